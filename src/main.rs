use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use harbor_core::AppConfig;
use harbor_dispatch::app::Application;
use harbor_dispatch::scenario::{load_events, Scenario};
use harbor_dispatch::shutdown::ShutdownManager;
use harbor_infrastructure::init_logging;
use tokio::signal;
use tracing::{error, info, warn};

fn cli() -> Command {
    Command::new("harbor")
        .version("1.0.0")
        .about("港口调度协调核心")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径（缺省时按默认路径查找）")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别（缺省使用配置文件）")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式（缺省使用配置文件）")
                .value_parser(["json", "pretty", "compact"])
                .global(true),
        )
        .subcommand(Command::new("run").about("运行调度循环与预留回收，直到收到关闭信号"))
        .subcommand(
            Command::new("plan")
                .about("准入并调度一批请求，以JSON输出分配结果")
                .arg(Arg::new("scenario").value_name("SCENARIO").required(true)),
        )
        .subcommand(
            Command::new("replay")
                .about("回放事件文件，以JSON输出结果")
                .arg(Arg::new("events").value_name("EVENTS").required(true))
                .arg(
                    Arg::new("window")
                        .short('w')
                        .long("window")
                        .value_name("N")
                        .help("分窗回放的窗口大小")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str))
        .with_context(|| format!("加载配置失败: {config_path:?}"))?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.observability.log_format.clone());
    init_logging(&log_level, &log_format)?;

    match matches.subcommand() {
        Some(("run", _)) => run(config).await,
        Some(("plan", sub)) => {
            let scenario = Scenario::from_file(required(sub, "scenario")?)?;
            if let Some(tide_level) = scenario.tide_level {
                config.port.tide_level = tide_level;
            }
            let app = Application::new(config).await?;
            let report = app.plan(scenario).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Some(("replay", sub)) => {
            let events = load_events(required(sub, "events")?)?;
            let window = sub.get_one::<usize>("window").copied();
            let app = Application::new(config).await?;
            let replayed = app.replay(&events, window)?;
            println!("{}", serde_json::to_string_pretty(&replayed)?);
            Ok(())
        }
        _ => Err(anyhow::anyhow!("未知的子命令")),
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(name)
        .with_context(|| format!("缺少参数: {name}"))
}

async fn run(config: AppConfig) -> Result<()> {
    info!(port = %config.port.name, "启动港口调度服务");

    let app = Arc::new(Application::new(config).await?);
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);

        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await?;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("港口调度服务已退出");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("安装SIGTERM信号处理器失败")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("安装Ctrl+C信号处理器失败")?;
                info!("收到Ctrl+C信号");
            }
            _ = terminate.recv() => {
                info!("收到SIGTERM信号");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("安装Ctrl+C信号处理器失败")?;
        info!("收到Ctrl+C信号");
    }

    Ok(())
}
