use crate::config::models::AppConfig;
use crate::errors::DispatchError;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert_eq!(config.admission.hard_limit, 1000);
    assert!(!config.admission.emergency_mode);
    assert_eq!(config.rate_limiter.shard_count, 16);
    assert_eq!(config.port.berths.len(), 3);
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[admission]
hard_limit = 50
emergency_mode = true

[rate_limiter]
max_tokens = 4.0
refill_rate_per_second = 0.5
shard_count = 8

[scheduling]
window_minutes = 30
max_per_window = 2

[port]
tide_level = 3.0

[[port.berths]]
id = "K7"
max_draft = 10.0
max_length = 200.0

[[port.channels]]
id = "inner"
latency = 12.0

[[port.channels]]
id = "outer"
latency = 20.0
reliability = 0.8
blocked = true
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.admission.hard_limit, 50);
    assert!(config.admission.emergency_mode);
    assert_eq!(config.rate_limiter.max_tokens, 4.0);
    assert_eq!(config.rate_limiter.request_cost, 1.0);
    assert_eq!(config.scheduling.max_per_window, 2);
    assert_eq!(config.scheduling.reservation_ttl_seconds, 1800);
    assert_eq!(config.port.berths[0].id, "K7");
    assert_eq!(config.port.channels[0].reliability, 1.0);
    assert!(config.port.channels[1].blocked);
    assert_eq!(config.checkpoint.interval, 100);
}

#[test]
fn test_invalid_toml_section_rejected() {
    let toml_content = r#"
[rate_limiter]
shard_count = 6
"#;
    let error = AppConfig::from_toml(toml_content).unwrap_err();
    let root = error.root_cause().to_string();
    assert!(root.contains("分片数"), "unexpected error: {root}");
}

#[test]
fn test_infinite_backoff_multiplier_rejected() {
    let toml_content = r#"
[resilience.route_service]
failure_threshold = 3
success_threshold = 3
recovery_timeout_ms = 45000
call_timeout_ms = 5000
backoff_multiplier = inf
max_recovery_timeout_ms = 240000
"#;
    let error = AppConfig::from_toml(toml_content).unwrap_err();
    let root = error.root_cause().to_string();
    assert!(root.contains("退避倍数"), "unexpected error: {root}");
}

#[test]
fn test_validate_reports_invalid_configuration() {
    let mut config = AppConfig::default();
    config.admission.hard_limit = 0;
    assert!(matches!(
        config.validate(),
        Err(DispatchError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_toml_round_trip_keeps_port_layout() {
    let config = AppConfig::default();
    let toml_str = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(parsed.port.berths.len(), config.port.berths.len());
    assert_eq!(parsed.port.channels, config.port.channels);
}
