use std::io::Write;

use tempfile::NamedTempFile;

use crate::config::models::AppConfig;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[admission]
hard_limit = 25

[checkpoint]
interval = 10
replay_window_size = 4
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.admission.hard_limit, 25);
    assert_eq!(config.checkpoint.interval, 10);
    assert_eq!(config.checkpoint.replay_window_size, 4);
}

#[test]
fn test_load_missing_file_fails() {
    let result = AppConfig::load(Some("/nonexistent/harbor.toml"));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("配置文件不存在"));
}

#[test]
fn test_load_rejects_invalid_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[admission]\nhard_limit = -1").unwrap();

    let path = file.path().to_str().unwrap().to_string();
    assert!(AppConfig::load(Some(&path)).is_err());
}
