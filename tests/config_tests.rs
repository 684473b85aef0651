use logship::config::{load_config, ConfigError};
use logship::{Severity, ShipperOptions};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_config_from_file() {
    let file = write_config(
        r#"
destination:
  group_name: checkout
  stream_name: worker-3
level: warn
batch:
  size: 250
  period: 2s
  max_attempts: 4
  initial_delay: 100ms
buffer:
  capacity: 1000
endpoint:
  url: http://127.0.0.1:4588
"#,
    );

    let config = load_config(file.path()).unwrap();
    let destination = config.destination();
    assert_eq!(destination.group_name, "checkout");
    assert_eq!(destination.stream_name, "worker-3");

    let options = ShipperOptions::from(&config);
    assert_eq!(options.level, Severity::Warn);
    assert_eq!(options.batch_size, 250);
    assert_eq!(options.max_attempts, 4);
    assert_eq!(options.buffer_capacity, Some(1000));
    assert_eq!(options.schedule.period, Duration::from_secs(2));
    assert_eq!(options.schedule.initial_delay, Duration::from_millis(100));
    assert_eq!(options.schedule.shutdown_timeout, Duration::from_secs(60));
    assert!(options.sequence_token.is_none());
}

#[test]
fn test_stream_name_defaults_to_host() {
    let file = write_config("destination:\n  group_name: checkout\n");

    let config = load_config(file.path()).unwrap();

    assert!(!config.destination().stream_name.is_empty());
}

#[test]
fn test_missing_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yml");

    let err = load_config(&path).unwrap_err();

    assert!(matches!(err, ConfigError::Io(_)));
    assert!(err.to_string().contains("absent.yml"));
}

#[test]
fn test_invalid_values_are_all_reported() {
    let file = write_config(
        r#"
destination:
  group_name: ""
batch:
  size: 20000
  max_attempts: 0
max_message_length: 3
"#,
    );

    match load_config(file.path()).unwrap_err() {
        ConfigError::ValidationList(errors) => {
            assert_eq!(errors.len(), 4);
            assert!(errors.iter().any(|e| e.contains("group_name")));
            assert!(errors.iter().any(|e| e.contains("batch.size")));
            assert!(errors.iter().any(|e| e.contains("max_attempts")));
            assert!(errors.iter().any(|e| e.contains("max_message_length")));
        }
        other => panic!("expected validation list, got {:?}", other),
    }
}

#[test]
fn test_unset_env_var_is_reported() {
    let file = write_config("destination:\n  group_name: $env{LOGSHIP_TEST_UNSET_GROUP}\n");

    let err = load_config(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::Validation(_)));
    assert!(err.to_string().contains("LOGSHIP_TEST_UNSET_GROUP"));
}

#[test]
fn test_malformed_yaml_names_file() {
    let file = write_config("destination: [unclosed\n");

    let err = load_config(file.path()).unwrap_err();

    assert!(err.to_string().contains(&file.path().display().to_string()));
}
