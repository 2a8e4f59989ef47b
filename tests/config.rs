//! Loading configuration files from disk and reloading them while running.

use std::io::Write;
use std::time::{Duration, Instant};

use rmlog::config::{apply_updates, load_config, ConfigError, ConfigWatcher, ValidationError};
use rmlog::logging::{Level, TextFormatter, TimeZone};

#[test]
fn test_load_full_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[logging]
level = "debug"
add_source = false
reporting_enabled = true
trace_key = "request_id"
time_zone = "utc"
filter = "rmlog=debug,hyper=warn"

[reporting]
enabled = true
dsn = "https://public@sentry.invalid/1"
environment = "staging"
sample_rate = 0.5
filter_levels = ["warn"]
"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.logging.min_level(), Level::DEBUG);
    assert!(!config.logging.add_source);
    assert_eq!(config.logging.trace_key, "request_id");
    assert_eq!(config.logging.time_zone, TimeZone::Utc);

    let settings = config.logging.formatter_settings();
    assert!(settings.reporting);
    assert_eq!(settings.time_zone, TimeZone::Utc);

    assert_eq!(config.reporting.environment.as_deref(), Some("staging"));
    assert_eq!(config.reporting.sample_rate, 0.5);
    assert_eq!(config.reporting.settings().filter_levels, vec![Level::WARN]);
}

#[test]
fn test_empty_file_uses_defaults() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let config = load_config(file.path()).unwrap();
    assert!(config.logging.add_source);
    assert!(!config.reporting.enabled);
    assert_eq!(config.logging.trace_key, "trace_id");
}

#[test]
fn test_validation_errors_are_aggregated() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[logging]
trace_key = ""

[reporting]
enabled = true
sample_rate = 2.0
"#
    )
    .unwrap();

    match load_config(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.contains(&ValidationError::EmptyTraceKey));
            assert!(errors.contains(&ValidationError::MissingDsn));
            assert!(errors.contains(&ValidationError::SampleRateOutOfRange(2.0)));
        }
        other => panic!("expected validation errors, got {:?}", other),
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_config(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[tokio::test]
async fn test_watcher_reloads_level_on_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rmlog.toml");
    std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();
    let config = load_config(&path).unwrap();

    let formatter = TextFormatter::new(std::io::sink, config.logging.formatter_settings());
    let handle = formatter.reload_handle();
    assert_eq!(handle.current().min_level, Level::WARN);

    let (watcher, updates) = ConfigWatcher::new(&path, &config.logging);
    let _watcher = watcher.run().unwrap();
    tokio::spawn(apply_updates(handle.clone(), updates));
    tokio::time::sleep(Duration::from_millis(100)).await;

    std::fs::write(&path, "[logging]\nlevel = \"error\"\nadd_source = false\n").unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.current().min_level != Level::ERROR {
        assert!(Instant::now() < deadline, "logging level was not reloaded");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!handle.current().add_source);
    assert!(!formatter.enabled(Level::WARN));
}
