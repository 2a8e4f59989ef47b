//! Global subscriber installation. One test per binary: the global
//! dispatcher can only be set once per process.

use rmlog::config::LoggingConfig;
use rmlog::logging::{self, Level, LogInitError};
use rmlog::trace::{self, TraceId};

#[test]
fn test_init_once_then_already_set() {
    let config = LoggingConfig {
        level: Some(Level::INFO),
        trace_key: "request_id".to_string(),
        ..Default::default()
    };

    let handle = logging::init(&config).unwrap();
    assert_eq!(handle.current().min_level, Level::INFO);
    assert_eq!(trace::trace_key().as_str(), "request_id");

    // the global registry tracks trace ids of entered spans
    let trace_id = TraceId::from_string("init-trace");
    let span = trace::trace_span(&trace_id);
    span.in_scope(|| {
        assert_eq!(trace::current_trace_id(), Some(trace_id.clone()));
    });
    assert_eq!(trace::current_trace_id(), None);

    handle.set_level(Level::ERROR);
    assert_eq!(handle.current().min_level, Level::ERROR);

    let second = logging::init(&LoggingConfig::default());
    assert!(matches!(second, Err(LogInitError::AlreadySet(_))));
}
