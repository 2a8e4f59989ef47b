//! Integration tests for the text layer: rendering through `tracing`,
//! trace id propagation and forwarding to the reporter.

use std::sync::Arc;
use std::thread;

use rmlog::logging::{FormatterSettings, Level, TextFormatter, TextLayer, TimeZone, HANDLED_TARGET};
use rmlog::reporting::Reporting;
use rmlog::trace::{self, TraceId};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

mod common;
use common::SharedBuffer;

fn settings(reporting: bool) -> FormatterSettings {
    FormatterSettings {
        min_level: Level::INFO,
        add_source: true,
        reporting,
        time_zone: TimeZone::Utc,
    }
}

fn layer(buffer: &SharedBuffer, reporting: Reporting, forward: bool) -> TextLayer<SharedBuffer> {
    TextLayer::new(TextFormatter::new(buffer.clone(), settings(forward)).with_reporter(reporting))
}

#[test]
fn test_layer_writes_lines() {
    let buffer = SharedBuffer::default();
    let subscriber = Registry::default().with(layer(&buffer, Reporting::Disabled, false));

    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!("below the threshold");
        tracing::info!(user = "ana", attempts = 3, "user logged in");
        tracing::warn!(ratio = 0.5, "slow");
    });

    let lines = buffer.lines();
    assert_eq!(lines.len(), 2, "{:?}", lines);
    assert!(lines[0].contains(" [INFO] [tests/formatter.rs:"));
    assert!(lines[0].ends_with("user logged in user=ana attempts=3"));
    assert!(lines[1].contains(" [WARN] "));
    assert!(lines[1].ends_with("slow ratio=0.5"));
}

#[test]
fn test_level_reload_takes_effect() {
    let buffer = SharedBuffer::default();
    let layer = layer(&buffer, Reporting::Disabled, false);
    let handle = layer.reload_handle();
    let subscriber = Registry::default().with(layer);

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("first");
        handle.set_level(Level::ERROR);
        tracing::warn!("dropped");
        tracing::error!("kept");
    });

    let lines = buffer.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("first"));
    assert!(lines[1].ends_with("kept"));
    assert_eq!(handle.current().min_level, Level::ERROR);
}

#[test]
fn test_error_in_span_is_reported_with_trace_id() {
    let buffer = SharedBuffer::default();
    let (reporter, transport) = common::test_reporter();
    let subscriber = Registry::default().with(layer(&buffer, Reporting::Explicit(reporter), true));

    let trace_id = TraceId::from_string("trace-123");
    tracing::subscriber::with_default(subscriber, || {
        let _span = trace::trace_span(&trace_id).entered();
        tracing::info!("not reported");
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        tracing::error!(error = &err as &(dyn std::error::Error + 'static), order = 42, "charge failed");
    });

    let events = common::events(&transport);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.level, sentry::Level::Error);
    assert_eq!(event.tags.get("trace_id").map(String::as_str), Some("trace-123"));
    assert_eq!(event.tags.get("order").map(String::as_str), Some("42"));
    assert_eq!(event.tags.get("error_captured").map(String::as_str), Some("true"));
    assert_eq!(event.tags.get("error_type").map(String::as_str), Some("connection"));
    assert_eq!(event.tags.get("rust_package").map(String::as_str), Some("rmlog"));
    let fingerprint: Vec<String> = event.fingerprint.iter().map(|f| f.to_string()).collect();
    assert_eq!(fingerprint, ["{{ default }}", "connection-refused"]);
    assert!(event.contexts.contains_key("log_context"));
    assert!(!event.exception.values.is_empty());
}

#[test]
fn test_display_fields_become_tags() {
    let buffer = SharedBuffer::default();
    let (reporter, transport) = common::test_reporter();
    let subscriber = Registry::default().with(layer(&buffer, Reporting::Explicit(reporter), true));

    let name = String::from("abc");
    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(user = %name, "failed");
    });

    let events = common::events(&transport);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tags.get("user").map(String::as_str), Some("abc"));
    assert!(!events[0].extra.contains_key("user"));
}

#[test]
fn test_handled_target_is_not_forwarded() {
    let buffer = SharedBuffer::default();
    let (reporter, transport) = common::test_reporter();
    let subscriber = Registry::default().with(layer(&buffer, Reporting::Explicit(reporter), true));

    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(target: HANDLED_TARGET, "already reported");
    });

    assert_eq!(buffer.lines().len(), 1);
    assert!(common::events(&transport).is_empty());
}

#[test]
fn test_forwarding_off_keeps_events_local() {
    let buffer = SharedBuffer::default();
    let (reporter, transport) = common::test_reporter();
    let subscriber = Registry::default().with(layer(&buffer, Reporting::Explicit(reporter), false));

    tracing::subscriber::with_default(subscriber, || {
        tracing::error!("local only");
    });

    assert_eq!(buffer.lines().len(), 1);
    assert!(common::events(&transport).is_empty());
}

#[test]
fn test_concurrent_writers_produce_whole_lines() {
    let buffer = SharedBuffer::default();
    let subscriber = Arc::new(Registry::default().with(layer(&buffer, Reporting::Disabled, false)));

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let subscriber = Arc::clone(&subscriber);
            thread::spawn(move || {
                tracing::subscriber::with_default(subscriber, || {
                    for i in 0..50 {
                        tracing::info!(worker, i, "tick");
                    }
                });
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let lines = buffer.lines();
    assert_eq!(lines.len(), 400);
    for line in lines {
        assert!(line.contains(" [INFO] "), "{}", line);
        assert!(line.contains(" tick worker="), "{}", line);
    }
}
