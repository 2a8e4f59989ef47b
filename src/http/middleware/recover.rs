//! Panic recovery.
//!
//! # Responsibilities
//! - Stop a panicking handler from tearing down the connection task
//! - Report the panic with its location and backtrace
//! - Answer with a bare 500
//!
//! # Design Decisions
//! - A process panic hook stores location and backtrace in a thread-local;
//!   the catching future runs on the same thread and reads it right after
//!   the unwind, before its next await point
//! - The previous hook still runs, so default panic output is kept

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::time::Duration;

use axum::extract::{OriginalUri, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use sentry::protocol::{Context, Event, Map};

use crate::http::middleware::scope::{request_scope, ReportScope};
use crate::logging::HANDLED_TARGET;
use crate::reporting::Reporting;
use crate::trace::TraceId;

/// How long a recovered panic waits for its report to be delivered.
pub const PANIC_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
struct PanicSnapshot {
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicSnapshot>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let snapshot = PanicSnapshot {
                location: info
                    .location()
                    .map(|loc| format!("{}:{}", loc.file(), loc.line())),
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(snapshot));
            previous(info);
        }));
    });
}

fn take_snapshot() -> PanicSnapshot {
    LAST_PANIC
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_default()
}

/// Text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Catch panics from the inner stack, report them and respond 500.
pub async fn recover_middleware(
    State(reporting): State<Reporting>,
    req: Request,
    next: Next,
) -> Response {
    install_panic_hook();

    let url = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.to_string())
        .unwrap_or_else(|| req.uri().to_string());
    let report_scope = req.extensions().get::<ReportScope>().cloned();
    let trace_id = req.extensions().get::<TraceId>().cloned();

    let payload = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => return response,
        Err(payload) => payload,
    };

    let snapshot = take_snapshot();
    let value = panic_message(payload.as_ref());
    let location = snapshot.location.as_deref().unwrap_or("unknown:0");

    let reporter = reporting.get();
    let event_id = reporter.as_ref().and_then(|reporter| {
        let mut scope = request_scope(report_scope.as_ref(), trace_id.as_ref());
        scope.set_tag("panic_recovered", "true");
        scope.set_tag("component", "recovery_middleware");

        let mut details = Map::new();
        details.insert("recovered_value".into(), value.clone().into());
        details.insert("location".into(), location.into());
        details.insert("stack_trace".into(), snapshot.backtrace.clone().into());
        scope.set_context("panic_details", Context::Other(details));

        let event = Event {
            message: Some(format!("Panic: {}", value)),
            level: sentry::Level::Fatal,
            ..Default::default()
        };
        reporter.capture_with_scope(event, &scope)
    });

    let event_id = event_id.map(|id| id.to_string());
    let error_location = format!("[{}]", location);
    tracing::error!(
        target: HANDLED_TARGET,
        url = url.as_str(),
        error = value.as_str(),
        error_location = error_location.as_str(),
        sentry_event_id = event_id.as_deref(),
        "Panic recovered"
    );

    if let (Some(_), Some(reporter)) = (&event_id, reporter) {
        let flushed = tokio::task::spawn_blocking(move || reporter.flush(Some(PANIC_FLUSH_TIMEOUT))).await;
        if !matches!(flushed, Ok(true)) {
            tracing::warn!(target: HANDLED_TARGET, "Panic report not flushed in time");
        }
    }

    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "Box<dyn Any>");
    }

    #[test]
    fn test_hook_records_location() {
        install_panic_hook();
        let result = std::panic::catch_unwind(|| panic!("inside"));
        assert!(result.is_err());
        let snapshot = take_snapshot();
        assert!(snapshot.location.unwrap().contains("recover.rs"));
        assert!(take_snapshot().location.is_none());
    }
}
