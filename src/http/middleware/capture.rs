//! Reporting of errors returned by handlers.
//!
//! # Responsibilities
//! - Pick up the `HandlerError` a handler's response carries
//! - Log it with the request it belongs to
//! - Report server errors (status >= 500) with request and error context
//! - Leave client errors (4xx) alone unless they are database failures
//!
//! # Design Decisions
//! - Two entry points share one implementation: `error_handler` is the
//!   terminal handler and strips the error from the response,
//!   `capture_error_middleware` reports and passes the error on
//! - Logs emitted here use the handled target; the failure is reported
//!   explicitly, never again through the log layer
//! - Each handled failure writes exactly one log line, carrying the id of
//!   the event sent for it

use std::backtrace::Backtrace;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use sentry::protocol::{Context, Map};

use crate::errors::response::{respond, Forwarding};
use crate::errors::ErrorKind;
use crate::http::middleware::scope::{request_scope, ReportScope};
use crate::http::request::RequestInfo;
use crate::http::response::HandlerError;
use crate::logging::HANDLED_TARGET;
use crate::reporting::classify::{self, find_app_error};
use crate::reporting::Reporting;
use crate::trace::TraceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ErrorHandler,
    Middleware,
}

impl Stage {
    fn tag(self) -> &'static str {
        match self {
            Stage::ErrorHandler => "axum",
            Stage::Middleware => "middleware",
        }
    }

    fn fingerprint_prefix(self) -> &'static str {
        match self {
            Stage::ErrorHandler => "axum-error",
            Stage::Middleware => "middleware-error",
        }
    }

    fn event_message(self) -> &'static str {
        match self {
            Stage::ErrorHandler => "Error handler error",
            Stage::Middleware => "Error captured in middleware",
        }
    }
}

/// Terminal error handling: log and report the handler's error, then drop
/// it from the response.
pub async fn error_handler(
    State(reporting): State<Reporting>,
    info: RequestInfo,
    req: Request,
    next: Next,
) -> Response {
    run(Stage::ErrorHandler, reporting, info, req, next).await
}

/// Report server errors and leave the error on the response for outer layers.
pub async fn capture_error_middleware(
    State(reporting): State<Reporting>,
    info: RequestInfo,
    req: Request,
    next: Next,
) -> Response {
    run(Stage::Middleware, reporting, info, req, next).await
}

async fn run(stage: Stage, reporting: Reporting, info: RequestInfo, req: Request, next: Next) -> Response {
    let report_scope = req.extensions().get::<ReportScope>().cloned();
    let trace_id = req.extensions().get::<TraceId>().cloned();

    let mut response = next.run(req).await;

    let error = match stage {
        Stage::ErrorHandler => response.extensions_mut().remove::<HandlerError>(),
        Stage::Middleware => response.extensions().get::<HandlerError>().cloned(),
    };
    let Some(error) = error else {
        return response;
    };

    let status = response.status();
    let database = find_app_error(error.as_error()).is_some_and(|app| *app.kind() == ErrorKind::Database);
    if !status.is_server_error() && !database {
        return response;
    }

    let event_id = if status.is_server_error() {
        reporting.get().and_then(|reporter| {
            let scope = server_error_scope(
                stage,
                status,
                &error,
                &info,
                report_scope.as_ref(),
                trace_id.as_ref(),
            );
            let mut event = sentry::event_from_error(error.as_error());
            event.message = Some(stage.event_message().to_string());
            event.level = sentry::Level::Error;
            reporter.capture_with_scope(event, &scope)
        })
    } else {
        None
    };
    let event_id = event_id.map(|id| id.to_string());

    // one line per failure
    match stage {
        Stage::ErrorHandler => {
            respond(
                error.as_error(),
                Some(&info),
                Forwarding::AlreadyReported,
                event_id.as_deref(),
            );
        }
        Stage::Middleware => log_captured(status, &error, &info, event_id.as_deref()),
    }

    response
}

fn server_error_scope(
    stage: Stage,
    status: StatusCode,
    error: &HandlerError,
    info: &RequestInfo,
    report_scope: Option<&ReportScope>,
    trace_id: Option<&TraceId>,
) -> sentry::Scope {
    let err = error.as_error();
    let code = status.as_u16().to_string();

    let mut scope = request_scope(report_scope, trace_id);
    scope.set_level(Some(sentry::Level::Error));
    scope.set_tag("error_handler", stage.tag());
    scope.set_tag("status_code", &code);
    scope.set_tag("error_type", classify::classify(err));

    scope.set_context("request", info.to_context());

    let mut details = Map::new();
    details.insert("message".into(), err.to_string().into());
    details.insert(
        "type".into(),
        sentry::parse_type_from_debug(&format!("{:?}", err)).into(),
    );
    details.insert("stack_trace".into(), Backtrace::capture().to_string().into());
    scope.set_context("error_details", Context::Other(details));

    let fingerprint = classify::fingerprint(err);
    scope.set_fingerprint(Some(&[stage.fingerprint_prefix(), code.as_str(), fingerprint.as_str()]));

    if let Some(app) = find_app_error(err) {
        let mut internal = Map::new();
        internal.insert("type".into(), app.kind().as_str().into());
        internal.insert("message".into(), app.message().into());
        internal.insert("details".into(), app.details().into());
        internal.insert("property".into(), app.property().into());
        internal.insert("value".into(), app.value().clone());
        internal.insert("file".into(), app.file().into());
        internal.insert(
            "system_error".into(),
            app.system_error()
                .map_or(serde_json::Value::Null, |e| e.to_string().into()),
        );
        scope.set_context("internal_error", Context::Other(internal));

        scope.set_tag("internal_error_type", app.kind().as_str());
        if !app.property().is_empty() {
            scope.set_tag("error_property", app.property());
        }
    }

    scope
}

fn log_captured(status: StatusCode, error: &HandlerError, info: &RequestInfo, event_id: Option<&str>) {
    tracing::error!(
        target: HANDLED_TARGET,
        url = info.url.as_str(),
        method = info.method.as_str(),
        status_code = status.as_u16(),
        error = error.as_error(),
        sentry_event_id = event_id,
        "Error captured in middleware"
    );
}
