//! Client-facing response bodies for handled errors.
//!
//! # Responsibilities
//! - Turn an error into a status code and an optional JSON body
//! - Log internal failures with the request they happened in
//!
//! # Design Decisions
//! - Only the `message`/`property` pair of an `AppError` ever reaches the
//!   client; anything else collapses to a generic message
//! - Internal failures (500 or database) are always logged, even when the
//!   client gets a 4xx-looking body

use std::error::Error;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, ErrorKind};
use crate::http::request::RequestInfo;
use crate::logging::HANDLED_TARGET;
use crate::reporting::classify::find_app_error;

/// Message sent when an error carries nothing safe to show.
pub const GENERIC_MESSAGE: &str = "Oops, something went wrong";

/// Per-field feedback entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub code_type: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// JSON body returned to API clients. Empty fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub answer_code: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_info: Vec<AnswerInfo>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl HttpResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn answer(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            answer_info: vec![AnswerInfo {
                property: property.into(),
                message: message.into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Status and body for an `AppError`, without logging.
pub fn app_error_response(err: &AppError) -> (StatusCode, HttpResponse) {
    let body = if err.property().is_empty() || err.message().is_empty() {
        HttpResponse::message(GENERIC_MESSAGE)
    } else {
        HttpResponse::answer(err.property(), err.message())
    };
    (err.status_code(), body)
}

/// Whether a log line produced here should also be forwarded to the
/// error tracker by the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Forwarding {
    Forward,
    AlreadyReported,
}

macro_rules! log_error {
    ($forwarding:expr, $($arg:tt)+) => {
        match $forwarding {
            Forwarding::Forward => tracing::error!($($arg)+),
            Forwarding::AlreadyReported => tracing::error!(target: HANDLED_TARGET, $($arg)+),
        }
    };
}

/// Decide the client response for `err` and log it when it is an internal
/// failure.
///
/// Returns `(500, None)` when the chain holds no `AppError`.
pub fn handle_app_error(
    err: &(dyn Error + 'static),
    request: Option<&RequestInfo>,
) -> (StatusCode, Option<HttpResponse>) {
    respond(err, request, Forwarding::Forward, None)
}

/// Same as [`handle_app_error`], with the id of an event already sent for
/// this failure added to the log line.
pub(crate) fn respond(
    err: &(dyn Error + 'static),
    request: Option<&RequestInfo>,
    forwarding: Forwarding,
    event_id: Option<&str>,
) -> (StatusCode, Option<HttpResponse>) {
    let empty = RequestInfo::default();

    let Some(app) = find_app_error(err) else {
        match request {
            Some(req) => log_error!(
                forwarding,
                err = err,
                request_url = req.url.as_str(),
                request_method = req.method.as_str(),
                request_route = req.route.as_str(),
                request_params = ?req.params,
                request_query_params = ?req.query,
                sentry_event_id = event_id,
                "handled error"
            ),
            None => log_error!(forwarding, err = err, sentry_event_id = event_id, "handled error"),
        }
        return (StatusCode::INTERNAL_SERVER_ERROR, None);
    };

    let (status, body) = app_error_response(app);

    if status == StatusCode::INTERNAL_SERVER_ERROR || *app.kind() == ErrorKind::Database {
        let req = request.unwrap_or(&empty);
        let system_error = app
            .system_error()
            .map(|e| e.to_string())
            .unwrap_or_default();
        log_error!(
            forwarding,
            details = app.details(),
            file = app.file(),
            error_message = app.message(),
            value = %app.value(),
            property = app.property(),
            kind = app.kind().as_str(),
            system_error = system_error.as_str(),
            request_url = req.url.as_str(),
            request_method = req.method.as_str(),
            request_route = req.route.as_str(),
            request_params = ?req.params,
            request_query_params = ?req.query,
            sentry_event_id = event_id,
            "Handled internal error"
        );
    }

    (status, Some(body))
}
