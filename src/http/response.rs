//! Errors returned from handlers.
//!
//! # Responsibilities
//! - Carry framework errors with an explicit status code
//! - Turn any handler error into a response while keeping the error itself
//!   available to the middleware that reports it
//!
//! # Design Decisions
//! - The error rides along in response extensions; the error middleware
//!   decides whether to keep it there
//! - Status precedence follows classification: typed error first, then
//!   framework status, then 500

use std::error::Error;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::errors::app_error_response;
use crate::reporting::classify::{find_app_error, find_http_error};

/// Framework-level error with a status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.status.into_response()
    }
}

/// Error type for handlers: `Result<T, HandlerError>`.
///
/// Converts from any error with `?`.
#[derive(Debug, Clone)]
pub struct HandlerError(Arc<dyn Error + Send + Sync>);

impl HandlerError {
    pub fn as_error(&self) -> &(dyn Error + 'static) {
        self.0.as_ref()
    }

    pub fn shared(&self) -> Arc<dyn Error + Send + Sync> {
        Arc::clone(&self.0)
    }

    /// Status this error responds with.
    pub fn status(&self) -> StatusCode {
        let err = self.as_error();
        if let Some(app) = find_app_error(err) {
            app.status_code()
        } else if let Some(http) = find_http_error(err) {
            http.status()
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self(Arc::new(err))
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let mut response = match find_app_error(self.as_error()) {
            Some(app) => app_error_response(app).into_response(),
            None => self.status().into_response(),
        };
        response.extensions_mut().insert(self);
        response
    }
}
