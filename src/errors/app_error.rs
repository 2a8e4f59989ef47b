//! Typed application error with an HTTP status mapping.

use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Category of an [`AppError`]. Determines the HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Database,
    #[default]
    Internal,
    Busy,
    Forbidden,
    /// A category this crate does not know about; maps to 500.
    Unrecognized(String),
}

impl ErrorKind {
    /// Canonical upper-case name, e.g. `NOT_FOUND`.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Database => "DATABASE",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Busy => "BUSY",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Unrecognized(name) => name,
        }
    }

    /// Lower-case category token used by the classifier.
    pub fn token(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Database => "database",
            ErrorKind::Internal => "internal",
            ErrorKind::Busy => "busy",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Unrecognized(_) => "internal_error_unknown",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Busy => StatusCode::CONFLICT,
            ErrorKind::Unrecognized(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NOT_FOUND" => ErrorKind::NotFound,
            "VALIDATION" => ErrorKind::Validation,
            "DATABASE" => ErrorKind::Database,
            "INTERNAL" => ErrorKind::Internal,
            "BUSY" => ErrorKind::Busy,
            "FORBIDDEN" => ErrorKind::Forbidden,
            other => ErrorKind::Unrecognized(other.to_string()),
        })
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|never: Infallible| match never {}))
    }
}

/// Application error carrying a category, a user-facing message and the
/// offending field.
///
/// `message` and `property` may be shown to API clients; `details`, `file`
/// and `system_error` are for logs only.
#[derive(Debug, Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    property: String,
    value: serde_json::Value,
    details: String,
    file: String,
    system_error: Option<Arc<dyn Error + Send + Sync>>,
}

impl AppError {
    /// Start building an error. The caller's location is recorded.
    #[track_caller]
    pub fn builder() -> AppErrorBuilder {
        let location = Location::caller();
        AppErrorBuilder {
            err: AppError {
                kind: ErrorKind::default(),
                message: String::new(),
                property: String::new(),
                value: serde_json::Value::Null,
                details: String::new(),
                file: format!("[{}:{}]", location.file(), location.line()),
                system_error: None,
            },
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    /// Where the error was built, as `[file:line]`.
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn system_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.system_error.as_deref()
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handled internal error. Details: '{}', file: '{}', type: '{}' system error: '",
            self.details, self.file, self.kind
        )?;
        match &self.system_error {
            Some(err) => write!(f, "{}'", err),
            None => f.write_str("none'"),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.system_error
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

/// Builder for [`AppError`].
#[derive(Debug)]
pub struct AppErrorBuilder {
    err: AppError,
}

impl AppErrorBuilder {
    pub fn kind(mut self, kind: ErrorKind) -> Self {
        self.err.kind = kind;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.err.message = message.into();
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.err.details = details.into();
        self
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.err.property = property.into();
        self
    }

    /// The offending value. Values that fail to serialize are stored as null.
    pub fn value<T: Serialize>(mut self, value: T) -> Self {
        self.err.value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self
    }

    pub fn system_error<E>(mut self, err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.err.system_error = Some(Arc::new(err));
        self
    }

    /// Same as [`system_error`](Self::system_error) for errors that are
    /// already shared.
    pub fn shared_system_error(mut self, err: Arc<dyn Error + Send + Sync>) -> Self {
        self.err.system_error = Some(err);
        self
    }

    pub fn build(self) -> AppError {
        self.err
    }
}
