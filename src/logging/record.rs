//! Log records and their attribute values.
//!
//! # Responsibilities
//! - Hold one log call's data: time, level, message, source, ordered attributes
//! - Convert a `tracing` event into a record
//! - Snapshot borrowed errors into owned values that keep their classification
//!
//! # Design Decisions
//! - Records are plain owned values; nothing borrows from the event
//! - Errors are captured once at the call site, so the formatter and the
//!   reporter see the same classification and fingerprint

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::panic::Location;

use chrono::{DateTime, Utc};
use tracing::field::{Field, Visit};

use crate::errors::AppError;
use crate::logging::level::Level;
use crate::reporting::classify::{self, Classifier};

/// Name of the field holding the formatted message of a `tracing` event.
pub const MESSAGE_FIELD: &str = "message";

/// Call site of a log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

impl From<&'static Location<'static>> for SourceLocation {
    fn from(location: &'static Location<'static>) -> Self {
        Self::new(location.file(), location.line())
    }
}

/// Dynamically typed attribute value.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Error(ErrorValue),
    /// Anything else, already rendered through `Debug`.
    Debug(String),
}

impl Value {
    /// Capture a borrowed error as an attribute value.
    pub fn error(err: &(dyn Error + 'static)) -> Self {
        Value::Error(ErrorValue::capture(err))
    }

    /// Capture any `Debug` value as an opaque attribute value.
    pub fn debug(value: &dyn fmt::Debug) -> Self {
        Value::Debug(format!("{:?}", value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::I64(n) => write!(f, "{}", n),
            Value::U64(n) => write!(f, "{}", n),
            Value::F64(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Error(e) => write!(f, "{}", e),
            Value::Debug(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I64(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::U64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Key/value attribute of a record.
#[derive(Debug, Clone)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single log call.
#[derive(Debug, Clone)]
pub struct Record {
    pub time: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub source: Option<SourceLocation>,
    pub attrs: Vec<Attr>,
}

impl Record {
    /// Create a record stamped with the current time and the caller's location.
    #[track_caller]
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            level,
            message: message.into(),
            source: Some(Location::caller().into()),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push(Attr::new(key, value));
        self
    }

    pub fn with_error(mut self, key: impl Into<String>, err: &(dyn Error + 'static)) -> Self {
        self.attrs.push(Attr {
            key: key.into(),
            value: Value::error(err),
        });
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    pub fn with_source(mut self, source: Option<SourceLocation>) -> Self {
        self.source = source;
        self
    }

    /// First attribute with the given key.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.iter().find(|a| a.key == key).map(|a| &a.value)
    }

    /// Build a record from a `tracing` event.
    ///
    /// The `message` field becomes the record message; every other field
    /// becomes an attribute in declaration order. Events without file/line
    /// metadata fall back to the module path with line 0.
    pub fn from_event(event: &tracing::Event<'_>) -> Self {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let source = match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => Some(SourceLocation::new(file, line)),
            _ => metadata
                .module_path()
                .map(|module| SourceLocation::new(module, 0)),
        };

        Self {
            time: Utc::now(),
            level: Level::from(*metadata.level()),
            message: visitor.message.unwrap_or_default(),
            source,
            attrs: visitor.attrs,
        }
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    attrs: Vec<Attr>,
}

impl RecordVisitor {
    fn push(&mut self, field: &Field, value: Value) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(value.to_string());
        } else {
            self.attrs.push(Attr {
                key: field.name().to_string(),
                value,
            });
        }
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, Value::Str(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::U64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.push(field, Value::error(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, Value::debug(value));
    }
}

/// Owned snapshot of an error and its source chain.
///
/// The category and fingerprint are computed while the original error is
/// still borrowable, so typed errors deep in the chain are not lost.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    message: String,
    type_name: String,
    category: Cow<'static, str>,
    fingerprint: String,
    app_error: Option<AppError>,
    source: Option<Box<ChainLink>>,
}

impl ErrorValue {
    pub fn capture(err: &(dyn Error + 'static)) -> Self {
        Self::capture_with(err, &Classifier::default())
    }

    pub fn capture_with(err: &(dyn Error + 'static), classifier: &Classifier) -> Self {
        Self {
            message: err.to_string(),
            type_name: type_name_of(err),
            category: classifier.classify(err),
            fingerprint: classifier.fingerprint(err),
            app_error: classify::find_app_error(err).cloned(),
            source: err.source().map(ChainLink::capture),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Concrete type of the captured error as printed by `Debug`, e.g. `Custom`
    /// for an `io::Error` built from a message.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// `(type name, message)` for every cause below the top error, outermost first.
    pub fn causes(&self) -> impl Iterator<Item = (&str, &str)> {
        std::iter::successors(self.source.as_deref(), |link| link.next.as_deref())
            .map(|link| (link.type_name.as_str(), link.message.as_str()))
    }

    /// Coarse category, e.g. `validation` or `connection`.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Grouping key for the error tracker.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The typed domain error found in the chain, if any.
    pub fn app_error(&self) -> Option<&AppError> {
        self.app_error.as_ref()
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ErrorValue {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|link| link as &(dyn Error + 'static))
    }
}

#[derive(Debug, Clone)]
struct ChainLink {
    message: String,
    type_name: String,
    next: Option<Box<ChainLink>>,
}

impl ChainLink {
    fn capture(err: &(dyn Error + 'static)) -> Box<Self> {
        Box::new(Self {
            message: err.to_string(),
            type_name: type_name_of(err),
            next: err.source().map(ChainLink::capture),
        })
    }
}

fn type_name_of(err: &(dyn Error + 'static)) -> String {
    sentry::parse_type_from_debug(&format!("{:?}", err)).to_string()
}

impl fmt::Display for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ChainLink {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.next.as_deref().map(|link| link as &(dyn Error + 'static))
    }
}
