//! Structured logging.
//!
//! # Data Flow
//! ```text
//! tracing event
//!     → formatter.rs TextLayer (level check, span trace id)
//!     → record.rs Record (message, source, ordered attributes)
//!     → one text line on the configured writer
//!     → reporting::Reporter when forwarding is enabled
//! ```
//!
//! # Design Decisions
//! - Exactly one text sink and at most one forwarding sink
//! - Events under [`HANDLED_TARGET`] are written but never forwarded;
//!   whoever emitted them has already reported the failure

pub mod formatter;
pub mod init;
pub mod level;
pub mod record;

pub use formatter::{FormatterSettings, LogHandle, TextFormatter, TextLayer, TimeZone};
pub use init::{init, LogInitError};
pub use level::{level_from_env, parse_bool, parse_level, Level, LOG_LEVEL_ENV};
pub use record::{Attr, ErrorValue, Record, SourceLocation, Value};

/// Target of log events whose failure was already sent to the error tracker.
pub const HANDLED_TARGET: &str = "rmlog::handled";
