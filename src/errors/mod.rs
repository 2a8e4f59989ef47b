//! Typed domain errors and their HTTP responses.
//!
//! # Data Flow
//! ```text
//! handler builds AppError::builder()...build()
//!     → returned through HandlerError (any source chain depth)
//!     → response.rs finds the AppError, logs internal failures
//!     → status + HttpResponse body for the client
//! ```
//!
//! # Design Decisions
//! - User-facing text (`message`, `property`) is kept apart from log-only
//!   text (`details`, `file`, `system_error`)
//! - The kind alone decides the status code

pub mod app_error;
pub mod response;

pub use app_error::{AppError, AppErrorBuilder, ErrorKind};
pub use response::{app_error_response, handle_app_error, AnswerInfo, HttpResponse, GENERIC_MESSAGE};
