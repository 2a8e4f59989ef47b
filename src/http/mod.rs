//! HTTP glue for axum applications.
//!
//! # Data Flow
//! ```text
//! incoming request
//!     → request.rs (trace id, request span, RequestInfo)
//!     → middleware/ (report scope, panic recovery)
//!     → handler returns Result<_, HandlerError>
//!     → response.rs (status + body, error kept in extensions)
//!     → middleware/capture.rs (log, report server errors)
//!     → client
//! ```

pub mod middleware;
pub mod request;
pub mod response;

pub use request::{trace_id_middleware, MakeTraceId, RequestInfo, X_TRACE_ID};
pub use response::{HandlerError, HttpError};
