//! axum middleware for trace ids and error reporting.
//!
//! # Layer Order
//! ```text
//! request  → SetRequestId (mint x-trace-id)
//!          → PropagateRequestId (echo x-trace-id)
//!          → trace_id_middleware (TraceId extension + request span)
//!          → enhance_report_scope (endpoint, method, user)
//!          → recover_middleware (panics → 500)
//!          → error_handler (HandlerError → log + report)
//!          → handler
//! ```

pub mod capture;
pub mod recover;
pub mod scope;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::http::request::{trace_id_middleware, MakeTraceId, X_TRACE_ID};
use crate::reporting::Reporting;

pub use capture::{capture_error_middleware, error_handler};
pub use recover::recover_middleware;
pub use scope::{enhance_report_scope, ReportScope, ReportUser};

/// Wrap `router` in the full middleware stack, outermost last.
///
/// Layers added to the returned router run before all of these, which is
/// where a [`ReportUser`] should be inserted.
pub fn install<S>(router: Router<S>, reporting: Reporting) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(from_fn_with_state(reporting.clone(), error_handler))
        .layer(from_fn_with_state(reporting, recover_middleware))
        .layer(from_fn(enhance_report_scope))
        .layer(from_fn(trace_id_middleware))
        .layer(PropagateRequestIdLayer::new(X_TRACE_ID))
        .layer(SetRequestIdLayer::new(X_TRACE_ID, MakeTraceId))
}
