//! Request trace identifiers.
//!
//! # Responsibilities
//! - Mint and carry an opaque per-request trace id
//! - Hold the process-wide key under which the id is reported
//! - Attach an id to a unit of async work with a deadline
//!
//! # Design Decisions
//! - The id travels in a `tracing` span field named `trace_id`; the log
//!   layer copies it into span extensions so it can be read back
//! - The reporting key is an atomically swapped immutable string, set once
//!   at startup and read on every report

use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::time::error::Elapsed;
use tracing::{Instrument, Span};
use tracing_subscriber::registry::{LookupSpan, Registry};

/// Span field carrying the trace id.
pub const TRACE_ID_FIELD: &str = "trace_id";

/// Default key used for the trace id tag in reports.
pub const DEFAULT_TRACE_KEY: &str = "trace_id";

static TRACE_KEY: LazyLock<ArcSwap<String>> =
    LazyLock::new(|| ArcSwap::from_pointee(DEFAULT_TRACE_KEY.to_string()));

/// Opaque request trace id, a UUID v4 string unless supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Mint a fresh id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an id received from elsewhere, e.g. an incoming header.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current reporting key for the trace id.
pub fn trace_key() -> Arc<String> {
    TRACE_KEY.load_full()
}

/// Publish a new reporting key. Intended for startup.
pub fn set_trace_key(key: impl Into<String>) {
    TRACE_KEY.store(Arc::new(key.into()));
}

/// Span carrying `trace_id`. Events inside it are stamped with the id.
pub fn trace_span(trace_id: &TraceId) -> Span {
    tracing::info_span!("trace", trace_id = %trace_id)
}

/// Trace id of the innermost span in the current context that carries one.
///
/// Requires the crate's log layer on a `Registry`; returns `None` otherwise.
pub fn current_trace_id() -> Option<TraceId> {
    Span::current()
        .with_subscriber(|(id, dispatch)| {
            let registry = dispatch.downcast_ref::<Registry>()?;
            let span = registry.span(id)?;
            span.scope()
                .find_map(|span| span.extensions().get::<TraceId>().cloned())
        })
        .flatten()
}

/// Run `fut` under a fresh trace id, failing with `Elapsed` after `timeout`.
pub async fn with_trace_id<F>(timeout: Duration, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    let trace_id = TraceId::new();
    tokio::time::timeout(timeout, fut.instrument(trace_span(&trace_id))).await
}
