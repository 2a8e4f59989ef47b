//! Error reporting to Sentry.
//!
//! # Data Flow
//! ```text
//! Record (from the log layer) or error (from middleware)
//!     → classify.rs (category + fingerprint)
//!     → bridge.rs Reporter (tags vs extra, severity, exception chain)
//!     → sentry::Client with a per-call Scope
//!
//! state.rs publishes one Reporter for the whole process
//! ```
//!
//! # Design Decisions
//! - Components take a [`Reporting`] value instead of reaching for the
//!   global directly, so tests can inject a reporter
//! - Each submission builds its own `Scope`; nothing shared is mutated

use std::sync::Arc;

pub mod bridge;
pub mod classify;
pub mod state;

pub use bridge::{Reporter, ReportingSettings};
pub use classify::{classify, fingerprint, Classifier, KeywordRule};
pub use state::{capture_event, flush, init, init_with_options, is_initialized, reporter, uninstall};

/// Errors raised while setting up reporting.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("invalid Sentry DSN: {0}")]
    InvalidDsn(#[source] sentry::types::ParseDsnError),
}

/// Which reporter a component submits to.
#[derive(Debug, Clone, Default)]
pub enum Reporting {
    /// The process-wide reporter, if one has been initialized.
    #[default]
    Global,
    Explicit(Arc<Reporter>),
    Disabled,
}

impl Reporting {
    pub fn get(&self) -> Option<Arc<Reporter>> {
        match self {
            Reporting::Global => state::reporter(),
            Reporting::Explicit(reporter) => Some(Arc::clone(reporter)),
            Reporting::Disabled => None,
        }
    }
}

impl From<Arc<Reporter>> for Reporting {
    fn from(reporter: Arc<Reporter>) -> Self {
        Reporting::Explicit(reporter)
    }
}
