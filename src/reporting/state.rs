//! Process-wide reporter.
//!
//! # Design Decisions
//! - One `ArcSwapOption` slot, published with a single store; readers never
//!   see a half-initialized reporter
//! - Before initialization every call here is a no-op
//! - The client is also bound to the main hub so `sentry::` free functions
//!   used elsewhere in the process reach the same project

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use sentry::{ClientOptions, Hub, IntoDsn};
use uuid::Uuid;

use crate::config::ReportingConfig;
use crate::logging::record::Record;
use crate::reporting::bridge::{Reporter, ReportingSettings};
use crate::reporting::ReportError;
use crate::trace::TraceId;

static REPORTER: ArcSwapOption<Reporter> = ArcSwapOption::const_empty();

/// Initialize reporting from configuration.
pub fn init(config: &ReportingConfig) -> Result<Arc<Reporter>, ReportError> {
    let dsn = config
        .dsn
        .as_str()
        .into_dsn()
        .map_err(ReportError::InvalidDsn)?;

    let options = ClientOptions {
        dsn,
        environment: config.environment.clone().map(Cow::Owned),
        release: config.release.clone().map(Cow::Owned),
        sample_rate: config.sample_rate,
        debug: config.debug,
        ..Default::default()
    };

    Ok(init_with_options(config.settings(), options))
}

/// Initialize reporting with caller-built client options.
pub fn init_with_options(settings: ReportingSettings, options: ClientOptions) -> Arc<Reporter> {
    let reporter = Arc::new(Reporter::new(settings, options));
    Hub::main().bind_client(Some(reporter.client()));
    REPORTER.store(Some(Arc::clone(&reporter)));

    tracing::info!(
        enabled = reporter.client().is_enabled(),
        filter_levels = ?reporter.settings().filter_levels,
        "Error reporting initialized"
    );
    reporter
}

/// The published reporter, if any.
pub fn reporter() -> Option<Arc<Reporter>> {
    REPORTER.load_full()
}

pub fn is_initialized() -> bool {
    REPORTER.load().is_some()
}

/// Report a record through the published reporter.
pub fn capture_event(trace_id: Option<&TraceId>, record: &Record) -> Option<Uuid> {
    reporter().and_then(|reporter| reporter.capture_event(trace_id, record))
}

/// Wait for pending events.
///
/// Flushes the published reporter when there is one; otherwise flushes
/// whatever client the current hub has bound. Returns `false` when nothing
/// could be flushed or the timeout expired.
pub fn flush(timeout: Duration) -> bool {
    if let Some(reporter) = reporter() {
        return reporter.flush(Some(timeout));
    }
    match Hub::current().client() {
        Some(client) => client.flush(Some(timeout)),
        None => false,
    }
}

/// Remove the published reporter and unbind it from the main hub.
pub fn uninstall() -> Option<Arc<Reporter>> {
    let previous = REPORTER.swap(None);
    if previous.is_some() {
        Hub::main().bind_client(None);
    }
    previous
}
