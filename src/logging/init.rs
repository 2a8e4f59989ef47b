//! Global subscriber setup.

use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::config::LoggingConfig;
use crate::logging::formatter::{LogHandle, TextFormatter, TextLayer};
use crate::trace;

#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("global subscriber already set: {0}")]
    AlreadySet(#[from] TryInitError),
}

/// Install the text layer on stdout as the global subscriber.
///
/// Also publishes the configured trace key. The returned handle adjusts the
/// formatter at runtime.
pub fn init(config: &LoggingConfig) -> Result<LogHandle, LogInitError> {
    let filter = config
        .filter
        .as_deref()
        .map(EnvFilter::try_new)
        .transpose()?;

    let layer = TextLayer::new(TextFormatter::stdout(config.formatter_settings()));
    let handle = layer.reload_handle();

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;

    trace::set_trace_key(config.trace_key.clone());

    tracing::debug!(
        level = %handle.current().min_level,
        add_source = config.add_source,
        reporting = config.reporting_enabled,
        "Logging initialized"
    );
    Ok(handle)
}
