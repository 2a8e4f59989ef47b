//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges and formats the types cannot express
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: RmlogConfig → Result<(), Vec<ValidationError>>
//! - Runs before a config is accepted, at startup and on reload

use sentry::IntoDsn;

use crate::config::schema::RmlogConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("logging.trace_key must not be empty")]
    EmptyTraceKey,

    #[error("logging.filter is invalid: {0}")]
    InvalidFilter(String),

    #[error("reporting.dsn is required when reporting is enabled")]
    MissingDsn,

    #[error("reporting.dsn is invalid: {0}")]
    InvalidDsn(String),

    #[error("reporting.sample_rate must be within 0.0..=1.0, got {0}")]
    SampleRateOutOfRange(f32),

    #[error("reporting.filter_levels must not be empty when reporting is enabled")]
    NoFilterLevels,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &RmlogConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.logging.trace_key.trim().is_empty() {
        errors.push(ValidationError::EmptyTraceKey);
    }

    if let Some(filter) = &config.logging.filter {
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(filter) {
            errors.push(ValidationError::InvalidFilter(e.to_string()));
        }
    }

    let reporting = &config.reporting;
    if !(0.0..=1.0).contains(&reporting.sample_rate) {
        errors.push(ValidationError::SampleRateOutOfRange(reporting.sample_rate));
    }

    match reporting.dsn.as_str().into_dsn() {
        Err(e) => errors.push(ValidationError::InvalidDsn(e.to_string())),
        Ok(None) if reporting.enabled => errors.push(ValidationError::MissingDsn),
        Ok(_) => {}
    }

    if reporting.enabled && reporting.filter_levels.is_empty() {
        errors.push(ValidationError::NoFilterLevels);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
