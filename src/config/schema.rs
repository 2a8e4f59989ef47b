//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::logging::formatter::{FormatterSettings, TimeZone};
use crate::logging::level::{level_from_env, Level, LOG_LEVEL_ENV};
use crate::reporting::ReportingSettings;
use crate::trace::DEFAULT_TRACE_KEY;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RmlogConfig {
    /// Text logging settings.
    pub logging: LoggingConfig,

    /// Sentry settings.
    pub reporting: ReportingConfig,
}

/// Text logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level. When unset, the `log_level` environment variable decides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,

    /// Render `[file:line]` on every line.
    pub add_source: bool,

    /// Forward records to the error reporter.
    pub reporting_enabled: bool,

    /// Key under which the trace id is reported.
    pub trace_key: String,

    /// Zone of rendered timestamps ("local" or "utc").
    pub time_zone: TimeZone,

    /// Optional `EnvFilter` directives applied before the text layer,
    /// e.g. "info,hyper=warn".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            add_source: true,
            reporting_enabled: false,
            trace_key: DEFAULT_TRACE_KEY.to_string(),
            time_zone: TimeZone::Local,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Configured level, or the environment default.
    pub fn min_level(&self) -> Level {
        self.level.unwrap_or_else(|| level_from_env(LOG_LEVEL_ENV))
    }

    pub fn formatter_settings(&self) -> FormatterSettings {
        FormatterSettings {
            min_level: self.min_level(),
            add_source: self.add_source,
            reporting: self.reporting_enabled,
            time_zone: self.time_zone,
        }
    }
}

/// Error reporting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReportingConfig {
    /// Initialize the reporter at startup.
    pub enabled: bool,

    /// Project DSN. Empty disables sending.
    pub dsn: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    /// Fraction of events sent, 0.0 to 1.0.
    pub sample_rate: f32,

    /// Sentry client debug output.
    pub debug: bool,

    /// Records at or above any of these levels are reported.
    pub filter_levels: Vec<Level>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dsn: String::new(),
            environment: None,
            release: None,
            sample_rate: 1.0,
            debug: false,
            filter_levels: vec![Level::ERROR],
        }
    }
}

impl ReportingConfig {
    pub fn settings(&self) -> ReportingSettings {
        ReportingSettings {
            filter_levels: self.filter_levels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: RmlogConfig = toml::from_str("").unwrap();
        assert_eq!(config, RmlogConfig::default());
        assert!(config.logging.add_source);
        assert_eq!(config.logging.trace_key, "trace_id");
        assert_eq!(config.reporting.filter_levels, vec![Level::ERROR]);
    }

    #[test]
    fn test_partial_document() {
        let config: RmlogConfig = toml::from_str(
            r#"
            [logging]
            level = "debug"
            time_zone = "utc"

            [reporting]
            enabled = true
            filter_levels = ["warn"]
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.min_level(), Level::DEBUG);
        assert_eq!(config.logging.time_zone, TimeZone::Utc);
        assert!(config.reporting.enabled);
        assert_eq!(config.reporting.settings().filter_levels, vec![Level::WARN]);
        assert_eq!(config.reporting.sample_rate, 1.0);
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let result: Result<RmlogConfig, _> = toml::from_str("[logging]\nlevel = \"loud\"");
        assert!(result.is_err());
    }
}
