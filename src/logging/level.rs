//! Log levels and level parsing.
//!
//! # Design Decisions
//! - A level is a plain ordered integer so that off-grid levels (e.g. TRACE
//!   coming from `tracing`) still compare and render sensibly
//! - Named levels are spaced by 4, leaving room for in-between severities
//! - Environment parsing is lenient and never fails; config parsing is strict

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Environment variable that supplies the default minimum level.
pub const LOG_LEVEL_ENV: &str = "log_level";

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(pub i8);

impl Level {
    pub const DEBUG: Level = Level(-4);
    pub const INFO: Level = Level(0);
    pub const WARN: Level = Level(4);
    pub const ERROR: Level = Level(8);

    /// Name of the nearest named level at or below this one.
    fn base(self) -> (&'static str, Level) {
        if self < Level::INFO {
            ("DEBUG", Level::DEBUG)
        } else if self < Level::WARN {
            ("INFO", Level::INFO)
        } else if self < Level::ERROR {
            ("WARN", Level::WARN)
        } else {
            ("ERROR", Level::ERROR)
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::WARN
    }
}

impl fmt::Display for Level {
    /// Renders `DEBUG`, `INFO`, `WARN`, `ERROR`, or a name with an offset
    /// such as `DEBUG-4` or `INFO+2` for levels between the named ones.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, base) = self.base();
        let offset = i16::from(self.0) - i16::from(base.0);
        if offset == 0 {
            f.write_str(name)
        } else {
            write!(f, "{}{:+}", name, offset)
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level(-8),
            tracing::Level::DEBUG => Level::DEBUG,
            tracing::Level::INFO => Level::INFO,
            tracing::Level::WARN => Level::WARN,
            tracing::Level::ERROR => Level::ERROR,
        }
    }
}

/// Error returned when a level string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0:?}")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Strict parse: `debug`, `info`, `warn`, `error` (any case), optionally
    /// followed by a signed offset (`info+2`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseLevelError(s.to_string());
        let lower = s.trim().to_ascii_lowercase();
        let split = lower.find(['+', '-']).unwrap_or(lower.len());
        let (name, offset) = lower.split_at(split);

        let base = match name {
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => return Err(err()),
        };

        if offset.is_empty() {
            return Ok(base);
        }
        let offset: i8 = offset.parse().map_err(|_| err())?;
        base.0.checked_add(offset).map(Level).ok_or_else(err)
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string().to_ascii_lowercase())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Lenient parse used for environment values.
///
/// Only `debug`, `warn` and `error` are recognized; everything else,
/// including `info`, yields [`Level::WARN`].
pub fn parse_level(s: &str) -> Level {
    match s {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

/// Read the minimum level from the environment variable `key`.
/// Unset or empty yields [`Level::WARN`].
pub fn level_from_env(key: &str) -> Level {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => parse_level(&value),
        _ => Level::WARN,
    }
}

/// Case-insensitive `"true"` check for boolean environment values.
pub fn parse_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::DEBUG < Level::INFO);
        assert!(Level::INFO < Level::WARN);
        assert!(Level::WARN < Level::ERROR);
        assert!(Level::from(tracing::Level::TRACE) < Level::DEBUG);
    }

    #[test]
    fn test_level_display() {
        assert_eq!(Level::DEBUG.to_string(), "DEBUG");
        assert_eq!(Level::ERROR.to_string(), "ERROR");
        assert_eq!(Level(-8).to_string(), "DEBUG-4");
        assert_eq!(Level(2).to_string(), "INFO+2");
        assert_eq!(Level(12).to_string(), "ERROR+4");
    }

    #[test]
    fn test_parse_level_lenient() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("info"), Level::WARN);
        assert_eq!(parse_level("DEBUG"), Level::WARN);
        assert_eq!(parse_level(""), Level::WARN);
    }

    #[test]
    fn test_level_from_env_unset() {
        assert_eq!(level_from_env("RMLOG_TEST_SURELY_UNSET_VARIABLE"), Level::WARN);
    }

    #[test]
    fn test_from_str_strict() {
        assert_eq!("Info".parse::<Level>().unwrap(), Level::INFO);
        assert_eq!("info+2".parse::<Level>().unwrap(), Level(2));
        assert_eq!("debug-4".parse::<Level>().unwrap(), Level(-8));
        assert!("verbose".parse::<Level>().is_err());
        assert!("info+x".parse::<Level>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_from_str() {
        for level in [Level(-8), Level::DEBUG, Level(1), Level::WARN, Level(9)] {
            assert_eq!(level.to_string().parse::<Level>().unwrap(), level);
        }
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool(""));
    }
}
