//! Error classification and fingerprinting.
//!
//! # Responsibilities
//! - Derive a coarse category token for any error
//! - Derive a stable grouping key for the error tracker
//!
//! # Design Decisions
//! - Layered lookup, same order for both operations:
//!   typed (`AppError`) → sentinel (timeouts, cancellation) → framework
//!   (`HttpError`) → keyword heuristic
//! - Structural checks walk the whole `source()` chain by type identity
//! - The keyword tier only looks at the top-level message and is best-effort;
//!   its rule tables are plain data and can be replaced

use std::borrow::Cow;
use std::error::Error;
use std::io;

use crate::errors::AppError;
use crate::http::HttpError;
use crate::logging::record::ErrorValue;

/// Maximum length (in characters) of a message-derived fingerprint.
pub const FINGERPRINT_MAX_CHARS: usize = 50;

/// Substring rule: if the lower-cased message contains `needle`, the result is `token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub needle: Cow<'static, str>,
    pub token: Cow<'static, str>,
}

impl KeywordRule {
    pub const fn new(needle: &'static str, token: &'static str) -> Self {
        Self {
            needle: Cow::Borrowed(needle),
            token: Cow::Borrowed(token),
        }
    }
}

const CLASSIFY_RULES: &[KeywordRule] = &[
    KeywordRule::new("connection", "connection"),
    KeywordRule::new("timeout", "timeout"),
    KeywordRule::new("not found", "not_found"),
    KeywordRule::new("unauthorized", "unauthorized"),
    KeywordRule::new("forbidden", "forbidden"),
    KeywordRule::new("validation", "validation"),
    KeywordRule::new("database", "database"),
];

const FINGERPRINT_RULES: &[KeywordRule] = &[
    KeywordRule::new("connection refused", "connection-refused"),
    KeywordRule::new("timeout", "timeout"),
    KeywordRule::new("not found", "not-found"),
    KeywordRule::new("unauthorized", "unauthorized"),
    KeywordRule::new("forbidden", "forbidden"),
];

/// Deadline and cancellation errors recognized by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Timeout,
    Canceled,
}

impl Sentinel {
    pub fn token(self) -> &'static str {
        match self {
            Sentinel::Timeout => "timeout",
            Sentinel::Canceled => "canceled",
        }
    }
}

/// Classifier with replaceable keyword tables.
#[derive(Debug, Clone)]
pub struct Classifier {
    classify_rules: Cow<'static, [KeywordRule]>,
    fingerprint_rules: Cow<'static, [KeywordRule]>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            classify_rules: Cow::Borrowed(CLASSIFY_RULES),
            fingerprint_rules: Cow::Borrowed(FINGERPRINT_RULES),
        }
    }
}

impl Classifier {
    /// Classifier with custom keyword tables for the heuristic tier.
    pub fn with_rules(classify_rules: Vec<KeywordRule>, fingerprint_rules: Vec<KeywordRule>) -> Self {
        Self {
            classify_rules: Cow::Owned(classify_rules),
            fingerprint_rules: Cow::Owned(fingerprint_rules),
        }
    }

    /// Category token for `err`.
    pub fn classify(&self, err: &(dyn Error + 'static)) -> Cow<'static, str> {
        if let Some(captured) = err.downcast_ref::<ErrorValue>() {
            return Cow::Owned(captured.category().to_string());
        }

        if let Some(app) = find_app_error(err) {
            return Cow::Borrowed(app.kind().token());
        }

        if let Some(sentinel) = find_sentinel(err) {
            return Cow::Borrowed(sentinel.token());
        }

        if find_http_error(err).is_some() {
            return Cow::Borrowed("http_error");
        }

        let message = err.to_string().to_lowercase();
        match_rule(&self.classify_rules, &message).unwrap_or(Cow::Borrowed("unknown"))
    }

    /// Grouping key for `err`.
    pub fn fingerprint(&self, err: &(dyn Error + 'static)) -> String {
        if let Some(captured) = err.downcast_ref::<ErrorValue>() {
            return captured.fingerprint().to_string();
        }

        if let Some(app) = find_app_error(err) {
            return if app.property().is_empty() {
                app.kind().as_str().to_string()
            } else {
                format!("{}-{}", app.kind().as_str(), app.property())
            };
        }

        if let Some(sentinel) = find_sentinel(err) {
            return sentinel.token().to_string();
        }

        if let Some(http) = find_http_error(err) {
            return format!("http-{}", http.status().as_u16());
        }

        let message = err.to_string().to_lowercase();
        match match_rule(&self.fingerprint_rules, &message) {
            Some(token) => token.into_owned(),
            None => message.chars().take(FINGERPRINT_MAX_CHARS).collect(),
        }
    }
}

fn match_rule(rules: &[KeywordRule], message: &str) -> Option<Cow<'static, str>> {
    rules
        .iter()
        .find(|rule| message.contains(rule.needle.as_ref()))
        .map(|rule| rule.token.clone())
}

/// Iterate over `err` and all of its sources.
pub fn chain<'a>(err: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(err), |e: &&'a (dyn Error + 'static)| (*e).source())
}

/// First `AppError` in the chain.
pub fn find_app_error<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a AppError> {
    chain(err).find_map(|e| e.downcast_ref::<AppError>())
}

/// First `HttpError` in the chain.
pub fn find_http_error<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a HttpError> {
    chain(err).find_map(|e| e.downcast_ref::<HttpError>())
}

/// First deadline or cancellation error in the chain.
pub fn find_sentinel(err: &(dyn Error + 'static)) -> Option<Sentinel> {
    chain(err).find_map(|e| {
        if e.is::<tokio::time::error::Elapsed>() {
            return Some(Sentinel::Timeout);
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return Some(Sentinel::Timeout);
            }
        }
        if let Some(join_err) = e.downcast_ref::<tokio::task::JoinError>() {
            if join_err.is_cancelled() {
                return Some(Sentinel::Canceled);
            }
        }
        None
    })
}

/// Category token using the built-in rules.
pub fn classify(err: &(dyn Error + 'static)) -> Cow<'static, str> {
    Classifier::default().classify(err)
}

/// Fingerprint using the built-in rules.
pub fn fingerprint(err: &(dyn Error + 'static)) -> String {
    Classifier::default().fingerprint(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use axum::http::StatusCode;
    use std::fmt;

    #[derive(Debug)]
    struct Wrapper(Box<dyn Error + Send + Sync>);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl Error for Wrapper {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(self.0.as_ref())
        }
    }

    fn plain(msg: &str) -> io::Error {
        io::Error::new(io::ErrorKind::Other, msg.to_string())
    }

    #[test]
    fn test_wrapped_app_error_classifies_by_kind() {
        let app = AppError::builder().kind(ErrorKind::Forbidden).build();
        let err = Wrapper(Box::new(app));
        assert_eq!(classify(&err), "forbidden");
        assert_eq!(fingerprint(&err), "FORBIDDEN");
    }

    #[test]
    fn test_app_error_fingerprint_with_property() {
        let err = AppError::builder()
            .kind(ErrorKind::Validation)
            .property("email")
            .build();
        assert_eq!(fingerprint(&err), "VALIDATION-email");
    }

    #[test]
    fn test_unrecognized_kind() {
        let err = AppError::builder()
            .kind(ErrorKind::Unrecognized("TEAPOT".into()))
            .build();
        assert_eq!(classify(&err), "internal_error_unknown");
        assert_eq!(fingerprint(&err), "TEAPOT");
    }

    #[test]
    fn test_heuristic_connection() {
        let err = plain("Connection refused by peer");
        assert_eq!(classify(&err), "connection");
        assert_eq!(fingerprint(&err), "connection-refused");
    }

    #[test]
    fn test_heuristic_rules_are_ordered() {
        // "connection" wins over "timeout" for classify; fingerprint only knows "timeout"
        let err = plain("connection timeout");
        assert_eq!(classify(&err), "connection");
        assert_eq!(fingerprint(&err), "timeout");
    }

    #[test]
    fn test_unknown_message_truncates_fingerprint() {
        let long = "X".repeat(80);
        let err = plain(&long);
        assert_eq!(classify(&err), "unknown");
        assert_eq!(fingerprint(&err), "x".repeat(FINGERPRINT_MAX_CHARS));
    }

    #[test]
    fn test_fingerprint_truncation_is_char_safe() {
        let err = plain(&"é".repeat(60));
        assert_eq!(fingerprint(&err).chars().count(), FINGERPRINT_MAX_CHARS);
    }

    #[test]
    fn test_sentinel_by_identity() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "slow upstream");
        assert_eq!(classify(&err), "timeout");
        assert_eq!(fingerprint(&err), "timeout");
    }

    #[tokio::test]
    async fn test_elapsed_and_cancelled() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert_eq!(classify(&elapsed), "timeout");

        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let join_err = handle.await.unwrap_err();
        assert_eq!(classify(&join_err), "canceled");
        assert_eq!(fingerprint(&join_err), "canceled");
    }

    #[test]
    fn test_sentinel_checked_before_framework() {
        let err = Wrapper(Box::new(io::Error::new(io::ErrorKind::TimedOut, "late")));
        assert_eq!(classify(&err), "timeout");
    }

    #[test]
    fn test_http_error() {
        let err = HttpError::new(StatusCode::BAD_GATEWAY, "upstream broke");
        assert_eq!(classify(&err), "http_error");
        assert_eq!(fingerprint(&err), "http-502");
    }

    #[test]
    fn test_custom_rules() {
        let classifier = Classifier::with_rules(
            vec![KeywordRule::new("quota", "quota")],
            vec![KeywordRule::new("quota", "quota-exceeded")],
        );
        let err = plain("Quota reached for tenant");
        assert_eq!(classifier.classify(&err), "quota");
        assert_eq!(classifier.fingerprint(&err), "quota-exceeded");

        let other = plain("connection reset");
        assert_eq!(classifier.classify(&other), "unknown");
    }

    #[test]
    fn test_captured_value_keeps_classification() {
        let app = AppError::builder().kind(ErrorKind::Busy).property("slot").build();
        let captured = ErrorValue::capture(&Wrapper(Box::new(app)));
        assert_eq!(classify(&captured), "busy");
        assert_eq!(fingerprint(&captured), "BUSY-slot");
    }
}
