//! Forwarding of log records to Sentry.
//!
//! # Responsibilities
//! - Decide whether a record is reportable
//! - Split record attributes into searchable tags and free-form extra data
//! - Attach trace id, source, classification and fingerprint
//! - Submit exactly one event per record
//!
//! # Design Decisions
//! - The reporter owns its client; scopes are built per call and passed to
//!   `Client::capture_event`, so concurrent reports never share state
//! - The first error attribute becomes the event's exception; any further
//!   errors are kept as extra data

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::SecondsFormat;
use sentry::protocol::{Context, Event, Exception, Map};
use sentry::{ClientOptions, Scope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logging::level::Level;
use crate::logging::record::{Attr, ErrorValue, Record, Value};
use crate::trace::{self, TraceId};

/// String attributes at least this long (in bytes) go to extra data.
pub const TAG_MAX_LEN: usize = 100;

/// Tag added to every event sent by this crate.
pub const PACKAGE_TAG: (&str, &str) = ("rust_package", "rmlog");

/// Which records are reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    /// A record is reported when its level is at or above any of these.
    pub filter_levels: Vec<Level>,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            filter_levels: vec![Level::ERROR],
        }
    }
}

/// Sentry client plus the reporting policy.
#[derive(Debug)]
pub struct Reporter {
    settings: ReportingSettings,
    client: Arc<sentry::Client>,
}

impl Reporter {
    /// Build a reporter with its own client.
    ///
    /// Default integrations and transport are applied to `options`, and a
    /// `before_send` hook tags every event with the package name. An existing
    /// hook still runs after it.
    pub fn new(settings: ReportingSettings, mut options: ClientOptions) -> Self {
        let previous = options.before_send.take();
        options.before_send = Some(Arc::new(move |mut event: Event<'static>| {
            event
                .tags
                .insert(PACKAGE_TAG.0.to_string(), PACKAGE_TAG.1.to_string());
            match &previous {
                Some(hook) => hook(event),
                None => Some(event),
            }
        }));

        let client = sentry::Client::with_options(sentry::apply_defaults(options));
        Self {
            settings,
            client: Arc::new(client),
        }
    }

    pub fn settings(&self) -> &ReportingSettings {
        &self.settings
    }

    pub fn client(&self) -> Arc<sentry::Client> {
        Arc::clone(&self.client)
    }

    pub fn should_capture(&self, level: Level) -> bool {
        self.settings.filter_levels.iter().any(|min| level >= *min)
    }

    /// Report a log record. Returns the event id when an event was sent.
    pub fn capture_event(&self, trace_id: Option<&TraceId>, record: &Record) -> Option<Uuid> {
        if !self.should_capture(record.level) {
            return None;
        }

        let severity = severity(record.level);
        let (mut tags, mut extra, error) = partition_attrs(&record.attrs);

        if let Some(trace_id) = trace_id {
            put_tag(&mut tags, &mut extra, trace::trace_key().as_str(), trace_id.as_str());
        }
        let level_name = record.level.to_string();
        put_tag(&mut tags, &mut extra, "log_level", &level_name);
        let source = record.source.as_ref().map(|s| s.to_string());
        if let Some(source) = &source {
            put_tag(&mut tags, &mut extra, "source", source);
        }

        let timestamp = record.time.to_rfc3339_opts(SecondsFormat::Secs, true);
        put_extra(&mut tags, &mut extra, "timestamp", timestamp.clone().into());

        let mut scope = Scope::default();
        scope.set_level(Some(severity));
        for (key, value) in &tags {
            scope.set_tag(key, value);
        }
        for (key, value) in extra {
            scope.set_extra(&key, value);
        }

        let mut log_context = Map::new();
        log_context.insert("message".into(), record.message.clone().into());
        log_context.insert("level".into(), level_name.into());
        log_context.insert("timestamp".into(), timestamp.into());
        log_context.insert("source".into(), source.map_or(serde_json::Value::Null, Into::into));
        scope.set_context("log_context", Context::Other(log_context));

        let mut event = match error {
            Some(error) => {
                scope.set_tag("error_captured", "true");
                scope.set_tag("error_type", error.category());
                scope.set_fingerprint(Some(&["{{ default }}", error.fingerprint()]));
                exception_event(error)
            }
            None => Event {
                message: Some(record.message.clone()),
                ..Default::default()
            },
        };
        event.level = severity;
        event.timestamp = SystemTime::from(record.time);

        self.capture_with_scope(event, &scope)
    }

    /// Submit a prepared event with a caller-built scope.
    pub fn capture_with_scope(&self, event: Event<'static>, scope: &Scope) -> Option<Uuid> {
        let id = self.client.capture_event(event, Some(scope));
        (!id.is_nil()).then_some(id)
    }

    /// Wait for queued events to be sent. Returns `false` on timeout.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        self.client.flush(timeout)
    }
}

/// Sentry severity for a record level. Off-grid levels map to info.
pub fn severity(level: Level) -> sentry::Level {
    match level {
        Level::DEBUG => sentry::Level::Debug,
        Level::INFO => sentry::Level::Info,
        Level::WARN => sentry::Level::Warning,
        Level::ERROR => sentry::Level::Error,
        _ => sentry::Level::Info,
    }
}

/// Split attributes into tags and extra data, pulling out the first error.
///
/// Fields recorded with `%` or `?` arrive already rendered and are treated
/// like strings, so `user = %name` is still a searchable tag.
/// A key lands in exactly one map; a later attribute with the same key wins.
pub fn partition_attrs(
    attrs: &[Attr],
) -> (BTreeMap<String, String>, Map<String, serde_json::Value>, Option<&ErrorValue>) {
    let mut tags = BTreeMap::new();
    let mut extra = Map::new();
    let mut error = None;

    for attr in attrs {
        let key = attr.key.as_str();
        match &attr.value {
            Value::Error(err) if error.is_none() => error = Some(err),
            Value::Str(s) | Value::Debug(s) if is_tag_text(s) => put_tag(&mut tags, &mut extra, key, s),
            Value::Bool(b) => put_tag(&mut tags, &mut extra, key, &b.to_string()),
            Value::I64(n) => put_tag(&mut tags, &mut extra, key, &n.to_string()),
            Value::U64(n) => put_tag(&mut tags, &mut extra, key, &n.to_string()),
            Value::Str(s) | Value::Debug(s) => put_extra(&mut tags, &mut extra, key, s.clone().into()),
            Value::F64(n) => put_extra(&mut tags, &mut extra, key, (*n).into()),
            Value::Error(err) => put_extra(&mut tags, &mut extra, key, err.message().into()),
        }
    }

    (tags, extra, error)
}

fn is_tag_text(s: &str) -> bool {
    s.len() < TAG_MAX_LEN && !s.contains('\n')
}

fn put_tag(
    tags: &mut BTreeMap<String, String>,
    extra: &mut Map<String, serde_json::Value>,
    key: &str,
    value: &str,
) {
    extra.remove(key);
    tags.insert(key.to_string(), value.to_string());
}

fn put_extra(
    tags: &mut BTreeMap<String, String>,
    extra: &mut Map<String, serde_json::Value>,
    key: &str,
    value: serde_json::Value,
) {
    tags.remove(key);
    extra.insert(key.to_string(), value);
}

/// Event with the captured error and its causes as a structured chain.
///
/// Sentry expects the outermost error last.
fn exception_event(error: &ErrorValue) -> Event<'static> {
    let top_type = match error.app_error() {
        Some(app) => app.kind().as_str().to_string(),
        None => error.type_name().to_string(),
    };

    let mut exceptions: Vec<Exception> = std::iter::once((top_type.as_str(), error.message()))
        .chain(error.causes())
        .map(|(ty, value)| Exception {
            ty: ty.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        })
        .collect();
    exceptions.reverse();

    Event {
        exception: exceptions.into(),
        ..Default::default()
    }
}
