//! Text rendering of log records.
//!
//! # Responsibilities
//! - Render one record as one text line and write it with a single call
//! - Expose the formatter as a `tracing_subscriber` layer
//! - Hand records to the error reporter when enabled
//!
//! # Design Decisions
//! - Settings are an immutable snapshot behind `ArcSwap`; a `LogHandle`
//!   replaces the snapshot at runtime without locking the write path
//! - Level filtering happens in `on_event` rather than `Layer::enabled` so
//!   that callsite interest is never cached against a level that can change
//! - Reporting failures never reach the logging call

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record as SpanValues};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::logging::level::{level_from_env, Level, LOG_LEVEL_ENV};
use crate::logging::record::Record;
use crate::logging::HANDLED_TARGET;
use crate::reporting::Reporting;
use crate::trace::{TraceId, TRACE_ID_FIELD};

/// Timestamp layout of a rendered line.
pub const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Zone in which timestamps are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZone {
    #[default]
    Local,
    Utc,
}

/// Runtime-adjustable formatter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatterSettings {
    /// Records below this level are dropped.
    pub min_level: Level,

    /// Render `[file:line]` after the level.
    pub add_source: bool,

    /// Forward records to the error reporter after writing them.
    pub reporting: bool,

    pub time_zone: TimeZone,
}

impl Default for FormatterSettings {
    fn default() -> Self {
        Self {
            min_level: level_from_env(LOG_LEVEL_ENV),
            add_source: false,
            reporting: false,
            time_zone: TimeZone::Local,
        }
    }
}

/// Handle for replacing formatter settings while the formatter is in use.
#[derive(Debug, Clone)]
pub struct LogHandle {
    settings: Arc<ArcSwap<FormatterSettings>>,
}

impl LogHandle {
    pub fn current(&self) -> Arc<FormatterSettings> {
        self.settings.load_full()
    }

    pub fn reload(&self, settings: FormatterSettings) {
        self.settings.store(Arc::new(settings));
    }

    pub fn set_level(&self, level: Level) {
        self.settings.rcu(|current| FormatterSettings {
            min_level: level,
            ..FormatterSettings::clone(current)
        });
    }
}

/// Renders records as `<time> [<LEVEL>] [<file:line>] <message> k=v ...`.
pub struct TextFormatter<W = fn() -> io::Stdout> {
    settings: Arc<ArcSwap<FormatterSettings>>,
    make_writer: W,
    reporting: Reporting,
}

impl TextFormatter {
    /// Formatter writing to standard output.
    pub fn stdout(settings: FormatterSettings) -> Self {
        Self::new(io::stdout as fn() -> io::Stdout, settings)
    }
}

impl<W> TextFormatter<W>
where
    W: for<'w> MakeWriter<'w>,
{
    pub fn new(make_writer: W, settings: FormatterSettings) -> Self {
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            make_writer,
            reporting: Reporting::Global,
        }
    }

    /// Choose where forwarded records go. Defaults to the process-wide reporter.
    pub fn with_reporter(mut self, reporting: Reporting) -> Self {
        self.reporting = reporting;
        self
    }

    pub fn reload_handle(&self) -> LogHandle {
        LogHandle {
            settings: Arc::clone(&self.settings),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.settings.load().min_level
    }

    /// Render a record without the trailing newline.
    pub fn render(&self, record: &Record) -> String {
        let settings = self.settings.load();
        let mut line = String::with_capacity(128);

        let _ = match settings.time_zone {
            TimeZone::Local => write!(
                line,
                "{}",
                record.time.with_timezone(&chrono::Local).format(TIME_FORMAT)
            ),
            TimeZone::Utc => write!(line, "{}", record.time.format(TIME_FORMAT)),
        };
        let _ = write!(line, " [{}]", record.level);

        if settings.add_source {
            match &record.source {
                Some(source) => {
                    let _ = write!(line, " [{}]", source);
                }
                None => line.push_str(" [unknown:0]"),
            }
        }

        line.push(' ');
        line.push_str(&record.message);

        for attr in &record.attrs {
            let _ = write!(line, " {}={}", attr.key, attr.value);
        }

        line
    }

    /// Write the record as one line, then forward it if reporting is on.
    ///
    /// Only a write failure is returned. The level is not checked here.
    pub fn handle(&self, record: &Record, trace_id: Option<&TraceId>) -> io::Result<()> {
        self.write(record)?;
        self.forward(record, trace_id);
        Ok(())
    }

    /// Write the record as one line without forwarding it.
    pub fn write(&self, record: &Record) -> io::Result<()> {
        let mut line = self.render(record);
        line.push('\n');
        let mut writer = self.make_writer.make_writer();
        writer.write_all(line.as_bytes())
    }

    fn forward(&self, record: &Record, trace_id: Option<&TraceId>) {
        if !self.settings.load().reporting {
            return;
        }
        if let Some(reporter) = self.reporting.get() {
            reporter.capture_event(trace_id, record);
        }
    }
}

/// `tracing` layer around a [`TextFormatter`].
pub struct TextLayer<W = fn() -> io::Stdout> {
    formatter: TextFormatter<W>,
}

impl<W> TextLayer<W>
where
    W: for<'w> MakeWriter<'w>,
{
    pub fn new(formatter: TextFormatter<W>) -> Self {
        Self { formatter }
    }

    pub fn reload_handle(&self) -> LogHandle {
        self.formatter.reload_handle()
    }

    pub fn formatter(&self) -> &TextFormatter<W> {
        &self.formatter
    }
}

impl<S, W> Layer<S> for TextLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = TraceIdVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(trace_id), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().insert(trace_id);
        }
    }

    fn on_record(&self, id: &Id, values: &SpanValues<'_>, ctx: Context<'_, S>) {
        let mut visitor = TraceIdVisitor::default();
        values.record(&mut visitor);
        if let (Some(trace_id), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().replace(trace_id);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = Level::from(*event.metadata().level());
        if !self.formatter.enabled(level) {
            return;
        }

        let record = Record::from_event(event);

        // already reported by the middleware that emitted it
        if event.metadata().target() == HANDLED_TARGET {
            let _ = self.formatter.write(&record);
            return;
        }

        let trace_id = ctx.event_scope(event).and_then(|scope| {
            scope
                .into_iter()
                .find_map(|span| span.extensions().get::<TraceId>().cloned())
        });
        let _ = self.formatter.handle(&record, trace_id.as_ref());
    }
}

#[derive(Default)]
struct TraceIdVisitor(Option<TraceId>);

impl Visit for TraceIdVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == TRACE_ID_FIELD {
            self.0 = Some(TraceId::from_string(value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == TRACE_ID_FIELD {
            self.0 = Some(TraceId::from_string(format!("{:?}", value)));
        }
    }
}
