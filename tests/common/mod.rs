//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use rmlog::reporting::{Reporter, ReportingSettings};
use sentry::protocol::Event;
use sentry::test::TestTransport;
use tracing_subscriber::fmt::MakeWriter;

pub const TEST_DSN: &str = "https://public@sentry.invalid/1";

/// In-memory writer shared between the layer under test and the assertions.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = SharedBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Client options that deliver into a test transport.
pub fn test_options() -> (sentry::ClientOptions, Arc<TestTransport>) {
    let transport = TestTransport::new();
    let options = sentry::ClientOptions {
        dsn: Some(TEST_DSN.parse().unwrap()),
        transport: Some(Arc::new(transport.clone())),
        ..Default::default()
    };
    (options, transport)
}

/// Reporter with default settings whose events are kept in memory.
pub fn test_reporter() -> (Arc<Reporter>, Arc<TestTransport>) {
    let (options, transport) = test_options();
    let reporter = Reporter::new(ReportingSettings::default(), options);
    (Arc::new(reporter), transport)
}

/// Events delivered so far; clears the transport.
pub fn events(transport: &TestTransport) -> Vec<Event<'static>> {
    transport
        .fetch_and_clear_envelopes()
        .into_iter()
        .filter_map(|envelope| envelope.event().cloned())
        .collect()
}
