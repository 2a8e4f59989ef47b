//! Configuration file watcher for hot reload of logging settings.
//!
//! # Design Decisions
//! - Only `[logging]` is live: the watcher remembers the last applied
//!   section and sends new `FormatterSettings` only when it changed
//! - `trace_key` and `filter` are fixed once the subscriber is installed;
//!   edits to them are reported and otherwise ignored
//! - A file that fails to load or validate keeps the current settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::LoggingConfig;
use crate::logging::{FormatterSettings, LogHandle};

/// Watches the configuration file and publishes logging changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: LoggingConfig,
    update_tx: mpsc::UnboundedSender<FormatterSettings>,
}

impl ConfigWatcher {
    /// `current` is the `[logging]` section already in effect.
    ///
    /// Returns the watcher and a receiver for formatter settings to apply.
    pub fn new(
        path: &Path,
        current: &LoggingConfig,
    ) -> (Self, mpsc::UnboundedReceiver<FormatterSettings>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current: current.clone(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(settings) = reload_logging(&path, &mut current) {
                        let _ = update_tx.send(settings);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Reload `path` and return new formatter settings when `[logging]` differs
/// from `current`, which is then updated.
pub fn reload_logging(path: &Path, current: &mut LoggingConfig) -> Option<FormatterSettings> {
    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                error = %e,
                "Failed to reload config. Keeping current logging settings."
            );
            return None;
        }
    };

    let next = config.logging;
    if next == *current {
        return None;
    }
    if next.trace_key != current.trace_key || next.filter != current.filter {
        tracing::warn!("logging.trace_key and logging.filter only apply at startup");
    }

    let settings = next.formatter_settings();
    *current = next;
    Some(settings)
}

/// Apply formatter settings from `updates` until the channel closes.
///
/// Reporting settings are read once at startup and are not reloaded.
pub async fn apply_updates(
    handle: LogHandle,
    mut updates: mpsc::UnboundedReceiver<FormatterSettings>,
) {
    while let Some(settings) = updates.recv().await {
        tracing::info!(
            level = %settings.min_level,
            add_source = settings.add_source,
            reporting = settings.reporting,
            "Logging configuration reloaded"
        );
        handle.reload(settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, TextFormatter, TimeZone};
    use std::fs;

    #[test]
    fn test_reload_only_on_logging_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rmlog.toml");
        fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        let mut current = load_config(&path).unwrap().logging;

        // reporting edits are not live
        fs::write(&path, "[logging]\nlevel = \"warn\"\n[reporting]\nsample_rate = 0.5\n").unwrap();
        assert!(reload_logging(&path, &mut current).is_none());

        fs::write(&path, "[logging]\nlevel = \"error\"\ntime_zone = \"utc\"\n").unwrap();
        let settings = reload_logging(&path, &mut current).unwrap();
        assert_eq!(settings.min_level, Level::ERROR);
        assert_eq!(settings.time_zone, TimeZone::Utc);
        assert_eq!(current.level, Some(Level::ERROR));

        // same content again
        assert!(reload_logging(&path, &mut current).is_none());
    }

    #[test]
    fn test_invalid_file_keeps_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rmlog.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let mut current = load_config(&path).unwrap().logging;

        fs::write(&path, "[logging]\ntrace_key = \"\"\n").unwrap();
        assert!(reload_logging(&path, &mut current).is_none());
        assert_eq!(current.level, Some(Level::DEBUG));
    }

    #[tokio::test]
    async fn test_apply_updates_reloads_handle() {
        let formatter = TextFormatter::new(std::io::sink, FormatterSettings::default());
        let handle = formatter.reload_handle();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(FormatterSettings {
            min_level: Level::ERROR,
            ..FormatterSettings::default()
        })
        .unwrap();
        drop(tx);

        apply_updates(handle.clone(), rx).await;
        assert_eq!(handle.current().min_level, Level::ERROR);
        assert!(!formatter.enabled(Level::WARN));
    }
}
