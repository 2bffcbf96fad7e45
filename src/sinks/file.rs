//! Rotating file sink
//!
//! The sink owns one [`ActiveFileHandle`] behind its mutex. Rotation runs
//! inside the same critical section as writes, so a record is never split
//! across files and no write lands in a file being renamed.
//!
//! State transitions:
//!
//! - `Open` → `Open`: rotation succeeded, or the rename failed and writing
//!   continues in the current file.
//! - `Open` → `Broken`: the active file could not be reopened after a
//!   rename. Every later write retries the open.
//! - `Broken` → `Open`: a retried open succeeded.
//! - any → `Closed`: `close` was called.
//!
//! A path is written by at most one `FileSink`. A reconfiguration that keeps
//! a path hands the live sink to the new configuration through
//! [`FileSink::retune`] instead of opening a second handle.

use super::compression::Compression;
use super::retention::{highest_sequence, RetentionManager, RetentionPolicy, RotatedFile};
use super::rotation::{historical_path, ActiveFileHandle, RotationMarker, RotationPolicy};
use super::{lock_within, Sink};
use crate::core::error::{LoggerError, Result};
use crate::core::metrics::SinkMetrics;
use crate::core::record::Record;
use crate::core::report::{Diagnostic, ErrorReporter, SinkError};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Observable state of a [`FileSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Open,
    Broken,
    Closed,
}

enum Slot {
    Open(ActiveFileHandle),
    Broken,
    Closed,
}

struct FileInner {
    slot: Slot,
    next_sequence: u64,
    rotation: RotationPolicy,
    retention: RetentionPolicy,
    compression: Compression,
}

/// Resolved settings of one file sink
#[derive(Debug, Clone)]
pub struct FileSinkSettings {
    pub path: PathBuf,
    pub rotation: RotationPolicy,
    pub retention: RetentionPolicy,
    pub compression: Compression,
    pub lock_timeout: Duration,
}

pub struct FileSink {
    name: String,
    path: PathBuf,
    lock_timeout_ms: AtomicU64,
    inner: Mutex<FileInner>,
    retention: Arc<RetentionManager>,
    metrics: Arc<SinkMetrics>,
    reporter: Arc<ErrorReporter>,
}

impl FileSink {
    /// Create the directory if needed and open the active file
    ///
    /// # Errors
    ///
    /// Returns an IO-kind error if the directory cannot be created or the
    /// file cannot be opened.
    pub fn open(
        name: impl Into<String>,
        settings: FileSinkSettings,
        retention: Arc<RetentionManager>,
        metrics: Arc<SinkMetrics>,
        reporter: Arc<ErrorReporter>,
    ) -> Result<Self> {
        if let Some(parent) = settings.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LoggerError::io_operation(
                        "create log directory",
                        format!("Failed to create directory '{}'", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let handle = ActiveFileHandle::open(&settings.path)?;
        let next_sequence = highest_sequence(&settings.path) + 1;

        Ok(Self {
            name: name.into(),
            lock_timeout_ms: AtomicU64::new(settings.lock_timeout.as_millis() as u64),
            inner: Mutex::new(FileInner {
                slot: Slot::Open(handle),
                next_sequence,
                rotation: settings.rotation,
                retention: settings.retention,
                compression: settings.compression,
            }),
            path: settings.path,
            retention,
            metrics,
            reporter,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> FileState {
        match self.inner.lock().slot {
            Slot::Open(_) => FileState::Open,
            Slot::Broken => FileState::Broken,
            Slot::Closed => FileState::Closed,
        }
    }

    /// Bytes in the active file, 0 unless open
    pub fn bytes_written(&self) -> u64 {
        match &self.inner.lock().slot {
            Slot::Open(handle) => handle.bytes_written(),
            _ => 0,
        }
    }

    pub(crate) fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Apply new rotation, retention, compression and lock settings
    ///
    /// The active file, its byte count and the rotation sequence carry over.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `settings` names another path.
    pub fn retune(&self, settings: FileSinkSettings) -> Result<()> {
        if settings.path != self.path {
            return Err(LoggerError::config(
                format!("sink '{}'", self.name),
                format!(
                    "cannot move '{}' to '{}'",
                    self.path.display(),
                    settings.path.display()
                ),
            ));
        }
        // Blocking: callers retune only after every other sink opened
        let mut inner = self.inner.lock();
        inner.rotation = settings.rotation;
        inner.retention = settings.retention;
        inner.compression = settings.compression;
        self.lock_timeout_ms
            .store(settings.lock_timeout.as_millis() as u64, Ordering::Release);
        Ok(())
    }

    fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.load(Ordering::Acquire))
    }

    fn report(&self, level: Diagnostic, error: &LoggerError) {
        self.reporter.report(level, SinkError::new(&self.name, error));
    }

    /// Rotate the active file; never fails the triggering write by itself
    fn rotate(&self, inner: &mut FileInner, now: DateTime<Local>) {
        let path = self.path.as_path();
        let mut handle = match std::mem::replace(&mut inner.slot, Slot::Broken) {
            Slot::Open(handle) => handle,
            other => {
                inner.slot = other;
                return;
            }
        };

        if let Err(e) = handle.flush() {
            self.metrics.record_rotation_failure();
            self.report(
                Diagnostic::Error,
                &LoggerError::file_rotation(path.display().to_string(), format!("Failed to flush before rotation: {}", e)),
            );
            handle.reset_counter();
            inner.slot = Slot::Open(handle);
            return;
        }

        let marker = RotationMarker::new(now, inner.next_sequence);
        let historical = historical_path(path, &marker);

        if let Err(e) = handle.close() {
            self.report(Diagnostic::Warning, &e);
        }

        if let Err(e) = fs::rename(path, &historical) {
            // Keep appending to the same file; size tracking restarts so the
            // rename is not retried on every write
            self.metrics.record_rotation_failure();
            self.report(
                Diagnostic::Error,
                &LoggerError::file_rotation(
                    path.display().to_string(),
                    format!("Failed to rotate current log file: {}", e),
                ),
            );
            inner.slot = self.reopen(true);
            return;
        }

        inner.next_sequence += 1;
        self.metrics.record_rotation();
        inner.slot = self.reopen(false);

        let job = RotatedFile {
            sink: self.name.clone(),
            active: self.path.clone(),
            path: historical,
            marker,
            compression: inner.compression.clone(),
            retention: inner.retention,
        };
        if let Err(e) = self.retention.submit(job) {
            self.report(Diagnostic::Warning, &e);
        }
    }

    fn reopen(&self, reset_counter: bool) -> Slot {
        match ActiveFileHandle::open(&self.path) {
            Ok(mut handle) => {
                if reset_counter {
                    handle.reset_counter();
                }
                Slot::Open(handle)
            }
            Err(e) => {
                self.report(Diagnostic::Critical, &e);
                Slot::Broken
            }
        }
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, _record: &Record, rendered: &[u8]) -> Result<()> {
        let mut inner = lock_within(&self.inner, &self.name, self.lock_timeout())?;

        if matches!(inner.slot, Slot::Closed) {
            return Err(LoggerError::sink_closed(&self.name));
        }
        if matches!(inner.slot, Slot::Broken) {
            inner.slot = Slot::Open(ActiveFileHandle::open(&self.path)?);
        }

        let now = Local::now();
        let due = match &inner.slot {
            Slot::Open(handle) => inner.rotation.should_rotate(handle, rendered.len() as u64, now),
            _ => false,
        };
        if due {
            self.rotate(&mut inner, now);
        }

        match &mut inner.slot {
            Slot::Open(handle) => handle.write_record(rendered),
            _ => Err(LoggerError::file_sink(
                self.path.display().to_string(),
                "active file unavailable after rotation",
            )),
        }
    }

    fn flush(&self) -> Result<()> {
        let mut inner = lock_within(&self.inner, &self.name, self.lock_timeout())?;
        match &mut inner.slot {
            Slot::Open(handle) => handle.flush(),
            _ => Ok(()),
        }
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.slot, Slot::Closed) {
            Slot::Open(handle) => handle.close(),
            _ => Ok(()),
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Slot::Open(handle) = std::mem::replace(&mut self.inner.get_mut().slot, Slot::Closed) {
            let _ = handle.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::ManagerMetrics;
    use crate::core::severity::Severity;
    use crate::sinks::retention::enumerate;
    use crate::sinks::rotation::RotationTrigger;
    use tempfile::tempdir;

    struct Fixture {
        retention: Arc<RetentionManager>,
        metrics: Arc<SinkMetrics>,
        reporter: Arc<ErrorReporter>,
    }

    fn fixture() -> Fixture {
        let reporter = Arc::new(ErrorReporter::new(32, None));
        Fixture {
            retention: Arc::new(
                RetentionManager::start(
                    16,
                    Duration::from_secs(2),
                    Arc::new(ManagerMetrics::new()),
                    Arc::clone(&reporter),
                )
                .unwrap(),
            ),
            metrics: Arc::new(SinkMetrics::new()),
            reporter,
        }
    }

    fn settings(path: PathBuf, trigger: RotationTrigger, retention: RetentionPolicy) -> FileSinkSettings {
        FileSinkSettings {
            path,
            rotation: RotationPolicy::new(trigger).unwrap(),
            retention,
            compression: Compression::None,
            lock_timeout: Duration::from_secs(1),
        }
    }

    fn open(fx: &Fixture, settings: FileSinkSettings) -> FileSink {
        FileSink::open(
            "file",
            settings,
            Arc::clone(&fx.retention),
            Arc::clone(&fx.metrics),
            Arc::clone(&fx.reporter),
        )
        .unwrap()
    }

    fn line(i: usize) -> Vec<u8> {
        format!("record number {:04}\n", i).into_bytes()
    }

    #[test]
    fn test_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.log");
        let fx = fixture();
        let sink = open(&fx, settings(path.clone(), RotationTrigger::Size(1024), RetentionPolicy::Count(3)));

        assert!(path.exists());
        assert_eq!(sink.state(), FileState::Open);
    }

    #[test]
    fn test_size_rotation_keeps_files_bounded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let fx = fixture();
        let sink = open(&fx, settings(path.clone(), RotationTrigger::Size(100), RetentionPolicy::Count(50)));
        let record = Record::new(Severity::Info, "x");

        for i in 0..20 {
            sink.write(&record, &line(i)).unwrap();
        }
        assert!(fx.retention.sync(Duration::from_secs(5)));

        let historical = enumerate(&path).unwrap();
        assert!(!historical.is_empty());
        for file in &historical {
            assert!(file.size <= 100, "{} has {} bytes", file.path.display(), file.size);
        }
        assert_eq!(fx.metrics.rotations(), historical.len() as u64);
    }

    #[test]
    fn test_rotation_loses_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let fx = fixture();
        let sink = open(&fx, settings(path.clone(), RotationTrigger::Size(64), RetentionPolicy::Count(1000)));
        let record = Record::new(Severity::Info, "x");

        let mut expected = Vec::new();
        for i in 0..50 {
            let bytes = line(i);
            sink.write(&record, &bytes).unwrap();
            expected.extend_from_slice(&bytes);
        }
        sink.close().unwrap();
        assert!(fx.retention.sync(Duration::from_secs(5)));

        let mut actual = Vec::new();
        for file in enumerate(&path).unwrap() {
            actual.extend(fs::read(&file.path).unwrap());
        }
        actual.extend(fs::read(&path).unwrap());
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_sequence_continues_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(dir.path().join("app.log.20200101000000000-000041"), "old\n").unwrap();

        let fx = fixture();
        let sink = open(&fx, settings(path.clone(), RotationTrigger::Size(10), RetentionPolicy::Count(100)));
        let record = Record::new(Severity::Info, "x");
        sink.write(&record, b"first line\n").unwrap();
        sink.write(&record, b"second line\n").unwrap();

        let sequences: Vec<u64> = enumerate(&path)
            .unwrap()
            .iter()
            .map(|f| f.marker.sequence())
            .collect();
        assert_eq!(sequences, vec![41, 42]);
    }

    #[test]
    fn test_broken_state_recovers() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("logs");
        let path = logs.join("app.log");
        let fx = fixture();
        let sink = open(&fx, settings(path.clone(), RotationTrigger::Size(10), RetentionPolicy::Count(5)));
        let record = Record::new(Severity::Info, "x");

        sink.write(&record, b"0123456789\n").unwrap();
        fs::remove_dir_all(&logs).unwrap();

        // Rename and reopen both fail: the record is dropped
        assert!(sink.write(&record, b"lost\n").is_err());
        assert_eq!(sink.state(), FileState::Broken);
        assert!(fx.metrics.rotation_failures() >= 1);
        assert!(!fx.reporter.is_empty());

        fs::create_dir_all(&logs).unwrap();
        sink.write(&record, b"back\n").unwrap();
        assert_eq!(sink.state(), FileState::Open);
        assert_eq!(fs::read_to_string(&path).unwrap(), "back\n");
    }

    #[test]
    fn test_closed_sink_rejects_writes() {
        let dir = tempdir().unwrap();
        let fx = fixture();
        let sink = open(
            &fx,
            settings(dir.path().join("app.log"), RotationTrigger::Size(1024), RetentionPolicy::Count(3)),
        );
        sink.close().unwrap();

        let err = sink.write(&Record::new(Severity::Info, "x"), b"x\n").unwrap_err();
        assert!(matches!(err, LoggerError::SinkClosed { .. }));
        assert_eq!(sink.state(), FileState::Closed);
    }

    #[test]
    fn test_busy_sink_times_out() {
        let dir = tempdir().unwrap();
        let fx = fixture();
        let mut config = settings(dir.path().join("app.log"), RotationTrigger::Size(1024), RetentionPolicy::Count(3));
        config.lock_timeout = Duration::from_millis(20);
        let sink = open(&fx, config);

        let guard = sink.inner.lock();
        let err = std::thread::scope(|scope| {
            scope
                .spawn(|| sink.write(&Record::new(Severity::Info, "x"), b"x\n"))
                .join()
                .unwrap()
        })
        .unwrap_err();
        drop(guard);

        assert_eq!(err.kind(), crate::core::error::ErrorKind::Concurrency);
    }

    #[test]
    fn test_retune_keeps_active_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let fx = fixture();
        let sink = open(&fx, settings(path.clone(), RotationTrigger::Size(1024), RetentionPolicy::Count(3)));
        let record = Record::new(Severity::Info, "x");

        sink.write(&record, b"before retune\n").unwrap();
        sink.retune(settings(path.clone(), RotationTrigger::Size(20), RetentionPolicy::Count(3)))
            .unwrap();
        assert_eq!(sink.bytes_written(), 14);

        sink.write(&record, b"after retune\n").unwrap();
        assert_eq!(fx.metrics.rotations(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "after retune\n");

        let moved = settings(dir.path().join("other.log"), RotationTrigger::Size(20), RetentionPolicy::Count(3));
        assert!(sink.retune(moved).unwrap_err().is_config());
    }
}
