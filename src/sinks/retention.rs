//! Background compression and pruning of historical files
//!
//! Rotation hands each renamed file to the [`RetentionManager`], which runs
//! a single worker thread fed by a bounded queue. Submissions never block:
//! when the queue is full the job is dropped, reported, and the next job's
//! directory scan picks up whatever was missed.

use super::compression::{Compression, Compressor};
use super::rotation::RotationMarker;
use crate::core::config::parse_duration;
use crate::core::error::{LoggerError, Result};
use crate::core::metrics::ManagerMetrics;
use crate::core::report::{panic_message, Diagnostic, ErrorReporter, SinkError};
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) const TEMP_SUFFIX: &str = "tmp";

/// How many historical files a sink keeps
///
/// # Examples
///
/// ```
/// use rust_log_manager::RetentionPolicy;
/// use std::time::Duration;
///
/// assert_eq!("5 files".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::Count(5));
/// assert_eq!("7 days".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::Age(Duration::from_secs(7 * 86_400)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Delete files rotated longer ago than this
    Age(Duration),

    /// Keep only the most recent N rotations
    Count(usize),
}

impl RetentionPolicy {
    pub fn validate(&self) -> Result<()> {
        match self {
            RetentionPolicy::Count(0) => Err(LoggerError::config(
                "retention",
                "retention count must be greater than zero",
            )),
            RetentionPolicy::Age(age) if age.is_zero() => Err(LoggerError::config(
                "retention",
                "retention age must be greater than zero",
            )),
            _ => Ok(()),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Age(Duration::from_secs(7 * 86_400))
    }
}

impl FromStr for RetentionPolicy {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let lower = s.to_lowercase();
        let count = lower
            .strip_suffix("files")
            .or_else(|| lower.strip_suffix("file"))
            .unwrap_or(&lower)
            .trim();

        let policy = if let Ok(n) = count.parse::<usize>() {
            RetentionPolicy::Count(n)
        } else if let Some(age) = parse_duration(s) {
            RetentionPolicy::Age(age)
        } else {
            return Err(LoggerError::config(
                "retention",
                format!("cannot parse retention '{}'", s),
            ));
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl<'de> serde::Deserialize<'de> for RetentionPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A rotated file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalFile {
    pub path: PathBuf,
    pub marker: RotationMarker,
    /// Compression extension, `None` for a raw file
    pub extension: Option<String>,
    pub size: u64,
}

impl HistoricalFile {
    /// Recognize `candidate` as a historical file of the sink writing `active`
    pub fn parse(active: &Path, candidate: &Path) -> Option<Self> {
        let base = active.file_name()?.to_str()?;
        let name = candidate.file_name()?.to_str()?;
        let rest = name.strip_prefix(base)?.strip_prefix('.')?;

        let (marker, extension) = match rest.split_once('.') {
            Some((marker, ext))
                if !ext.split('.').any(str::is_empty) && ext.rsplit('.').next() != Some(TEMP_SUFFIX) =>
            {
                (marker, Some(ext.to_string()))
            }
            Some(_) => return None,
            None => (rest, None),
        };

        Some(Self {
            path: candidate.to_path_buf(),
            marker: RotationMarker::parse(marker)?,
            extension,
            size: 0,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.extension.is_some()
    }
}

/// Historical files of the sink writing `active`, oldest first
pub fn enumerate(active: &Path) -> Result<Vec<HistoricalFile>> {
    let dir = match active.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let entries = fs::read_dir(dir).map_err(|e| {
        LoggerError::io_operation(
            "scan historical files",
            format!("Failed to read directory '{}'", dir.display()),
            e,
        )
    })?;

    let mut files: Vec<HistoricalFile> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let mut file = HistoricalFile::parse(active, &entry.path())?;
            file.size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            Some(file)
        })
        .collect();

    files.sort_by(|a, b| a.marker.cmp(&b.marker).then_with(|| a.extension.cmp(&b.extension)));
    Ok(files)
}

/// Highest rotation sequence on disk for `active`, 0 if none
pub fn highest_sequence(active: &Path) -> u64 {
    enumerate(active)
        .map(|files| files.iter().map(|f| f.marker.sequence()).max().unwrap_or(0))
        .unwrap_or(0)
}

/// Files that `policy` no longer retains, oldest first
///
/// `files` must be sorted oldest first. A raw and a compressed copy of the
/// same rotation count as one.
pub fn select_expired<'a>(
    files: &'a [HistoricalFile],
    policy: RetentionPolicy,
    now: DateTime<Local>,
) -> Vec<&'a HistoricalFile> {
    match policy {
        RetentionPolicy::Count(keep) => {
            let mut markers: Vec<&RotationMarker> = files.iter().map(|f| &f.marker).collect();
            markers.dedup();
            let expired = markers.len().saturating_sub(keep);
            match markers.get(expired) {
                Some(oldest_kept) => {
                    let oldest_kept = (*oldest_kept).clone();
                    files.iter().filter(|f| f.marker < oldest_kept).collect()
                }
                None => files.iter().collect(),
            }
        }
        RetentionPolicy::Age(age) => files
            .iter()
            .filter(|f| {
                f.marker
                    .rotated_at()
                    .and_then(|at| (now - at).to_std().ok())
                    .map(|elapsed| elapsed > age)
                    .unwrap_or(false)
            })
            .collect(),
    }
}

/// A file just renamed by rotation, with the owning sink's settings
#[derive(Debug, Clone)]
pub struct RotatedFile {
    pub sink: String,
    /// Path of the sink's active file
    pub active: PathBuf,
    /// Path of the historical file
    pub path: PathBuf,
    pub marker: RotationMarker,
    pub compression: Compression,
    pub retention: RetentionPolicy,
}

enum RetentionJob {
    Rotated(RotatedFile),
    Barrier(Sender<()>),
    Shutdown,
}

struct Worker {
    metrics: Arc<ManagerMetrics>,
    reporter: Arc<ErrorReporter>,
    budget: Duration,
}

impl Worker {
    fn run(self, receiver: Receiver<RetentionJob>) {
        for job in receiver.iter() {
            match job {
                RetentionJob::Rotated(file) => {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        self.process(&file)
                    }));
                    if let Err(panic_info) = outcome {
                        self.reporter.report(
                            Diagnostic::Critical,
                            SinkError::new(
                                &file.sink,
                                &LoggerError::retention(
                                    file.path.display().to_string(),
                                    format!("retention job panicked: {}", panic_message(panic_info.as_ref())),
                                ),
                            ),
                        );
                    }
                }
                RetentionJob::Barrier(ack) => {
                    let _ = ack.send(());
                }
                RetentionJob::Shutdown => break,
            }
        }
    }

    fn process(&self, file: &RotatedFile) {
        let deadline = Instant::now() + self.budget;

        if let Some(compressor) = file.compression.compressor() {
            self.compress_one(file, &file.path, compressor.as_ref());
        }

        let historical = match enumerate(&file.active) {
            Ok(files) => files,
            Err(e) => {
                self.reporter.report(Diagnostic::Error, SinkError::new(&file.sink, &e));
                return;
            }
        };

        // Raw files left behind by dropped jobs or earlier failures
        if let Some(compressor) = file.compression.compressor() {
            for backlog in historical
                .iter()
                .filter(|f| !f.is_compressed() && f.marker < file.marker)
            {
                if Instant::now() >= deadline {
                    break;
                }
                if !historical
                    .iter()
                    .any(|f| f.marker == backlog.marker && f.is_compressed())
                {
                    self.compress_one(file, &backlog.path, compressor.as_ref());
                }
            }
        }

        self.prune(file, deadline);
    }

    fn compress_one(&self, file: &RotatedFile, path: &Path, compressor: &dyn Compressor) {
        match compress_file(path, compressor) {
            Ok(true) => {
                self.metrics.record_compressed();
            }
            Ok(false) => {}
            Err(e) => {
                self.metrics.record_compression_failure();
                self.reporter.report(Diagnostic::Warning, SinkError::new(&file.sink, &e));
            }
        }
    }

    fn prune(&self, file: &RotatedFile, deadline: Instant) {
        let historical = match enumerate(&file.active) {
            Ok(files) => files,
            Err(e) => {
                self.reporter.report(Diagnostic::Error, SinkError::new(&file.sink, &e));
                return;
            }
        };

        for expired in select_expired(&historical, file.retention, Local::now()) {
            if Instant::now() >= deadline {
                self.reporter.report(
                    Diagnostic::Warning,
                    SinkError::new(
                        &file.sink,
                        &LoggerError::retention(
                            expired.path.display().to_string(),
                            format!("retention budget of {:?} exhausted, deferring deletions", self.budget),
                        ),
                    ),
                );
                return;
            }

            match fs::remove_file(&expired.path) {
                Ok(()) => {
                    self.metrics.record_pruned();
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    self.metrics.record_prune_failure();
                    self.reporter.report(
                        Diagnostic::Error,
                        SinkError::new(
                            &file.sink,
                            &LoggerError::retention(
                                expired.path.display().to_string(),
                                format!("Failed to delete historical file: {}", e),
                            ),
                        ),
                    );
                }
            }
        }
    }
}

/// Compress `path` to `{path}.{ext}` through a temporary file
///
/// Returns `Ok(false)` when `path` no longer exists. On failure the raw
/// file is left untouched and the temporary file removed.
pub fn compress_file(path: &Path, compressor: &dyn Compressor) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = path.with_file_name(format!("{}.{}", file_name, compressor.extension()));
    let temp = path.with_file_name(format!("{}.{}.{}", file_name, compressor.extension(), TEMP_SUFFIX));

    let attempt = compressor.compress(path, &temp).and_then(|()| {
        fs::rename(&temp, &target).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to rename compressed file to: {}", target.display()),
                e,
            )
        })
    });

    if let Err(e) = attempt {
        let _ = fs::remove_file(&temp);
        return Err(LoggerError::compression(path.display().to_string(), e.to_string()));
    }

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[LOGGER WARNING] Compression succeeded but failed to remove original file {}: {}. \
             Both compressed and uncompressed versions exist.",
            path.display(),
            e
        );
    }

    Ok(true)
}

/// Owner of the retention worker thread
pub struct RetentionManager {
    sender: Mutex<Option<Sender<RetentionJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
    metrics: Arc<ManagerMetrics>,
}

impl RetentionManager {
    /// Spawn the worker
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(
        capacity: usize,
        budget: Duration,
        metrics: Arc<ManagerMetrics>,
        reporter: Arc<ErrorReporter>,
    ) -> Result<Self> {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);

        let worker = Worker {
            metrics: Arc::clone(&metrics),
            reporter,
            budget,
        };
        let handle = thread::Builder::new()
            .name("log-retention".to_string())
            .spawn(move || worker.run(receiver))
            .map_err(|e| LoggerError::io_operation("start retention worker", "Failed to spawn thread", e))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            capacity,
            metrics,
        })
    }

    /// Queue a rotated file without blocking
    ///
    /// # Errors
    ///
    /// `RetentionQueueFull` when the queue is at capacity, `RetentionStopped`
    /// after shutdown.
    pub fn submit(&self, file: RotatedFile) -> Result<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            self.metrics.record_retention_job_dropped();
            return Err(LoggerError::RetentionStopped);
        };

        match sender.try_send(RetentionJob::Rotated(file)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.record_retention_job_dropped();
                Err(LoggerError::RetentionQueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => {
                self.metrics.record_retention_job_dropped();
                Err(LoggerError::RetentionStopped)
            }
        }
    }

    /// Wait until every job queued before this call has finished
    ///
    /// Returns `false` on timeout or when the worker is gone.
    pub fn sync(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let (ack_tx, ack_rx) = bounded(1);

        let sender = match self.sender.lock().as_ref() {
            Some(sender) => sender.clone(),
            None => return false,
        };
        if sender
            .send_timeout(RetentionJob::Barrier(ack_tx), timeout)
            .is_err()
        {
            return false;
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        ack_rx.recv_timeout(remaining).is_ok()
    }

    /// Stop the worker after the jobs already queued, waiting at most `timeout`
    ///
    /// Returns `true` if the worker finished in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let start = Instant::now();

        if let Some(sender) = self.sender.lock().take() {
            // A full queue drains on its own; dropping the sender ends the loop too
            let _ = sender.send_timeout(RetentionJob::Shutdown, timeout);
        }

        let Some(handle) = self.worker.lock().take() else {
            return true;
        };

        loop {
            if handle.is_finished() {
                if let Err(e) = handle.join() {
                    eprintln!(
                        "[LOGGER ERROR] Retention worker panicked during shutdown: {}",
                        panic_message(e.as_ref())
                    );
                    return false;
                }
                return true;
            }

            if start.elapsed() >= timeout {
                eprintln!(
                    "[LOGGER WARNING] Retention worker did not finish within {:?}. \
                     Pending compression and pruning will resume on the next run.",
                    timeout
                );
                return false;
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }
}

impl fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionManager")
            .field("capacity", &self.capacity)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for RetentionManager {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown(Duration::from_secs(1));
        }
    }
}
