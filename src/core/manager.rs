//! The log manager: configuration, fan-out and lifecycle
//!
//! A [`LogManager`] owns the installed sink set behind a single
//! `RwLock<Arc<SinkSet>>`. `configure` builds and validates a complete new
//! set before swapping it in, so an emit always sees either the whole old
//! set or the whole new one. Sink sets close their sinks when the last
//! reference goes away.

use super::binding::{BindingConfig, LoggerBinding};
use super::config::{ManagerConfig, SinkConfig, SinkKind};
use super::error::{LoggerError, Result};
use super::format::FormatRenderer;
use super::metrics::{ManagerMetrics, SinkMetrics};
use super::record::Record;
use super::report::{panic_message, Diagnostic, DispatchReport, ErrorCallback, ErrorReporter, SinkError};
use super::severity::{accepts, Severity};
use crate::sinks::console::ConsoleSink;
use crate::sinks::file::{FileSink, FileSinkSettings};
use crate::sinks::retention::RetentionManager;
use crate::sinks::rotation::RotationPolicy;
use crate::sinks::writer::WriterSink;
use crate::sinks::Sink;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Default timeout for graceful shutdown
///
/// Bounds how long shutdown waits for pending compression and pruning.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct SinkSlot {
    name: String,
    min_severity: Severity,
    renderer: FormatRenderer,
    sink: Arc<dyn Sink>,
    metrics: Arc<SinkMetrics>,
    file_path: Option<PathBuf>,
}

/// An immutable, fully validated set of sinks
pub(crate) struct SinkSet {
    slots: Vec<SinkSlot>,
    closed: AtomicBool,
    owner: u64,
    registry: Option<Arc<PathRegistry>>,
}

/// File paths claimed by live sink sets
///
/// A path belongs to one set at a time. Only a reconfiguration may take a
/// path over from the set it replaces, and it then reuses the live sink.
pub(crate) struct PathRegistry {
    next_owner: AtomicU64,
    claims: Mutex<HashMap<PathBuf, PathClaim>>,
}

struct PathClaim {
    owner: u64,
    sink: Weak<FileSink>,
}

impl PathRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_owner: AtomicU64::new(1),
            claims: Mutex::new(HashMap::new()),
        }
    }

    fn next_owner(&self) -> u64 {
        self.next_owner.fetch_add(1, Ordering::Relaxed)
    }

    #[cfg(test)]
    fn claimed(&self) -> usize {
        self.claims.lock().len()
    }
}

/// A sink definition that passed validation but is not opened yet
struct PlannedSink<'a> {
    config: &'a SinkConfig,
    min_severity: Severity,
    renderer: FormatRenderer,
    file: Option<FileSinkSettings>,
}

impl SinkSet {
    pub(crate) fn empty() -> Self {
        Self {
            slots: Vec::new(),
            closed: AtomicBool::new(false),
            owner: 0,
            registry: None,
        }
    }

    /// Validate every definition, claim the file paths, then open every sink
    ///
    /// Paths claimed by another live set are rejected, except those of
    /// `takeover`, whose file sinks are reused with the new settings.
    pub(crate) fn build(
        sinks: &[SinkConfig],
        config: &ManagerConfig,
        registry: &Arc<PathRegistry>,
        takeover: Option<u64>,
        retention: &Arc<RetentionManager>,
        reporter: &Arc<ErrorReporter>,
    ) -> Result<Self> {
        let mut names = HashSet::new();
        let mut paths = HashSet::new();
        let mut planned = Vec::with_capacity(sinks.len());

        for sink in sinks {
            if sink.name.trim().is_empty() {
                return Err(LoggerError::config("sinks", "sink name must not be empty"));
            }
            if !names.insert(sink.name.as_str()) {
                return Err(LoggerError::config(
                    "sinks",
                    format!("duplicate sink name '{}'", sink.name),
                ));
            }

            let template = sink.format.as_deref().unwrap_or(&config.log_format);
            let renderer = FormatRenderer::compile(template, sink.colorize())
                .map_err(|e| LoggerError::config(format!("sink '{}'", sink.name), e.to_string()))?;

            let file = match &sink.kind {
                SinkKind::File(options) => {
                    let path = resolve_path(&config.log_path, &options.file_name);
                    if !paths.insert(path.clone()) {
                        return Err(LoggerError::config(
                            format!("sink '{}'", sink.name),
                            format!("file '{}' is already used by another sink", path.display()),
                        ));
                    }

                    let defaults = &config.file_defaults;
                    let retention = options.retention.unwrap_or(defaults.retention);
                    retention.validate()?;
                    let compression = options
                        .compression
                        .clone()
                        .unwrap_or_else(|| defaults.compression.clone());
                    compression.validate()?;
                    Some(FileSinkSettings {
                        path,
                        rotation: RotationPolicy::new(options.rotation.unwrap_or(defaults.rotation))?,
                        retention,
                        compression,
                        lock_timeout: config.lock_timeout(),
                    })
                }
                _ => None,
            };

            planned.push(PlannedSink {
                config: sink,
                min_severity: sink.min_severity.unwrap_or(config.log_level),
                renderer,
                file,
            });
        }

        let owner = registry.next_owner();
        let mut claims = registry.claims.lock();
        for path in &paths {
            if let Some(claim) = claims.get(path) {
                if Some(claim.owner) != takeover {
                    return Err(LoggerError::config(
                        "sinks",
                        format!("file '{}' is already used by another sink", path.display()),
                    ));
                }
            }
        }

        let mut slots = Vec::with_capacity(planned.len());
        let mut adopted = Vec::new();
        let mut claimed = Vec::new();
        for plan in planned {
            let mut metrics = Arc::new(SinkMetrics::new());
            let name = plan.config.name.clone();
            let file_path = plan.file.as_ref().map(|f| f.path.clone());

            let sink: Arc<dyn Sink> = match (&plan.config.kind, plan.file) {
                (SinkKind::File(_), Some(settings)) => {
                    let live = claims.get(&settings.path).and_then(|claim| claim.sink.upgrade());
                    let file = match live {
                        Some(file) => {
                            metrics = file.metrics();
                            adopted.push((Arc::clone(&file), settings.clone()));
                            file
                        }
                        None => Arc::new(FileSink::open(
                            name.clone(),
                            settings.clone(),
                            Arc::clone(retention),
                            Arc::clone(&metrics),
                            Arc::clone(reporter),
                        )?),
                    };
                    claimed.push((settings.path, Arc::downgrade(&file)));
                    file
                }
                (SinkKind::Console(options), _) => {
                    Arc::new(ConsoleSink::new(name.clone(), options.stream, config.lock_timeout()))
                }
                (SinkKind::Writer(writer), _) => {
                    Arc::new(WriterSink::new(name.clone(), writer.clone(), config.lock_timeout()))
                }
                (SinkKind::Custom(custom), _) => Arc::clone(&custom.0),
                (SinkKind::File(_), None) => {
                    return Err(LoggerError::other(format!("file sink '{}' has no settings", name)))
                }
            };

            slots.push(SinkSlot {
                name,
                min_severity: plan.min_severity,
                renderer: plan.renderer,
                sink,
                metrics,
                file_path,
            });
        }

        // Every fresh sink opened; only now touch the sinks being taken over
        for (file, settings) in adopted {
            file.retune(settings)?;
        }
        for (path, sink) in claimed {
            claims.insert(path, PathClaim { owner, sink });
        }

        Ok(Self {
            slots,
            closed: AtomicBool::new(false),
            owner,
            registry: Some(Arc::clone(registry)),
        })
    }

    /// Deliver `record` to every accepting sink, isolating failures
    pub(crate) fn dispatch(
        &self,
        record: &Record,
        metrics: &ManagerMetrics,
        reporter: &ErrorReporter,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for slot in &self.slots {
            if !accepts(record.severity(), slot.min_severity) {
                slot.metrics.record_filtered();
                report.filtered += 1;
                continue;
            }

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let rendered = slot.renderer.render(record);
                slot.sink.write(record, &rendered).map(|()| rendered.len())
            }));

            let (level, error) = match outcome {
                Ok(Ok(bytes)) => {
                    slot.metrics.record_written(bytes);
                    metrics.record_delivered();
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => (Diagnostic::Error, e),
                Err(panic_info) => (
                    Diagnostic::Critical,
                    LoggerError::sink_panicked(&slot.name, panic_message(panic_info.as_ref())),
                ),
            };

            slot.metrics.record_dropped();
            metrics.record_failed_delivery();
            let failure = SinkError::new(&slot.name, &error);
            reporter.report(level, failure.clone());
            report.failures.push(failure);
        }

        report
    }

    /// Flush every sink; returns the first failure after trying all
    pub(crate) fn flush(&self) -> Result<()> {
        let mut first_error = None;
        for slot in &self.slots {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| slot.sink.flush()));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic_info) => LoggerError::sink_panicked(&slot.name, panic_message(panic_info.as_ref())),
            };
            eprintln!("[LOGGER ERROR] Sink '{}' flush failed: {}", slot.name, error);
            first_error.get_or_insert(error);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Close every sink and release the set's paths
    ///
    /// File sinks taken over by a newer set stay open.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut released = HashSet::new();
        if let Some(registry) = &self.registry {
            let mut claims = registry.claims.lock();
            for path in self.slots.iter().filter_map(|s| s.file_path.as_ref()) {
                if claims.get(path).is_some_and(|claim| claim.owner == self.owner) {
                    claims.remove(path);
                    released.insert(path);
                }
            }
        }

        for slot in &self.slots {
            if slot.file_path.as_ref().is_some_and(|path| !released.contains(path)) {
                continue;
            }
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| slot.sink.close()));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => eprintln!("[LOGGER ERROR] Sink '{}' close failed: {}", slot.name, e),
                Err(panic_info) => eprintln!(
                    "[LOGGER CRITICAL] Sink '{}' panicked during close: {}",
                    slot.name,
                    panic_message(panic_info.as_ref())
                ),
            }
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name.clone()).collect()
    }

    pub(crate) fn metrics_of(&self, name: &str) -> Option<SinkMetrics> {
        self.slots
            .iter()
            .find(|s| s.name == name)
            .map(|s| (*s.metrics).clone())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for SinkSet {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve_path(log_path: &Path, file_name: &Path) -> PathBuf {
    if file_name.is_absolute() {
        file_name.to_path_buf()
    } else {
        log_path.join(file_name)
    }
}

/// State shared by a manager and its bindings
pub(crate) struct Shared {
    sinks: RwLock<Arc<SinkSet>>,
    config: RwLock<ManagerConfig>,
    configure_lock: Mutex<()>,
    retention: Arc<RetentionManager>,
    metrics: Arc<ManagerMetrics>,
    reporter: Arc<ErrorReporter>,
    paths: Arc<PathRegistry>,
    stopped: AtomicBool,
}

impl Shared {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn current_sinks(&self) -> Arc<SinkSet> {
        Arc::clone(&self.sinks.read())
    }

    pub(crate) fn dispatch(&self, set: &SinkSet, record: &Record) -> DispatchReport {
        set.dispatch(record, &self.metrics, &self.reporter)
    }

    pub(crate) fn record_emitted(&self) {
        self.metrics.record_emitted();
    }

    pub(crate) fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// Build a set for a binding; its files must not be claimed by any live set
    pub(crate) fn build_extra(&self, sinks: &[SinkConfig]) -> Result<SinkSet> {
        if sinks.is_empty() {
            return Ok(SinkSet::empty());
        }
        let config = self.config.read().clone();
        SinkSet::build(sinks, &config, &self.paths, None, &self.retention, &self.reporter)
    }
}

/// Configurable logging manager
///
/// # Example
///
/// ```
/// use rust_log_manager::{LogManager, ManagerConfig, Severity, SinkConfig, FileSinkOptions};
///
/// let dir = tempfile::tempdir().unwrap();
/// let manager = LogManager::new(
///     ManagerConfig::new(dir.path())
///         .with_sink(SinkConfig::console("console").with_min_severity(Severity::Warning))
///         .with_sink(SinkConfig::file("app", FileSinkOptions::new("app.log"))),
/// )
/// .unwrap();
///
/// let report = manager.info("service started");
/// assert_eq!(report.delivered, 1);
/// assert_eq!(report.filtered, 1);
///
/// assert!(manager.shutdown(std::time::Duration::from_secs(5)));
/// ```
pub struct LogManager {
    shared: Arc<Shared>,
}

impl LogManager {
    /// Create a manager and install `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings, or an IO error
    /// when a log directory or file cannot be created.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Start a builder for a manager with custom runtime settings
    pub fn builder() -> LogManagerBuilder {
        LogManagerBuilder::new()
    }

    /// Validate `config` and install it atomically
    ///
    /// On error the previous configuration stays in place.
    pub fn configure(&self, config: ManagerConfig) -> Result<()> {
        let _serialized = self.shared.configure_lock.lock();
        if self.shared.is_stopped() {
            return Err(LoggerError::ManagerStopped);
        }

        let current = self.shared.current_sinks().owner;
        let set = SinkSet::build(
            &config.sinks,
            &config,
            &self.shared.paths,
            Some(current),
            &self.shared.retention,
            &self.shared.reporter,
        )?;

        let previous = std::mem::replace(&mut *self.shared.sinks.write(), Arc::new(set));
        *self.shared.config.write() = config;
        // Closed once in-flight emits release it
        drop(previous);
        Ok(())
    }

    /// Deliver a record to every sink whose minimum severity accepts it
    ///
    /// Never fails: per-sink errors are returned in the report and sent to
    /// the error side channel.
    pub fn emit(&self, record: Record) -> DispatchReport {
        if self.shared.is_stopped() {
            return DispatchReport::default();
        }
        self.shared.record_emitted();
        let set = self.shared.current_sinks();
        self.shared.dispatch(&set, &record)
    }

    emission_methods!();

    /// Create a named view with extra sinks, filters and bound fields
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an extra sink is invalid or reuses a
    /// file of the global configuration.
    pub fn bind(&self, name: impl Into<String>, config: BindingConfig) -> Result<LoggerBinding> {
        if self.shared.is_stopped() {
            return Err(LoggerError::ManagerStopped);
        }
        LoggerBinding::new(Arc::clone(&self.shared), name.into(), config)
    }

    /// Alias of [`bind`](Self::bind)
    pub fn get_logger(&self, name: impl Into<String>, config: BindingConfig) -> Result<LoggerBinding> {
        self.bind(name, config)
    }

    /// Directory that relative file sink names resolve against
    pub fn log_path(&self) -> PathBuf {
        self.shared.config.read().log_path.clone()
    }

    /// Default minimum severity for sinks without their own
    pub fn log_level(&self) -> Severity {
        self.shared.config.read().log_level
    }

    /// Default template id for sinks without their own
    pub fn log_format(&self) -> String {
        self.shared.config.read().log_format.clone()
    }

    /// Names of the installed global sinks, in configuration order
    pub fn sink_names(&self) -> Vec<String> {
        self.shared.current_sinks().names()
    }

    /// Snapshot of the manager-wide counters
    pub fn metrics(&self) -> ManagerMetrics {
        (*self.shared.metrics).clone()
    }

    /// Snapshot of one installed sink's counters
    pub fn sink_metrics(&self, name: &str) -> Option<SinkMetrics> {
        self.shared.current_sinks().metrics_of(name)
    }

    /// Drain the runtime error history, oldest first
    pub fn take_errors(&self) -> Vec<SinkError> {
        self.shared.reporter.take()
    }

    /// Flush every installed sink
    pub fn flush(&self) -> Result<()> {
        self.shared.current_sinks().flush()
    }

    /// Wait for queued compression and pruning to finish
    pub fn sync(&self, timeout: Duration) -> bool {
        self.shared.retention.sync(timeout)
    }

    /// Close every sink and stop the retention worker
    ///
    /// Later emits deliver to nothing. Returns `true` if the worker stopped
    /// within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let _serialized = self.shared.configure_lock.lock();
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return true;
        }

        let previous = std::mem::replace(&mut *self.shared.sinks.write(), Arc::new(SinkSet::empty()));
        let _ = previous.flush();
        previous.close();

        let finished = self.shared.retention.shutdown(timeout);

        let failed = self.shared.metrics.failed_deliveries();
        if failed > 0 {
            eprintln!(
                "[LOGGER WARNING] Log manager shutting down with {} failed deliveries (drop rate: {:.2}%)",
                failed,
                self.shared.metrics.drop_rate()
            );
        }
        finished
    }

    /// Whether [`shutdown`](Self::shutdown) has run
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_stopped()
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        if !self.shared.is_stopped() {
            self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }
}

impl fmt::Debug for LogManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogManager")
            .field("sinks", &self.sink_names())
            .field("stopped", &self.shared.is_stopped())
            .finish()
    }
}

/// Builder for a [`LogManager`] with non-serializable collaborators
///
/// # Example
///
/// ```
/// use rust_log_manager::{LogManager, ManagerConfig};
/// use std::sync::Arc;
///
/// let manager = LogManager::builder()
///     .config(ManagerConfig::default())
///     .on_error(Arc::new(|error| {
///         eprintln!("ALERT: {}", error);
///     }))
///     .build()
///     .unwrap();
/// assert!(manager.sink_names().is_empty());
/// ```
pub struct LogManagerBuilder {
    config: ManagerConfig,
    on_error: Option<ErrorCallback>,
}

impl LogManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            on_error: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.config.sinks.push(sink);
        self
    }

    /// Callback invoked for every runtime sink failure
    #[must_use]
    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// Start the retention worker and install the configuration
    pub fn build(self) -> Result<LogManager> {
        let metrics = Arc::new(ManagerMetrics::new());
        let reporter = Arc::new(ErrorReporter::new(self.config.error_history, self.on_error));
        let retention = Arc::new(RetentionManager::start(
            self.config.retention_queue,
            self.config.retention_budget(),
            Arc::clone(&metrics),
            Arc::clone(&reporter),
        )?);

        let paths = Arc::new(PathRegistry::new());
        let set = SinkSet::build(&self.config.sinks, &self.config, &paths, None, &retention, &reporter);
        let set = match set {
            Ok(set) => set,
            Err(e) => {
                retention.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
                return Err(e);
            }
        };

        Ok(LogManager {
            shared: Arc::new(Shared {
                sinks: RwLock::new(Arc::new(set)),
                config: RwLock::new(self.config),
                configure_lock: Mutex::new(()),
                retention,
                metrics,
                reporter,
                paths,
                stopped: AtomicBool::new(false),
            }),
        })
    }
}

impl Default for LogManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
