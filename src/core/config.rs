//! Manager and sink configuration
//!
//! Configuration is plain data: it can be built in code or deserialized
//! (unknown keys are rejected), then handed to `LogManager::configure`,
//! which validates everything before installing it.
//!
//! ```
//! use rust_log_manager::{ManagerConfig, Severity, SinkConfig, FileSinkOptions, RotationTrigger};
//!
//! let config = ManagerConfig::new("./logs")
//!     .with_level(Severity::Info)
//!     .with_sink(SinkConfig::console("console").with_format("colorized"))
//!     .with_sink(SinkConfig::file(
//!         "app",
//!         FileSinkOptions::new("app.log").with_rotation(RotationTrigger::Size(1024 * 1024)),
//!     ));
//! assert_eq!(config.sinks.len(), 2);
//! ```

use super::error::{LoggerError, Result};
use super::format::DEFAULT_LOG_FORMAT;
use super::severity::Severity;
use crate::sinks::compression::Compression;
use crate::sinks::retention::RetentionPolicy;
use crate::sinks::rotation::RotationTrigger;
use crate::sinks::writer::SharedWriter;
use crate::sinks::Sink;
use serde::Deserialize;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_LOG_PATH: &str = "LOG_PATH";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_FILE_ROTATION: &str = "LOG_FILE_ROTATION";
pub const ENV_FILE_RETENTION: &str = "LOG_FILE_RETENTION";
pub const ENV_FILE_COMPRESSION: &str = "LOG_FILE_COMPRESSION";

pub const DEFAULT_LOG_PATH: &str = "./logs";
pub const DEFAULT_FILE_NAME: &str = "app.log";

/// Defaults applied to file sinks that leave rotation, retention or
/// compression unset
///
/// Each value is independently settable. The presets mirror the
/// combinations commonly found in existing deployments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileDefaults {
    pub rotation: RotationTrigger,
    pub retention: RetentionPolicy,
    pub compression: Compression,
}

impl FileDefaults {
    /// 10 MB files kept for 7 days, zipped
    pub fn compact() -> Self {
        Self {
            rotation: RotationTrigger::Size(10 * 1000 * 1000),
            retention: RetentionPolicy::Age(Duration::from_secs(7 * 86_400)),
            compression: Compression::Zip,
        }
    }

    /// 100 MB files kept for 30 days, zipped
    pub fn extended() -> Self {
        Self {
            rotation: RotationTrigger::Size(100 * 1000 * 1000),
            retention: RetentionPolicy::Age(Duration::from_secs(30 * 86_400)),
            compression: Compression::Zip,
        }
    }

    /// 500 MB files kept for 30 days, zipped
    pub fn bulk() -> Self {
        Self {
            rotation: RotationTrigger::Size(500 * 1000 * 1000),
            retention: RetentionPolicy::Age(Duration::from_secs(30 * 86_400)),
            compression: Compression::Zip,
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: RotationTrigger) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

impl Default for FileDefaults {
    fn default() -> Self {
        Self::compact()
    }
}

/// Console output stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleStream {
    #[default]
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleOptions {
    pub stream: ConsoleStream,
}

/// File sink settings; unset values come from [`FileDefaults`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSinkOptions {
    /// File name, relative to `log_path` unless absolute
    #[serde(default = "default_file_name")]
    pub file_name: PathBuf,
    #[serde(default)]
    pub rotation: Option<RotationTrigger>,
    #[serde(default)]
    pub retention: Option<RetentionPolicy>,
    #[serde(default)]
    pub compression: Option<Compression>,
}

fn default_file_name() -> PathBuf {
    PathBuf::from(DEFAULT_FILE_NAME)
}

impl FileSinkOptions {
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            rotation: None,
            retention: None,
            compression: None,
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: RotationTrigger) -> Self {
        self.rotation = Some(rotation);
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = Some(retention);
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }
}

impl Default for FileSinkOptions {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_NAME)
    }
}

/// Caller-supplied sink, shared by reference
#[derive(Clone)]
pub struct CustomSink(pub Arc<dyn Sink>);

impl fmt::Debug for CustomSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomSink").field(&self.0.name()).finish()
    }
}

/// Destination kind of a sink
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Console(#[serde(default)] ConsoleOptions),
    File(FileSinkOptions),
    /// Any `Write` target, e.g. a socket or an in-memory buffer
    #[serde(skip)]
    Writer(SharedWriter),
    /// A handler implementing [`Sink`] directly
    #[serde(skip)]
    Custom(CustomSink),
}

impl SinkKind {
    pub fn is_console(&self) -> bool {
        matches!(self, SinkKind::Console(_))
    }
}

/// One configured destination
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    pub name: String,
    pub kind: SinkKind,
    /// Falls back to the manager's `log_level`
    #[serde(default)]
    pub min_severity: Option<Severity>,
    /// Template identifier; falls back to the manager's `log_format`
    #[serde(default)]
    pub format: Option<String>,
    /// Color custom patterns; defaults to true for console sinks only
    #[serde(default)]
    pub colorize: Option<bool>,
}

impl SinkConfig {
    pub fn new(name: impl Into<String>, kind: SinkKind) -> Self {
        Self {
            name: name.into(),
            kind,
            min_severity: None,
            format: None,
            colorize: None,
        }
    }

    pub fn console(name: impl Into<String>) -> Self {
        Self::new(name, SinkKind::Console(ConsoleOptions::default()))
    }

    pub fn stderr(name: impl Into<String>) -> Self {
        Self::new(
            name,
            SinkKind::Console(ConsoleOptions {
                stream: ConsoleStream::Stderr,
            }),
        )
    }

    pub fn file(name: impl Into<String>, options: FileSinkOptions) -> Self {
        Self::new(name, SinkKind::File(options))
    }

    pub fn writer<W: Write + Send + 'static>(name: impl Into<String>, writer: W) -> Self {
        Self::new(name, SinkKind::Writer(SharedWriter::new(writer)))
    }

    pub fn custom(name: impl Into<String>, sink: Arc<dyn Sink>) -> Self {
        Self::new(name, SinkKind::Custom(CustomSink(sink)))
    }

    #[must_use]
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    #[must_use]
    pub fn with_format(mut self, template_id: impl Into<String>) -> Self {
        self.format = Some(template_id.into());
        self
    }

    #[must_use]
    pub fn with_colorize(mut self, colorize: bool) -> Self {
        self.colorize = Some(colorize);
        self
    }

    pub(crate) fn colorize(&self) -> bool {
        self.colorize.unwrap_or_else(|| self.kind.is_console())
    }
}

/// Top-level configuration consumed by `LogManager`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Directory holding file sinks
    pub log_path: PathBuf,
    /// Default minimum severity for sinks
    pub log_level: Severity,
    /// Default template for sinks
    pub log_format: String,
    pub file_defaults: FileDefaults,
    pub sinks: Vec<SinkConfig>,
    /// Longest wait for a busy sink before the record is dropped
    pub lock_timeout_ms: u64,
    /// Capacity of the background retention queue
    pub retention_queue: usize,
    /// Time budget for one retention job
    pub retention_budget_ms: u64,
    /// Number of runtime errors kept for `take_errors`
    pub error_history: usize,
}

impl ManagerConfig {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `LOG_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override global options from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_LOG_PATH) {
            self.log_path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level
                .parse()
                .map_err(|e: String| LoggerError::config(ENV_LOG_LEVEL, e))?;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.log_format = format;
        }
        if let Some(rotation) = lookup(ENV_FILE_ROTATION) {
            self.file_defaults.rotation = rotation.parse()?;
        }
        if let Some(retention) = lookup(ENV_FILE_RETENTION) {
            self.file_defaults.retention = retention.parse()?;
        }
        if let Some(compression) = lookup(ENV_FILE_COMPRESSION) {
            self.file_defaults.compression = compression.parse()?;
        }
        Ok(())
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LoggerError::config("configuration", e.to_string()))
    }

    #[must_use]
    pub fn with_level(mut self, level: Severity) -> Self {
        self.log_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, template_id: impl Into<String>) -> Self {
        self.log_format = template_id.into();
        self
    }

    #[must_use]
    pub fn with_file_defaults(mut self, defaults: FileDefaults) -> Self {
        self.file_defaults = defaults;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn retention_budget(&self) -> Duration {
        Duration::from_millis(self.retention_budget_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            log_level: Severity::Debug,
            log_format: DEFAULT_LOG_FORMAT.to_string(),
            file_defaults: FileDefaults::default(),
            sinks: Vec::new(),
            lock_timeout_ms: 5_000,
            retention_queue: 256,
            retention_budget_ms: 2_000,
            error_history: 128,
        }
    }
}

/// Parse a byte size such as `"10 MB"`, `"500KB"`, `"1 GiB"` or `"4096"`
///
/// Decimal units (KB, MB, GB) are powers of 1000, binary units (KiB, MiB,
/// GiB) powers of 1024.
pub(crate) fn parse_size(input: &str) -> Option<u64> {
    let s = input.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.parse().ok()?;

    let multiplier: u64 = match unit.trim().to_lowercase().as_str() {
        "" | "b" | "bytes" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        _ => return None,
    };

    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 {
        return None;
    }
    Some(bytes.round() as u64)
}

/// Parse a duration such as `"7 days"`, `"12h"`, `"1 week 2 days"`
pub(crate) fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    let mut total = 0.0_f64;
    let mut rest = s.as_str();
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if split == 0 {
            return None;
        }
        let number: f64 = rest[..split].parse().ok()?;
        rest = rest[split..].trim_start();

        let unit_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_end] {
            "ms" | "millis" | "milliseconds" => 0.001,
            "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
            "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
            "h" | "hr" | "hour" | "hours" => 3_600.0,
            "d" | "day" | "days" => 86_400.0,
            "w" | "week" | "weeks" => 604_800.0,
            _ => return None,
        };
        total += number * seconds;
        rest = rest[unit_end..].trim_start_matches([' ', ',']);
    }

    if total.is_finite() && total >= 0.0 {
        Some(Duration::from_secs_f64(total))
    } else {
        None
    }
}
