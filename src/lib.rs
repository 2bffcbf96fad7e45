//! # Rust Log Manager
//!
//! A configurable logging manager that routes structured records to
//! several destinations and manages the lifecycle of log files.
//!
//! ## Features
//!
//! - **Multiple Sinks**: Console, rotating files, any `Write` target and custom sinks
//! - **Per-Sink Filtering**: Each sink has its own minimum severity and template
//! - **Rotation**: By size, age or time of day, without losing or splitting records
//! - **Retention**: Background compression (gzip, zip) and pruning by age or count
//! - **Bindings**: Named loggers with extra sinks, filters and bound fields
//! - **Failure Isolation**: A failing or panicking sink never affects the others
//!
//! ## Example
//!
//! ```
//! use rust_log_manager::prelude::*;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let manager = LogManager::new(
//!     ManagerConfig::new(dir.path())
//!         .with_sink(SinkConfig::console("console").with_min_severity(Severity::Info))
//!         .with_sink(SinkConfig::file(
//!             "app",
//!             FileSinkOptions::new("app.log")
//!                 .with_rotation("1 MB".parse().unwrap())
//!                 .with_retention(RetentionPolicy::Count(3))
//!                 .with_compression(Compression::Gzip),
//!         )),
//! )
//! .unwrap();
//!
//! manager.debug("only in the file");
//! manager.info("in both");
//!
//! manager.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
//! assert!(dir.path().join("app.log").exists());
//! ```

#[macro_use]
pub mod macros;

pub mod core;
pub mod sinks;

pub mod prelude {
    pub use crate::core::{
        BindingConfig, DispatchReport, FieldValue, Fields, FileDefaults, FileSinkOptions,
        LogManager, LogManagerBuilder, LoggerBinding, LoggerError, ManagerConfig, Record,
        Result, Severity, SinkConfig, SinkError, DEFAULT_SHUTDOWN_TIMEOUT,
    };
    pub use crate::sinks::{CaptureBuffer, Compression, RetentionPolicy, RotationTrigger, Sink};
}

pub use core::{
    accepts, BindingConfig, ConsoleOptions, ConsoleStream, CustomSink, DispatchReport, ErrorCallback,
    ErrorKind, ErrorReporter, FieldValue, Fields, FileDefaults, FileSinkOptions, FormatRenderer,
    Location, LogManager, LogManagerBuilder, LoggerBinding, LoggerError, ManagerConfig,
    ManagerMetrics, Record, RecordFilter, Result, Severity, SinkConfig, SinkError, SinkKind,
    SinkMetrics, Template, COLORIZED_TEMPLATE, DEFAULT_LOG_FORMAT, DEFAULT_SHUTDOWN_TIMEOUT,
    PLAIN_TEMPLATE,
};
pub use sinks::{
    ActiveFileHandle, CaptureBuffer, Compression, Compressor, ConsoleSink, FileSink, FileState,
    GzipCompressor, HistoricalFile, RetentionManager, RetentionPolicy, RotationMarker,
    RotationPolicy, RotationTrigger, SharedWriter, Sink, WriterSink, ZipCompressor,
};
