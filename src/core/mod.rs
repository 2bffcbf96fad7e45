//! Core log manager types

pub mod binding;
pub mod config;
pub mod error;
pub mod fields;
pub mod format;
pub mod manager;
pub mod metrics;
pub mod record;
pub mod report;
pub mod severity;

pub use binding::{BindingConfig, LoggerBinding, RecordFilter};
pub use config::{
    ConsoleOptions, ConsoleStream, CustomSink, FileDefaults, FileSinkOptions, ManagerConfig,
    SinkConfig, SinkKind,
};
pub use error::{ErrorKind, LoggerError, Result};
pub use fields::{FieldValue, Fields};
pub use format::{FormatRenderer, Template, COLORIZED_TEMPLATE, DEFAULT_LOG_FORMAT, PLAIN_TEMPLATE};
pub use manager::{LogManager, LogManagerBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use metrics::{ManagerMetrics, SinkMetrics};
pub use record::{Location, Record};
pub use report::{DispatchReport, ErrorCallback, ErrorReporter, SinkError};
pub use severity::{accepts, Severity};
