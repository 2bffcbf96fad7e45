//! Error types for the log manager

use std::time::Duration;

pub type Result<T> = std::result::Result<T, LoggerError>;

/// Coarse classification of a [`LoggerError`]
///
/// `Config` errors are raised eagerly by `configure`/`bind`; `Io` and
/// `Concurrency` errors are per-sink runtime failures that are reported
/// through the side channel and never abort a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Io,
    Concurrency,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// File sink error with path
    #[error("File sink error for '{path}': {message}")]
    FileSinkError { path: String, message: String },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotationError { path: String, message: String },

    /// Compression of a rotated file failed; the raw file is kept
    #[error("Compression failed for '{path}': {message}")]
    CompressionError { path: String, message: String },

    /// Pruning of a historical file failed; retried on the next cycle
    #[error("Retention failed for '{path}': {message}")]
    RetentionError { path: String, message: String },

    /// Sink lock could not be acquired in time
    #[error("Sink '{sink}' busy: lock not acquired within {waited:?}")]
    SinkBusy { sink: String, waited: Duration },

    /// Sink panicked while handling a record
    #[error("Sink '{sink}' panicked: {message}")]
    SinkPanicked { sink: String, message: String },

    /// Sink already closed
    #[error("Sink '{sink}' is closed")]
    SinkClosed { sink: String },

    /// Background retention queue full
    #[error("Retention queue full ({capacity} jobs pending)")]
    RetentionQueueFull { capacity: usize },

    /// Retention worker no longer running
    #[error("Retention worker stopped")]
    RetentionStopped,

    /// Manager already shut down
    #[error("Log manager already stopped")]
    ManagerStopped,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a file sink error
    pub fn file_sink(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileSinkError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileRotationError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn compression(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::CompressionError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn retention(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::RetentionError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn sink_busy(sink: impl Into<String>, waited: Duration) -> Self {
        LoggerError::SinkBusy {
            sink: sink.into(),
            waited,
        }
    }

    pub fn sink_panicked(sink: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::SinkPanicked {
            sink: sink.into(),
            message: message.into(),
        }
    }

    pub fn sink_closed(sink: impl Into<String>) -> Self {
        LoggerError::SinkClosed { sink: sink.into() }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoggerError::InvalidConfiguration { .. } => ErrorKind::Config,
            LoggerError::IoOperation { .. }
            | LoggerError::IoError(_)
            | LoggerError::FileSinkError { .. }
            | LoggerError::FileRotationError { .. }
            | LoggerError::CompressionError { .. }
            | LoggerError::RetentionError { .. } => ErrorKind::Io,
            LoggerError::SinkBusy { .. } | LoggerError::RetentionQueueFull { .. } => {
                ErrorKind::Concurrency
            }
            LoggerError::SinkPanicked { .. }
            | LoggerError::SinkClosed { .. }
            | LoggerError::RetentionStopped
            | LoggerError::ManagerStopped
            | LoggerError::Other(_) => ErrorKind::Other,
        }
    }

    /// True for errors raised at configuration time
    pub fn is_config(&self) -> bool {
        self.kind() == ErrorKind::Config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LoggerError::config("template", "unknown identifier 'fancy'");
        assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));
        assert!(err.is_config());

        let err = LoggerError::file_sink("/var/log/app.log", "Permission denied");
        assert!(matches!(err, LoggerError::FileSinkError { .. }));
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = LoggerError::sink_busy("file", Duration::from_millis(5));
        assert_eq!(err.kind(), ErrorKind::Concurrency);
    }

    #[test]
    fn test_error_display() {
        let err = LoggerError::file_rotation("/var/log/app.log", "Disk full");
        assert_eq!(
            err.to_string(),
            "File rotation failed for '/var/log/app.log': Disk full"
        );

        let err = LoggerError::compression("/var/log/app.log.1", "encoder failed");
        assert_eq!(
            err.to_string(),
            "Compression failed for '/var/log/app.log.1': encoder failed"
        );
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = LoggerError::io_operation("create log directory", "cannot create", io_err);

        assert!(matches!(err, LoggerError::IoOperation { .. }));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("create log directory"));
        assert!(err.to_string().contains("cannot create"));
    }
}
