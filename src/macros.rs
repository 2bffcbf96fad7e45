//! Logging macros for ergonomic log message formatting.
//!
//! The macros format their arguments like `format!` and record the call
//! site: `file!()`, `line!()` and `module_path!()` (rendered as the
//! function). They work with both [`LogManager`](crate::LogManager) and
//! [`LoggerBinding`](crate::LoggerBinding).
//!
//! # Examples
//!
//! ```
//! use rust_log_manager::{info, CaptureBuffer, LogManager, ManagerConfig, SinkConfig};
//!
//! let capture = CaptureBuffer::new();
//! let manager = LogManager::new(
//!     ManagerConfig::default()
//!         .with_format("{level} {function} {message}")
//!         .with_sink(SinkConfig::writer("memory", capture.clone())),
//! )
//! .unwrap();
//!
//! let port = 8080;
//! info!(manager, "Server listening on port {}", port);
//!
//! assert!(capture.contents().starts_with("INFO "));
//! assert!(capture.contents().ends_with(" Server listening on port 8080\n"));
//! ```

/// Log a message at an explicit severity.
///
/// # Examples
///
/// ```
/// # use rust_log_manager::{LogManager, ManagerConfig, Severity};
/// # let manager = LogManager::new(ManagerConfig::default()).unwrap();
/// use rust_log_manager::log;
/// log!(manager, Severity::Info, "Simple message");
/// log!(manager, Severity::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.emit(
            $crate::Record::new($level, format!($($arg)+)).with_location(
                $crate::Location::new(file!(), line!()).with_function(module_path!()),
            ),
        )
    };
}

/// Log a debug-level message.
///
/// ```
/// # use rust_log_manager::{LogManager, ManagerConfig};
/// # let manager = LogManager::new(ManagerConfig::default()).unwrap();
/// use rust_log_manager::debug;
/// debug!(manager, "Counter value: {}", 10);
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Severity::Debug, $($arg)+)
    };
}

/// Log an info-level message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Severity::Info, $($arg)+)
    };
}

/// Log a warning-level message.
///
/// ```
/// # use rust_log_manager::{LogManager, ManagerConfig};
/// # let manager = LogManager::new(ManagerConfig::default()).unwrap();
/// use rust_log_manager::warning;
/// warning!(manager, "Retry attempt {} of {}", 3, 5);
/// ```
#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Severity::Warning, $($arg)+)
    };
}

/// Log an error-level message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Severity::Error, $($arg)+)
    };
}

/// Log a critical-level message.
#[macro_export]
macro_rules! critical {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Severity::Critical, $($arg)+)
    };
}

/// Severity shorthands shared by `LogManager` and `LoggerBinding`
///
/// Expands inside an `impl` block whose type has
/// `fn emit(&self, Record) -> DispatchReport`.
macro_rules! emission_methods {
    () => {
        /// Emit a message at `severity`, located at the caller
        #[track_caller]
        pub fn log(
            &self,
            severity: $crate::core::severity::Severity,
            message: impl Into<String>,
        ) -> $crate::core::report::DispatchReport {
            self.emit(
                $crate::core::record::Record::new(severity, message)
                    .with_location($crate::core::record::Location::caller()),
            )
        }

        /// Emit a message with structured fields
        #[track_caller]
        pub fn log_with_fields(
            &self,
            severity: $crate::core::severity::Severity,
            message: impl Into<String>,
            fields: $crate::core::fields::Fields,
        ) -> $crate::core::report::DispatchReport {
            self.emit(
                $crate::core::record::Record::new(severity, message)
                    .with_location($crate::core::record::Location::caller())
                    .with_fields(fields),
            )
        }

        #[track_caller]
        pub fn debug(&self, message: impl Into<String>) -> $crate::core::report::DispatchReport {
            self.log($crate::core::severity::Severity::Debug, message)
        }

        #[track_caller]
        pub fn info(&self, message: impl Into<String>) -> $crate::core::report::DispatchReport {
            self.log($crate::core::severity::Severity::Info, message)
        }

        #[track_caller]
        pub fn warning(&self, message: impl Into<String>) -> $crate::core::report::DispatchReport {
            self.log($crate::core::severity::Severity::Warning, message)
        }

        #[track_caller]
        pub fn error(&self, message: impl Into<String>) -> $crate::core::report::DispatchReport {
            self.log($crate::core::severity::Severity::Error, message)
        }

        #[track_caller]
        pub fn critical(&self, message: impl Into<String>) -> $crate::core::report::DispatchReport {
            self.log($crate::core::severity::Severity::Critical, message)
        }
    };
}
