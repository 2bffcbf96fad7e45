//! Side channel for runtime sink failures
//!
//! Runtime failures never propagate out of `emit`. They are collected in a
//! [`DispatchReport`], written to stderr as a `[LOGGER ...]` diagnostic,
//! kept in a bounded history and handed to an optional callback.

use super::error::{ErrorKind, LoggerError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Callback invoked for every reported failure
///
/// Runs on the thread that hit the failure (an emitting thread or the
/// retention worker) and must not block for long.
pub type ErrorCallback = Arc<dyn Fn(&SinkError) + Send + Sync>;

/// One failure attributed to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct SinkError {
    pub sink: String,
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl SinkError {
    pub fn new(sink: impl Into<String>, error: &LoggerError) -> Self {
        Self {
            sink: sink.into(),
            kind: error.kind(),
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink '{}' ({:?}): {}", self.sink, self.kind, self.message)
    }
}

/// Outcome of delivering one record
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Sinks that wrote the record
    pub delivered: usize,
    /// Sinks whose severity filter rejected the record
    pub filtered: usize,
    pub failures: Vec<SinkError>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.filtered += other.filtered;
        self.failures.extend(other.failures);
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Diagnostic {
    Warning,
    Error,
    Critical,
}

impl Diagnostic {
    fn prefix(self) -> &'static str {
        match self {
            Diagnostic::Warning => "[LOGGER WARNING]",
            Diagnostic::Error => "[LOGGER ERROR]",
            Diagnostic::Critical => "[LOGGER CRITICAL]",
        }
    }
}

/// Bounded error history plus the user callback
pub struct ErrorReporter {
    history: Mutex<VecDeque<SinkError>>,
    capacity: usize,
    callback: Option<ErrorCallback>,
}

impl ErrorReporter {
    pub fn new(capacity: usize, callback: Option<ErrorCallback>) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            callback,
        }
    }

    pub(crate) fn report(&self, level: Diagnostic, error: SinkError) {
        eprintln!("{} {}", level.prefix(), error);

        if self.capacity > 0 {
            let mut history = self.history.lock();
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(error.clone());
        }

        if let Some(callback) = &self.callback {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(&error)));
            if let Err(panic_info) = outcome {
                eprintln!(
                    "[LOGGER CRITICAL] Error callback panicked: {}",
                    panic_message(panic_info.as_ref())
                );
            }
        }
    }

    /// Drain the history, oldest first
    pub fn take(&self) -> Vec<SinkError> {
        self.history.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("capacity", &self.capacity)
            .field("pending", &self.len())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Extract a readable message from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
