//! Named logger views layered over a manager
//!
//! A binding stamps its name and bound fields onto every record, sends it
//! to the manager's current global sinks, and then, if every filter
//! accepts the record, to its own extra sinks. Filters never affect the
//! global sinks.

use super::config::SinkConfig;
use super::error::{LoggerError, Result};
use super::fields::{FieldValue, Fields};
use super::manager::{Shared, SinkSet};
use super::record::Record;
use super::report::{panic_message, Diagnostic, DispatchReport, SinkError};
use std::fmt;
use std::sync::Arc;

/// Reject-only predicate over records; `false` keeps the record away
/// from the binding's extra sinks
pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Extra sinks, filters and bound fields of a binding
///
/// # Example
///
/// ```
/// use rust_log_manager::{BindingConfig, CaptureBuffer, LogManager, ManagerConfig, Severity, SinkConfig};
///
/// let audit = CaptureBuffer::new();
/// let manager = LogManager::new(ManagerConfig::default()).unwrap();
/// let payments = manager
///     .bind(
///         "payments",
///         BindingConfig::new()
///             .with_sink(SinkConfig::writer("audit", audit.clone()).with_format("{name} {message} {extra}"))
///             .with_filter(|record| record.severity() >= Severity::Warning)
///             .with_field("region", "eu-west"),
///     )
///     .unwrap();
///
/// payments.info("authorized");
/// payments.warning("declined");
/// assert_eq!(audit.contents(), "payments declined region=eu-west\n");
/// ```
#[derive(Clone, Default)]
pub struct BindingConfig {
    pub sinks: Vec<SinkConfig>,
    pub filters: Vec<RecordFilter>,
    pub fields: Fields,
}

impl BindingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }
}

impl fmt::Debug for BindingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingConfig")
            .field("sinks", &self.sinks)
            .field("filters", &self.filters.len())
            .field("fields", &self.fields)
            .finish()
    }
}

/// A named view of a [`LogManager`](crate::LogManager)
///
/// Cheap to clone; clones share extra sinks and filters.
#[derive(Clone)]
pub struct LoggerBinding {
    shared: Arc<Shared>,
    name: Arc<str>,
    extra: Arc<SinkSet>,
    filters: Arc<[RecordFilter]>,
    fields: Arc<Fields>,
}

impl LoggerBinding {
    pub(crate) fn new(shared: Arc<Shared>, name: String, config: BindingConfig) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(LoggerError::config("binding", "binding name must not be empty"));
        }
        let extra = shared.build_extra(&config.sinks)?;
        Ok(Self {
            shared,
            name: Arc::from(name),
            extra: Arc::new(extra),
            filters: Arc::from(config.filters),
            fields: Arc::new(config.fields),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// A binding with the same sinks and filters and additional bound fields
    #[must_use]
    pub fn with_fields(&self, fields: Fields) -> Self {
        let mut merged = fields;
        merged.merge_defaults(&self.fields);
        Self {
            fields: Arc::new(merged),
            ..self.clone()
        }
    }

    /// Deliver a record through the global sinks, then the extra sinks
    pub fn emit(&self, record: Record) -> DispatchReport {
        if self.shared.is_stopped() {
            return DispatchReport::default();
        }
        self.shared.record_emitted();

        let record = record.with_logger(self.name.as_ref()).merge_fields(&self.fields);
        let global = self.shared.current_sinks();
        let mut report = self.shared.dispatch(&global, &record);

        if !self.extra.is_empty() && self.accepts(&record) {
            report.merge(self.shared.dispatch(&self.extra, &record));
        }
        report
    }

    emission_methods!();

    fn accepts(&self, record: &Record) -> bool {
        self.filters.iter().all(|filter| {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| filter(record))) {
                Ok(accepted) => accepted,
                Err(panic_info) => {
                    self.shared.reporter().report(
                        Diagnostic::Critical,
                        SinkError::new(
                            self.name.as_ref(),
                            &LoggerError::other(format!(
                                "binding filter panicked: {}",
                                panic_message(panic_info.as_ref())
                            )),
                        ),
                    );
                    false
                }
            }
        })
    }
}

impl fmt::Debug for LoggerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerBinding")
            .field("name", &self.name)
            .field("extra_sinks", &self.extra.names())
            .field("filters", &self.filters.len())
            .field("fields", &self.fields)
            .finish()
    }
}
