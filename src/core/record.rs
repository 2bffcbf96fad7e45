//! Immutable log record

use super::fields::{FieldValue, Fields};
use super::severity::Severity;
use chrono::{DateTime, Utc};
use std::cell::RefCell;

// Thread-local caches for thread information to avoid repeated allocations
thread_local! {
    static THREAD_ID_CACHE: RefCell<Option<String>> = const { RefCell::new(None) };
    static THREAD_NAME_CACHE: RefCell<Option<Option<String>>> = const { RefCell::new(None) };
}

fn current_thread_id() -> String {
    THREAD_ID_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| format!("{:?}", std::thread::current().id()))
            .clone()
    })
}

fn current_thread_name() -> Option<String> {
    THREAD_NAME_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| std::thread::current().name().map(String::from))
            .clone()
    })
}

/// Where a record was emitted from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub function: Option<String>,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            function: None,
            line,
        }
    }

    #[must_use]
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Location of the caller of a `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        let caller = std::panic::Location::caller();
        Self::new(caller.file(), caller.line())
    }
}

/// Escape line breaks and tabs so rendered text stays on one line
pub(crate) fn escape_control(text: &str) -> String {
    text.replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// A single log record
///
/// Built at the call site, then shared read-only by every sink that
/// accepts it.
#[derive(Debug, Clone)]
pub struct Record {
    timestamp: DateTime<Utc>,
    severity: Severity,
    message: String,
    location: Option<Location>,
    process_id: u32,
    thread_id: String,
    thread_name: Option<String>,
    logger: Option<String>,
    fields: Fields,
}

impl Record {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: escape_control(&message.into()),
            location: None,
            process_id: std::process::id(),
            thread_id: current_thread_id(),
            thread_name: current_thread_name(),
            logger: None,
            fields: Fields::new(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, name: impl Into<String>) -> Self {
        self.logger = Some(name.into());
        self
    }

    pub(crate) fn merge_fields(mut self, defaults: &Fields) -> Self {
        self.fields.merge_defaults(defaults);
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    /// Thread name when set, otherwise the thread id
    pub fn thread_label(&self) -> &str {
        self.thread_name.as_deref().unwrap_or(&self.thread_id)
    }

    pub fn logger(&self) -> Option<&str> {
        self.logger.as_deref()
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_single_line() {
        let record = Record::new(Severity::Info, "line one\nline two\r\tend");
        assert_eq!(record.message(), "line one\\nline two\\r\\tend");
    }

    #[test]
    fn test_builder_methods() {
        let record = Record::new(Severity::Warning, "disk almost full")
            .with_location(Location::new("src/main.rs", 42).with_function("main"))
            .with_field("free_mb", 12)
            .with_logger("storage");

        assert_eq!(record.severity(), Severity::Warning);
        assert_eq!(record.location().map(|l| l.line), Some(42));
        assert_eq!(record.logger(), Some("storage"));
        assert_eq!(record.fields().get("free_mb"), Some(&FieldValue::Int(12)));
        assert_eq!(record.process_id(), std::process::id());
    }

    #[test]
    fn test_thread_label_uses_name() {
        let handle = std::thread::Builder::new()
            .name("worker-7".into())
            .spawn(|| Record::new(Severity::Debug, "x").thread_label().to_string())
            .unwrap();
        assert_eq!(handle.join().unwrap(), "worker-7");
    }

    #[test]
    fn test_caller_location() {
        let location = Location::caller();
        assert!(location.file.ends_with("record.rs"));
        assert!(location.line > 0);
    }
}
