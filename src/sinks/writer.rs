//! Sink over any caller-supplied `Write` target

use super::{lock_within, Sink};
use crate::core::error::{LoggerError, Result};
use crate::core::record::Record;
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

/// A `Write` target shared between the configuration and the sink
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<dyn Write + Send>>,
}

impl SharedWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedWriter")
    }
}

/// In-memory `Write` target; clones share the same buffer
///
/// # Example
///
/// ```
/// use rust_log_manager::{CaptureBuffer, LogManager, ManagerConfig, SinkConfig};
///
/// let capture = CaptureBuffer::new();
/// let manager = LogManager::new(
///     ManagerConfig::default()
///         .with_format("{level} {message}")
///         .with_sink(SinkConfig::writer("memory", capture.clone())),
/// )
/// .unwrap();
///
/// manager.info("hello");
/// assert_eq!(capture.contents(), "INFO hello\n");
/// ```
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(String::from).collect()
    }

    pub fn clear(&self) {
        self.bytes.lock().clear();
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBuffer")
            .field("len", &self.bytes.lock().len())
            .finish()
    }
}

struct WriterState {
    closed: bool,
}

pub struct WriterSink {
    name: String,
    writer: SharedWriter,
    state: Mutex<WriterState>,
    lock_timeout: Duration,
}

impl WriterSink {
    pub fn new(name: impl Into<String>, writer: SharedWriter, lock_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            writer,
            state: Mutex::new(WriterState { closed: false }),
            lock_timeout,
        }
    }
}

impl Sink for WriterSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, _record: &Record, rendered: &[u8]) -> Result<()> {
        let state = lock_within(&self.state, &self.name, self.lock_timeout)?;
        if state.closed {
            return Err(LoggerError::sink_closed(&self.name));
        }

        // The writer may be shared with another sink, so bound this wait too
        let mut writer = self
            .writer
            .inner
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| LoggerError::sink_busy(&self.name, self.lock_timeout))?;
        writer
            .write_all(rendered)
            .and_then(|()| writer.flush())
            .map_err(|e| LoggerError::io_operation("write record", format!("sink '{}'", self.name), e))
    }

    fn flush(&self) -> Result<()> {
        self.writer.inner.lock().flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        self.writer.inner.lock().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::severity::Severity;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_capture_buffer_shared_between_clones() {
        let capture = CaptureBuffer::new();
        let sink = WriterSink::new("mem", SharedWriter::new(capture.clone()), Duration::from_secs(1));
        let record = Record::new(Severity::Info, "x");

        sink.write(&record, b"one\n").unwrap();
        sink.write(&record, b"two\n").unwrap();

        assert_eq!(capture.lines(), vec!["one", "two"]);
    }

    #[test]
    fn test_write_error_is_io_kind() {
        let sink = WriterSink::new("pipe", SharedWriter::new(FailingWriter), Duration::from_secs(1));
        let err = sink.write(&Record::new(Severity::Info, "x"), b"x\n").unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Io);
    }

    #[test]
    fn test_closed_sink_rejects_writes() {
        let sink = WriterSink::new("mem", SharedWriter::new(CaptureBuffer::new()), Duration::from_secs(1));
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(sink.write(&Record::new(Severity::Info, "x"), b"x\n").is_err());
    }
}
