//! Console sink writing to stdout or stderr

use super::{lock_within, Sink};
use crate::core::config::ConsoleStream;
use crate::core::error::{LoggerError, Result};
use crate::core::record::Record;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::time::Duration;

pub struct ConsoleSink {
    name: String,
    stream: ConsoleStream,
    closed: Mutex<bool>,
    lock_timeout: Duration,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>, stream: ConsoleStream, lock_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            stream,
            closed: Mutex::new(false),
            lock_timeout,
        }
    }

    pub fn stream(&self) -> ConsoleStream {
        self.stream
    }

    fn write_stream(&self, bytes: &[u8]) -> io::Result<()> {
        match self.stream {
            ConsoleStream::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()
            }
            ConsoleStream::Stderr => {
                let mut out = io::stderr().lock();
                out.write_all(bytes)?;
                out.flush()
            }
        }
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, _record: &Record, rendered: &[u8]) -> Result<()> {
        let closed = lock_within(&self.closed, &self.name, self.lock_timeout)?;
        if *closed {
            return Err(LoggerError::sink_closed(&self.name));
        }
        self.write_stream(rendered).map_err(|e| {
            LoggerError::io_operation("write console", format!("sink '{}'", self.name), e)
        })
    }

    fn flush(&self) -> Result<()> {
        match self.stream {
            ConsoleStream::Stdout => io::stdout().flush()?,
            ConsoleStream::Stderr => io::stderr().flush()?,
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock();
        *closed = true;
        drop(closed);
        self.flush()
    }
}
