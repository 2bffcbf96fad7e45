//! Output destinations for rendered records

pub mod compression;
pub mod console;
pub mod file;
pub mod retention;
pub mod rotation;
pub mod writer;

pub use compression::{Compression, Compressor, GzipCompressor, ZipCompressor};
pub use console::ConsoleSink;
pub use file::{FileSink, FileState};
pub use retention::{HistoricalFile, RetentionManager, RetentionPolicy, RotatedFile};
pub use rotation::{ActiveFileHandle, RotationMarker, RotationPolicy, RotationTrigger};
pub use writer::{CaptureBuffer, SharedWriter, WriterSink};

use crate::core::error::{LoggerError, Result};
use crate::core::record::Record;
use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;

/// A named output endpoint
///
/// Implementations serialize their own writes: `write` is called
/// concurrently from every emitting thread and must not interleave two
/// records.
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Write one record, already rendered for this sink
    fn write(&self, record: &Record, rendered: &[u8]) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Release the destination; later writes fail
    fn close(&self) -> Result<()> {
        self.flush()
    }
}

/// Acquire a sink mutex, giving up after `timeout`
pub(crate) fn lock_within<'a, T>(
    mutex: &'a Mutex<T>,
    sink: &str,
    timeout: Duration,
) -> Result<MutexGuard<'a, T>> {
    mutex
        .try_lock_for(timeout)
        .ok_or_else(|| LoggerError::sink_busy(sink, timeout))
}
