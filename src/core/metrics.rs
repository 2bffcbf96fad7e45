//! Counters for observing the manager and its sinks
//!
//! All counters are relaxed atomics: they are reporting aids, not
//! synchronization points.

use std::sync::atomic::{AtomicU64, Ordering};

/// Manager-wide counters
///
/// # Example
///
/// ```
/// use rust_log_manager::ManagerMetrics;
///
/// let metrics = ManagerMetrics::new();
/// metrics.record_emitted();
/// metrics.record_delivered();
///
/// assert_eq!(metrics.records_emitted(), 1);
/// assert_eq!(metrics.drop_rate(), 0.0);
/// ```
#[derive(Debug)]
pub struct ManagerMetrics {
    /// Records handed to `emit`
    records_emitted: AtomicU64,

    /// Successful sink deliveries (one record to N sinks counts N)
    deliveries: AtomicU64,

    /// Failed sink deliveries
    failed_deliveries: AtomicU64,

    /// Retention jobs dropped because the queue was full or stopped
    retention_jobs_dropped: AtomicU64,

    files_compressed: AtomicU64,
    compression_failures: AtomicU64,
    files_pruned: AtomicU64,
    prune_failures: AtomicU64,
}

impl ManagerMetrics {
    pub const fn new() -> Self {
        Self {
            records_emitted: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            failed_deliveries: AtomicU64::new(0),
            retention_jobs_dropped: AtomicU64::new(0),
            files_compressed: AtomicU64::new(0),
            compression_failures: AtomicU64::new(0),
            files_pruned: AtomicU64::new(0),
            prune_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn records_emitted(&self) -> u64 {
        self.records_emitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn retention_jobs_dropped(&self) -> u64 {
        self.retention_jobs_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn files_compressed(&self) -> u64 {
        self.files_compressed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn compression_failures(&self) -> u64 {
        self.compression_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn files_pruned(&self) -> u64 {
        self.files_pruned.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn prune_failures(&self) -> u64 {
        self.prune_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_emitted(&self) -> u64 {
        self.records_emitted.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_delivered(&self) -> u64 {
        self.deliveries.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_failed_delivery(&self) -> u64 {
        self.failed_deliveries.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_retention_job_dropped(&self) -> u64 {
        self.retention_jobs_dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_compressed(&self) -> u64 {
        self.files_compressed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_compression_failure(&self) -> u64 {
        self.compression_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_pruned(&self) -> u64 {
        self.files_pruned.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_prune_failure(&self) -> u64 {
        self.prune_failures.fetch_add(1, Ordering::Relaxed)
    }

    /// Failed deliveries as a percentage (0.0 - 100.0) of all deliveries
    ///
    /// Returns 0.0 if nothing has been delivered yet.
    pub fn drop_rate(&self) -> f64 {
        let failed = self.failed_deliveries() as f64;
        let total = self.deliveries() as f64 + failed;
        if total == 0.0 {
            0.0
        } else {
            (failed / total) * 100.0
        }
    }
}

impl Default for ManagerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ManagerMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            records_emitted: AtomicU64::new(self.records_emitted()),
            deliveries: AtomicU64::new(self.deliveries()),
            failed_deliveries: AtomicU64::new(self.failed_deliveries()),
            retention_jobs_dropped: AtomicU64::new(self.retention_jobs_dropped()),
            files_compressed: AtomicU64::new(self.files_compressed()),
            compression_failures: AtomicU64::new(self.compression_failures()),
            files_pruned: AtomicU64::new(self.files_pruned()),
            prune_failures: AtomicU64::new(self.prune_failures()),
        }
    }
}

/// Per-sink counters
#[derive(Debug)]
pub struct SinkMetrics {
    records_written: AtomicU64,
    records_dropped: AtomicU64,
    records_filtered: AtomicU64,
    bytes_written: AtomicU64,
    rotations: AtomicU64,
    rotation_failures: AtomicU64,
}

impl SinkMetrics {
    pub const fn new() -> Self {
        Self {
            records_written: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            records_filtered: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            rotation_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    /// Records rejected by this sink's severity filter
    #[inline]
    pub fn records_filtered(&self) -> u64 {
        self.records_filtered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rotation_failures(&self) -> u64 {
        self.rotation_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_written(&self, bytes: usize) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.records_dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_filtered(&self) -> u64 {
        self.records_filtered.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_rotation(&self) -> u64 {
        self.rotations.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_rotation_failure(&self) -> u64 {
        self.rotation_failures.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SinkMetrics {
    fn clone(&self) -> Self {
        Self {
            records_written: AtomicU64::new(self.records_written()),
            records_dropped: AtomicU64::new(self.records_dropped()),
            records_filtered: AtomicU64::new(self.records_filtered()),
            bytes_written: AtomicU64::new(self.bytes_written()),
            rotations: AtomicU64::new(self.rotations()),
            rotation_failures: AtomicU64::new(self.rotation_failures()),
        }
    }
}
