// Performance metrics module
//
// Lightweight counters for scans, plans and backup runs

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide backup metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Workers record bytes as they go; the coordinator records run outcomes.
/// The binary logs the summary on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Number of inventory scans performed
    pub scans: AtomicUsize,

    /// Number of backup plans computed
    pub validations: AtomicUsize,

    /// Mods written to an archive
    pub mods_archived: AtomicUsize,

    /// Runs that produced a complete backup
    pub runs_completed: AtomicUsize,

    /// Runs that ended with an error
    pub runs_failed: AtomicUsize,

    /// Runs stopped by an explicit cancel request
    pub runs_cancelled: AtomicUsize,

    /// Bytes read from mod directories
    pub bytes_read: AtomicU64,

    /// Bytes written to archives
    pub bytes_written: AtomicU64,

    /// Total backup time in milliseconds
    pub total_backup_time_ms: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            scans: AtomicUsize::new(0),
            validations: AtomicUsize::new(0),
            mods_archived: AtomicUsize::new(0),
            runs_completed: AtomicUsize::new(0),
            runs_failed: AtomicUsize::new(0),
            runs_cancelled: AtomicUsize::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            total_backup_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation(&self) {
        self.validations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one mod fully written to an archive
    pub fn record_mod_archived(&self, bytes: u64) {
        self.mods_archived.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a successful run
    pub fn record_run_completed(&self, bytes_written: u64, duration: Duration) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes_written, Ordering::Relaxed);
        self.record_backup_time(duration);
    }

    /// Record a failed run
    pub fn record_run_failed(&self, duration: Duration) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        self.record_backup_time(duration);
    }

    /// Record a cancelled run
    pub fn record_run_cancelled(&self, duration: Duration) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
        self.record_backup_time(duration);
    }

    fn record_backup_time(&self, duration: Duration) {
        self.total_backup_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Read throughput over all runs in bytes per second
    pub fn throughput_bytes_per_sec(&self) -> f64 {
        let total_ms = self.total_backup_time_ms.load(Ordering::Relaxed);
        if total_ms > 0 {
            self.bytes_read.load(Ordering::Relaxed) as f64 / (total_ms as f64 / 1000.0)
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Backup Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Scans: {}, plans computed: {}",
            self.scans.load(Ordering::Relaxed),
            self.validations.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Runs: {} completed, {} failed, {} cancelled",
            self.runs_completed.load(Ordering::Relaxed),
            self.runs_failed.load(Ordering::Relaxed),
            self.runs_cancelled.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Mods archived: {}, read: {} bytes, written: {} bytes",
            self.mods_archived.load(Ordering::Relaxed),
            self.bytes_read.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total backup time: {:.2}s ({:.0} bytes/s)",
            self.total_backup_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.throughput_bytes_per_sec()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
