//! Cumulative progress across all shards of a sync

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Receives progress percentages in `0..=100`.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Shared counter of records persisted during one sync.
///
/// Every report is `round(100 * persisted / expected)`, clamped to 100 and
/// never lower than a previous report.
pub struct ProgressReporter {
    expected: u64,
    persisted: AtomicU64,
    last: AtomicU8,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(expected: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            expected,
            persisted: AtomicU64::new(0),
            last: AtomicU8::new(0),
            callback,
        }
    }

    /// Report 0 before any shard work.
    pub fn start(&self) {
        self.emit(0);
    }

    /// Count `records` persisted rows and report.
    pub fn record(&self, records: u64) {
        let persisted = self.persisted.fetch_add(records, Ordering::SeqCst) + records;
        self.emit(percent(persisted, self.expected));
    }

    /// Report 100 once every shard succeeded.
    pub fn complete(&self) {
        self.emit(100);
    }

    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::SeqCst)
    }

    fn emit(&self, value: u8) {
        let value = self.last.fetch_max(value, Ordering::SeqCst).max(value);
        if let Some(callback) = &self.callback {
            callback(value);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("expected", &self.expected)
            .field("persisted", &self.persisted())
            .finish_non_exhaustive()
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let ratio = (done as f64 * 100.0 / total as f64).round();
    ratio.min(100.0) as u8
}
