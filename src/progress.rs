//! Progress reporting.
//!
//! Long-running operations report byte counters to a [`ProgressSink`].  The
//! sink is the only mutable resource shared between extraction workers, so
//! implementations must synchronise themselves and must stay cheap: calls
//! arrive from the compression and decompression hot paths.

use std::sync::atomic::{AtomicU64, Ordering};

/// Receiver of byte counters.  Every call is fire-and-forget.
pub trait ProgressSink: Send + Sync {
    fn reset(&self);
    fn set_total(&self, bytes: u64);
    fn add_processed(&self, bytes: u64);
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn reset(&self) {}
    fn set_total(&self, _: u64) {}
    fn add_processed(&self, _: u64) {}
}

type PercentCallback = dyn Fn(u8) + Send + Sync;

/// Lock-free counter sink with an optional percentage callback.
///
/// The callback fires on `reset`/`set_total` (with 0) and whenever an
/// `add_processed` call moves the integer percentage.
pub struct ProgressCounter {
    total:        AtomicU64,
    processed:    AtomicU64,
    last_percent: AtomicU64,
    callback:     Option<Box<PercentCallback>>,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self {
            total:        AtomicU64::new(0),
            processed:    AtomicU64::new(0),
            last_percent: AtomicU64::new(0),
            callback:     None,
        }
    }

    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        Self { callback: Some(Box::new(callback)), ..Self::new() }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Integer percentage clamped to 0..=100.  0 while no total is known.
    pub fn percent(&self) -> u8 {
        percent_of(self.processed(), self.total())
    }

    fn restart(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.last_percent.store(0, Ordering::Relaxed);
        if let Some(cb) = &self.callback {
            cb(0);
        }
    }
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressCounter {
    fn reset(&self) {
        self.restart(0);
    }

    fn set_total(&self, bytes: u64) {
        self.restart(bytes);
    }

    fn add_processed(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let processed = self.processed.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return;
        }
        let pct = percent_of(processed, total);
        if let Some(cb) = &self.callback {
            if self.last_percent.swap(pct as u64, Ordering::Relaxed) != pct as u64 {
                cb(pct);
            }
        }
    }
}

fn percent_of(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (processed as u128 * 100 / total as u128).min(100) as u8
}

// ── Batching ─────────────────────────────────────────────────────────────────

/// Coalesces small increments into roughly `threshold`-sized reports.
pub(crate) struct ProgressBatch<'a> {
    sink:      &'a dyn ProgressSink,
    pending:   u64,
    threshold: u64,
}

impl<'a> ProgressBatch<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, threshold: u64) -> Self {
        Self { sink, pending: 0, threshold }
    }

    pub(crate) fn add(&mut self, bytes: u64) {
        self.pending += bytes;
        if self.pending >= self.threshold {
            self.flush();
        }
    }

    pub(crate) fn flush(&mut self) {
        if self.pending > 0 {
            self.sink.add_processed(self.pending);
            self.pending = 0;
        }
    }
}
