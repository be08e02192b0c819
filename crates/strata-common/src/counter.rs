//! Access-counter instrumentation shared by the index structures.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for the number of nodes or buckets inspected during lookups.
///
/// Purely an instrumentation surface: every index bumps it once per
/// node/bucket it touches on the read path, and callers may read or reset
/// it between measurement runs. Relaxed ordering is sufficient since the
/// count carries no synchronization meaning.
#[derive(Debug, Default)]
pub struct AccessCounter(AtomicU64);

impl AccessCounter {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Records one node/bucket inspection.
    #[inline]
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current count.
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Resets the count to zero.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}
