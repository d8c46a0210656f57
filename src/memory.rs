//! Allocation accounting for pooled detection buffers.
//!
//! Tracks how many bytes the buffer pool currently holds and the high-water
//! mark, so the daemon can log memory pressure without walking the pool.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryCounters {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_alloc(&self, bytes: usize) {
        let now = self.current.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak.fetch_max(now, Ordering::Relaxed);
    }

    pub fn record_free(&self, bytes: usize) {
        // Saturate rather than wrap if accounting ever drifts.
        let mut cur = self.current.load(Ordering::Relaxed);
        loop {
            let next = cur.saturating_sub(bytes);
            match self.current.compare_exchange_weak(
                cur,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn current_bytes(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}
