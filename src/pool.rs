//! Fixed-capacity buffer pool for frame staging.
//!
//! Detection cycles borrow packet/frame scratch space from a small pool
//! instead of allocating per cycle. Acquisition scans for a free buffer that
//! already fits, then falls back to repurposing an empty or least-recently
//! used free slot. When every slot is checked out, buffers held longer than
//! the staleness window are reclaimed on the assumption that their holder
//! died mid-cycle; the reclaimed holder's late release is detected by a
//! per-checkout generation counter and degrades to a plain free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{DetectError, Result};
use crate::memory::MemoryCounters;

pub const DEFAULT_POOL_SLOTS: usize = 8;
pub const DEFAULT_ACQUIRE_RETRIES: u32 = 3;
pub const DEFAULT_ACQUIRE_BACKOFF: Duration = Duration::from_millis(100);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(15);

struct Slot {
    /// Buffer bytes when the slot is parked; `None` while checked out or
    /// never allocated.
    bytes: Option<Vec<u8>>,
    /// Capacity recorded against the memory counters.
    recorded: usize,
    in_use: bool,
    last_used: Instant,
    checked_out_at: Instant,
    /// Bumped on every checkout; a release whose generation no longer
    /// matches hit a slot that was reclaimed underneath it.
    generation: u64,
}

struct PoolInner {
    slots: Vec<Slot>,
}

pub struct BufferPool {
    inner: Mutex<PoolInner>,
    counters: Arc<MemoryCounters>,
    next_generation: AtomicU64,
    retries: u32,
    backoff: Duration,
    stale_after: Duration,
}

/// A buffer checked out of the pool. Return it with [`BufferPool::release`];
/// if it is dropped instead, the bytes are freed but the slot stays marked
/// in-use until staleness reclamation catches it, mirroring a holder that
/// never came back.
#[derive(Debug)]
pub struct PooledBuffer {
    bytes: Option<Vec<u8>>,
    recorded: usize,
    slot: usize,
    generation: u64,
    counters: Arc<MemoryCounters>,
}

impl PooledBuffer {
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or(&[])
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match self.bytes.as_deref_mut() {
            Some(b) => b,
            None => &mut [],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if self.bytes.take().is_some() {
            self.counters.record_free(self.recorded);
        }
    }
}

impl BufferPool {
    pub fn new(slots: usize, counters: Arc<MemoryCounters>) -> Self {
        Self::with_timings(
            slots,
            counters,
            DEFAULT_ACQUIRE_RETRIES,
            DEFAULT_ACQUIRE_BACKOFF,
            DEFAULT_STALE_AFTER,
        )
    }

    pub fn with_timings(
        slots: usize,
        counters: Arc<MemoryCounters>,
        retries: u32,
        backoff: Duration,
        stale_after: Duration,
    ) -> Self {
        let now = Instant::now();
        let slots = (0..slots.max(1))
            .map(|_| Slot {
                bytes: None,
                recorded: 0,
                in_use: false,
                last_used: now,
                checked_out_at: now,
                generation: 0,
            })
            .collect();
        Self {
            inner: Mutex::new(PoolInner { slots }),
            counters,
            next_generation: AtomicU64::new(1),
            retries,
            backoff,
            stale_after,
        }
    }

    /// Borrow a buffer of at least `min_size` bytes. Retries with backoff
    /// when the pool is fully checked out, reclaiming stale checkouts along
    /// the way, and fails with [`DetectError::ResourceExhausted`] once the
    /// retry budget runs out.
    pub fn acquire(&self, min_size: usize) -> Result<PooledBuffer> {
        let mut attempt = 0;
        loop {
            if let Some(buf) = self.try_acquire(min_size) {
                return Ok(buf);
            }
            attempt += 1;
            if attempt > self.retries {
                return Err(DetectError::ResourceExhausted(format!(
                    "buffer pool full after {} attempts ({} bytes requested)",
                    attempt, min_size
                )));
            }
            log::debug!(
                "pool: all buffers in use, retry {}/{} in {:?}",
                attempt,
                self.retries,
                self.backoff
            );
            std::thread::sleep(self.backoff);
        }
    }

    fn try_acquire(&self, min_size: usize) -> Option<PooledBuffer> {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let now = Instant::now();

        // First pass: a parked buffer that already fits.
        if let Some(idx) = inner
            .slots
            .iter()
            .position(|s| !s.in_use && s.bytes.as_ref().is_some_and(|b| b.len() >= min_size))
        {
            return Some(self.check_out(&mut inner.slots[idx], idx, min_size, now));
        }

        // Second pass: a never-allocated slot, else the least-recently used
        // free slot; either way the buffer is (re)grown to fit.
        let mut chosen: Option<usize> = None;
        for (idx, slot) in inner.slots.iter().enumerate() {
            if slot.in_use {
                continue;
            }
            if slot.bytes.is_none() {
                chosen = Some(idx);
                break;
            }
            match chosen {
                Some(c) if inner.slots[c].last_used <= slot.last_used => {}
                _ => chosen = Some(idx),
            }
        }
        if let Some(idx) = chosen {
            return Some(self.check_out(&mut inner.slots[idx], idx, min_size, now));
        }

        // Fully checked out: reclaim anything held past the staleness
        // window, then rescan once.
        let mut reclaimed = 0;
        for slot in inner.slots.iter_mut() {
            if slot.in_use && now.duration_since(slot.checked_out_at) > self.stale_after {
                slot.in_use = false;
                slot.generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            log::warn!("pool: reclaimed {} stale buffer(s)", reclaimed);
            if let Some(idx) = inner.slots.iter().position(|s| !s.in_use) {
                return Some(self.check_out(&mut inner.slots[idx], idx, min_size, now));
            }
        }
        None
    }

    fn check_out(
        &self,
        slot: &mut Slot,
        idx: usize,
        min_size: usize,
        now: Instant,
    ) -> PooledBuffer {
        let mut bytes = slot.bytes.take().unwrap_or_default();
        if bytes.len() < min_size {
            bytes.resize(min_size, 0);
        }
        let cap = bytes.capacity();
        if cap != slot.recorded {
            self.counters.record_free(slot.recorded);
            self.counters.record_alloc(cap);
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        slot.generation = generation;
        slot.in_use = true;
        slot.checked_out_at = now;
        slot.last_used = now;
        let recorded = cap;
        slot.recorded = 0;
        PooledBuffer {
            bytes: Some(bytes),
            recorded,
            slot: idx,
            generation,
            counters: Arc::clone(&self.counters),
        }
    }

    /// Return a buffer to its slot. If the slot was reclaimed while the
    /// buffer was out, the bytes are dropped instead of re-parked.
    pub fn release(&self, mut buf: PooledBuffer) {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let Some(bytes) = buf.bytes.take() else {
            return;
        };
        let slot = &mut inner.slots[buf.slot];
        if slot.in_use && slot.generation == buf.generation {
            let cap = bytes.capacity();
            if cap != buf.recorded {
                self.counters.record_free(buf.recorded);
                self.counters.record_alloc(cap);
            }
            slot.recorded = cap;
            slot.bytes = Some(bytes);
            slot.in_use = false;
            slot.last_used = Instant::now();
        } else {
            log::debug!("pool: late release on reclaimed slot {}, dropping", buf.slot);
            drop(bytes);
            self.counters.record_free(buf.recorded);
        }
    }

    /// Drop every parked buffer. Checked-out buffers stay with their
    /// holders and free through [`PooledBuffer`]'s drop.
    pub fn clear(&self) {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        for slot in inner.slots.iter_mut() {
            if slot.bytes.take().is_some() {
                self.counters.record_free(slot.recorded);
                slot.recorded = 0;
            }
        }
    }

    pub fn in_use_count(&self) -> usize {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        inner.slots.iter().filter(|s| s.in_use).count()
    }
}
