//! Shared model cache.
//!
//! Loaded models are expensive; the cache keeps a small path-keyed table of
//! handles that streams share. Two classes of model bypass the table: large
//! models (over the configured size threshold) are per-stream and count
//! against a hard process-wide budget, and motion "models" carry mutable
//! per-stream state so sharing them would bleed background frames across
//! cameras.
//!
//! During shutdown, backend teardown is skipped wholesale: a native
//! inference library hung in `unload` must not block process exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::backend::BackendSet;
use crate::error::{DetectError, Result};
use crate::model::{BackendKind, ModelHandle};

struct CacheEntry {
    path: String,
    handle: Arc<ModelHandle>,
    last_used: Instant,
}

/// A handle is in service when something outside the table (a stream
/// worker mid-cycle) still holds it. Table lookups clone under the table
/// lock, so the count cannot race upward from the table side while an
/// eviction pass runs.
fn in_service(table: &[CacheEntry], handle: &Arc<ModelHandle>) -> bool {
    let in_table = table
        .iter()
        .filter(|e| Arc::ptr_eq(&e.handle, handle))
        .count();
    Arc::strong_count(handle) > in_table
}

pub struct ModelCache {
    backends: Arc<BackendSet>,
    table: Mutex<Vec<CacheEntry>>,
    max_entries: usize,
    large_threshold: u64,
    large_cap: usize,
    large_in_use: Mutex<usize>,
    shutting_down: AtomicBool,
}

impl ModelCache {
    pub fn new(
        backends: Arc<BackendSet>,
        max_entries: usize,
        large_threshold: u64,
        large_cap: usize,
    ) -> Self {
        Self {
            backends,
            table: Mutex::new(Vec::new()),
            max_entries: max_entries.max(1),
            large_threshold,
            large_cap,
            large_in_use: Mutex::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Load (or fetch from cache) the model named by `path`. `threshold` is
    /// the load-time default stored on the handle; per-cycle thresholds are
    /// passed at dispatch.
    pub fn load(&self, path: &str, threshold: f32) -> Result<Arc<ModelHandle>> {
        let kind = BackendKind::classify(path)?;

        // Motion state is per-stream by construction.
        if kind == BackendKind::Motion {
            return self.load_uncached(kind, path, threshold, 0, false);
        }

        if let Some(handle) = self.lookup(path) {
            return Ok(handle);
        }

        let file_size = if kind.is_file_backed() {
            std::fs::metadata(path)
                .map_err(|e| {
                    DetectError::ModelLoadFailed(format!("model file {}: {}", path, e))
                })?
                .len()
        } else {
            0
        };
        let is_large = kind.is_file_backed() && file_size > self.large_threshold;

        if is_large {
            self.reserve_large_slot(path)?;
            match self.load_uncached(kind, path, threshold, file_size, true) {
                Ok(handle) => Ok(handle),
                Err(e) => {
                    self.release_large_slot();
                    Err(e)
                }
            }
        } else {
            self.load_cached(kind, path, threshold, file_size)
        }
    }

    fn lookup(&self, path: &str) -> Option<Arc<ModelHandle>> {
        let mut table = self.lock_table();
        let entry = table.iter_mut().find(|e| e.path == path)?;
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.handle))
    }

    fn load_uncached(
        &self,
        kind: BackendKind,
        path: &str,
        threshold: f32,
        file_size: u64,
        is_large: bool,
    ) -> Result<Arc<ModelHandle>> {
        let runtime = self.backends.get(kind)?;
        let state = runtime.load(path, threshold)?;
        Ok(Arc::new(ModelHandle {
            kind,
            path: path.to_string(),
            threshold,
            file_size,
            is_large,
            state,
        }))
    }

    fn load_cached(
        &self,
        kind: BackendKind,
        path: &str,
        threshold: f32,
        file_size: u64,
    ) -> Result<Arc<ModelHandle>> {
        let handle = self.load_uncached(kind, path, threshold, file_size, false)?;
        let mut table = self.lock_table();
        // Another worker may have raced the load; keep the first one in.
        if let Some(entry) = table.iter_mut().find(|e| e.path == path) {
            entry.last_used = Instant::now();
            let existing = Arc::clone(&entry.handle);
            drop(table);
            self.unload_handle(&handle);
            return Ok(existing);
        }
        if table.len() >= self.max_entries {
            self.evict_lru(&mut table);
        }
        log::info!("cache: loaded {} model {}", kind.label(), path);
        table.push(CacheEntry {
            path: path.to_string(),
            handle: Arc::clone(&handle),
            last_used: Instant::now(),
        });
        Ok(handle)
    }

    /// Evict the least-recently used entry that no worker still holds. The
    /// table cap is soft while every entry is in service; an over-full table
    /// shrinks back on the next eviction once holders let go. Must be called
    /// with the table lock held so the identity checks stay consistent.
    fn evict_lru(&self, table: &mut Vec<CacheEntry>) {
        let Some(idx) = table
            .iter()
            .enumerate()
            .filter(|(_, e)| !in_service(table, &e.handle))
            .min_by_key(|(_, e)| e.last_used)
            .map(|(i, _)| i)
        else {
            log::warn!("cache: table full but every entry is in service");
            return;
        };
        let entry = table.remove(idx);
        let shared_elsewhere = table
            .iter()
            .any(|e| Arc::ptr_eq(&e.handle, &entry.handle));
        log::info!("cache: evicting {}", entry.path);
        if !shared_elsewhere {
            self.unload_handle(&entry.handle);
        }
    }

    /// Done with a handle obtained from [`load`]. Cached handles stay warm
    /// for other streams; large and motion handles are torn down here.
    ///
    /// [`load`]: ModelCache::load
    pub fn release(&self, handle: &Arc<ModelHandle>) {
        if handle.is_large {
            self.release_large_slot();
            self.unload_handle(handle);
        } else if handle.kind == BackendKind::Motion {
            self.unload_handle(handle);
        }
    }

    /// Drop cached entries idle for longer than `max_age`. Entries a worker
    /// still holds are left in place; their idle clock only matters once the
    /// last holder is gone.
    pub fn evict_idle(&self, max_age: Duration) {
        let now = Instant::now();
        let mut table = self.lock_table();
        let mut idx = 0;
        while idx < table.len() {
            let idle = now.duration_since(table[idx].last_used) > max_age;
            if !idle || in_service(&table, &table[idx].handle) {
                idx += 1;
                continue;
            }
            let entry = table.remove(idx);
            let shared = table.iter().any(|e| Arc::ptr_eq(&e.handle, &entry.handle));
            if !shared {
                log::info!("cache: evicting idle {}", entry.path);
                self.unload_handle(&entry.handle);
            }
        }
    }

    pub fn force_evict_all(&self) {
        let mut table = self.lock_table();
        for entry in table.drain(..) {
            self.unload_handle(&entry.handle);
        }
    }

    /// Enter shutdown mode: all subsequent teardown clears bookkeeping but
    /// never calls into backend unload.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn cached_count(&self) -> usize {
        self.lock_table().len()
    }

    pub fn large_in_use(&self) -> usize {
        match self.large_in_use.lock() {
            Ok(g) => *g,
            Err(p) => *p.into_inner(),
        }
    }

    fn reserve_large_slot(&self, path: &str) -> Result<()> {
        let mut in_use = match self.large_in_use.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if *in_use >= self.large_cap {
            return Err(DetectError::ResourceExhausted(format!(
                "large-model budget exhausted ({} in use), refusing {}",
                *in_use, path
            )));
        }
        *in_use += 1;
        Ok(())
    }

    fn release_large_slot(&self) {
        let mut in_use = match self.large_in_use.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        *in_use = in_use.saturating_sub(1);
    }

    fn unload_handle(&self, handle: &Arc<ModelHandle>) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(runtime) = self.backends.get(handle.kind) {
            runtime.unload(&handle.state);
        }
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, Vec<CacheEntry>> {
        match self.table.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StubBackend;
    use std::io::Write;

    fn backends() -> (Arc<BackendSet>, Arc<StubBackend>) {
        let stub = Arc::new(StubBackend::new(BackendKind::Cnn));
        let mut set = BackendSet::new();
        set.register(stub.clone() as Arc<dyn crate::backend::BackendRuntime>);
        set.register(Arc::new(StubBackend::new(BackendKind::Motion)));
        set.register(Arc::new(StubBackend::new(BackendKind::RemoteApi)));
        (Arc::new(set), stub)
    }

    fn model_file(dir: &tempfile::TempDir, name: &str, bytes: usize) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0u8; bytes]).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn same_path_shares_one_handle() {
        let dir = tempfile::tempdir().unwrap();
        let (set, stub) = backends();
        let cache = ModelCache::new(set, 8, 1024, 4);
        let path = model_file(&dir, "a.sod", 100);
        let h1 = cache.load(&path, 0.3).unwrap();
        let h2 = cache.load(&path, 0.3).unwrap();
        assert!(Arc::ptr_eq(&h1, &h2));
        assert_eq!(stub.loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached_count(), 1);
    }

    #[test]
    fn lru_eviction_unloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let (set, stub) = backends();
        let cache = ModelCache::new(set, 2, 1024, 4);
        let a = model_file(&dir, "a.sod", 10);
        let b = model_file(&dir, "b.sod", 10);
        let c = model_file(&dir, "c.sod", 10);
        drop(cache.load(&a, 0.3).unwrap());
        std::thread::sleep(Duration::from_millis(5));
        drop(cache.load(&b, 0.3).unwrap());
        std::thread::sleep(Duration::from_millis(5));
        drop(cache.load(&c, 0.3).unwrap());
        assert_eq!(cache.cached_count(), 2);
        // "a" was least recently used and got unloaded.
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_table_never_evicts_held_handles() {
        let dir = tempfile::tempdir().unwrap();
        let (set, stub) = backends();
        let cache = ModelCache::new(set, 1, 1024, 4);
        let a = model_file(&dir, "a.sod", 10);
        let b = model_file(&dir, "b.sod", 10);
        let _ha = cache.load(&a, 0.3).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        // "a" is still held, so the table grows past its cap instead of
        // tearing the handle down underneath its holder.
        let _hb = cache.load(&b, 0.3).unwrap();
        assert_eq!(cache.cached_count(), 2);
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn large_models_bypass_table_and_hit_cap() {
        let dir = tempfile::tempdir().unwrap();
        let (set, _stub) = backends();
        let cache = ModelCache::new(set, 8, 50, 2);
        let big1 = model_file(&dir, "big1.sod", 200);
        let big2 = model_file(&dir, "big2.sod", 200);
        let big3 = model_file(&dir, "big3.sod", 200);
        let h1 = cache.load(&big1, 0.3).unwrap();
        let h2 = cache.load(&big2, 0.3).unwrap();
        assert!(h1.is_large && h2.is_large);
        assert_eq!(cache.cached_count(), 0);
        assert!(matches!(
            cache.load(&big3, 0.3),
            Err(DetectError::ResourceExhausted(_))
        ));
        cache.release(&h1);
        assert!(cache.load(&big3, 0.3).is_ok());
    }

    #[test]
    fn motion_handles_are_never_shared() {
        let (set, _) = backends();
        let cache = ModelCache::new(set, 8, 1024, 4);
        let h1 = cache.load("motion", 0.0).unwrap();
        let h2 = cache.load("motion", 0.0).unwrap();
        assert!(!Arc::ptr_eq(&h1, &h2));
        assert_eq!(cache.cached_count(), 0);
    }

    #[test]
    fn missing_file_is_load_error() {
        let (set, _) = backends();
        let cache = ModelCache::new(set, 8, 1024, 4);
        assert!(matches!(
            cache.load("/nonexistent/m.sod", 0.3),
            Err(DetectError::ModelLoadFailed(_))
        ));
    }

    #[test]
    fn shutdown_skips_backend_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let (set, stub) = backends();
        let cache = ModelCache::new(set, 8, 1024, 4);
        let path = model_file(&dir, "a.sod", 10);
        let _h = cache.load(&path, 0.3).unwrap();
        cache.begin_shutdown();
        cache.force_evict_all();
        assert_eq!(cache.cached_count(), 0);
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn idle_eviction_respects_age() {
        let dir = tempfile::tempdir().unwrap();
        let (set, stub) = backends();
        let cache = ModelCache::new(set, 8, 1024, 4);
        let path = model_file(&dir, "a.sod", 10);
        drop(cache.load(&path, 0.3).unwrap());
        cache.evict_idle(Duration::from_secs(60));
        assert_eq!(cache.cached_count(), 1);
        std::thread::sleep(Duration::from_millis(20));
        cache.evict_idle(Duration::from_millis(5));
        assert_eq!(cache.cached_count(), 0);
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn idle_eviction_spares_held_handles() {
        let dir = tempfile::tempdir().unwrap();
        let (set, stub) = backends();
        let cache = ModelCache::new(set, 8, 1024, 4);
        let path = model_file(&dir, "a.sod", 10);
        let held = cache.load(&path, 0.3).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        // Idle by the clock, but a worker still owns the handle.
        cache.evict_idle(Duration::from_millis(5));
        assert_eq!(cache.cached_count(), 1);
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 0);
        drop(held);
        cache.evict_idle(Duration::from_millis(5));
        assert_eq!(cache.cached_count(), 0);
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 1);
    }
}
