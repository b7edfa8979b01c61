//! Process-wide cache of cleaned datasets, one slot per source identity.
//!
//! The outer map lock is held only long enough to find or create a slot.
//! Loading happens under the slot's own lock, so concurrent first loads of
//! the same sources run once and everyone else waits for that result, while
//! loads of different sources proceed independently.

use crate::cleaner::Dataset;
use crate::error::Result;
use crate::loader::SourceKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, info};

type Slot = Arc<Mutex<Option<Arc<Dataset>>>>;

#[derive(Debug, Default)]
pub struct SourceCache {
    slots: Mutex<HashMap<SourceKey, Slot>>,
}

// A poisoned lock only means another loader panicked; the data is still
// a valid Option, so recover it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static SourceCache {
        static GLOBAL: OnceLock<SourceCache> = OnceLock::new();
        GLOBAL.get_or_init(SourceCache::new)
    }

    fn slot(&self, key: &SourceKey) -> Slot {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Return the cached dataset for `key`, running `load` only if none is
    /// cached yet. A failed load leaves the slot empty for the next caller.
    pub fn get_or_load<F>(&self, key: &SourceKey, load: F) -> Result<Arc<Dataset>>
    where
        F: FnOnce() -> Result<Dataset>,
    {
        let slot = self.slot(key);
        let mut guard = lock(&slot);

        if let Some(ds) = guard.as_ref() {
            debug!("cache hit for {:?}", key);
            return Ok(Arc::clone(ds));
        }

        info!("cache miss for {:?}; loading", key);
        let ds = Arc::new(load()?);
        *guard = Some(Arc::clone(&ds));
        Ok(ds)
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        let slot = lock(&self.slots).get(key).cloned();
        slot.is_some_and(|s| lock(&s).is_some())
    }

    /// Drop the cached dataset for one source identity.
    pub fn invalidate(&self, key: &SourceKey) -> bool {
        let removed = lock(&self.slots).remove(key);
        let had_data = removed.is_some_and(|s| lock(&s).is_some());
        if had_data {
            info!("cache invalidated for {:?}", key);
        }
        had_data
    }

    pub fn clear(&self) {
        lock(&self.slots).clear();
        info!("cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(name: &str) -> SourceKey {
        SourceKey::new(Path::new(name), Path::new("store.csv"))
    }

    #[test]
    fn test_second_load_hits_cache() {
        let cache = SourceCache::new();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Dataset::default())
        };

        let a = cache.get_or_load(&key("a.csv"), load).unwrap();
        let b = cache.get_or_load(&key("a.csv"), load).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains(&key("a.csv")));
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let cache = SourceCache::new();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Dataset::default())
        };

        cache.get_or_load(&key("a.csv"), load).unwrap();
        assert!(cache.invalidate(&key("a.csv")));
        assert!(!cache.contains(&key("a.csv")));
        cache.get_or_load(&key("a.csv"), load).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = SourceCache::new();
        let err = cache
            .get_or_load(&key("a.csv"), || Err(PipelineError::EmptyDataset))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset));
        assert!(!cache.contains(&key("a.csv")));
        assert!(cache.get_or_load(&key("a.csv"), || Ok(Dataset::default())).is_ok());
    }

    #[test]
    fn test_concurrent_first_loads_run_once() {
        let cache = Arc::new(SourceCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cache
                        .get_or_load(&key("shared.csv"), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(Dataset::default())
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_distinct_sources_get_distinct_slots() {
        let cache = SourceCache::new();
        let a = cache.get_or_load(&key("a.csv"), || Ok(Dataset::default())).unwrap();
        let b = cache.get_or_load(&key("b.csv"), || Ok(Dataset::default())).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        cache.clear();
        assert!(!cache.contains(&key("a.csv")));
    }
}
