//! Bounded least-recently-used cache of loaded tables.
//!
//! Entries are immutable `Arc<DataFrame>`s replaced wholesale, so two requests
//! racing to load the same dataset just both load it and the last insert wins.
//! The lock is never held while a table is being loaded.

use parking_lot::Mutex;
use polars::prelude::DataFrame;
use static_assertions::assert_impl_all;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::types::DatasetId;

/// Default number of tables kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

/// LRU cache keyed by dataset id.
#[derive(Debug)]
pub struct DatasetCache {
    capacity: usize,
    /// Most recently used entry at the back.
    entries: Mutex<VecDeque<(DatasetId, Arc<DataFrame>)>>,
}

assert_impl_all!(DatasetCache: Send, Sync);

impl DatasetCache {
    /// Create a cache holding at most `capacity` tables (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, id: DatasetId) -> bool {
        self.entries.lock().iter().any(|(key, _)| *key == id)
    }

    /// Look up a table and mark it most recently used.
    pub fn get(&self, id: DatasetId) -> Option<Arc<DataFrame>> {
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|(key, _)| *key == id)?;
        let entry = entries.remove(position)?;
        let table = Arc::clone(&entry.1);
        entries.push_back(entry);
        Some(table)
    }

    /// Insert or replace a table, evicting the least recently used on overflow.
    pub fn insert(&self, id: DatasetId, table: Arc<DataFrame>) {
        let mut entries = self.entries.lock();
        entries.retain(|(key, _)| *key != id);
        entries.push_back((id, table));
        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                debug!(dataset_id = %evicted, "Evicted dataset from cache");
            }
        }
    }

    /// Return the cached table or load, insert and return it.
    pub fn get_or_load<F>(&self, id: DatasetId, load: F) -> Result<Arc<DataFrame>>
    where
        F: FnOnce() -> Result<DataFrame>,
    {
        if let Some(table) = self.get(id) {
            debug!(dataset_id = %id, "Dataset cache hit");
            return Ok(table);
        }

        debug!(dataset_id = %id, "Dataset cache miss, loading");
        let table = Arc::new(load()?);
        self.insert(id, Arc::clone(&table));
        Ok(table)
    }

    /// Drop the entry for `id`. Returns whether one was present.
    pub fn invalidate(&self, id: DatasetId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(key, _)| *key != id);
        let removed = entries.len() != before;
        if removed {
            debug!(dataset_id = %id, "Invalidated cached dataset");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatsError;
    use polars::prelude::*;
    use std::cell::Cell;

    fn table(n: i32) -> DataFrame {
        df! { "x" => &[n] }.unwrap()
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = DatasetCache::new(2);
        cache.insert(DatasetId(1), Arc::new(table(1)));
        cache.insert(DatasetId(2), Arc::new(table(2)));

        // Touch 1 so 2 becomes the eviction candidate.
        assert!(cache.get(DatasetId(1)).is_some());
        cache.insert(DatasetId(3), Arc::new(table(3)));

        assert!(cache.contains(DatasetId(1)));
        assert!(!cache.contains(DatasetId(2)));
        assert!(cache.contains(DatasetId(3)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_or_load_loads_once() {
        let cache = DatasetCache::default();
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok(table(7))
        };

        let first = cache.get_or_load(DatasetId(7), load).unwrap();
        let second = cache
            .get_or_load(DatasetId(7), || {
                loads.set(loads.get() + 1);
                Ok(table(7))
            })
            .unwrap();

        assert_eq!(loads.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = DatasetCache::default();
        let result = cache.get_or_load(DatasetId(1), || Err(StatsError::DatasetNotFound(DatasetId(1))));
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = DatasetCache::new(5);
        cache.insert(DatasetId(1), Arc::new(table(1)));
        cache.insert(DatasetId(2), Arc::new(table(2)));

        assert!(cache.invalidate(DatasetId(1)));
        assert!(!cache.invalidate(DatasetId(1)));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_still_holds_one() {
        let cache = DatasetCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(DatasetId(1), Arc::new(table(1)));
        cache.insert(DatasetId(2), Arc::new(table(2)));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(DatasetId(2)));
    }
}
