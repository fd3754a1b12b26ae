//! Per-kind cache state

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable view of one kind's cache contents
pub type Snapshot<E> = Arc<BTreeMap<i64, Arc<E>>>;

/// Read-through counters for one cached kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Reads served from the cache
    pub hits: usize,
    /// Reads that had to go to the store
    pub misses: usize,
    /// Batch fetches issued against the store
    pub fetches: usize,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hits, {} misses, {} fetches", self.hits, self.misses, self.fetches)
    }
}

/// Cached entities of one kind, keyed by id.
///
/// An id is either absent or holds a value that matches the store. "All of
/// this kind" is tracked by a single flag that any change clears.
pub struct EntityCache<E> {
    kind: &'static str,
    entries: HashMap<i64, Arc<E>>,
    all_valid: bool,
    queued: BTreeSet<i64>,
    stats: CacheStats,
    snapshots: watch::Sender<Snapshot<E>>,
}

impl<E> EntityCache<E> {
    pub fn new(kind: &'static str) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(BTreeMap::new()));
        Self {
            kind,
            entries: HashMap::new(),
            all_valid: false,
            queued: BTreeSet::new(),
            stats: CacheStats::default(),
            snapshots,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Counted read: a hit returns the entry, a miss is recorded
    pub fn get(&mut self, id: i64) -> Option<Arc<E>> {
        match self.entries.get(&id) {
            Some(entry) => {
                self.stats.hits += 1;
                Some(entry.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Uncounted read
    pub fn peek(&self, id: i64) -> Option<Arc<E>> {
        self.entries.get(&id).cloned()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn insert(&mut self, id: i64, entry: Arc<E>) {
        self.entries.insert(id, entry);
    }

    /// Drop `id`. The kind is no longer known to be complete.
    pub fn invalidate(&mut self, id: i64) -> bool {
        self.all_valid = false;
        self.entries.remove(&id).is_some()
    }

    /// Drop every entry and queued refresh
    pub fn clear(&mut self) {
        self.all_valid = false;
        self.entries.clear();
        self.queued.clear();
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<E>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_all_valid(&self) -> bool {
        self.all_valid
    }

    pub fn set_all_valid(&mut self) {
        self.all_valid = true;
    }

    pub fn mark_dirty(&mut self) {
        self.all_valid = false;
    }

    /// Defer a refresh of `id` until refreshes resume
    pub fn queue(&mut self, id: i64) {
        self.queued.insert(id);
    }

    pub fn drain_queued(&mut self) -> BTreeSet<i64> {
        std::mem::take(&mut self.queued)
    }

    pub fn record_fetch(&mut self) {
        self.stats.fetches += 1;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Latest-value stream of snapshots. Slow receivers only see the newest.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<E>> {
        self.snapshots.subscribe()
    }

    /// Broadcast the current contents
    pub fn publish(&self) {
        let snapshot: BTreeMap<i64, Arc<E>> =
            self.entries.iter().map(|(id, e)| (*id, e.clone())).collect();
        self.snapshots.send_replace(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_hits_and_misses() {
        let mut cache: EntityCache<String> = EntityCache::new("word");
        assert!(cache.get(1).is_none());
        cache.insert(1, Arc::new("one".to_string()));
        assert_eq!(cache.get(1).as_deref().map(String::as_str), Some("one"));
        assert!(cache.peek(1).is_some());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, fetches: 0 });
    }

    #[test]
    fn test_invalidate_clears_all_valid() {
        let mut cache: EntityCache<String> = EntityCache::new("word");
        cache.insert(1, Arc::new("one".to_string()));
        cache.set_all_valid();
        assert!(cache.invalidate(1));
        assert!(!cache.is_all_valid());
        assert!(!cache.invalidate(1));
    }

    #[test]
    fn test_snapshots_conflate() {
        let mut cache: EntityCache<String> = EntityCache::new("word");
        let mut rx = cache.subscribe();
        cache.insert(1, Arc::new("one".to_string()));
        cache.publish();
        cache.insert(2, Arc::new("two".to_string()));
        cache.publish();
        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.len(), 2);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_queue_drains_once() {
        let mut cache: EntityCache<String> = EntityCache::new("word");
        cache.queue(3);
        cache.queue(1);
        cache.queue(3);
        assert_eq!(cache.drain_queued().into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert!(cache.drain_queued().is_empty());
    }

    #[test]
    fn test_clear_drops_entries_and_queue() {
        let mut cache: EntityCache<String> = EntityCache::new("word");
        cache.insert(1, Arc::new("one".to_string()));
        cache.set_all_valid();
        cache.queue(1);
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_all_valid());
        assert!(cache.drain_queued().is_empty());
    }
}
