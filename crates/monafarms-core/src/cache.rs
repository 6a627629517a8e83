//! Client-side cache of authoritative tile records.
//!
//! [`TileStateCache`] is a plain map from [`TileIndex`] to the last record
//! read from the backend. It never fabricates data: a tile that was never
//! loaded reads as `None`, which is different from a loaded empty tile.
//!
//! Every refresh read is tagged with a [`RefreshStamp`] issued *before* the
//! read starts. Applying a result whose stamp is older than the one the
//! tile already carries is a no-op, so a slow read can never overwrite the
//! result of a read that was issued after it.
//!
//! [`SharedTileCache`] wraps the cache for use across tasks and broadcasts
//! a [`CacheEvent`] on every change.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};

use monafarms_types::{TileIndex, TileRecord};

/// Capacity of the cache event broadcast channel.
///
/// Subscribers that fall behind by more than this many events receive
/// [`broadcast::error::RecvError::Lagged`] and should re-read the cache.
const EVENT_CAPACITY: usize = 256;

/// Ordering tag for refresh reads. Later-issued stamps compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RefreshStamp(u64);

impl RefreshStamp {
    /// The raw sequence number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for RefreshStamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cached record together with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTile {
    /// Last record read from the backend.
    pub record: TileRecord,
    /// Stamp of the read that produced `record`.
    pub stamp: RefreshStamp,
    /// Set by [`TileStateCache::invalidate`], cleared by the next applied read.
    pub stale: bool,
}

/// Result of applying a read to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The tile was not cached before.
    Inserted,
    /// The cached record was replaced with different contents.
    Updated,
    /// The read matched the cached record; only the stamp moved.
    Unchanged,
    /// A newer read already landed; this one was discarded.
    Superseded,
}

impl ApplyOutcome {
    /// Whether the read was accepted.
    pub const fn is_applied(self) -> bool {
        !matches!(self, Self::Superseded)
    }
}

/// Map of tile index to last known authoritative record.
#[derive(Debug, Default)]
pub struct TileStateCache {
    entries: BTreeMap<TileIndex, CachedTile>,
    next_stamp: u64,
    /// Tile count from the newest applied whole-farm read, with its stamp.
    farm_size: Option<(RefreshStamp, u32)>,
}

impl TileStateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known record for `index`, or `None` if it was never loaded.
    pub fn get(&self, index: TileIndex) -> Option<&TileRecord> {
        self.entries.get(&index).map(|e| &e.record)
    }

    /// Cached entry for `index` including stamp and staleness.
    pub fn entry(&self, index: TileIndex) -> Option<&CachedTile> {
        self.entries.get(&index)
    }

    /// Store `record` for `index` unconditionally under a fresh stamp.
    pub fn set(&mut self, index: TileIndex, record: TileRecord) {
        let stamp = self.issue_stamp();
        self.entries.insert(
            index,
            CachedTile {
                record: TileRecord { index, ..record },
                stamp,
                stale: false,
            },
        );
    }

    /// Mark `index` stale. Known fields are kept until the next read.
    ///
    /// Returns `false` if the tile was never loaded.
    pub fn invalidate(&mut self, index: TileIndex) -> bool {
        self.entries.get_mut(&index).is_some_and(|e| {
            e.stale = true;
            true
        })
    }

    /// Copies of every cached record, ordered by index.
    pub fn snapshot_all(&self) -> Vec<TileRecord> {
        self.entries.values().map(|e| e.record.clone()).collect()
    }

    /// Copies of every cached entry, ordered by index.
    pub fn snapshot_entries(&self) -> Vec<CachedTile> {
        self.entries.values().cloned().collect()
    }

    /// Number of loaded tiles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tile has been loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tiles the player owns, as of the newest whole-farm read.
    ///
    /// `None` until a whole-farm read has been applied. Loaded tiles are
    /// not a substitute: single-tile reads can fill the cache partially.
    pub const fn tiles_owned(&self) -> Option<u32> {
        match self.farm_size {
            Some((_, count)) => Some(count),
            None => None,
        }
    }

    /// Issue the stamp for a read that is about to start.
    pub fn issue_stamp(&mut self) -> RefreshStamp {
        self.next_stamp = self.next_stamp.saturating_add(1);
        RefreshStamp(self.next_stamp)
    }

    /// Apply one read result tagged with `stamp`.
    pub fn apply(&mut self, record: TileRecord, stamp: RefreshStamp) -> ApplyOutcome {
        match self.entries.get_mut(&record.index) {
            None => {
                self.entries.insert(
                    record.index,
                    CachedTile {
                        record,
                        stamp,
                        stale: false,
                    },
                );
                ApplyOutcome::Inserted
            }
            Some(existing) if existing.stamp > stamp => ApplyOutcome::Superseded,
            Some(existing) => {
                let changed = existing.record != record;
                existing.record = record;
                existing.stamp = stamp;
                existing.stale = false;
                if changed {
                    ApplyOutcome::Updated
                } else {
                    ApplyOutcome::Unchanged
                }
            }
        }
    }

    /// Apply a partial or full batch read. Tiles absent from `records` are
    /// left untouched.
    ///
    /// Returns the outcome for each record, in input order.
    pub fn apply_batch(
        &mut self,
        records: impl IntoIterator<Item = TileRecord>,
        stamp: RefreshStamp,
    ) -> Vec<(TileIndex, ApplyOutcome)> {
        records
            .into_iter()
            .map(|record| {
                let index = record.index;
                (index, self.apply(record, stamp))
            })
            .collect()
    }

    /// Apply a read of the whole farm and record its size.
    pub fn apply_full(
        &mut self,
        records: Vec<TileRecord>,
        stamp: RefreshStamp,
    ) -> Vec<(TileIndex, ApplyOutcome)> {
        if self.farm_size.is_none_or(|(newest, _)| newest <= stamp) {
            let count = u32::try_from(records.len()).unwrap_or(u32::MAX);
            self.farm_size = Some((stamp, count));
        }
        self.apply_batch(records, stamp)
    }
}

// ---------------------------------------------------------------------------
// Shared cache
// ---------------------------------------------------------------------------

/// Change notification published by [`SharedTileCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A read was applied and the record is new or changed.
    TileUpdated {
        /// The tile.
        index: TileIndex,
        /// Stamp of the applied read.
        stamp: RefreshStamp,
    },
    /// The tile was marked stale.
    TileInvalidated {
        /// The tile.
        index: TileIndex,
    },
}

/// Cloneable handle to a [`TileStateCache`] shared between tasks.
#[derive(Debug, Clone)]
pub struct SharedTileCache {
    inner: Arc<RwLock<TileStateCache>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for SharedTileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedTileCache {
    /// Create an empty shared cache.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(TileStateCache::new())),
            events,
        }
    }

    /// Subscribe to cache change events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: CacheEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Last known record for `index`.
    pub async fn get(&self, index: TileIndex) -> Option<TileRecord> {
        self.inner.read().await.get(index).cloned()
    }

    /// Cached entry for `index`.
    pub async fn entry(&self, index: TileIndex) -> Option<CachedTile> {
        self.inner.read().await.entry(index).cloned()
    }

    /// Copies of every cached record.
    pub async fn snapshot_all(&self) -> Vec<TileRecord> {
        self.inner.read().await.snapshot_all()
    }

    /// Copies of every cached entry.
    pub async fn snapshot_entries(&self) -> Vec<CachedTile> {
        self.inner.read().await.snapshot_entries()
    }

    /// Number of loaded tiles.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether no tile has been loaded.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Issue a stamp for a read that is about to start.
    pub async fn issue_stamp(&self) -> RefreshStamp {
        self.inner.write().await.issue_stamp()
    }

    /// Store `record` unconditionally.
    pub async fn set(&self, index: TileIndex, record: TileRecord) {
        let stamp = {
            let mut cache = self.inner.write().await;
            cache.set(index, record);
            cache.entry(index).map(|e| e.stamp)
        };
        if let Some(stamp) = stamp {
            self.publish(CacheEvent::TileUpdated { index, stamp });
        }
    }

    /// Mark `index` stale.
    pub async fn invalidate(&self, index: TileIndex) -> bool {
        let known = self.inner.write().await.invalidate(index);
        if known {
            self.publish(CacheEvent::TileInvalidated { index });
        }
        known
    }

    /// Apply one stamped read.
    pub async fn apply(&self, record: TileRecord, stamp: RefreshStamp) -> ApplyOutcome {
        let index = record.index;
        let outcome = self.inner.write().await.apply(record, stamp);
        if matches!(outcome, ApplyOutcome::Inserted | ApplyOutcome::Updated) {
            self.publish(CacheEvent::TileUpdated { index, stamp });
        }
        outcome
    }

    /// Apply a stamped batch read.
    pub async fn apply_batch(
        &self,
        records: Vec<TileRecord>,
        stamp: RefreshStamp,
    ) -> Vec<(TileIndex, ApplyOutcome)> {
        let outcomes = self.inner.write().await.apply_batch(records, stamp);
        self.publish_batch(&outcomes, stamp);
        outcomes
    }

    /// Apply a stamped whole-farm read.
    pub async fn apply_full(
        &self,
        records: Vec<TileRecord>,
        stamp: RefreshStamp,
    ) -> Vec<(TileIndex, ApplyOutcome)> {
        let outcomes = self.inner.write().await.apply_full(records, stamp);
        self.publish_batch(&outcomes, stamp);
        outcomes
    }

    /// Number of tiles the player owns, once a whole-farm read has landed.
    pub async fn tiles_owned(&self) -> Option<u32> {
        self.inner.read().await.tiles_owned()
    }

    fn publish_batch(&self, outcomes: &[(TileIndex, ApplyOutcome)], stamp: RefreshStamp) {
        for (index, outcome) in outcomes {
            if matches!(outcome, ApplyOutcome::Inserted | ApplyOutcome::Updated) {
                self.publish(CacheEvent::TileUpdated {
                    index: *index,
                    stamp,
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use monafarms_types::CropId;

    use super::*;

    fn planted(index: u32, water_count: u32) -> TileRecord {
        TileRecord {
            planted_crop: CropId(1),
            planted_at: 1_000,
            maturity_time: 4_600,
            water_count,
            ..TileRecord::empty(TileIndex(index))
        }
    }

    #[test]
    fn unloaded_tile_is_none_not_empty() {
        let mut cache = TileStateCache::new();
        assert!(cache.get(TileIndex(0)).is_none());

        cache.set(TileIndex(0), TileRecord::empty(TileIndex(0)));
        let loaded = cache.get(TileIndex(0)).unwrap();
        assert!(loaded.is_empty());
        assert!(cache.get(TileIndex(1)).is_none());
    }

    #[test]
    fn set_normalizes_index() {
        let mut cache = TileStateCache::new();
        cache.set(TileIndex(3), planted(9, 0));
        assert_eq!(cache.get(TileIndex(3)).unwrap().index, TileIndex(3));
    }

    #[test]
    fn invalidate_keeps_fields() {
        let mut cache = TileStateCache::new();
        assert!(!cache.invalidate(TileIndex(0)));

        cache.set(TileIndex(0), planted(0, 1));
        assert!(cache.invalidate(TileIndex(0)));
        let entry = cache.entry(TileIndex(0)).unwrap();
        assert!(entry.stale);
        assert_eq!(entry.record.water_count, 1);
    }

    #[test]
    fn stale_read_is_discarded() {
        let mut cache = TileStateCache::new();
        let older = cache.issue_stamp();
        let newer = cache.issue_stamp();

        assert_eq!(cache.apply(planted(0, 2), newer), ApplyOutcome::Inserted);
        assert_eq!(cache.apply(planted(0, 1), older), ApplyOutcome::Superseded);
        assert_eq!(cache.get(TileIndex(0)).unwrap().water_count, 2);
    }

    #[test]
    fn newer_read_clears_stale_flag() {
        let mut cache = TileStateCache::new();
        let first = cache.issue_stamp();
        cache.apply(planted(0, 0), first);
        cache.invalidate(TileIndex(0));

        let second = cache.issue_stamp();
        assert_eq!(cache.apply(planted(0, 0), second), ApplyOutcome::Unchanged);
        assert!(!cache.entry(TileIndex(0)).unwrap().stale);
    }

    #[test]
    fn partial_batch_preserves_other_tiles() {
        let mut cache = TileStateCache::new();
        let stamp = cache.issue_stamp();
        cache.apply_batch((0..4).map(|i| planted(i, 0)), stamp);

        let partial = cache.issue_stamp();
        let outcomes = cache.apply_batch(vec![planted(2, 5)], partial);
        assert_eq!(outcomes, vec![(TileIndex(2), ApplyOutcome::Updated)]);

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(TileIndex(2)).unwrap().water_count, 5);
        for i in [0, 1, 3] {
            assert_eq!(cache.get(TileIndex(i)).unwrap().water_count, 0);
            assert_eq!(cache.entry(TileIndex(i)).unwrap().stamp, stamp);
        }
    }

    #[test]
    fn set_outranks_earlier_reads() {
        let mut cache = TileStateCache::new();
        let in_flight = cache.issue_stamp();
        cache.set(TileIndex(0), planted(0, 3));
        assert_eq!(cache.apply(planted(0, 0), in_flight), ApplyOutcome::Superseded);
    }

    #[test]
    fn snapshot_is_ordered_by_index() {
        let mut cache = TileStateCache::new();
        let stamp = cache.issue_stamp();
        cache.apply_batch([planted(5, 0), planted(1, 0), planted(3, 0)], stamp);
        let indices: Vec<u32> = cache.snapshot_all().iter().map(|t| t.index.get()).collect();
        assert_eq!(indices, vec![1, 3, 5]);
    }

    #[test]
    fn farm_size_comes_only_from_whole_farm_reads() {
        let mut cache = TileStateCache::new();
        let stamp = cache.issue_stamp();
        cache.apply(planted(0, 0), stamp);
        cache.apply_batch([planted(1, 0)], stamp);
        assert_eq!(cache.tiles_owned(), None);

        let older = cache.issue_stamp();
        let newer = cache.issue_stamp();
        let full: Vec<TileRecord> = (0..12).map(|i| TileRecord::empty(TileIndex(i))).collect();
        cache.apply_full(full, newer);
        assert_eq!(cache.tiles_owned(), Some(12));

        // A slower whole-farm read issued earlier does not roll the size back.
        cache.apply_full(vec![TileRecord::empty(TileIndex(0))], older);
        assert_eq!(cache.tiles_owned(), Some(12));
    }

    #[tokio::test]
    async fn shared_cache_broadcasts_changes_only() {
        let cache = SharedTileCache::new();
        let mut events = cache.subscribe();

        let stamp = cache.issue_stamp().await;
        cache.apply(planted(0, 0), stamp).await;
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::TileUpdated {
                index: TileIndex(0),
                stamp
            }
        );

        // Identical contents: no event.
        let again = cache.issue_stamp().await;
        assert_eq!(cache.apply(planted(0, 0), again).await, ApplyOutcome::Unchanged);

        cache.invalidate(TileIndex(0)).await;
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::TileInvalidated {
                index: TileIndex(0)
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn shared_cache_clones_see_same_state() {
        let cache = SharedTileCache::new();
        let other = cache.clone();
        cache.set(TileIndex(7), planted(7, 1)).await;
        assert_eq!(other.get(TileIndex(7)).await.unwrap().water_count, 1);
        assert!(other.get(TileIndex(8)).await.is_none());
    }
}
