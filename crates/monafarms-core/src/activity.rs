//! Player stats and the confirmed-activity log.
//!
//! [`ActivityTracker`] counts confirmed actions and keeps a bounded log of
//! the most recent ones. Only receipts returned by the backend are ever
//! recorded; nothing here is synthesized. Persistence goes through an
//! injected [`StatsStore`] so tests and alternative frontends can swap the
//! storage without touching the tracker.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use monafarms_types::{ActionKind, ActionReceipt, CropId, PlayerAddress, TileIndex, TxHash};

/// Errors from a stats store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("stats store I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The stored stats could not be encoded or decoded.
    #[error("stats store JSON error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// One confirmed action in the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Tile acted on.
    pub tile: TileIndex,
    /// Kind of action.
    pub action: ActionKind,
    /// Crop involved, if known.
    pub crop: Option<CropId>,
    /// Transaction that confirmed the action.
    pub tx_hash: TxHash,
    /// Confirmation time, unix seconds.
    pub confirmed_at: u64,
}

/// Persistent per-player counters and recent activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    /// Crops planted.
    pub planted: u64,
    /// Waterings.
    pub watered: u64,
    /// Fertilizer applications.
    pub fertilized: u64,
    /// Crops harvested.
    pub harvested: u64,
    /// Harvests per crop.
    pub harvested_by_crop: BTreeMap<CropId, u64>,
    /// Most recent confirmed actions, oldest first.
    pub recent: VecDeque<ActivityEntry>,
}

impl PlayerStats {
    /// Total confirmed actions.
    pub const fn total_actions(&self) -> u64 {
        self.planted
            .saturating_add(self.watered)
            .saturating_add(self.fertilized)
            .saturating_add(self.harvested)
    }

    fn count(&mut self, action: ActionKind, crop: Option<CropId>) {
        let counter = match action {
            ActionKind::Plant => &mut self.planted,
            ActionKind::Water => &mut self.watered,
            ActionKind::Fertilize => &mut self.fertilized,
            ActionKind::Harvest => &mut self.harvested,
        };
        *counter = counter.saturating_add(1);

        if let (ActionKind::Harvest, Some(crop)) = (action, crop) {
            let per_crop = self.harvested_by_crop.entry(crop).or_insert(0);
            *per_crop = per_crop.saturating_add(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Storage for [`PlayerStats`], keyed by player.
pub trait StatsStore: Send + Sync {
    /// Load a player's stats. `Ok(None)` when nothing has been saved.
    fn load(&self, player: &PlayerAddress) -> Result<Option<PlayerStats>, StoreError>;

    /// Save a player's stats, replacing any previous value.
    fn save(&self, player: &PlayerAddress, stats: &PlayerStats) -> Result<(), StoreError>;
}

type StatsFile = BTreeMap<PlayerAddress, PlayerStats>;

/// Stats kept in a single JSON file holding every player.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<StatsFile, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StatsFile::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl StatsStore for JsonFileStore {
    fn load(&self, player: &PlayerAddress) -> Result<Option<PlayerStats>, StoreError> {
        Ok(self.read_all()?.remove(player))
    }

    fn save(&self, player: &PlayerAddress, stats: &PlayerStats) -> Result<(), StoreError> {
        let mut all = self.read_all()?;
        all.insert(player.clone(), stats.clone());
        let json = serde_json::to_string_pretty(&all)?;

        // Write beside the target, then rename over it.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Stats kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    players: Mutex<StatsFile>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsStore for MemoryStore {
    fn load(&self, player: &PlayerAddress) -> Result<Option<PlayerStats>, StoreError> {
        Ok(self
            .players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(player)
            .cloned())
    }

    fn save(&self, player: &PlayerAddress, stats: &PlayerStats) -> Result<(), StoreError> {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player.clone(), stats.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Records confirmed actions for one player.
pub struct ActivityTracker {
    player: PlayerAddress,
    store: Box<dyn StatsStore>,
    capacity: usize,
    stats: Mutex<PlayerStats>,
    dirty: AtomicBool,
}

impl core::fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("player", &self.player)
            .field("capacity", &self.capacity)
            .field("dirty", &self.dirty.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ActivityTracker {
    /// Load `player`'s stats from `store` and start tracking.
    ///
    /// At most `capacity` recent entries are kept.
    pub fn open(
        player: PlayerAddress,
        store: Box<dyn StatsStore>,
        capacity: usize,
    ) -> Result<Self, StoreError> {
        let mut stats = store.load(&player)?.unwrap_or_default();
        trim(&mut stats.recent, capacity);
        debug!(
            player = %player,
            actions = stats.total_actions(),
            "Loaded player stats"
        );
        Ok(Self {
            player,
            store,
            capacity,
            stats: Mutex::new(stats),
            dirty: AtomicBool::new(false),
        })
    }

    /// Record a confirmed action.
    pub fn record(&self, receipt: &ActionReceipt, crop: Option<CropId>) {
        let action = receipt.action.kind();
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.count(action, crop);
        stats.recent.push_back(ActivityEntry {
            tile: receipt.tile,
            action,
            crop,
            tx_hash: receipt.tx_hash.clone(),
            confirmed_at: receipt.confirmed_at,
        });
        trim(&mut stats.recent, self.capacity);
        self.dirty.store(true, Ordering::Release);
    }

    /// Copy of the current stats.
    pub fn stats(&self) -> PlayerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Save if anything changed since the last save. Returns whether a
    /// save happened.
    pub fn flush(&self) -> Result<bool, StoreError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        let snapshot = self.stats();
        if let Err(e) = self.store.save(&self.player, &snapshot) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        info!(player = %self.player, actions = snapshot.total_actions(), "Saved player stats");
        Ok(true)
    }
}

fn trim(log: &mut VecDeque<ActivityEntry>, capacity: usize) {
    while log.len() > capacity {
        log.pop_front();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use monafarms_types::FarmAction;

    use super::*;

    fn player() -> PlayerAddress {
        PlayerAddress::parse("0x00000000000000000000000000000000000000bb").unwrap()
    }

    fn receipt(tile: u32, action: FarmAction, at: u64) -> ActionReceipt {
        ActionReceipt {
            tile: TileIndex(tile),
            action,
            tx_hash: TxHash(format!("0x{at:x}")),
            confirmed_at: at,
        }
    }

    /// Lets a test keep a handle on the store the tracker owns.
    struct Shared(Arc<MemoryStore>);

    impl StatsStore for Shared {
        fn load(&self, player: &PlayerAddress) -> Result<Option<PlayerStats>, StoreError> {
            self.0.load(player)
        }

        fn save(&self, player: &PlayerAddress, stats: &PlayerStats) -> Result<(), StoreError> {
            self.0.save(player, stats)
        }
    }

    #[test]
    fn new_player_starts_empty() {
        let tracker = ActivityTracker::open(player(), Box::new(MemoryStore::new()), 10).unwrap();
        assert_eq!(tracker.stats(), PlayerStats::default());
        assert!(!tracker.flush().unwrap());
    }

    #[test]
    fn records_and_counts() {
        let tracker = ActivityTracker::open(player(), Box::new(MemoryStore::new()), 10).unwrap();
        tracker.record(&receipt(0, FarmAction::Plant { crop: CropId(1) }, 10), Some(CropId(1)));
        tracker.record(&receipt(0, FarmAction::Water, 20), Some(CropId(1)));
        tracker.record(&receipt(0, FarmAction::Harvest, 30), Some(CropId(1)));

        let stats = tracker.stats();
        assert_eq!(stats.planted, 1);
        assert_eq!(stats.watered, 1);
        assert_eq!(stats.harvested, 1);
        assert_eq!(stats.harvested_by_crop.get(&CropId(1)), Some(&1));
        assert_eq!(stats.total_actions(), 3);
        assert_eq!(stats.recent.len(), 3);
        assert_eq!(stats.recent.back().unwrap().confirmed_at, 30);
    }

    #[test]
    fn log_is_bounded() {
        let tracker = ActivityTracker::open(player(), Box::new(MemoryStore::new()), 2).unwrap();
        for at in 1..=5 {
            tracker.record(&receipt(1, FarmAction::Water, at), None);
        }
        let stats = tracker.stats();
        assert_eq!(stats.watered, 5);
        let kept: Vec<u64> = stats.recent.iter().map(|e| e.confirmed_at).collect();
        assert_eq!(kept, vec![4, 5]);
    }

    #[test]
    fn flush_round_trips_through_store() {
        let store = Arc::new(MemoryStore::new());
        let tracker =
            ActivityTracker::open(player(), Box::new(Shared(Arc::clone(&store))), 10).unwrap();
        tracker.record(&receipt(2, FarmAction::Fertilize, 99), Some(CropId(3)));
        assert!(tracker.flush().unwrap());
        assert!(!tracker.flush().unwrap());

        let reopened = ActivityTracker::open(player(), Box::new(Shared(store)), 10).unwrap();
        assert_eq!(reopened.stats().fertilized, 1);
        assert_eq!(reopened.stats(), tracker.stats());
    }

    #[test]
    fn json_file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("monafarms-stats-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stats.json");
        let store = JsonFileStore::new(&path);

        assert_eq!(store.load(&player()).unwrap(), None);

        let mut stats = PlayerStats::default();
        stats.count(ActionKind::Harvest, Some(CropId(9)));
        store.save(&player(), &stats).unwrap();

        let other = PlayerAddress::parse("0x00000000000000000000000000000000000000cc").unwrap();
        store.save(&other, &PlayerStats::default()).unwrap();

        assert_eq!(store.load(&player()).unwrap(), Some(stats));
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("monafarms-stats-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stats.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(&player()), Err(StoreError::Json { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
