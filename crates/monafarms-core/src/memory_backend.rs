//! In-process [`FarmBackend`] that plays the role of the farm contracts.
//!
//! [`MemoryBackend`] keeps every player's tiles and inventory in memory and
//! enforces the same rules the contracts do: seeds are consumed on
//! planting, rare and exclusive crops are checked, growth time comes from
//! the crop catalog, fertilizer finishes the crop immediately, and harvest
//! requires readiness and an open harvest window. Locked tiles refuse all
//! mutations.
//!
//! Tests and the demo client drive it with failure injection: an
//! unreachable switch, artificial latency, out-of-band tile mutation, and
//! per-operation call counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use monafarms_farm::{RarityRules, can_plant, catalog};
use monafarms_types::{
    ActionReceipt, CropId, FarmAction, Inventory, PlayerAddress, TileIndex, TileRecord, TxHash,
};

use crate::backend::{BackendError, FarmBackend};
use crate::clock::TimeSource;

/// One player's on-chain state.
#[derive(Debug, Clone, Default)]
struct PlayerFarm {
    tiles: Vec<TileRecord>,
    inventory: Inventory,
}

impl PlayerFarm {
    fn tile_mut(&mut self, index: TileIndex) -> Result<&mut TileRecord, BackendError> {
        usize::try_from(index.get())
            .ok()
            .and_then(|i| self.tiles.get_mut(i))
            .ok_or(BackendError::UnknownTile { index })
    }

    fn tile(&self, index: TileIndex) -> Result<&TileRecord, BackendError> {
        usize::try_from(index.get())
            .ok()
            .and_then(|i| self.tiles.get(i))
            .ok_or(BackendError::UnknownTile { index })
    }

    fn tiles_owned(&self) -> u32 {
        u32::try_from(self.tiles.len()).unwrap_or(u32::MAX)
    }
}

/// Counts of backend calls, by operation.
#[derive(Debug, Default)]
pub struct CallCounters {
    tile_reads: AtomicU64,
    farm_reads: AtomicU64,
    inventory_reads: AtomicU64,
    time_reads: AtomicU64,
    submits: AtomicU64,
}

impl CallCounters {
    /// Single-tile reads attempted.
    pub fn tile_reads(&self) -> u64 {
        self.tile_reads.load(Ordering::Relaxed)
    }

    /// Whole-farm reads attempted.
    pub fn farm_reads(&self) -> u64 {
        self.farm_reads.load(Ordering::Relaxed)
    }

    /// Inventory reads attempted.
    pub fn inventory_reads(&self) -> u64 {
        self.inventory_reads.load(Ordering::Relaxed)
    }

    /// Chain time reads attempted.
    pub fn time_reads(&self) -> u64 {
        self.time_reads.load(Ordering::Relaxed)
    }

    /// Mutating submissions attempted.
    pub fn submits(&self) -> u64 {
        self.submits.load(Ordering::Relaxed)
    }

    /// Every call of any kind.
    pub fn total(&self) -> u64 {
        self.tile_reads()
            .saturating_add(self.farm_reads())
            .saturating_add(self.inventory_reads())
            .saturating_add(self.time_reads())
            .saturating_add(self.submits())
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// In-memory farm contracts.
#[derive(Debug)]
pub struct MemoryBackend<C> {
    clock: C,
    rules: RarityRules,
    farms: Mutex<BTreeMap<PlayerAddress, PlayerFarm>>,
    unreachable: AtomicBool,
    latency_ms: AtomicU64,
    calls: CallCounters,
}

impl<C: TimeSource> MemoryBackend<C> {
    /// Create a backend with no players, reading time from `clock`.
    pub fn new(clock: C, rules: RarityRules) -> Self {
        Self {
            clock,
            rules,
            farms: Mutex::new(BTreeMap::new()),
            unreachable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            calls: CallCounters::default(),
        }
    }

    /// Give `player` a farm of `tile_count` empty tiles and `inventory`.
    /// Replaces any existing farm for that player.
    pub async fn add_player(&self, player: PlayerAddress, tile_count: u32, inventory: Inventory) {
        let tiles = (0..tile_count)
            .map(|i| TileRecord::empty(TileIndex(i)))
            .collect();
        self.farms
            .lock()
            .await
            .insert(player, PlayerFarm { tiles, inventory });
    }

    /// Make every call fail with [`BackendError::Unreachable`] while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Release);
    }

    /// Delay every call by `latency` before it is evaluated.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::Release);
    }

    /// Call counters.
    pub const fn calls(&self) -> &CallCounters {
        &self.calls
    }

    /// Change a tile out of band, as another device or automated tool would.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UnknownTile`] if the player or tile does not
    /// exist.
    pub async fn mutate_tile(
        &self,
        player: &PlayerAddress,
        index: TileIndex,
        mutate: impl FnOnce(&mut TileRecord),
    ) -> Result<(), BackendError> {
        let mut farms = self.farms.lock().await;
        let farm = farms
            .get_mut(player)
            .ok_or(BackendError::UnknownTile { index })?;
        mutate(farm.tile_mut(index)?);
        Ok(())
    }

    /// Set or clear the automation lock on a tile.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UnknownTile`] if the player or tile does not
    /// exist.
    pub async fn set_locked(
        &self,
        player: &PlayerAddress,
        index: TileIndex,
        locked: bool,
    ) -> Result<(), BackendError> {
        self.mutate_tile(player, index, |tile| tile.is_locked = locked)
            .await
    }

    /// Replace a player's inventory.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Rejected`] if the player has no farm.
    pub async fn set_inventory(
        &self,
        player: &PlayerAddress,
        inventory: Inventory,
    ) -> Result<(), BackendError> {
        let mut farms = self.farms.lock().await;
        let farm = farms.get_mut(player).ok_or_else(|| no_farm(player))?;
        farm.inventory = inventory;
        Ok(())
    }

    async fn enter(&self, counter: &AtomicU64) -> Result<(), BackendError> {
        bump(counter);
        let latency = self.latency_ms.load(Ordering::Acquire);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unreachable.load(Ordering::Acquire) {
            return Err(BackendError::Unreachable {
                message: "memory backend is offline".to_owned(),
            });
        }
        Ok(())
    }

    fn apply(
        &self,
        farm: &mut PlayerFarm,
        index: TileIndex,
        action: FarmAction,
        now: u64,
    ) -> Result<(), BackendError> {
        let tile = farm.tile(index)?;
        if tile.is_locked {
            return Err(rejected(format!("tile {index} is locked by an automated tool")));
        }

        match action {
            FarmAction::Plant { crop } => self.plant(farm, index, crop, now),
            FarmAction::Water => {
                let tile = farm.tile(index)?;
                if tile.is_empty() {
                    return Err(rejected(format!("tile {index} has nothing to water")));
                }
                if tile.is_ready(now) {
                    return Err(rejected(format!("tile {index} is already ready to harvest")));
                }
                farm.inventory.water_charges = farm
                    .inventory
                    .water_charges
                    .checked_sub(1)
                    .ok_or_else(|| rejected("no water charges left".to_owned()))?;
                let tile = farm.tile_mut(index)?;
                tile.water_count = tile.water_count.saturating_add(1);
                tile.last_watered_at = now;
                Ok(())
            }
            FarmAction::Fertilize => {
                let tile = farm.tile(index)?;
                if tile.is_empty() {
                    return Err(rejected(format!("tile {index} has nothing to fertilize")));
                }
                if tile.is_fertilized {
                    return Err(rejected(format!("tile {index} is already fertilized")));
                }
                farm.inventory.fertilizer_charges = farm
                    .inventory
                    .fertilizer_charges
                    .checked_sub(1)
                    .ok_or_else(|| rejected("no fertilizer left".to_owned()))?;
                let tile = farm.tile_mut(index)?;
                tile.is_fertilized = true;
                tile.maturity_time = tile.maturity_time.min(now);
                Ok(())
            }
            FarmAction::Harvest => {
                let tile = farm.tile(index)?;
                let Some(crop) = tile.crop() else {
                    return Err(rejected(format!("tile {index} has nothing to harvest")));
                };
                if !tile.is_ready(now) {
                    return Err(rejected(format!("{} is not ready yet", catalog::name_of(crop))));
                }
                if let Some(window) =
                    catalog::harvest_window_of(crop).filter(|w| !w.contains(now))
                {
                    return Err(rejected(format!(
                        "{} can only be harvested {window}",
                        catalog::name_of(crop)
                    )));
                }
                let produce = farm.inventory.produce.entry(crop).or_insert(0);
                *produce = produce.saturating_add(1);
                let tile = farm.tile_mut(index)?;
                *tile = TileRecord::empty(index);
                Ok(())
            }
        }
    }

    fn plant(
        &self,
        farm: &mut PlayerFarm,
        index: TileIndex,
        crop: CropId,
        now: u64,
    ) -> Result<(), BackendError> {
        if !farm.tile(index)?.is_empty() {
            return Err(rejected(format!("tile {index} is already planted")));
        }
        can_plant(crop, &farm.tiles, farm.tiles_owned(), self.rules)
            .map_err(|e| rejected(e.to_string()))?;
        let info = catalog::lookup(crop).ok_or_else(|| rejected(format!("unknown crop {crop}")))?;

        let seeds = farm
            .inventory
            .seeds
            .get_mut(&crop)
            .filter(|n| **n > 0)
            .ok_or_else(|| rejected(format!("no {} seeds left", info.name)))?;
        *seeds = seeds.saturating_sub(1);

        let tile = farm.tile_mut(index)?;
        *tile = TileRecord {
            planted_crop: crop,
            planted_at: now,
            maturity_time: now.saturating_add(info.growth_secs),
            ..TileRecord::empty(index)
        };
        Ok(())
    }
}

fn rejected(reason: String) -> BackendError {
    BackendError::Rejected { reason }
}

fn no_farm(player: &PlayerAddress) -> BackendError {
    rejected(format!("player {player} has no farm"))
}

impl<C: TimeSource + 'static> FarmBackend for MemoryBackend<C> {
    async fn read_tile(
        &self,
        player: &PlayerAddress,
        index: TileIndex,
    ) -> Result<TileRecord, BackendError> {
        self.enter(&self.calls.tile_reads).await?;
        let farms = self.farms.lock().await;
        let farm = farms.get(player).ok_or(BackendError::UnknownTile { index })?;
        farm.tile(index).cloned()
    }

    async fn read_all_tiles(&self, player: &PlayerAddress) -> Result<Vec<TileRecord>, BackendError> {
        self.enter(&self.calls.farm_reads).await?;
        let farms = self.farms.lock().await;
        Ok(farms.get(player).map(|f| f.tiles.clone()).unwrap_or_default())
    }

    async fn read_inventory(&self, player: &PlayerAddress) -> Result<Inventory, BackendError> {
        self.enter(&self.calls.inventory_reads).await?;
        let farms = self.farms.lock().await;
        Ok(farms
            .get(player)
            .map(|f| f.inventory.clone())
            .unwrap_or_default())
    }

    async fn read_chain_time(&self) -> Result<u64, BackendError> {
        self.enter(&self.calls.time_reads).await?;
        Ok(self.clock.now())
    }

    async fn submit(
        &self,
        player: &PlayerAddress,
        index: TileIndex,
        action: FarmAction,
    ) -> Result<ActionReceipt, BackendError> {
        self.enter(&self.calls.submits).await?;
        let now = self.clock.now();
        let mut farms = self.farms.lock().await;
        let farm = farms.get_mut(player).ok_or_else(|| no_farm(player))?;
        self.apply(farm, index, action, now)?;

        let tx_hash = TxHash(format!("0x{}", Uuid::new_v4().simple()));
        debug!(
            player = %player,
            tile = %index,
            action = %action.kind(),
            tx = %tx_hash,
            "Memory backend confirmed action"
        );
        Ok(ActionReceipt {
            tile: index,
            action,
            tx_hash,
            confirmed_at: now,
        })
    }
}
