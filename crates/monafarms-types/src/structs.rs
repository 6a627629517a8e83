//! Core record types: tiles, actions, inventory, and projected views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActionKind, TileStage, ViewState};
use crate::ids::{CropId, TileIndex, TxHash};

// ---------------------------------------------------------------------------
// TileRecord
// ---------------------------------------------------------------------------

/// Authoritative state of one farm tile, as read from the backend.
///
/// Timestamps are unix seconds. `planted_at == 0` means the tile is empty,
/// in which case `planted_crop` carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TileRecord {
    /// Ordinal position of the tile within the farm.
    pub index: TileIndex,
    /// Crop growing on the tile.
    pub planted_crop: CropId,
    /// When the crop was planted; 0 for an empty tile.
    pub planted_at: u64,
    /// When the crop was last watered; 0 if never.
    pub last_watered_at: u64,
    /// Number of waterings since planting.
    pub water_count: u32,
    /// Whether fertilizer has been applied since planting.
    pub is_fertilized: bool,
    /// When the crop becomes harvestable. Opaque to the client.
    pub maturity_time: u64,
    /// Whether an automated tool holds exclusive claim on the tile.
    pub is_locked: bool,
}

impl TileRecord {
    /// An empty, unlocked tile at `index`.
    pub const fn empty(index: TileIndex) -> Self {
        Self {
            index,
            planted_crop: CropId(0),
            planted_at: 0,
            last_watered_at: 0,
            water_count: 0,
            is_fertilized: false,
            maturity_time: 0,
            is_locked: false,
        }
    }

    /// Whether nothing is planted on the tile.
    pub const fn is_empty(&self) -> bool {
        self.planted_at == 0
    }

    /// Whether the tile holds a mature crop at `now`.
    pub const fn is_ready(&self, now: u64) -> bool {
        !self.is_empty() && self.maturity_time <= now
    }

    /// The planted crop, or `None` for an empty tile.
    pub const fn crop(&self) -> Option<CropId> {
        if self.is_empty() {
            None
        } else {
            Some(self.planted_crop)
        }
    }
}

// ---------------------------------------------------------------------------
// FarmAction
// ---------------------------------------------------------------------------

/// A mutating action submitted against a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FarmAction {
    /// Plant a seed of the given crop.
    Plant {
        /// Crop to plant.
        crop: CropId,
    },
    /// Water the growing crop.
    Water,
    /// Harvest the ready crop.
    Harvest,
    /// Fertilize the growing crop.
    Fertilize,
}

impl FarmAction {
    /// The payload-free discriminant of this action.
    pub const fn kind(self) -> ActionKind {
        match self {
            Self::Plant { .. } => ActionKind::Plant,
            Self::Water => ActionKind::Water,
            Self::Harvest => ActionKind::Harvest,
            Self::Fertilize => ActionKind::Fertilize,
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Consumable items held by a player, as read from the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Inventory {
    /// Seed count per crop.
    pub seeds: BTreeMap<CropId, u32>,
    /// Remaining water charges.
    pub water_charges: u32,
    /// Remaining fertilizer charges.
    pub fertilizer_charges: u32,
    /// Harvested produce count per crop.
    pub produce: BTreeMap<CropId, u32>,
}

impl Inventory {
    /// Number of seeds held for `crop`.
    pub fn seeds_of(&self, crop: CropId) -> u32 {
        self.seeds.get(&crop).copied().unwrap_or(0)
    }

    /// Whether any seed at all is held.
    pub fn has_any_seed(&self) -> bool {
        self.seeds.values().any(|&count| count > 0)
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Confirmation of a mutating action accepted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionReceipt {
    /// The tile the action targeted.
    pub tile: TileIndex,
    /// The confirmed action.
    pub action: FarmAction,
    /// Transaction hash reported by the backend.
    pub tx_hash: TxHash,
    /// Backend time of confirmation, unix seconds.
    pub confirmed_at: u64,
}

// ---------------------------------------------------------------------------
// Projected views
// ---------------------------------------------------------------------------

/// Render-ready projection of a single tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TileView {
    /// Tile position.
    pub index: TileIndex,
    /// Planted crop, if any.
    pub crop: Option<CropId>,
    /// Display name of the planted crop, if any.
    pub crop_name: Option<String>,
    /// Derived growth state.
    pub state: ViewState,
    /// Lifecycle stage.
    pub stage: TileStage,
    /// Seconds until the crop is ready; 0 when ready or empty.
    pub seconds_until_ready: u64,
    /// Seconds until the crop's harvest window opens; `None` when the crop
    /// has no window, 0 when it is open now.
    pub seconds_until_window: Option<u64>,
    /// Whether an automated tool holds the tile.
    pub locked: bool,
    /// Whether the cached record has been invalidated and awaits refresh.
    pub stale: bool,
}

/// Render-ready projection of a whole farm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FarmView {
    /// Time the projection was computed for, unix seconds.
    pub now: u64,
    /// Views of every loaded tile, ordered by index.
    pub tiles: Vec<TileView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tile_has_no_crop() {
        let tile = TileRecord::empty(TileIndex(3));
        assert!(tile.is_empty());
        assert!(!tile.is_ready(u64::MAX));
        assert_eq!(tile.crop(), None);
    }

    #[test]
    fn planted_tile_readiness() {
        let tile = TileRecord {
            planted_crop: CropId(1),
            planted_at: 100,
            maturity_time: 200,
            ..TileRecord::empty(TileIndex(0))
        };
        assert_eq!(tile.crop(), Some(CropId(1)));
        assert!(!tile.is_ready(199));
        assert!(tile.is_ready(200));
    }

    #[test]
    fn action_kind_matches_variant() {
        assert_eq!(FarmAction::Plant { crop: CropId(2) }.kind(), ActionKind::Plant);
        assert_eq!(FarmAction::Harvest.kind(), ActionKind::Harvest);
    }

    #[test]
    fn inventory_seed_lookup() {
        let mut inv = Inventory::default();
        assert!(!inv.has_any_seed());
        inv.seeds.insert(CropId(4), 2);
        assert_eq!(inv.seeds_of(CropId(4)), 2);
        assert_eq!(inv.seeds_of(CropId(5)), 0);
        assert!(inv.has_any_seed());
    }

    #[test]
    fn plant_action_serializes_with_kind_tag() {
        let json = serde_json::to_string(&FarmAction::Plant { crop: CropId(9) }).ok();
        assert_eq!(json.as_deref(), Some(r#"{"kind":"plant","crop":9}"#));
    }
}
