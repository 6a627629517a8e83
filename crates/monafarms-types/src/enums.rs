//! Enumeration types shared across the MonaFarms client.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// The kind of mutating action a player can submit against a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Put a seed into an empty tile.
    Plant,
    /// Irrigate a growing crop.
    Water,
    /// Collect a ready crop, returning the tile to empty.
    Harvest,
    /// Apply fertilizer, short-circuiting the remaining growth time.
    Fertilize,
}

impl ActionKind {
    /// Lowercase name used in logs and console commands.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plant => "plant",
            Self::Water => "water",
            Self::Harvest => "harvest",
            Self::Fertilize => "fertilize",
        }
    }
}

impl core::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Derived tile state
// ---------------------------------------------------------------------------

/// What the UI should show for a tile at a given instant.
///
/// Derived from a tile record and the current time; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewState {
    /// Nothing planted.
    Empty,
    /// Planted but neither watered nor fertilized; growth shows 0%.
    NeedsWater,
    /// Growing, with completion percentage in `0..=100`.
    Growing {
        /// Completion percentage.
        percent: u8,
    },
    /// Mature and harvestable; growth pinned at 100%.
    Ready,
}

impl ViewState {
    /// Growth percentage implied by this state.
    pub const fn percent(self) -> u8 {
        match self {
            Self::Empty | Self::NeedsWater => 0,
            Self::Growing { percent } => percent,
            Self::Ready => 100,
        }
    }
}

/// Lifecycle stage of a tile.
///
/// A tile is in exactly one stage at any instant. Fertilized tiles are
/// reported as [`TileStage::Fertilized`] until they are ready, regardless
/// of their water count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum TileStage {
    /// Nothing planted.
    Empty,
    /// Planted, not yet watered.
    GrowingUnwatered,
    /// Planted and watered at least once.
    GrowingWatered,
    /// Planted and fertilized.
    Fertilized,
    /// Mature and waiting for harvest.
    Ready,
}

// ---------------------------------------------------------------------------
// Crop rarity
// ---------------------------------------------------------------------------

/// Rarity class of a crop, governing cross-tile planting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    /// No cross-tile restrictions.
    Common,
    /// At most one planted instance per farm.
    Rare,
    /// Needs an entirely empty, sufficiently large farm and blocks all
    /// other planting while it grows.
    Exclusive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_state_percent() {
        assert_eq!(ViewState::Empty.percent(), 0);
        assert_eq!(ViewState::NeedsWater.percent(), 0);
        assert_eq!(ViewState::Growing { percent: 42 }.percent(), 42);
        assert_eq!(ViewState::Ready.percent(), 100);
    }

    #[test]
    fn view_state_serializes_tagged() {
        let json = serde_json::to_string(&ViewState::Growing { percent: 50 }).ok();
        assert_eq!(json.as_deref(), Some(r#"{"state":"growing","percent":50}"#));
    }

    #[test]
    fn action_kind_names() {
        assert_eq!(ActionKind::Fertilize.to_string(), "fertilize");
        let json = serde_json::to_string(&ActionKind::Harvest).ok();
        assert_eq!(json.as_deref(), Some("\"harvest\""));
    }
}
