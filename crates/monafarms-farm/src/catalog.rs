//! Crop metadata table.
//!
//! Every component that needs a crop's name, rarity, nominal growth time,
//! or harvest window reads it from here. Entries are keyed by the stable
//! on-chain [`CropId`]; the table is read-only.

use monafarms_types::{CropId, Rarity};

use crate::harvest_window::HarvestWindow;

// ---------------------------------------------------------------------------
// Crop identifiers
// ---------------------------------------------------------------------------

/// Wheat.
pub const WHEAT: CropId = CropId(1);
/// Corn.
pub const CORN: CropId = CropId(2);
/// Carrot.
pub const CARROT: CropId = CropId(3);
/// Potato.
pub const POTATO: CropId = CropId(4);
/// Tomato.
pub const TOMATO: CropId = CropId(5);
/// Pumpkin.
pub const PUMPKIN: CropId = CropId(6);
/// Strawberry.
pub const STRAWBERRY: CropId = CropId(7);
/// Starfruit (rare).
pub const STARFRUIT: CropId = CropId(8);
/// Moonflower (rare, night-only harvest).
pub const MOONFLOWER: CropId = CropId(9);
/// Golden melon (rare).
pub const GOLDEN_MELON: CropId = CropId(10);
/// Rainbow fruit (exclusive).
pub const RAINBOW_FRUIT: CropId = CropId(11);

/// Seconds in one hour, for readable growth times.
const HOUR: u64 = 3_600;

// ---------------------------------------------------------------------------
// CropInfo
// ---------------------------------------------------------------------------

/// Static metadata for one crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropInfo {
    /// Stable identifier.
    pub id: CropId,
    /// Display name.
    pub name: &'static str,
    /// Short flavor text.
    pub description: &'static str,
    /// Rarity class.
    pub rarity: Rarity,
    /// Nominal growth time in seconds. Informational on the client; the
    /// backend decides actual maturity.
    pub growth_secs: u64,
    /// Restricted harvest window, if any.
    pub harvest_window: Option<HarvestWindow>,
}

/// The crop table.
pub static CROPS: [CropInfo; 11] = [
    CropInfo {
        id: WHEAT,
        name: "Wheat",
        description: "A dependable staple.",
        rarity: Rarity::Common,
        growth_secs: HOUR,
        harvest_window: None,
    },
    CropInfo {
        id: CORN,
        name: "Corn",
        description: "Tall stalks, sweet kernels.",
        rarity: Rarity::Common,
        growth_secs: 2 * HOUR,
        harvest_window: None,
    },
    CropInfo {
        id: CARROT,
        name: "Carrot",
        description: "Crunchy and quick.",
        rarity: Rarity::Common,
        growth_secs: 3 * HOUR / 2,
        harvest_window: None,
    },
    CropInfo {
        id: POTATO,
        name: "Potato",
        description: "Hearty tubers.",
        rarity: Rarity::Common,
        growth_secs: 3 * HOUR,
        harvest_window: None,
    },
    CropInfo {
        id: TOMATO,
        name: "Tomato",
        description: "Sun-ripened and juicy.",
        rarity: Rarity::Common,
        growth_secs: 4 * HOUR,
        harvest_window: None,
    },
    CropInfo {
        id: PUMPKIN,
        name: "Pumpkin",
        description: "Slow to grow, heavy to carry.",
        rarity: Rarity::Common,
        growth_secs: 8 * HOUR,
        harvest_window: None,
    },
    CropInfo {
        id: STRAWBERRY,
        name: "Strawberry",
        description: "Small, red, and sweet.",
        rarity: Rarity::Common,
        growth_secs: 6 * HOUR,
        harvest_window: None,
    },
    CropInfo {
        id: STARFRUIT,
        name: "Starfruit",
        description: "Only one tree per farm will take root.",
        rarity: Rarity::Rare,
        growth_secs: 12 * HOUR,
        harvest_window: None,
    },
    CropInfo {
        id: MOONFLOWER,
        name: "Moonflower",
        description: "Blooms only under the night sky.",
        rarity: Rarity::Rare,
        growth_secs: 10 * HOUR,
        harvest_window: Some(HarvestWindow::utc(22, 4)),
    },
    CropInfo {
        id: GOLDEN_MELON,
        name: "Golden Melon",
        description: "Gleams in the afternoon light.",
        rarity: Rarity::Rare,
        growth_secs: 24 * HOUR,
        harvest_window: None,
    },
    CropInfo {
        id: RAINBOW_FRUIT,
        name: "Rainbow Fruit",
        description: "Demands the whole farm to itself.",
        rarity: Rarity::Exclusive,
        growth_secs: 48 * HOUR,
        harvest_window: None,
    },
];

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// Look up a crop by identifier.
pub fn lookup(id: CropId) -> Option<&'static CropInfo> {
    CROPS.iter().find(|info| info.id == id)
}

/// Look up a crop by display name, ignoring case, spaces, and underscores.
pub fn by_name(name: &str) -> Option<&'static CropInfo> {
    let wanted = normalize(name);
    CROPS.iter().find(|info| normalize(info.name) == wanted)
}

/// Display name for a crop, or `"Unknown"` for ids not in the table.
pub fn name_of(id: CropId) -> &'static str {
    lookup(id).map_or("Unknown", |info| info.name)
}

/// Rarity class for a crop, or `None` for ids not in the table.
pub fn rarity_of(id: CropId) -> Option<Rarity> {
    lookup(id).map(|info| info.rarity)
}

/// Harvest window for a crop, if it has one.
pub fn harvest_window_of(id: CropId) -> Option<HarvestWindow> {
    lookup(id).and_then(|info| info.harvest_window)
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn ids_are_unique() {
        let ids: BTreeSet<CropId> = CROPS.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), CROPS.len());
    }

    #[test]
    fn exactly_one_exclusive_crop() {
        let exclusive: Vec<_> = CROPS
            .iter()
            .filter(|c| c.rarity == Rarity::Exclusive)
            .collect();
        assert_eq!(exclusive.len(), 1);
        assert_eq!(exclusive.first().map(|c| c.id), Some(RAINBOW_FRUIT));
    }

    #[test]
    fn lookup_by_name_is_forgiving() {
        assert_eq!(by_name("rainbow_fruit").map(|c| c.id), Some(RAINBOW_FRUIT));
        assert_eq!(by_name("Golden Melon").map(|c| c.id), Some(GOLDEN_MELON));
        assert_eq!(by_name("MOONFLOWER").map(|c| c.id), Some(MOONFLOWER));
        assert!(by_name("turnip").is_none());
    }

    #[test]
    fn unknown_id_has_fallback_name() {
        assert_eq!(name_of(CropId(999)), "Unknown");
        assert_eq!(rarity_of(CropId(999)), None);
    }

    #[test]
    fn moonflower_has_night_window() {
        let window = harvest_window_of(MOONFLOWER);
        assert_eq!(window, Some(HarvestWindow::utc(22, 4)));
        assert_eq!(harvest_window_of(WHEAT), None);
    }
}
