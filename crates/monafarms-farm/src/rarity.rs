//! Cross-tile planting rules for rare and exclusive crops.
//!
//! These checks are an optimistic pre-validation. The backend enforces
//! the same rules authoritatively, so a submission that passes here can
//! still be rejected.

use monafarms_types::{CropId, Rarity, TileRecord};

use crate::catalog;

/// Minimum number of owned tiles before an exclusive crop may be planted.
pub const DEFAULT_EXCLUSIVE_MIN_TILES: u32 = 12;

/// Tunable parameters for the rarity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RarityRules {
    /// Minimum owned tiles before an exclusive crop may be planted.
    pub exclusive_min_tiles: u32,
}

impl Default for RarityRules {
    fn default() -> Self {
        Self {
            exclusive_min_tiles: DEFAULT_EXCLUSIVE_MIN_TILES,
        }
    }
}

/// Why a crop may not be planted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlantRejection {
    /// The crop id is not in the catalog.
    #[error("unknown crop {crop}")]
    UnknownCrop {
        /// The requested crop.
        crop: CropId,
    },

    /// A rare crop of this type is already growing on another tile.
    #[error("{name} is already planted on tile {tile}")]
    AlreadyPlanted {
        /// Name of the crop.
        name: &'static str,
        /// Tile already holding it.
        tile: u32,
    },

    /// The exclusive crop needs every tile to be empty.
    #[error("{name} needs an empty farm, but {occupied} tile(s) are planted")]
    FarmNotEmpty {
        /// Name of the exclusive crop.
        name: &'static str,
        /// Number of planted tiles.
        occupied: usize,
    },

    /// The exclusive crop needs a larger farm.
    #[error("{name} needs at least {required} tiles, farm has {owned}")]
    InsufficientTiles {
        /// Name of the exclusive crop.
        name: &'static str,
        /// Tiles required.
        required: u32,
        /// Tiles owned.
        owned: u32,
    },

    /// An exclusive crop occupies the farm and blocks other planting.
    #[error("{blocker} occupies the farm; nothing else can be planted until it is harvested")]
    BlockedByExclusiveCrop {
        /// Name of the exclusive crop currently growing.
        blocker: &'static str,
    },
}

/// Decide whether `candidate` may be planted given every known tile.
///
/// `tiles` is the set of known tile records; `tiles_owned` is how many
/// tiles the player owns in total.
///
/// # Errors
///
/// Returns the first [`PlantRejection`] that applies.
pub fn can_plant(
    candidate: CropId,
    tiles: &[TileRecord],
    tiles_owned: u32,
    rules: RarityRules,
) -> Result<(), PlantRejection> {
    let info = catalog::lookup(candidate).ok_or(PlantRejection::UnknownCrop { crop: candidate })?;

    // An exclusive crop already growing blocks everything, including a
    // second instance of itself.
    if let Some(blocking) = tiles.iter().find(|t| is_exclusive(t)) {
        return if blocking.planted_crop == candidate {
            Err(PlantRejection::AlreadyPlanted {
                name: info.name,
                tile: blocking.index.get(),
            })
        } else {
            Err(PlantRejection::BlockedByExclusiveCrop {
                blocker: catalog::name_of(blocking.planted_crop),
            })
        };
    }

    match info.rarity {
        Rarity::Common => Ok(()),
        Rarity::Rare => tiles
            .iter()
            .find(|t| t.crop() == Some(candidate))
            .map_or(Ok(()), |t| {
                Err(PlantRejection::AlreadyPlanted {
                    name: info.name,
                    tile: t.index.get(),
                })
            }),
        Rarity::Exclusive => {
            let occupied = tiles.iter().filter(|t| !t.is_empty()).count();
            if occupied > 0 {
                return Err(PlantRejection::FarmNotEmpty {
                    name: info.name,
                    occupied,
                });
            }
            if tiles_owned < rules.exclusive_min_tiles {
                return Err(PlantRejection::InsufficientTiles {
                    name: info.name,
                    required: rules.exclusive_min_tiles,
                    owned: tiles_owned,
                });
            }
            Ok(())
        }
    }
}

fn is_exclusive(tile: &TileRecord) -> bool {
    tile.crop()
        .and_then(catalog::rarity_of)
        .is_some_and(|r| r == Rarity::Exclusive)
}
