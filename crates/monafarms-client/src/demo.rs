//! Starting farm for the in-memory backend.

use monafarms_core::{MemoryBackend, TimeSource};
use monafarms_farm::catalog;
use monafarms_types::{Inventory, PlayerAddress, Rarity};

/// Tiles on the demo farm. Enough for the exclusive crop.
pub const DEMO_TILES: u32 = 12;

/// Seeds of each common crop.
const COMMON_SEEDS: u32 = 5;

/// Seeds of each rare or exclusive crop.
const RARE_SEEDS: u32 = 1;

/// Starting inventory: seeds of every crop plus water and fertilizer.
pub fn starting_inventory() -> Inventory {
    let mut inventory = Inventory {
        water_charges: 20,
        fertilizer_charges: 3,
        ..Inventory::default()
    };
    for crop in &catalog::CROPS {
        let count = match crop.rarity {
            Rarity::Common => COMMON_SEEDS,
            Rarity::Rare | Rarity::Exclusive => RARE_SEEDS,
        };
        inventory.seeds.insert(crop.id, count);
    }
    inventory
}

/// Give `player` a fresh demo farm on `backend`.
pub async fn seed<C: TimeSource + 'static>(backend: &MemoryBackend<C>, player: &PlayerAddress) {
    backend
        .add_player(player.clone(), DEMO_TILES, starting_inventory())
        .await;
    tracing::info!(player = %player, tiles = DEMO_TILES, "Demo farm created");
}
