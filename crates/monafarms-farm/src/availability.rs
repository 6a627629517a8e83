//! Which actions the UI should offer for a tile.
//!
//! Combines the tile's derived state with the player's inventory. This is
//! a presentation filter, not a validator: the dispatcher still runs its
//! own checks before submitting anything.

use monafarms_types::{ActionKind, Inventory, TileRecord, ViewState};

use crate::catalog;
use crate::growth::compute_view_state;

/// List the action kinds worth offering for `tile` at `now`.
///
/// Locked tiles offer nothing. Planting is offered on empty tiles when any
/// seed is held; watering and fertilizing on growing tiles when the
/// matching charge is held; harvesting on ready tiles whose harvest window
/// (if any) is open.
pub fn offered_actions(tile: &TileRecord, now: u64, inventory: &Inventory) -> Vec<ActionKind> {
    if tile.is_locked {
        return Vec::new();
    }

    let mut offered = Vec::new();
    match compute_view_state(tile, now) {
        ViewState::Empty => {
            if inventory.has_any_seed() {
                offered.push(ActionKind::Plant);
            }
        }
        ViewState::NeedsWater | ViewState::Growing { .. } => {
            if inventory.water_charges > 0 {
                offered.push(ActionKind::Water);
            }
            if !tile.is_fertilized && inventory.fertilizer_charges > 0 {
                offered.push(ActionKind::Fertilize);
            }
        }
        ViewState::Ready => {
            let window_open = catalog::harvest_window_of(tile.planted_crop)
                .is_none_or(|window| window.contains(now));
            if window_open {
                offered.push(ActionKind::Harvest);
            }
        }
    }
    offered
}
