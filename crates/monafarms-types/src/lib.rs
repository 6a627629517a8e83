//! Shared type definitions for the MonaFarms client.
//!
//! This crate is the single source of truth for the types passed between
//! the reconciliation engine and the UI. Types defined here flow to
//! `TypeScript` via `ts-rs` for the React front end.
//!
//! # Modules
//!
//! - [`ids`] -- Newtype identifiers for tiles, crops, players, transactions
//! - [`enums`] -- Action kinds, derived view state, lifecycle stage, rarity
//! - [`structs`] -- Tile records, actions, inventory, receipts, views

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ActionKind, Rarity, TileStage, ViewState};
pub use ids::{AddressError, CropId, PlayerAddress, TileIndex, TxHash};
pub use structs::{ActionReceipt, FarmAction, FarmView, Inventory, TileRecord, TileView};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the UI.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::TileIndex::export_all();
        let _ = crate::ids::CropId::export_all();
        let _ = crate::ids::PlayerAddress::export_all();
        let _ = crate::ids::TxHash::export_all();

        // Enums
        let _ = crate::enums::ActionKind::export_all();
        let _ = crate::enums::ViewState::export_all();
        let _ = crate::enums::TileStage::export_all();
        let _ = crate::enums::Rarity::export_all();

        // Structs
        let _ = crate::structs::TileRecord::export_all();
        let _ = crate::structs::FarmAction::export_all();
        let _ = crate::structs::Inventory::export_all();
        let _ = crate::structs::ActionReceipt::export_all();
        let _ = crate::structs::TileView::export_all();
        let _ = crate::structs::FarmView::export_all();
    }
}
