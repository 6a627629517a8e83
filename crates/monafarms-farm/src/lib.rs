//! Crop catalog and farm rules for the MonaFarms client.
//!
//! Everything in this crate is a pure function of its inputs: no clocks,
//! no I/O, no shared state. The reconciliation engine in `monafarms-core`
//! calls into it to derive what a tile looks like and whether an action
//! makes sense before anything is sent to the backend.
//!
//! # Modules
//!
//! - [`catalog`] -- Crop metadata table keyed by [`CropId`]
//! - [`growth`] -- View state, lifecycle stage, and countdowns
//! - [`rarity`] -- Rare and exclusive crop planting rules
//! - [`harvest_window`] -- UTC hour windows for restricted harvests
//! - [`availability`] -- Actions worth offering given inventory
//!
//! [`CropId`]: monafarms_types::CropId

pub mod availability;
pub mod catalog;
pub mod growth;
pub mod harvest_window;
pub mod rarity;

pub use catalog::CropInfo;
pub use growth::{classify, compute_view_state, seconds_until_ready};
pub use harvest_window::HarvestWindow;
pub use rarity::{PlantRejection, RarityRules, can_plant};
