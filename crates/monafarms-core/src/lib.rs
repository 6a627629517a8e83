//! Reconciliation engine for the MonaFarms client.
//!
//! The farm's authoritative state lives behind a [`FarmBackend`]. This
//! crate keeps a local, never-fabricated copy of it in a
//! [`SharedTileCache`], keeps that copy fresh with a background
//! [`RefreshScheduler`], submits player actions one tile at a time through
//! the [`ActionDispatcher`], and projects render-ready views from the cache
//! and a [`TimeSource`].
//!
//! # Modules
//!
//! - [`clock`] -- Monotonic wall, trusted-synced, and manual clocks
//! - [`config`] -- YAML configuration with defaults and env overrides
//! - [`cache`] -- Stamped tile cache and its shared, broadcasting wrapper
//! - [`backend`] -- Backend trait and error type
//! - [`memory_backend`] -- In-process backend with failure injection
//! - [`scheduler`] -- Periodic, staggered, and coalesced refreshes
//! - [`dispatcher`] -- Per-tile serialized action submission
//! - [`view`] -- Farm view projection and the view loop
//! - [`activity`] -- Player stats and confirmed-activity log

pub mod activity;
pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod memory_backend;
pub mod scheduler;
pub mod view;

pub use activity::{ActivityTracker, JsonFileStore, MemoryStore, PlayerStats, StatsStore, StoreError};
pub use backend::{BackendError, FarmBackend};
pub use cache::{ApplyOutcome, CacheEvent, CachedTile, RefreshStamp, SharedTileCache, TileStateCache};
pub use clock::{ManualClock, SyncedClock, TimeSource, WallClock};
pub use config::{ClientConfig, ConfigError};
pub use dispatcher::{ActionDispatcher, DispatchError, DispatchSettings, FailureKind};
pub use memory_backend::MemoryBackend;
pub use scheduler::{RefreshEvent, RefreshHandle, RefreshReason, RefreshScheduler, RefreshTarget};
pub use view::{project, spawn_view_loop};
