//! Mutating action dispatch with per-tile serialization.
//!
//! [`ActionDispatcher::submit`] is the only way the client changes farm
//! state. It claims the tile, pre-validates the action against the cached
//! record, submits it to the backend under a deadline, and on confirmation
//! hands follow-up reads to the refresh scheduler. The cache is never
//! updated optimistically: the tile changes only when a later read says so.
//!
//! At most one action per tile is in flight. A second submission for the
//! same tile fails with [`DispatchError::TileBusy`] without contacting the
//! backend. The claim is released when the submission future completes or
//! is dropped.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use monafarms_farm::{HarvestWindow, PlantRejection, RarityRules, can_plant, catalog};
use monafarms_types::{ActionReceipt, CropId, FarmAction, PlayerAddress, TileIndex, TileRecord};

use crate::activity::ActivityTracker;
use crate::backend::{BackendError, FarmBackend};
use crate::cache::SharedTileCache;
use crate::clock::TimeSource;
use crate::config::ClientConfig;
use crate::scheduler::{RefreshHandle, RefreshReason, RefreshTarget};

/// Broad class of a dispatch failure, for choosing how to present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The action makes no sense for the current state. Nothing was sent.
    Validation,
    /// The backend could not be reached or did not answer in time.
    Transient,
    /// The backend evaluated the action and refused it.
    Rejected,
}

/// Why a submission did not confirm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Another action on this tile is still pending.
    #[error("tile {index} already has an action in flight")]
    TileBusy {
        /// The tile.
        index: TileIndex,
    },

    /// The tile has not been read from the backend yet.
    #[error("tile {index} has not been loaded yet")]
    TileNotLoaded {
        /// The tile.
        index: TileIndex,
    },

    /// An automated tool holds the tile.
    #[error("tile {index} is locked by an automated tool")]
    TileLocked {
        /// The tile.
        index: TileIndex,
    },

    /// Planting needs an empty tile.
    #[error("tile {index} is already planted")]
    TileOccupied {
        /// The tile.
        index: TileIndex,
    },

    /// The action needs a planted tile.
    #[error("tile {index} has nothing planted")]
    TileEmpty {
        /// The tile.
        index: TileIndex,
    },

    /// Fertilizer was already applied to this crop.
    #[error("tile {index} is already fertilized")]
    AlreadyFertilized {
        /// The tile.
        index: TileIndex,
    },

    /// The crop is not ready to harvest.
    #[error("tile {index} is not ready, {seconds_left}s to go")]
    NotReady {
        /// The tile.
        index: TileIndex,
        /// Seconds until maturity by the local clock.
        seconds_left: u64,
    },

    /// A rarity rule forbids the planting.
    #[error(transparent)]
    Rarity(#[from] PlantRejection),

    /// The crop can only be harvested during its window.
    #[error("{crop} can only be harvested {window}")]
    OutsideHarvestWindow {
        /// Crop name.
        crop: &'static str,
        /// The crop's window.
        window: HarvestWindow,
        /// Seconds until the window next opens.
        opens_in_secs: u64,
    },

    /// The backend refused the action.
    #[error("backend rejected the action: {reason}")]
    BackendRejected {
        /// Reason given by the backend.
        reason: String,
    },

    /// The backend could not be reached.
    #[error("backend unreachable: {message}")]
    BackendUnreachable {
        /// Transport failure description.
        message: String,
    },

    /// The backend did not answer before the deadline. For a submission
    /// the action may or may not have been applied.
    #[error("no answer within {after_ms}ms")]
    Timeout {
        /// The deadline that elapsed.
        after_ms: u64,
    },
}

impl DispatchError {
    /// Broad class of this failure.
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::BackendRejected { .. } => FailureKind::Rejected,
            Self::BackendUnreachable { .. } | Self::Timeout { .. } => FailureKind::Transient,
            Self::TileBusy { .. }
            | Self::TileNotLoaded { .. }
            | Self::TileLocked { .. }
            | Self::TileOccupied { .. }
            | Self::TileEmpty { .. }
            | Self::AlreadyFertilized { .. }
            | Self::NotReady { .. }
            | Self::Rarity(_)
            | Self::OutsideHarvestWindow { .. } => FailureKind::Validation,
        }
    }

    /// Message suitable for showing to the player.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => {
                "No confirmation yet. The action may still go through; refresh to check.".to_owned()
            }
            Self::TileBusy { .. } => "Still working on that tile, hang on.".to_owned(),
            _ => match self.kind() {
                FailureKind::Validation => format!("You can't do that: {self}."),
                FailureKind::Transient => format!("That didn't work, try again ({self})."),
                FailureKind::Rejected => format!("The farm refused that action: {self}."),
            },
        }
    }
}

impl From<BackendError> for DispatchError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Rejected { reason } => Self::BackendRejected { reason },
            BackendError::Unreachable { message } => Self::BackendUnreachable { message },
            BackendError::UnknownTile { .. } => Self::BackendRejected {
                reason: error.to_string(),
            },
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunables for [`ActionDispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Deadline for a submission to confirm.
    pub action_timeout: Duration,
    /// Deadline for the fresh read taken before a harvest.
    pub read_timeout: Duration,
    /// Seconds of clock skew tolerated when judging readiness.
    pub skew_tolerance_secs: u64,
    /// Rarity rules for planting pre-validation.
    pub rules: RarityRules,
}

impl DispatchSettings {
    /// Settings taken from the client configuration.
    pub const fn from_config(config: &ClientConfig) -> Self {
        Self {
            action_timeout: config.actions.timeout(),
            read_timeout: config.refresh.read_timeout(),
            skew_tolerance_secs: config.clock.skew_tolerance_secs,
            rules: config.farm.rarity_rules(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tile claims
// ---------------------------------------------------------------------------

type InFlight = Arc<Mutex<BTreeSet<TileIndex>>>;

/// Exclusive claim on a tile for the lifetime of one submission.
#[derive(Debug)]
struct TileClaim {
    index: TileIndex,
    in_flight: InFlight,
}

impl TileClaim {
    fn acquire(in_flight: &InFlight, index: TileIndex) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index);
        inserted.then(|| Self {
            index,
            in_flight: Arc::clone(in_flight),
        })
    }
}

impl Drop for TileClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.index);
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Serializes, validates, and submits mutating actions.
#[derive(Debug)]
pub struct ActionDispatcher<B, C> {
    backend: Arc<B>,
    cache: SharedTileCache,
    clock: C,
    player: PlayerAddress,
    refresh: RefreshHandle,
    settings: DispatchSettings,
    activity: Option<Arc<ActivityTracker>>,
    in_flight: InFlight,
}

impl<B: FarmBackend, C: TimeSource> ActionDispatcher<B, C> {
    /// Create a dispatcher acting for `player`.
    pub fn new(
        backend: Arc<B>,
        cache: SharedTileCache,
        clock: C,
        player: PlayerAddress,
        refresh: RefreshHandle,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            backend,
            cache,
            clock,
            player,
            refresh,
            settings,
            activity: None,
            in_flight: Arc::default(),
        }
    }

    /// Record confirmed actions into `tracker`.
    #[must_use]
    pub fn with_activity(mut self, tracker: Arc<ActivityTracker>) -> Self {
        self.activity = Some(tracker);
        self
    }

    /// Whether an action on `index` is currently pending.
    pub fn is_busy(&self, index: TileIndex) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&index)
    }

    /// Validate and submit `action` on tile `index`.
    ///
    /// The returned future is the pending submission; dropping it before it
    /// completes releases the tile claim but does not recall anything
    /// already sent to the backend.
    pub async fn submit(
        &self,
        index: TileIndex,
        action: FarmAction,
    ) -> Result<ActionReceipt, DispatchError> {
        let _claim =
            TileClaim::acquire(&self.in_flight, index).ok_or(DispatchError::TileBusy { index })?;

        let tile = self
            .cache
            .get(index)
            .await
            .ok_or(DispatchError::TileNotLoaded { index })?;
        if tile.is_locked {
            return Err(DispatchError::TileLocked { index });
        }
        let tile = self.prevalidate(tile, action).await?;

        debug!(tile = %index, action = %action.kind(), "Submitting action");
        let deadline = self.settings.action_timeout;
        let outcome = timeout(deadline, self.backend.submit(&self.player, index, action)).await;

        match outcome {
            Ok(Ok(receipt)) => {
                info!(
                    tile = %index,
                    action = %action.kind(),
                    tx = %receipt.tx_hash,
                    "Action confirmed"
                );
                if let Err(e) = self.refresh.schedule_staggered(index) {
                    warn!(tile = %index, error = %e, "Could not schedule follow-up refresh");
                }
                if let Some(activity) = &self.activity {
                    let crop = match action {
                        FarmAction::Plant { crop } => Some(crop),
                        FarmAction::Water | FarmAction::Harvest | FarmAction::Fertilize => {
                            tile.crop()
                        }
                    };
                    activity.record(&receipt, crop);
                }
                Ok(receipt)
            }
            Ok(Err(error)) => {
                let error = DispatchError::from(error);
                if error.kind() == FailureKind::Rejected {
                    warn!(tile = %index, action = %action.kind(), error = %error, "Action rejected");
                    self.force_refresh(index).await;
                } else {
                    warn!(tile = %index, action = %action.kind(), error = %error, "Action failed");
                }
                Err(error)
            }
            Err(_elapsed) => {
                warn!(
                    tile = %index,
                    action = %action.kind(),
                    timeout_ms = millis(deadline),
                    "Action timed out, outcome unknown"
                );
                Err(DispatchError::Timeout {
                    after_ms: millis(deadline),
                })
            }
        }
    }

    async fn force_refresh(&self, index: TileIndex) {
        self.cache.invalidate(index).await;
        if let Err(e) = self
            .refresh
            .schedule_refresh(RefreshTarget::Tile(index), RefreshReason::Rejected)
        {
            warn!(tile = %index, error = %e, "Could not schedule refresh after rejection");
        }
    }

    /// Local checks. Returns the record the action was validated against,
    /// which for a harvest is a fresh read.
    async fn prevalidate(
        &self,
        tile: TileRecord,
        action: FarmAction,
    ) -> Result<TileRecord, DispatchError> {
        let index = tile.index;
        match action {
            FarmAction::Plant { crop } => {
                if !tile.is_empty() {
                    return Err(DispatchError::TileOccupied { index });
                }
                let tiles = self.cache.snapshot_all().await;
                // Farm size unknown until a whole-farm read lands; the
                // backend judges the size rule until then.
                let owned = self.cache.tiles_owned().await.unwrap_or(u32::MAX);
                can_plant(crop, &tiles, owned, self.settings.rules)?;
                Ok(tile)
            }
            FarmAction::Water => {
                if tile.is_empty() {
                    return Err(DispatchError::TileEmpty { index });
                }
                Ok(tile)
            }
            FarmAction::Fertilize => {
                if tile.is_empty() {
                    return Err(DispatchError::TileEmpty { index });
                }
                if tile.is_fertilized {
                    return Err(DispatchError::AlreadyFertilized { index });
                }
                Ok(tile)
            }
            FarmAction::Harvest => {
                let crop = tile.crop().ok_or(DispatchError::TileEmpty { index })?;
                self.check_window(crop)?;
                let fresh = self.read_fresh(index).await?;
                self.check_ready(&fresh)?;
                Ok(fresh)
            }
        }
    }

    fn check_window(&self, crop: CropId) -> Result<(), DispatchError> {
        let Some(window) = catalog::harvest_window_of(crop) else {
            return Ok(());
        };
        let now = self.clock.now();
        if window.contains(now) {
            return Ok(());
        }
        Err(DispatchError::OutsideHarvestWindow {
            crop: catalog::name_of(crop),
            window,
            opens_in_secs: window.seconds_until_open(now),
        })
    }

    /// Read `index` from the backend and apply it to the cache.
    async fn read_fresh(&self, index: TileIndex) -> Result<TileRecord, DispatchError> {
        let stamp = self.cache.issue_stamp().await;
        let deadline = self.settings.read_timeout;
        match timeout(deadline, self.backend.read_tile(&self.player, index)).await {
            Ok(Ok(record)) => {
                self.cache.apply(record.clone(), stamp).await;
                Ok(record)
            }
            Ok(Err(error)) => {
                let error = DispatchError::from(error);
                if error.kind() == FailureKind::Rejected {
                    warn!(tile = %index, error = %error, "Fresh read rejected");
                    self.force_refresh(index).await;
                }
                Err(error)
            }
            Err(_elapsed) => Err(DispatchError::Timeout {
                after_ms: millis(deadline),
            }),
        }
    }

    fn check_ready(&self, fresh: &TileRecord) -> Result<(), DispatchError> {
        let index = fresh.index;
        if fresh.is_empty() {
            return Err(DispatchError::TileEmpty { index });
        }
        if fresh.is_locked {
            return Err(DispatchError::TileLocked { index });
        }
        let now = self.clock.now();
        let tolerant_now = now.saturating_add(self.settings.skew_tolerance_secs);
        if fresh.is_ready(tolerant_now) {
            return Ok(());
        }
        Err(DispatchError::NotReady {
            index,
            seconds_left: fresh.maturity_time.saturating_sub(now),
        })
    }
}
