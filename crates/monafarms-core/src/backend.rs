//! Backend trait: the client's view of the authoritative farm contracts.
//!
//! All tile state, inventory, and trusted time come from a [`FarmBackend`].
//! Mutating actions are submitted through it and either confirm with an
//! [`ActionReceipt`] or fail with a [`BackendError`]. The client never
//! assumes a submission succeeded until the backend says so.
//!
//! [`MemoryBackend`](crate::memory_backend::MemoryBackend) implements the
//! trait in-process for tests and the demo client.

use std::future::Future;

use monafarms_types::{ActionReceipt, FarmAction, Inventory, PlayerAddress, TileIndex, TileRecord};

/// Errors reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend evaluated the request and refused it.
    #[error("rejected: {reason}")]
    Rejected {
        /// Reason given by the backend.
        reason: String,
    },

    /// The backend could not be reached or did not answer.
    #[error("backend unreachable: {message}")]
    Unreachable {
        /// Description of the transport failure.
        message: String,
    },

    /// The requested tile does not belong to the player.
    #[error("tile {index} is not owned by the player")]
    UnknownTile {
        /// The requested tile.
        index: TileIndex,
    },
}

/// Source of authoritative farm state and sink for mutating actions.
///
/// Reads are idempotent and may be issued concurrently. Every returned
/// future is `Send` so implementations can be driven from spawned tasks.
pub trait FarmBackend: Send + Sync + 'static {
    /// Read one tile.
    fn read_tile(
        &self,
        player: &PlayerAddress,
        index: TileIndex,
    ) -> impl Future<Output = Result<TileRecord, BackendError>> + Send;

    /// Read every tile the player owns, ordered by index.
    fn read_all_tiles(
        &self,
        player: &PlayerAddress,
    ) -> impl Future<Output = Result<Vec<TileRecord>, BackendError>> + Send;

    /// Read the player's inventory.
    fn read_inventory(
        &self,
        player: &PlayerAddress,
    ) -> impl Future<Output = Result<Inventory, BackendError>> + Send;

    /// Read the backend's trusted clock, unix seconds.
    fn read_chain_time(&self) -> impl Future<Output = Result<u64, BackendError>> + Send;

    /// Submit a mutating action and wait for confirmation.
    fn submit(
        &self,
        player: &PlayerAddress,
        index: TileIndex,
        action: FarmAction,
    ) -> impl Future<Output = Result<ActionReceipt, BackendError>> + Send;
}
