//! Refresh scheduling: one background task owns every tile re-read.
//!
//! The scheduler keeps a [`RefreshQueue`] of pending reads and services it
//! from a single spawned task. Three things feed the queue:
//!
//! - a startup read of every tile;
//! - a periodic background read of every tile, with random jitter so a
//!   fleet of clients does not hit the backend in lockstep;
//! - explicit requests through a [`RefreshHandle`], most commonly the
//!   staggered re-reads scheduled after a confirmed action, because the
//!   backend's read side can lag its write side by a few seconds.
//!
//! Requests for a target that is already pending within the coalescing
//! window are dropped, and a due `All` read subsumes any due per-tile
//! reads. Each read is stamped before it starts and applied to the
//! [`SharedTileCache`] with that stamp, so a late result from an older read
//! never overwrites a newer one. Failed reads are logged and not retried;
//! the next scheduled read picks up where they left off.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use monafarms_types::{PlayerAddress, TileIndex};

use crate::backend::{BackendError, FarmBackend};
use crate::cache::{ApplyOutcome, SharedTileCache};
use crate::clock::SyncedClock;
use crate::config::RefreshConfig;

/// Capacity of the refresh event broadcast channel.
const EVENT_CAPACITY: usize = 128;

/// What to re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RefreshTarget {
    /// A single tile.
    Tile(TileIndex),
    /// Every tile the player owns.
    All,
}

impl core::fmt::Display for RefreshTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Tile(index) => write!(f, "tile {index}"),
            Self::All => f.write_str("all tiles"),
        }
    }
}

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    /// First load after the scheduler starts.
    Startup,
    /// Background interval.
    Periodic,
    /// Follow-up after a confirmed action.
    PostAction,
    /// The backend rejected an action on this tile.
    Rejected,
    /// Requested by the user or a caller.
    Manual,
}

impl RefreshReason {
    /// Stable lowercase name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Periodic => "periodic",
            Self::PostAction => "post_action",
            Self::Rejected => "rejected",
            Self::Manual => "manual",
        }
    }
}

/// Outcome of one serviced refresh, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// The read finished and was applied.
    Completed {
        /// What was read.
        target: RefreshTarget,
        /// Why it was read.
        reason: RefreshReason,
        /// Tiles whose cached record was inserted or changed.
        changed: usize,
        /// Tiles whose result was discarded because a newer read landed.
        superseded: usize,
    },
    /// The read failed or timed out. It is not retried.
    Failed {
        /// What was read.
        target: RefreshTarget,
        /// Why it was read.
        reason: RefreshReason,
        /// Description of the failure.
        error: String,
    },
}

// ---------------------------------------------------------------------------
// RefreshQueue
// ---------------------------------------------------------------------------

/// A refresh waiting for its due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRefresh {
    /// What to read.
    pub target: RefreshTarget,
    /// Why.
    pub reason: RefreshReason,
    /// When.
    pub due: Instant,
}

/// Pending refreshes with coalescing.
#[derive(Debug)]
pub struct RefreshQueue {
    pending: Vec<PendingRefresh>,
    coalesce_window: Duration,
}

impl RefreshQueue {
    /// Create an empty queue that merges requests within `coalesce_window`.
    pub const fn new(coalesce_window: Duration) -> Self {
        Self {
            pending: Vec::new(),
            coalesce_window,
        }
    }

    /// Queue a refresh. Returns `false` if it was coalesced into an
    /// existing one.
    pub fn push(&mut self, target: RefreshTarget, reason: RefreshReason, due: Instant) -> bool {
        let covered = self.pending.iter().any(|p| {
            (p.target == target || p.target == RefreshTarget::All)
                && abs_diff(p.due, due) <= self.coalesce_window
        });
        if covered {
            return false;
        }
        self.pending.push(PendingRefresh {
            target,
            reason,
            due,
        });
        true
    }

    /// Earliest due time, if anything is pending.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }

    /// Remove and return everything due at or before `now`.
    ///
    /// A due `All` replaces every due per-tile entry. Duplicate tiles are
    /// returned once, keeping the first reason seen.
    pub fn take_due(&mut self, now: Instant) -> Vec<(RefreshTarget, RefreshReason)> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = rest;
        due.sort_by_key(|p| p.due);

        if let Some(all) = due.iter().find(|p| p.target == RefreshTarget::All) {
            return vec![(RefreshTarget::All, all.reason)];
        }

        let mut seen = BTreeSet::new();
        due.into_iter()
            .filter(|p| seen.insert(p.target))
            .map(|p| (p.target, p.reason))
            .collect()
    }

    /// Number of pending refreshes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn abs_diff(a: Instant, b: Instant) -> Duration {
    if a >= b {
        a.saturating_duration_since(b)
    } else {
        b.saturating_duration_since(a)
    }
}

fn after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or(now)
}

/// Random delay in `0..=max`.
fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// The scheduler task has stopped and no longer accepts requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("refresh scheduler has stopped")]
pub struct SchedulerStopped;

#[derive(Debug)]
enum Command {
    Schedule {
        target: RefreshTarget,
        reason: RefreshReason,
        delay: Duration,
    },
    Shutdown,
}

/// Cloneable handle for requesting refreshes and observing their outcome.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<RefreshEvent>,
    stagger_offsets: Arc<[Duration]>,
}

impl RefreshHandle {
    /// Request a refresh of `target` as soon as possible.
    pub fn schedule_refresh(
        &self,
        target: RefreshTarget,
        reason: RefreshReason,
    ) -> Result<(), SchedulerStopped> {
        self.schedule_after(target, reason, Duration::ZERO)
    }

    /// Request a refresh of `target` after `delay`.
    pub fn schedule_after(
        &self,
        target: RefreshTarget,
        reason: RefreshReason,
        delay: Duration,
    ) -> Result<(), SchedulerStopped> {
        self.commands
            .send(Command::Schedule {
                target,
                reason,
                delay,
            })
            .map_err(|_closed| SchedulerStopped)
    }

    /// Request the configured series of follow-up reads of `index`.
    pub fn schedule_staggered(&self, index: TileIndex) -> Result<(), SchedulerStopped> {
        for &offset in self.stagger_offsets.iter() {
            self.schedule_after(RefreshTarget::Tile(index), RefreshReason::PostAction, offset)?;
        }
        Ok(())
    }

    /// Subscribe to refresh outcomes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Ask the scheduler task to exit after its current read.
    pub fn shutdown(&self) {
        // Already stopped is fine.
        let _ = self.commands.send(Command::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// Scheduler task
// ---------------------------------------------------------------------------

/// Background refresh task builder.
#[derive(Debug)]
pub struct RefreshScheduler<B> {
    config: RefreshConfig,
    backend: Arc<B>,
    cache: SharedTileCache,
    player: PlayerAddress,
    synced_clock: Option<Arc<SyncedClock>>,
}

impl<B: FarmBackend> RefreshScheduler<B> {
    /// Create a scheduler for `player`'s farm.
    pub const fn new(
        config: RefreshConfig,
        backend: Arc<B>,
        cache: SharedTileCache,
        player: PlayerAddress,
    ) -> Self {
        Self {
            config,
            backend,
            cache,
            player,
            synced_clock: None,
        }
    }

    /// Resynchronize `clock` against the backend's chain time on every
    /// periodic refresh, if enabled in the config.
    #[must_use]
    pub fn with_clock_sync(mut self, clock: Arc<SyncedClock>) -> Self {
        self.synced_clock = Some(clock);
        self
    }

    /// Spawn the scheduler task. It performs a startup read of every tile
    /// immediately.
    pub fn spawn(self) -> (RefreshHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let handle = RefreshHandle {
            commands,
            events: events.clone(),
            stagger_offsets: self.config.stagger_offsets().into(),
        };
        let task = tokio::spawn(self.run(rx, events));
        (handle, task)
    }

    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        events: broadcast::Sender<RefreshEvent>,
    ) {
        let mut queue = RefreshQueue::new(self.config.coalesce_window());
        let start = Instant::now();
        queue.push(RefreshTarget::All, RefreshReason::Startup, start);
        let mut next_periodic = self.next_periodic(start);

        info!(
            player = %self.player,
            interval_ms = self.config.periodic_interval_ms,
            "Refresh scheduler started"
        );

        loop {
            let wake = queue.next_due().map_or(next_periodic, |d| d.min(next_periodic));
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Schedule { target, reason, delay }) => {
                        let due = after(Instant::now(), delay);
                        if !queue.push(target, reason, due) {
                            debug!(%target, reason = reason.as_str(), "Refresh coalesced");
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                () = sleep_until(wake) => {
                    let now = Instant::now();
                    if now >= next_periodic {
                        queue.push(RefreshTarget::All, RefreshReason::Periodic, now);
                        next_periodic = self.next_periodic(now);
                        self.sync_clock().await;
                    }
                    let due = queue.take_due(now);
                    let outcomes = join_all(
                        due.into_iter()
                            .map(|(target, reason)| self.refresh(target, reason)),
                    )
                    .await;
                    for event in outcomes {
                        // No subscribers is fine.
                        let _ = events.send(event);
                    }
                }
            }
        }

        info!(player = %self.player, "Refresh scheduler stopped");
    }

    fn next_periodic(&self, now: Instant) -> Instant {
        let delay = self
            .config
            .periodic_interval()
            .saturating_add(jitter(self.config.jitter()));
        after(now, delay)
    }

    async fn sync_clock(&self) {
        if !self.config.sync_clock {
            return;
        }
        let Some(clock) = &self.synced_clock else {
            return;
        };
        match timeout(self.config.read_timeout(), self.backend.read_chain_time()).await {
            Ok(Ok(chain_time)) => {
                let offset = clock.observe_trusted(chain_time);
                debug!(offset_secs = offset, "Clock synchronized to chain time");
            }
            Ok(Err(e)) => warn!(error = %e, "Chain time read failed"),
            Err(_) => warn!("Chain time read timed out"),
        }
    }

    async fn refresh(&self, target: RefreshTarget, reason: RefreshReason) -> RefreshEvent {
        let stamp = self.cache.issue_stamp().await;
        let read_timeout = self.config.read_timeout();

        let result: Result<Vec<(TileIndex, ApplyOutcome)>, String> = match target {
            RefreshTarget::Tile(index) => {
                match timeout(read_timeout, self.backend.read_tile(&self.player, index)).await {
                    Ok(Ok(record)) => {
                        let outcome = self.cache.apply(record, stamp).await;
                        Ok(vec![(index, outcome)])
                    }
                    Ok(Err(e)) => Err(describe(&e)),
                    Err(_) => Err(timed_out(read_timeout)),
                }
            }
            RefreshTarget::All => {
                match timeout(read_timeout, self.backend.read_all_tiles(&self.player)).await {
                    Ok(Ok(records)) => Ok(self.cache.apply_full(records, stamp).await),
                    Ok(Err(e)) => Err(describe(&e)),
                    Err(_) => Err(timed_out(read_timeout)),
                }
            }
        };

        match result {
            Ok(outcomes) => {
                let changed = outcomes
                    .iter()
                    .filter(|(_, o)| matches!(o, ApplyOutcome::Inserted | ApplyOutcome::Updated))
                    .count();
                let superseded = outcomes
                    .iter()
                    .filter(|(_, o)| *o == ApplyOutcome::Superseded)
                    .count();
                debug!(
                    %target,
                    reason = reason.as_str(),
                    %stamp,
                    changed,
                    superseded,
                    "Refresh applied"
                );
                RefreshEvent::Completed {
                    target,
                    reason,
                    changed,
                    superseded,
                }
            }
            Err(error) => {
                warn!(%target, reason = reason.as_str(), error = %error, "Refresh failed");
                RefreshEvent::Failed {
                    target,
                    reason,
                    error,
                }
            }
        }
    }
}

fn describe(error: &BackendError) -> String {
    error.to_string()
}

fn timed_out(after: Duration) -> String {
    format!("read timed out after {}ms", after.as_millis())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn duplicate_request_within_window_coalesces() {
        let base = Instant::now();
        let mut queue = RefreshQueue::new(WINDOW);
        let tile = RefreshTarget::Tile(TileIndex(2));

        assert!(queue.push(tile, RefreshReason::PostAction, after(base, secs(1))));
        assert!(!queue.push(
            tile,
            RefreshReason::Manual,
            after(base, Duration::from_millis(1_200))
        ));
        assert!(queue.push(tile, RefreshReason::PostAction, after(base, secs(2))));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn pending_all_covers_tiles() {
        let base = Instant::now();
        let mut queue = RefreshQueue::new(WINDOW);
        assert!(queue.push(RefreshTarget::All, RefreshReason::Periodic, base));
        assert!(!queue.push(
            RefreshTarget::Tile(TileIndex(0)),
            RefreshReason::Manual,
            base
        ));
    }

    #[test]
    fn different_tiles_do_not_coalesce() {
        let base = Instant::now();
        let mut queue = RefreshQueue::new(WINDOW);
        assert!(queue.push(RefreshTarget::Tile(TileIndex(0)), RefreshReason::Manual, base));
        assert!(queue.push(RefreshTarget::Tile(TileIndex(1)), RefreshReason::Manual, base));
    }

    #[test]
    fn due_all_subsumes_tiles() {
        let base = Instant::now();
        let mut queue = RefreshQueue::new(Duration::ZERO);
        queue.push(RefreshTarget::Tile(TileIndex(0)), RefreshReason::Manual, base);
        queue.push(RefreshTarget::Tile(TileIndex(1)), RefreshReason::Manual, base);
        queue.push(
            RefreshTarget::All,
            RefreshReason::Periodic,
            after(base, Duration::from_millis(10)),
        );
        queue.push(RefreshTarget::Tile(TileIndex(2)), RefreshReason::Manual, after(base, secs(5)));

        let due = queue.take_due(after(base, secs(1)));
        assert_eq!(due, vec![(RefreshTarget::All, RefreshReason::Periodic)]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(after(base, secs(5))));
    }

    #[test]
    fn take_due_leaves_future_entries() {
        let base = Instant::now();
        let mut queue = RefreshQueue::new(WINDOW);
        for n in 1..=4 {
            queue.push(
                RefreshTarget::Tile(TileIndex(0)),
                RefreshReason::PostAction,
                after(base, secs(n)),
            );
        }
        let due = queue.take_due(after(base, secs(2)));
        assert_eq!(due, vec![(RefreshTarget::Tile(TileIndex(0)), RefreshReason::PostAction)]);
        assert_eq!(queue.len(), 2);
        assert!(queue.take_due(base).is_empty());
    }

    #[test]
    fn jitter_stays_in_range() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(secs(2)) <= secs(2));
        }
    }
}
