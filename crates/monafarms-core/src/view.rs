//! Render-ready projections of the cached farm.
//!
//! Derived state is recomputed locally from cached records and the clock,
//! never fetched. [`spawn_view_loop`] keeps a [`FarmView`] current by
//! recomputing on every clock tick and every cache change, and publishes it
//! through a `watch` channel only when something visible changed.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use monafarms_farm::{catalog, classify, compute_view_state, seconds_until_ready};
use monafarms_types::{FarmView, TileView};

use crate::cache::{CachedTile, SharedTileCache};
use crate::clock::TimeSource;

/// Project one cached tile at `now`.
pub fn project_tile(entry: &CachedTile, now: u64) -> TileView {
    let record = &entry.record;
    let crop = record.crop();
    TileView {
        index: record.index,
        crop,
        crop_name: crop.map(|c| catalog::name_of(c).to_owned()),
        state: compute_view_state(record, now),
        stage: classify(record, now),
        seconds_until_ready: seconds_until_ready(record, now),
        seconds_until_window: crop
            .and_then(catalog::harvest_window_of)
            .map(|w| w.seconds_until_open(now)),
        locked: record.is_locked,
        stale: entry.stale,
    }
}

/// Project every cached tile at `now`, ordered by index.
pub fn project(entries: &[CachedTile], now: u64) -> FarmView {
    FarmView {
        now,
        tiles: entries.iter().map(|e| project_tile(e, now)).collect(),
    }
}

/// Spawn a task that keeps a [`FarmView`] current.
///
/// The task exits once every receiver has been dropped.
pub fn spawn_view_loop<C>(
    cache: SharedTileCache,
    clock: C,
    tick: Duration,
) -> (watch::Receiver<FarmView>, JoinHandle<()>)
where
    C: TimeSource + 'static,
{
    let (tx, rx) = watch::channel(FarmView::default());
    let task = tokio::spawn(async move {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut events = cache.subscribe();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = tx.closed() => break,
                event = events.recv() => match event {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "View loop lagged behind cache events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }

            let entries = cache.snapshot_entries().await;
            let view = project(&entries, clock.now());
            tx.send_if_modified(|current| {
                if *current == view {
                    false
                } else {
                    *current = view;
                    true
                }
            });
        }
        debug!("View loop stopped");
    });
    (rx, task)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use monafarms_farm::catalog::{MOONFLOWER, WHEAT};
    use monafarms_types::{TileIndex, TileRecord, TileStage, ViewState};

    use super::*;
    use crate::clock::ManualClock;

    /// 2024-01-01T12:00:00Z.
    const NOON: u64 = 1_704_110_400;

    fn growing(index: u32, crop: monafarms_types::CropId) -> TileRecord {
        TileRecord {
            planted_crop: crop,
            planted_at: NOON,
            maturity_time: NOON + 3_600,
            water_count: 1,
            last_watered_at: NOON,
            ..TileRecord::empty(TileIndex(index))
        }
    }

    #[test]
    fn projects_growth_and_countdown() {
        let mut cache = crate::cache::TileStateCache::new();
        cache.set(TileIndex(0), growing(0, WHEAT));
        cache.set(TileIndex(1), TileRecord::empty(TileIndex(1)));

        let view = project(&cache.snapshot_entries(), NOON + 900);
        assert_eq!(view.tiles.len(), 2);

        let wheat = view.tiles.first().unwrap();
        assert_eq!(wheat.crop_name.as_deref(), Some("Wheat"));
        assert_eq!(wheat.state, ViewState::Growing { percent: 25 });
        assert_eq!(wheat.stage, TileStage::GrowingWatered);
        assert_eq!(wheat.seconds_until_ready, 2_700);
        assert_eq!(wheat.seconds_until_window, None);

        let empty = view.tiles.get(1).unwrap();
        assert_eq!(empty.crop, None);
        assert_eq!(empty.state, ViewState::Empty);
    }

    #[test]
    fn window_countdown_for_restricted_crop() {
        let mut cache = crate::cache::TileStateCache::new();
        cache.set(TileIndex(0), growing(0, MOONFLOWER));
        let view = project(&cache.snapshot_entries(), NOON);
        // Noon to 22:00 UTC.
        assert_eq!(view.tiles.first().unwrap().seconds_until_window, Some(10 * 3_600));
    }

    #[test]
    fn stale_flag_is_carried() {
        let mut cache = crate::cache::TileStateCache::new();
        cache.set(TileIndex(0), growing(0, WHEAT));
        cache.invalidate(TileIndex(0));
        let view = project(&cache.snapshot_entries(), NOON);
        assert!(view.tiles.first().unwrap().stale);
    }

    #[tokio::test(start_paused = true)]
    async fn view_loop_follows_clock_and_cache() {
        let cache = SharedTileCache::new();
        let clock = Arc::new(ManualClock::new(NOON));
        let (mut rx, task) = spawn_view_loop(cache.clone(), Arc::clone(&clock), Duration::from_secs(1));

        cache.set(TileIndex(0), growing(0, WHEAT)).await;
        let view = rx.wait_for(|v| v.tiles.len() == 1).await.unwrap().clone();
        assert_eq!(
            view.tiles.first().unwrap().state,
            ViewState::Growing { percent: 0 }
        );

        clock.set(NOON + 3_600);
        let view = rx
            .wait_for(|v| v.tiles.first().is_some_and(|t| t.state == ViewState::Ready))
            .await
            .unwrap()
            .clone();
        assert_eq!(view.now, NOON + 3_600);

        drop(rx);
        task.await.unwrap();
    }
}
