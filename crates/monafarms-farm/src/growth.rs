//! Derived growth state: tile record plus current time in, view state out.
//!
//! Everything here is pure. The functions never read a clock and never
//! touch the backend, so identical inputs always produce identical
//! outputs.
//!
//! Readiness is monotonic: once [`compute_view_state`] reports
//! [`ViewState::Ready`] at some `now`, it reports `Ready` for every later
//! `now` until the record itself changes (a harvest resets `planted_at`).

use monafarms_types::{TileRecord, TileStage, ViewState};

/// Percentage reported for a mature crop.
const FULL: u64 = 100;

/// Compute what the UI should show for `tile` at unix time `now`.
///
/// A record whose maturity does not lie after its planting time has no
/// meaningful growth window and is treated as ready.
pub fn compute_view_state(tile: &TileRecord, now: u64) -> ViewState {
    if tile.is_empty() {
        return ViewState::Empty;
    }
    if tile.maturity_time <= tile.planted_at || now >= tile.maturity_time {
        return ViewState::Ready;
    }
    if tile.water_count == 0 && !tile.is_fertilized {
        return ViewState::NeedsWater;
    }
    ViewState::Growing {
        percent: growth_percent(tile.planted_at, tile.maturity_time, now),
    }
}

/// Classify `tile` into its lifecycle stage at `now`.
pub fn classify(tile: &TileRecord, now: u64) -> TileStage {
    match compute_view_state(tile, now) {
        ViewState::Empty => TileStage::Empty,
        ViewState::Ready => TileStage::Ready,
        ViewState::NeedsWater | ViewState::Growing { .. } => {
            if tile.is_fertilized {
                TileStage::Fertilized
            } else if tile.water_count > 0 {
                TileStage::GrowingWatered
            } else {
                TileStage::GrowingUnwatered
            }
        }
    }
}

/// Seconds until `tile` becomes ready; 0 when empty or already ready.
pub fn seconds_until_ready(tile: &TileRecord, now: u64) -> u64 {
    match compute_view_state(tile, now) {
        ViewState::Empty | ViewState::Ready => 0,
        ViewState::NeedsWater | ViewState::Growing { .. } => {
            tile.maturity_time.saturating_sub(now)
        }
    }
}

/// Integer completion percentage, floored and clamped to `0..=100`.
///
/// Callers guarantee `maturity > planted`. A `now` before `planted` (clock
/// skew) counts as zero elapsed time.
fn growth_percent(planted: u64, maturity: u64, now: u64) -> u8 {
    let duration = maturity.saturating_sub(planted);
    if duration == 0 {
        return 100;
    }
    let elapsed = now.saturating_sub(planted).min(duration);
    let scaled = u128::from(elapsed).saturating_mul(u128::from(FULL));
    let percent = scaled.checked_div(u128::from(duration)).unwrap_or(0);
    u8::try_from(percent.min(u128::from(FULL))).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use monafarms_types::{CropId, TileIndex};

    use super::*;

    fn planted(planted_at: u64, maturity_time: u64, water_count: u32) -> TileRecord {
        TileRecord {
            planted_crop: CropId(1),
            planted_at,
            maturity_time,
            water_count,
            last_watered_at: if water_count > 0 { planted_at } else { 0 },
            ..TileRecord::empty(TileIndex(0))
        }
    }

    #[test]
    fn empty_tile_is_empty() {
        let tile = TileRecord::empty(TileIndex(0));
        assert_eq!(compute_view_state(&tile, 12_345), ViewState::Empty);
        assert_eq!(classify(&tile, 12_345), TileStage::Empty);
        assert_eq!(seconds_until_ready(&tile, 12_345), 0);
    }

    #[test]
    fn unwatered_tile_needs_water() {
        let tile = planted(100, 3_700, 0);
        assert_eq!(compute_view_state(&tile, 1_000), ViewState::NeedsWater);
        assert_eq!(classify(&tile, 1_000), TileStage::GrowingUnwatered);
    }

    #[test]
    fn watered_tile_reports_floor_percentage() {
        let tile = planted(1_000, 4_000, 1);
        assert_eq!(
            compute_view_state(&tile, 2_000),
            ViewState::Growing { percent: 33 }
        );
        assert_eq!(classify(&tile, 2_000), TileStage::GrowingWatered);
        assert_eq!(seconds_until_ready(&tile, 2_000), 2_000);
    }

    #[test]
    fn mature_tile_is_ready_even_without_water() {
        let tile = planted(1_000, 4_600, 0);
        assert_eq!(compute_view_state(&tile, 4_600), ViewState::Ready);
        assert_eq!(classify(&tile, 4_600), TileStage::Ready);
    }

    #[test]
    fn malformed_duration_is_ready() {
        let zero = planted(500, 500, 1);
        assert_eq!(compute_view_state(&zero, 0), ViewState::Ready);

        let negative = planted(500, 100, 0);
        assert_eq!(compute_view_state(&negative, 200), ViewState::Ready);
    }

    #[test]
    fn clock_before_planting_counts_as_zero() {
        let tile = planted(1_000, 2_000, 1);
        assert_eq!(
            compute_view_state(&tile, 10),
            ViewState::Growing { percent: 0 }
        );
    }

    #[test]
    fn fertilized_never_needs_water() {
        let tile = TileRecord {
            is_fertilized: true,
            ..planted(1_000, 4_600, 0)
        };
        assert_eq!(
            compute_view_state(&tile, 1_900),
            ViewState::Growing { percent: 25 }
        );
        assert_eq!(classify(&tile, 1_900), TileStage::Fertilized);
        assert_eq!(compute_view_state(&tile, 4_600), ViewState::Ready);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let tile = planted(10, 7_210, 2);
        let first = compute_view_state(&tile, 4_000);
        for _ in 0..10 {
            assert_eq!(compute_view_state(&tile, 4_000), first);
        }
    }

    #[test]
    fn percentage_bounded_and_non_decreasing() {
        let tile = planted(1_000, 4_600, 1);
        let mut last = 0_u8;
        for now in (0..6_000).step_by(37) {
            let percent = compute_view_state(&tile, now).percent();
            assert!(percent <= 100);
            assert!(percent >= last, "percent dropped at now={now}");
            last = percent;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn readiness_is_monotonic() {
        let tile = planted(50, 100, 1);
        let first_ready = (0..1_000)
            .find(|&now| compute_view_state(&tile, now) == ViewState::Ready)
            .unwrap_or(u64::MAX);
        assert_eq!(first_ready, 100);
        for now in first_ready..first_ready + 5_000 {
            assert_eq!(compute_view_state(&tile, now), ViewState::Ready);
        }
    }

    #[test]
    fn end_to_end_growth_and_harvest() {
        // planted_at = 0 reads as empty, so the scenario starts one second
        // into the epoch.
        let mut tile = planted(1, 3_601, 1);
        assert_eq!(
            compute_view_state(&tile, 1_801),
            ViewState::Growing { percent: 50 }
        );
        assert_eq!(compute_view_state(&tile, 3_601), ViewState::Ready);

        tile.planted_at = 0;
        assert_eq!(compute_view_state(&tile, 3_601), ViewState::Empty);
    }
}
