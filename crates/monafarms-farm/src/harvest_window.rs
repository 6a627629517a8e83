//! UTC hour ranges during which certain crops may be harvested.
//!
//! A window is half-open (`start_hour` inclusive, `end_hour` exclusive)
//! and may wrap midnight, e.g. 22:00 to 04:00. A window whose start and
//! end coincide is open all day.

use chrono::{DateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Seconds in one hour.
const SECS_PER_HOUR: u64 = 3_600;

/// Seconds in one day.
const SECS_PER_DAY: u64 = 86_400;

/// Hours in one day.
const HOURS_PER_DAY: u8 = 24;

/// A daily UTC hour range during which harvesting is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestWindow {
    start_hour: u8,
    end_hour: u8,
}

impl HarvestWindow {
    /// Create a window from UTC hours. Hours are taken modulo 24.
    pub const fn utc(start_hour: u8, end_hour: u8) -> Self {
        Self {
            start_hour: start_hour % HOURS_PER_DAY,
            end_hour: end_hour % HOURS_PER_DAY,
        }
    }

    /// First hour of the window.
    pub const fn start_hour(self) -> u8 {
        self.start_hour
    }

    /// First hour after the window closes.
    pub const fn end_hour(self) -> u8 {
        self.end_hour
    }

    /// Whether the window is open at unix time `now`.
    pub fn contains(self, now: u64) -> bool {
        let Some(hour) = utc_hour(now) else {
            return false;
        };
        match self.start_hour.cmp(&self.end_hour) {
            core::cmp::Ordering::Equal => true,
            core::cmp::Ordering::Less => hour >= self.start_hour && hour < self.end_hour,
            core::cmp::Ordering::Greater => hour >= self.start_hour || hour < self.end_hour,
        }
    }

    /// Seconds from `now` until the window next opens; 0 if open now.
    pub fn seconds_until_open(self, now: u64) -> u64 {
        if self.contains(now) {
            return 0;
        }
        let since_midnight = now.checked_rem(SECS_PER_DAY).unwrap_or(0);
        let opens_at = u64::from(self.start_hour).saturating_mul(SECS_PER_HOUR);
        if opens_at > since_midnight {
            opens_at.saturating_sub(since_midnight)
        } else {
            SECS_PER_DAY
                .saturating_sub(since_midnight)
                .saturating_add(opens_at)
        }
    }
}

impl core::fmt::Display for HarvestWindow {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}:00-{:02}:00 UTC", self.start_hour, self.end_hour)
    }
}

/// UTC hour of day for a unix timestamp, or `None` if out of range.
fn utc_hour(now: u64) -> Option<u8> {
    let secs = i64::try_from(now).ok()?;
    let at = DateTime::from_timestamp(secs, 0)?;
    u8::try_from(at.hour()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-01-01T00:00:00Z.
    const MIDNIGHT: u64 = 1_704_067_200;

    fn at_hour(hour: u64) -> u64 {
        MIDNIGHT + hour * SECS_PER_HOUR
    }

    #[test]
    fn simple_window() {
        let w = HarvestWindow::utc(9, 17);
        assert!(!w.contains(at_hour(8)));
        assert!(w.contains(at_hour(9)));
        assert!(w.contains(at_hour(16) + 3_599));
        assert!(!w.contains(at_hour(17)));
    }

    #[test]
    fn wrapping_window() {
        let w = HarvestWindow::utc(22, 4);
        assert!(w.contains(at_hour(22)));
        assert!(w.contains(at_hour(23)));
        assert!(w.contains(at_hour(0)));
        assert!(w.contains(at_hour(3)));
        assert!(!w.contains(at_hour(4)));
        assert!(!w.contains(at_hour(12)));
    }

    #[test]
    fn equal_bounds_means_always_open() {
        let w = HarvestWindow::utc(5, 5);
        for hour in 0..24 {
            assert!(w.contains(at_hour(hour)));
        }
    }

    #[test]
    fn seconds_until_open_same_day() {
        let w = HarvestWindow::utc(22, 4);
        assert_eq!(w.seconds_until_open(at_hour(20)), 2 * SECS_PER_HOUR);
        assert_eq!(w.seconds_until_open(at_hour(23)), 0);
    }

    #[test]
    fn seconds_until_open_next_day() {
        let w = HarvestWindow::utc(2, 3);
        assert_eq!(w.seconds_until_open(at_hour(5)), 21 * SECS_PER_HOUR);
    }

    #[test]
    fn hours_are_taken_modulo_day() {
        let w = HarvestWindow::utc(25, 26);
        assert_eq!(w.start_hour(), 1);
        assert_eq!(w.end_hour(), 2);
        assert_eq!(w.to_string(), "01:00-02:00 UTC");
    }

    #[test]
    fn serializes_as_hour_pair() {
        let w = HarvestWindow::utc(22, 4);
        let json = serde_json::to_string(&w).ok();
        assert_eq!(json.as_deref(), Some(r#"{"start_hour":22,"end_hour":4}"#));
        let back: Option<HarvestWindow> = json.and_then(|j| serde_json::from_str(&j).ok());
        assert_eq!(back, Some(w));
    }
}
