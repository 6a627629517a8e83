//! Time sources for countdowns and growth percentages.
//!
//! The client computes derived state locally on every tick instead of
//! asking the backend each second, so it needs a clock. Three are provided:
//!
//! - [`WallClock`] -- local system time.
//! - [`SyncedClock`] -- local time corrected by an offset learned from a
//!   trusted remote clock (the backend's chain time).
//! - [`ManualClock`] -- explicitly set, for tests and scripted sessions.
//!
//! Every clock is monotonic: `now` never returns a value smaller than one
//! it returned before, even if the underlying wall clock steps backwards or
//! a resync lowers the offset.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::Utc;

/// A source of the current unix time in seconds.
pub trait TimeSource: Send + Sync {
    /// Current unix time in seconds. Never decreases between calls.
    fn now(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// Raise `last` to at least `candidate` and return the resulting value.
fn monotonic(last: &AtomicU64, candidate: u64) -> u64 {
    let previous = last.fetch_max(candidate, Ordering::AcqRel);
    previous.max(candidate)
}

/// Local system time as unix seconds; pre-epoch readings clamp to 0.
fn system_now() -> u64 {
    u64::try_from(Utc::now().timestamp().max(0)).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// WallClock
// ---------------------------------------------------------------------------

/// Local wall-clock time.
#[derive(Debug, Default)]
pub struct WallClock {
    last: AtomicU64,
}

impl WallClock {
    /// Create a wall clock.
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> u64 {
        monotonic(&self.last, system_now())
    }
}

// ---------------------------------------------------------------------------
// SyncedClock
// ---------------------------------------------------------------------------

/// Local time corrected toward a trusted remote clock.
///
/// Until the first [`observe_trusted`](Self::observe_trusted) call the
/// offset is zero and the clock behaves like [`WallClock`].
#[derive(Debug, Default)]
pub struct SyncedClock {
    offset_secs: AtomicI64,
    synced: AtomicBool,
    last: AtomicU64,
}

impl SyncedClock {
    /// Create an unsynchronized clock.
    pub const fn new() -> Self {
        Self {
            offset_secs: AtomicI64::new(0),
            synced: AtomicBool::new(false),
            last: AtomicU64::new(0),
        }
    }

    /// Record a reading of the trusted clock and adopt its offset.
    ///
    /// Returns the new offset in seconds (trusted minus local).
    pub fn observe_trusted(&self, trusted_now: u64) -> i64 {
        let local = i128::from(system_now());
        let trusted = i128::from(trusted_now);
        let offset = trusted.saturating_sub(local);
        let offset = i64::try_from(offset).unwrap_or(if offset < 0 { i64::MIN } else { i64::MAX });
        self.offset_secs.store(offset, Ordering::Release);
        self.synced.store(true, Ordering::Release);
        offset
    }

    /// Whether a trusted reading has been observed.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Current offset in seconds (trusted minus local).
    pub fn offset_secs(&self) -> i64 {
        self.offset_secs.load(Ordering::Acquire)
    }
}

impl TimeSource for SyncedClock {
    fn now(&self) -> u64 {
        let local = system_now();
        let offset = self.offset_secs.load(Ordering::Acquire);
        let corrected = local.saturating_add_signed(offset);
        monotonic(&self.last, corrected)
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub const fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock to `to`. Ignored if `to` is earlier than the current
    /// reading.
    pub fn set(&self, to: u64) {
        self.now.fetch_max(to, Ordering::AcqRel);
    }

    /// Move the clock forward by `secs`. Returns the new reading.
    pub fn advance(&self, secs: u64) -> u64 {
        let mut current = self.now.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(secs);
            match self
                .now
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_never_rewinds() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(30), 1_030);
        clock.set(500);
        assert_eq!(clock.now(), 1_030);
        clock.set(2_000);
        assert_eq!(clock.now(), 2_000);
    }

    #[test]
    fn wall_clock_is_monotonic() {
        let clock = WallClock::new();
        let mut last = clock.now();
        for _ in 0..100 {
            let next = clock.now();
            assert!(next >= last);
            last = next;
        }
        assert!(last > 1_600_000_000);
    }

    #[test]
    fn synced_clock_applies_offset() {
        let clock = SyncedClock::new();
        assert!(!clock.is_synced());

        let local = system_now();
        let offset = clock.observe_trusted(local + 3_600);
        assert!(clock.is_synced());
        // Allow for the local clock ticking between the two readings.
        assert!((3_599..=3_600).contains(&offset));
        assert!(clock.now() >= local + 3_599);
    }

    #[test]
    fn synced_clock_does_not_rewind_on_lower_offset() {
        let clock = SyncedClock::new();
        let local = system_now();
        clock.observe_trusted(local + 10_000);
        let ahead = clock.now();

        clock.observe_trusted(local);
        assert!(clock.now() >= ahead);
    }

    #[test]
    fn arc_clock_delegates() {
        let clock = Arc::new(ManualClock::new(42));
        let source: &dyn TimeSource = &clock;
        assert_eq!(source.now(), 42);
    }
}
