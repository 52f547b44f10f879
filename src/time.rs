// ── Clocks and sleeping ───────────────────────────────────────────────────────
//
// Two clocks:
//   • the monotonic tick counter, in nanoseconds since an arbitrary epoch,
//     for measuring intervals; immune to wall-clock adjustment
//   • the wall clock, as a duration since the Unix epoch
//
// Two sleeps:
//   • `sleep` hands the thread to the scheduler and may overshoot by
//     whatever the scheduler adds
//   • `sleep_precise` sleeps coarsely until shortly before the deadline,
//     then yields in a loop on the tick counter until it is reached

use std::time::Duration;

use crate::error::{Record, Result};
use crate::platform::{Clock, ClockSys, ThreadSys, Threads};

/// How far before the deadline `sleep_precise` stops trusting the scheduler.
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Monotonic tick count.  One tick is one nanosecond.
pub fn ticks() -> Result<u64> {
    Clock::ticks().record()
}

/// Resolution of [`ticks`].
pub const fn ticks_per_second() -> u64 {
    1_000_000_000
}

/// Time elapsed since the Unix epoch, per the system's wall clock.
pub fn wall_clock() -> Result<Duration> {
    Clock::wall_clock().record()
}

/// Block the calling thread for at least `duration`.
pub fn sleep(duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Ok(());
    }
    Clock::sleep(duration).record()
}

/// Block the calling thread for `duration`, keeping the overshoot small.
pub fn sleep_precise(duration: Duration) -> Result<()> {
    let start = ticks()?;
    let deadline = start.saturating_add(duration_ticks(duration));

    if duration > SPIN_THRESHOLD {
        sleep(duration - SPIN_THRESHOLD)?;
    }
    while ticks()? < deadline {
        Threads::yield_now();
    }
    Ok(())
}

fn duration_ticks(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

// ── Stopwatch ─────────────────────────────────────────────────────────────────

/// Interval timer on top of the tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopwatch {
    start: u64,
}

impl Stopwatch {
    /// A stopwatch running from now.
    pub fn start() -> Result<Self> {
        Ok(Self { start: ticks()? })
    }

    /// Time since the stopwatch was started or last reset.
    pub fn elapsed(&self) -> Result<Duration> {
        let now = ticks()?;
        Ok(Duration::from_nanos(now.saturating_sub(self.start)))
    }

    /// Restart from now; returns the time elapsed before the restart.
    pub fn lap(&mut self) -> Result<Duration> {
        let now = ticks()?;
        let lap = Duration::from_nanos(now.saturating_sub(self.start));
        self.start = now;
        Ok(lap)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.start = ticks()?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, not(oskit_backend = "fallback")))]
mod tests {
    use super::*;

    /// Run `sleeper` three times and return the smallest overshoot seen.
    /// Shared CI machines stall occasionally; one good attempt is enough to
    /// show the mechanism works.
    fn best_overshoot(target: Duration, sleeper: fn(Duration) -> Result<()>) -> Duration {
        (0..3)
            .map(|_| {
                let watch = Stopwatch::start().expect("start");
                sleeper(target).expect("sleep");
                let elapsed = watch.elapsed().expect("elapsed");
                assert!(elapsed >= target, "woke early: {elapsed:?} < {target:?}");
                elapsed - target
            })
            .min()
            .unwrap_or(Duration::MAX)
    }

    #[test]
    fn ticks_advance_across_sleep() {
        let first = ticks().expect("ticks");
        sleep(Duration::from_millis(10)).expect("sleep");
        let second = ticks().expect("ticks");
        assert!(second > first);
        assert!(second - first >= 10_000_000);
    }

    #[test]
    fn coarse_sleep_overshoot_is_loosely_bounded() {
        let over = best_overshoot(Duration::from_millis(20), sleep);
        assert!(over < Duration::from_millis(30), "overshoot {over:?}");
    }

    #[test]
    fn precise_sleep_overshoot_is_tight() {
        let over = best_overshoot(Duration::from_millis(20), sleep_precise);
        assert!(over < Duration::from_millis(5), "overshoot {over:?}");
    }

    #[test]
    fn zero_sleeps_return_immediately() {
        sleep(Duration::ZERO).expect("sleep");
        sleep_precise(Duration::ZERO).expect("sleep_precise");
    }

    #[test]
    fn wall_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(wall_clock().expect("wall clock").as_secs() > 1_577_836_800);
    }

    #[test]
    fn stopwatch_laps() {
        let mut watch = Stopwatch::start().expect("start");
        sleep(Duration::from_millis(5)).expect("sleep");
        let lap = watch.lap().expect("lap");
        assert!(lap >= Duration::from_millis(5));
        assert!(watch.elapsed().expect("elapsed") < lap + Duration::from_millis(50));
    }
}

#[cfg(all(test, oskit_backend = "fallback"))]
mod fallback_tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn clocks_are_unsupported() {
        assert_eq!(ticks().expect_err("ticks").code, ErrorCode::UnsupportedOperation);
        assert_eq!(
            sleep(Duration::from_millis(1)).expect_err("sleep").code,
            ErrorCode::UnsupportedOperation
        );
        crate::error::clear();
    }
}
