// ── Clocks (clock_gettime / nanosleep) ────────────────────────────────────────

use std::io;
use std::time::Duration;

use super::{last_error, os_error, Clock};
use crate::error::{Error, ErrorCode, Result};
use crate::platform::ClockSys;

fn clock_now(clock: libc::clockid_t, name: &str) -> Result<libc::timespec> {
    // SAFETY: `timespec` is plain old data; all-zero is valid.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: `ts` is a valid out-pointer.
    if unsafe { libc::clock_gettime(clock, &mut ts) } < 0 {
        return Err(last_error(name, ErrorCode::PlatformError));
    }
    Ok(ts)
}

impl ClockSys for Clock {
    fn ticks() -> Result<u64> {
        let ts = clock_now(libc::CLOCK_MONOTONIC, "clock_gettime(CLOCK_MONOTONIC)")?;
        Ok(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
    }

    fn wall_clock() -> Result<Duration> {
        let ts = clock_now(libc::CLOCK_REALTIME, "clock_gettime(CLOCK_REALTIME)")?;
        let secs = u64::try_from(ts.tv_sec).map_err(|_| {
            Error::new(ErrorCode::OutOfRange, "wall clock is set before the Unix epoch")
        })?;
        Ok(Duration::new(secs, ts.tv_nsec as u32))
    }

    fn sleep(duration: Duration) -> Result<()> {
        // SAFETY: `timespec` is plain old data; all-zero is valid.
        let mut remaining: libc::timespec = unsafe { std::mem::zeroed() };
        remaining.tv_sec = libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX);
        remaining.tv_nsec = duration.subsec_nanos() as _;
        loop {
            let request = remaining;
            // SAFETY: both pointers are valid for the duration of the call.
            if unsafe { libc::nanosleep(&request, &mut remaining) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(os_error("nanosleep", err, ErrorCode::PlatformError));
            }
        }
    }
}
