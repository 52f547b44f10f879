// ── Clocks ────────────────────────────────────────────────────────────────────

use std::time::Duration;

use windows::Win32::System::Performance::{QueryPerformanceCounter, QueryPerformanceFrequency};
use windows::Win32::System::SystemInformation::GetSystemTimePreciseAsFileTime;
use windows::Win32::System::Threading::Sleep;

use super::{win_error, Clock};
use crate::error::{Error, ErrorCode, Result};
use crate::platform::ClockSys;

/// 100 ns intervals between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_OFFSET: u64 = 116_444_736_000_000_000;

impl ClockSys for Clock {
    fn ticks() -> Result<u64> {
        let mut count = 0i64;
        let mut frequency = 0i64;
        // SAFETY: both are valid out-pointers.
        unsafe {
            QueryPerformanceCounter(&mut count)
                .and_then(|()| QueryPerformanceFrequency(&mut frequency))
        }
        .map_err(|e| win_error("QueryPerformanceCounter", e, ErrorCode::PlatformError))?;
        if frequency <= 0 {
            return Err(Error::new(ErrorCode::PlatformError, "performance counter unavailable"));
        }
        let nanos = count as u128 * 1_000_000_000 / frequency as u128;
        Ok(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    fn wall_clock() -> Result<Duration> {
        // SAFETY: no preconditions.
        let ft = unsafe { GetSystemTimePreciseAsFileTime() };
        let intervals = (u64::from(ft.dwHighDateTime) << 32) | u64::from(ft.dwLowDateTime);
        let since_epoch = intervals.checked_sub(FILETIME_UNIX_OFFSET).ok_or_else(|| {
            Error::new(ErrorCode::OutOfRange, "wall clock is set before the Unix epoch")
        })?;
        Ok(Duration::from_nanos(since_epoch.saturating_mul(100)))
    }

    fn sleep(duration: Duration) -> Result<()> {
        // Round up so the sleep is never shorter than asked.
        let millis = duration.as_nanos().div_ceil(1_000_000);
        // SAFETY: no preconditions.
        unsafe { Sleep(u32::try_from(millis).unwrap_or(u32::MAX - 1)) };
        Ok(())
    }
}
