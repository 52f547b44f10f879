// ── Locale, memory and power ──────────────────────────────────────────────────

use windows::Win32::Globalization::GetUserDefaultLocaleName;
use windows::Win32::System::Power::{GetSystemPowerStatus, SYSTEM_POWER_STATUS};
use windows::Win32::System::SystemInformation::{
    GetSystemInfo, GlobalMemoryStatusEx, MEMORYSTATUSEX, SYSTEM_INFO,
};

use super::{win_error, Locale, Memory, Power};
use crate::error::{Error, ErrorCode, Result};
use crate::memory::MemoryInfo;
use crate::platform::{LocaleSys, MemorySys, PowerSys};
use crate::power::{PowerSource, PowerStatus};

/// `LOCALE_NAME_MAX_LENGTH`, including the terminator.
const LOCALE_NAME_LEN: usize = 85;

/// `SYSTEM_POWER_STATUS::BatteryFlag` bit meaning "no system battery".
const NO_SYSTEM_BATTERY: u8 = 128;
/// `SYSTEM_POWER_STATUS` value meaning "unknown".
const UNKNOWN: u8 = 255;

impl LocaleSys for Locale {
    fn current() -> Result<String> {
        let mut buf = [0u16; LOCALE_NAME_LEN];
        // SAFETY: `buf` is a valid, writable buffer of the documented size.
        let len = unsafe { GetUserDefaultLocaleName(&mut buf) };
        if len <= 0 {
            return Err(Error::from_os(
                "GetUserDefaultLocaleName",
                &std::io::Error::last_os_error(),
                ErrorCode::PlatformError,
            ));
        }
        // `len` counts the terminator.
        Ok(String::from_utf16_lossy(&buf[..len as usize - 1]))
    }
}

impl MemorySys for Memory {
    fn info() -> Result<MemoryInfo> {
        let mut status = MEMORYSTATUSEX {
            dwLength: std::mem::size_of::<MEMORYSTATUSEX>() as u32,
            ..Default::default()
        };
        // SAFETY: `status` is a valid out-pointer with `dwLength` set.
        unsafe { GlobalMemoryStatusEx(&mut status) }
            .map_err(|e| win_error("GlobalMemoryStatusEx", e, ErrorCode::PlatformError))?;
        Ok(MemoryInfo { total: status.ullTotalPhys, available: Some(status.ullAvailPhys) })
    }

    fn page_size() -> Result<usize> {
        let mut info = SYSTEM_INFO::default();
        // SAFETY: `info` is a valid out-pointer.
        unsafe { GetSystemInfo(&mut info) };
        Ok(info.dwPageSize as usize)
    }
}

impl PowerSys for Power {
    fn status() -> Result<PowerStatus> {
        let mut raw = SYSTEM_POWER_STATUS::default();
        // SAFETY: `raw` is a valid out-pointer.
        unsafe { GetSystemPowerStatus(&mut raw) }
            .map_err(|e| win_error("GetSystemPowerStatus", e, ErrorCode::PlatformError))?;

        let source = match raw.ACLineStatus {
            0 => PowerSource::Battery,
            1 => PowerSource::Ac,
            _ => PowerSource::Unknown,
        };
        let has_battery = raw.BatteryFlag != UNKNOWN && raw.BatteryFlag & NO_SYSTEM_BATTERY == 0;
        let battery_percent = (has_battery && raw.BatteryLifePercent <= 100)
            .then_some(raw.BatteryLifePercent);
        Ok(PowerStatus { source, battery_percent })
    }
}
