// ── Locale, memory and power ──────────────────────────────────────────────────

use super::{last_error, Locale, Memory, Power};
use crate::error::{ErrorCode, Result};
use crate::memory::MemoryInfo;
use crate::platform::{LocaleSys, MemorySys, PowerSys};
use crate::power::PowerStatus;

// ── Locale ────────────────────────────────────────────────────────────────────

impl LocaleSys for Locale {
    /// First non-empty of `LC_ALL`, `LC_MESSAGES`, `LANG`; `C` otherwise.
    fn current() -> Result<String> {
        Ok(["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
            .unwrap_or_else(|| "C".to_owned()))
    }
}

// ── Memory ────────────────────────────────────────────────────────────────────

fn sysconf(name: libc::c_int, what: &str) -> Result<u64> {
    // SAFETY: sysconf has no memory-safety preconditions.
    let value = unsafe { libc::sysconf(name) };
    u64::try_from(value).map_err(|_| last_error(what, ErrorCode::PlatformError))
}

impl MemorySys for Memory {
    fn info() -> Result<MemoryInfo> {
        let page = sysconf(libc::_SC_PAGESIZE, "sysconf(_SC_PAGESIZE)")?;
        let total = sysconf(libc::_SC_PHYS_PAGES, "sysconf(_SC_PHYS_PAGES)")? * page;

        #[cfg(any(target_os = "linux", target_os = "android"))]
        let available = sysconf(libc::_SC_AVPHYS_PAGES, "sysconf(_SC_AVPHYS_PAGES)")
            .ok()
            .map(|pages| pages * page);
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let available = None;

        Ok(MemoryInfo { total, available })
    }

    fn page_size() -> Result<usize> {
        let page = sysconf(libc::_SC_PAGESIZE, "sysconf(_SC_PAGESIZE)")?;
        Ok(page as usize)
    }
}

// ── Power ─────────────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
mod supply {
    use std::fs;
    use std::path::Path;

    use crate::power::{PowerSource, PowerStatus};

    const ROOT: &str = "/sys/class/power_supply";

    fn attr(dir: &Path, name: &str) -> Option<String> {
        fs::read_to_string(dir.join(name)).ok().map(|s| s.trim().to_owned())
    }

    /// Summarise every supply under sysfs.  Machines without any report an
    /// unknown source rather than an error.
    pub(super) fn status() -> PowerStatus {
        let Ok(entries) = fs::read_dir(ROOT) else {
            return PowerStatus::default();
        };

        let mut mains_online = false;
        let mut discharging = false;
        let mut has_battery = false;
        let mut percent: Option<u8> = None;

        for entry in entries.flatten() {
            let dir = entry.path();
            match attr(&dir, "type").as_deref() {
                Some("Mains") => mains_online |= attr(&dir, "online").as_deref() == Some("1"),
                Some("Battery") => {
                    has_battery = true;
                    discharging |= attr(&dir, "status").as_deref() == Some("Discharging");
                    if percent.is_none() {
                        percent = attr(&dir, "capacity")
                            .and_then(|c| c.parse::<u8>().ok())
                            .map(|c| c.min(100));
                    }
                }
                _ => {}
            }
        }

        let source = if discharging {
            PowerSource::Battery
        } else if mains_online || has_battery {
            PowerSource::Ac
        } else {
            PowerSource::Unknown
        };
        PowerStatus { source, battery_percent: percent }
    }
}

impl PowerSys for Power {
    #[cfg(target_os = "linux")]
    fn status() -> Result<PowerStatus> {
        Ok(supply::status())
    }

    #[cfg(not(target_os = "linux"))]
    fn status() -> Result<PowerStatus> {
        Err(crate::error::Error::unsupported("power status"))
    }
}
