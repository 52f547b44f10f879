// ── Physical memory ───────────────────────────────────────────────────────────

use serde::Serialize;

use crate::error::{Record, Result};
use crate::platform::{Memory, MemorySys};

/// Physical memory, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub total: u64,
    /// `None` where the OS does not report it cheaply.
    pub available: Option<u64>,
}

/// Installed and currently available physical memory.
pub fn info() -> Result<MemoryInfo> {
    Memory::info().record()
}

/// Size of a virtual memory page.
pub fn page_size() -> Result<usize> {
    Memory::page_size().record()
}

#[cfg(all(test, not(oskit_backend = "fallback")))]
mod tests {
    use super::*;

    #[test]
    fn totals_are_plausible() {
        let info = info().expect("memory info");
        assert!(info.total >= 16 * 1024 * 1024);
        if let Some(available) = info.available {
            assert!(available <= info.total);
        }
    }

    #[test]
    fn page_size_is_power_of_two() {
        let page = page_size().expect("page size");
        assert!(page >= 4096);
        assert!(page.is_power_of_two());
    }
}
