// ── Power supply ──────────────────────────────────────────────────────────────

use serde::Serialize;

use crate::error::{Record, Result};
use crate::platform::{Power, PowerSys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerSource {
    #[default]
    Unknown,
    Battery,
    Ac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PowerStatus {
    pub source: PowerSource,
    /// 0..=100, `None` without a battery or when the level is unknown.
    pub battery_percent: Option<u8>,
}

/// Current power source and battery charge.
pub fn status() -> Result<PowerStatus> {
    Power::status().record()
}

#[cfg(all(test, any(oskit_backend = "win32", all(oskit_backend = "posix", target_os = "linux"))))]
mod tests {
    use super::*;

    #[test]
    fn battery_percent_is_in_range() {
        let status = status().expect("power status");
        if let Some(percent) = status.battery_percent {
            assert!(percent <= 100);
        }
    }

    #[test]
    fn status_serializes() {
        let json = serde_json::to_value(PowerStatus {
            source: PowerSource::Ac,
            battery_percent: Some(80),
        })
        .expect("serialize");
        assert_eq!(json["source"], "AC");
        assert_eq!(json["battery_percent"], 80);
    }
}
