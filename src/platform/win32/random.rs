// ── Entropy (BCryptGenRandom) ─────────────────────────────────────────────────

use windows::Win32::Security::Cryptography::{
    BCryptGenRandom, BCRYPT_ALG_HANDLE, BCRYPT_USE_SYSTEM_PREFERRED_RNG,
};

use super::{win_error, Entropy};
use crate::error::{ErrorCode, Result};
use crate::platform::EntropySys;

impl EntropySys for Entropy {
    fn fill(buf: &mut [u8]) -> Result<()> {
        for chunk in buf.chunks_mut(u32::MAX as usize) {
            // SAFETY: `chunk` is a valid writable buffer; the system-preferred
            // RNG needs no algorithm handle.
            unsafe {
                BCryptGenRandom(BCRYPT_ALG_HANDLE::default(), chunk, BCRYPT_USE_SYSTEM_PREFERRED_RNG)
            }
            .ok()
            .map_err(|e| win_error("BCryptGenRandom", e, ErrorCode::PlatformError))?;
        }
        Ok(())
    }
}
