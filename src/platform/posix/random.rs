// ── Entropy ───────────────────────────────────────────────────────────────────
//
// getrandom(2) where the kernel has it, getentropy(3) on macOS / OpenBSD, and
// /dev/urandom elsewhere.  There is no weaker fallback: failures surface as
// PLATFORM_ERROR.

use super::Entropy;
use crate::error::Result;
use crate::platform::EntropySys;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
fn fill_os(mut buf: &mut [u8]) -> Result<()> {
    use super::{os_error, retry};
    use crate::error::ErrorCode;

    while !buf.is_empty() {
        // SAFETY: `buf` is valid for `buf.len()` writable bytes.
        let n = retry(|| unsafe { libc::getrandom(buf.as_mut_ptr().cast(), buf.len(), 0) })
            .map_err(|e| os_error("getrandom", e, ErrorCode::PlatformError))?;
        buf = &mut std::mem::take(&mut buf)[n as usize..];
    }
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "openbsd"))]
fn fill_os(buf: &mut [u8]) -> Result<()> {
    use super::last_error;
    use crate::error::ErrorCode;

    // getentropy serves at most 256 bytes per call.
    for chunk in buf.chunks_mut(256) {
        // SAFETY: `chunk` is valid for `chunk.len()` writable bytes.
        if unsafe { libc::getentropy(chunk.as_mut_ptr().cast(), chunk.len()) } != 0 {
            return Err(last_error("getentropy", ErrorCode::PlatformError));
        }
    }
    Ok(())
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "macos",
    target_os = "ios",
    target_os = "openbsd"
)))]
fn fill_os(mut buf: &mut [u8]) -> Result<()> {
    use super::Fs;
    use crate::error::{Error, ErrorCode};
    use crate::file::FileMode;
    use crate::platform::FileSys;

    let source = Fs::open(std::path::Path::new("/dev/urandom"), FileMode::Read)?;
    while !buf.is_empty() {
        let n = Fs::read(&source, buf)?;
        if n == 0 {
            return Err(Error::new(ErrorCode::PlatformError, "/dev/urandom: unexpected end of file"));
        }
        buf = &mut std::mem::take(&mut buf)[n..];
    }
    Ok(())
}

impl EntropySys for Entropy {
    fn fill(buf: &mut [u8]) -> Result<()> {
        fill_os(buf)
    }
}
