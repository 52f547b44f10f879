// ── Win32 backend ─────────────────────────────────────────────────────────────
//
// Windows, via the `windows` crate.  Every `unsafe` block MUST carry a
// `// SAFETY:` comment that states:
//   • which invariant makes the operation sound, and
//   • what the caller is responsible for maintaining.
//
// Raw `HANDLE`/`HMODULE` values are stored as `isize` inside `NativeHandle`
// so that owners stay `Send`; they are rebuilt at each call site.

#![allow(unsafe_code)]

// ── Sub-modules ───────────────────────────────────────────────────────────────

mod file;
mod library;
mod mutex;
mod process;
mod random;
mod system;
mod thread;
mod time;

use std::ffi::{c_void, OsStr};
use std::io;
use std::os::windows::ffi::OsStrExt;

use windows::Win32::Foundation::{
    CloseHandle, FreeLibrary, ERROR_LOCK_VIOLATION, ERROR_SHARING_VIOLATION, HANDLE, HMODULE,
};

use super::{HandleKind, Sealed};
use crate::error::{Error, ErrorCode, Result};
use crate::handle::NativeHandle;

pub(crate) const NAME: &str = "win32";

// ── Handle kinds ──────────────────────────────────────────────────────────────

/// Kernel object handles: files, pipes, processes, threads.
#[derive(Debug)]
pub enum Descriptor {}

impl Sealed for Descriptor {}

impl HandleKind for Descriptor {
    type Raw = isize;
    const INVALID: isize = -1;

    /// Win32 uses both NULL and INVALID_HANDLE_VALUE as "no handle".
    fn is_valid_raw(raw: isize) -> bool {
        raw != -1 && raw != 0
    }

    fn release(raw: isize) {
        // SAFETY: the owning NativeHandle closes each handle once.
        if let Err(e) = unsafe { CloseHandle(HANDLE(raw as *mut c_void)) } {
            log::warn!("CloseHandle failed: {e}");
        }
    }
}

/// `LoadLibraryW` module handles.
#[derive(Debug)]
pub enum Module {}

impl Sealed for Module {}

impl HandleKind for Module {
    type Raw = isize;
    const INVALID: isize = 0;

    fn release(raw: isize) {
        // SAFETY: `raw` came from a successful LoadLibraryW and is freed once.
        if let Err(e) = unsafe { FreeLibrary(HMODULE(raw as *mut c_void)) } {
            log::warn!("FreeLibrary failed: {e}");
        }
    }
}

// ── Facility implementors ─────────────────────────────────────────────────────

pub(crate) struct Fs;
pub(crate) struct Threads;
pub(crate) struct Locks;
pub(crate) struct Modules;
pub(crate) struct Processes;
pub(crate) struct Entropy;
pub(crate) struct Clock;
pub(crate) struct Locale;
pub(crate) struct Memory;
pub(crate) struct Power;

impl Sealed for Fs {}
impl Sealed for Threads {}
impl Sealed for Locks {}
impl Sealed for Modules {}
impl Sealed for Processes {}
impl Sealed for Entropy {}
impl Sealed for Clock {}
impl Sealed for Locale {}
impl Sealed for Memory {}
impl Sealed for Power {}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Translate a `windows` error, adding the busy codes the generic mapping
/// lacks.
fn win_error(context: &str, err: windows::core::Error, fallback: ErrorCode) -> Error {
    let hr = err.code().0 as u32;
    // HRESULT_FROM_WIN32 puts the Win32 code in the low word.
    let code = if hr & 0xFFFF_0000 == 0x8007_0000 { hr & 0xFFFF } else { hr };
    if code == ERROR_SHARING_VIOLATION.0 || code == ERROR_LOCK_VIOLATION.0 {
        return Error::new(ErrorCode::FileInUse, format!("{context}: {err}"));
    }
    Error::from_os(context, &io::Error::from_raw_os_error(code as i32), fallback)
}

/// NUL-terminated UTF-16 for a `PCWSTR` argument.
fn wide(value: &OsStr, what: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = value.encode_wide().collect();
    if out.contains(&0) {
        return Err(Error::new(ErrorCode::InvalidArgument, format!("{what} contains a NUL character")));
    }
    out.push(0);
    Ok(out)
}

fn raw_handle(fd: &NativeHandle<Descriptor>) -> HANDLE {
    HANDLE(fd.get() as *mut c_void)
}

/// Take ownership of a handle fresh from the OS.
fn adopt(handle: HANDLE) -> NativeHandle<Descriptor> {
    // SAFETY: callers pass only handles they just received and own.
    unsafe { NativeHandle::from_raw(handle.0 as isize) }
}
