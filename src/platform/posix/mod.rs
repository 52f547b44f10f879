// ── POSIX backend ─────────────────────────────────────────────────────────────
//
// Unix-likes, straight on top of `libc`.
//
// Every descriptor this backend creates is close-on-exec.  Descriptors only
// reach a child through the explicit `dup2` wiring in `process.rs`.
//
// Each unsafe block MUST carry a `// SAFETY:` comment.

#![allow(unsafe_code)]

mod file;
mod library;
mod mutex;
mod process;
mod random;
mod system;
mod thread;
mod time;

use std::ffi::{c_int, c_void, CString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::{HandleKind, Sealed};
use crate::error::{Error, ErrorCode, Result};

pub(crate) const NAME: &str = "posix";

// ── Handle kinds ──────────────────────────────────────────────────────────────

/// File, pipe and socket descriptors.
#[derive(Debug)]
pub enum Descriptor {}

impl Sealed for Descriptor {}

impl HandleKind for Descriptor {
    type Raw = c_int;
    const INVALID: c_int = -1;

    fn is_valid_raw(raw: c_int) -> bool {
        raw >= 0
    }

    fn release(raw: c_int) {
        // SAFETY: the owning NativeHandle releases each descriptor once.
        // EINTR from close() must not be retried on Linux; the fd is gone.
        unsafe { libc::close(raw) };
    }
}

/// `dlopen` handles, stored as an address.
#[derive(Debug)]
pub enum Module {}

impl Sealed for Module {}

impl HandleKind for Module {
    type Raw = usize;
    const INVALID: usize = 0;

    fn release(raw: usize) {
        // SAFETY: `raw` came from a successful dlopen and is closed once.
        if unsafe { libc::dlclose(raw as *mut c_void) } != 0 {
            log::warn!("dlclose failed: {}", library::dlerror_text());
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

/// Translate an OS error, adding the busy codes the generic mapping lacks.
fn os_error(context: &str, err: io::Error, fallback: ErrorCode) -> Error {
    match err.raw_os_error() {
        Some(libc::EBUSY | libc::ETXTBSY) => {
            Error::new(ErrorCode::FileInUse, format!("{context}: {err}"))
        }
        _ => Error::from_os(context, &err, fallback),
    }
}

/// `errno` of the last failed call, translated.
fn last_error(context: &str, fallback: ErrorCode) -> Error {
    os_error(context, io::Error::last_os_error(), fallback)
}

/// Run a `-1`-on-failure call until it stops failing with `EINTR`.
fn retry<T, F>(mut call: F) -> io::Result<T>
where
    T: PartialOrd + Default,
    F: FnMut() -> T,
{
    loop {
        let ret = call();
        if ret >= T::default() {
            return Ok(ret);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        Error::new(
            ErrorCode::InvalidArgument,
            format!("path contains a NUL byte: {}", path.display()),
        )
    })
}

fn c_string(what: &str, value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::new(ErrorCode::InvalidArgument, format!("{what} contains a NUL byte")))
}
