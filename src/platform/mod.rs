// ── Platform abstraction layer ────────────────────────────────────────────────
//
// This module defines the capability contract every backend must satisfy and
// selects exactly one backend at build time (see `build.rs`):
//
//   • `win32`    – Windows, via the `windows` crate
//   • `posix`    – Unix-likes, via `libc`
//   • `fallback` – anything else; every call fails with UNSUPPORTED_OPERATION
//
// The front-end modules (`crate::file`, `crate::thread`, …) only ever name the
// aliases exported below (`Fs`, `Threads`, …), never a backend path, so
// backend-specific types cannot leak into the public API.  All `unsafe` FFI
// lives underneath this module.
//
// The contract traits are sealed: only the backends in this module can
// implement them.

use std::ffi::{c_void, CStr, OsString};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::file::{FileMode, SeekOrigin};
use crate::handle::NativeHandle;
use crate::memory::MemoryInfo;
use crate::power::PowerStatus;

// ── Backend selection ─────────────────────────────────────────────────────────

#[cfg(oskit_backend = "win32")]
mod win32;
#[cfg(oskit_backend = "win32")]
use win32 as imp;

#[cfg(oskit_backend = "posix")]
mod posix;
#[cfg(oskit_backend = "posix")]
use posix as imp;

#[cfg(oskit_backend = "fallback")]
mod fallback;
#[cfg(oskit_backend = "fallback")]
use fallback as imp;

/// Name of the backend compiled into this build.
pub(crate) const BACKEND: &str = imp::NAME;

pub use imp::{Descriptor, Module};

pub(crate) use imp::{
    Clock, Entropy, Fs, Locale, Locks, Memory, Modules, Power, Processes, Threads,
};

// ── Sealing ───────────────────────────────────────────────────────────────────

mod sealed {
    pub trait Sealed {}
}

pub(crate) use sealed::Sealed;

// ── Native handles ────────────────────────────────────────────────────────────

/// A kind of OS resource that a [`NativeHandle`] can own.
///
/// Each backend provides one implementation per resource family (file/pipe
/// descriptors, loaded modules).  The trait is sealed.
pub trait HandleKind: sealed::Sealed {
    /// The raw OS value (descriptor, `HANDLE`, `dlopen` cookie, …).
    type Raw: Copy + PartialEq + fmt::Debug;

    /// Sentinel stored by an invalid handle.
    const INVALID: Self::Raw;

    /// Whether `raw` names a live resource.
    fn is_valid_raw(raw: Self::Raw) -> bool {
        raw != Self::INVALID
    }

    /// Release the resource.  Called exactly once per valid handle.
    fn release(raw: Self::Raw);
}

// ── Facility contracts ────────────────────────────────────────────────────────

/// File, pipe and descriptor operations.
pub(crate) trait FileSys: Sealed {
    fn open(path: &Path, mode: FileMode) -> Result<NativeHandle<Descriptor>>;
    fn read(fd: &NativeHandle<Descriptor>, buf: &mut [u8]) -> Result<usize>;
    fn write(fd: &NativeHandle<Descriptor>, buf: &[u8]) -> Result<usize>;
    /// Returns the new absolute position.
    fn seek(fd: &NativeHandle<Descriptor>, offset: i64, origin: SeekOrigin) -> Result<u64>;
    fn size(fd: &NativeHandle<Descriptor>) -> Result<u64>;
    fn flush(fd: &NativeHandle<Descriptor>) -> Result<()>;
    /// A second, independently owned descriptor for the same open file.
    fn duplicate(fd: &NativeHandle<Descriptor>) -> Result<NativeHandle<Descriptor>>;
    /// `(read end, write end)`.  Neither end is inherited by children unless
    /// explicitly wired by the process backend.
    fn pipe() -> Result<(NativeHandle<Descriptor>, NativeHandle<Descriptor>)>;
    fn exists(path: &Path) -> bool;
    fn remove(path: &Path) -> Result<()>;
}

/// Native threads.
pub(crate) trait ThreadSys: Sealed {
    /// A started, not yet joined or detached native thread.
    type Thread: Send;

    fn spawn(main: Box<dyn FnOnce() + Send + 'static>) -> Result<Self::Thread>;
    fn id(thread: &Self::Thread) -> u64;
    fn current_id() -> u64;
    /// Blocks until the thread returns.
    fn join(thread: Self::Thread) -> Result<()>;
    fn detach(thread: Self::Thread);
    fn yield_now();
    fn hardware_concurrency() -> usize;
}

/// Which flavour of mutex to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MutexKind {
    Normal,
    Recursive,
}

/// OS mutexes.
pub(crate) trait MutexSys: Sealed {
    /// Owns the OS object; dropping it destroys the mutex.
    type RawMutex: Send + Sync;

    fn create(kind: MutexKind) -> Result<Self::RawMutex>;
    fn lock(mutex: &Self::RawMutex);
    fn try_lock(mutex: &Self::RawMutex) -> bool;

    /// # Safety
    ///
    /// The calling thread must currently hold `mutex`.
    #[allow(unsafe_code)]
    unsafe fn unlock(mutex: &Self::RawMutex);
}

/// Dynamic module loading.
pub(crate) trait LibrarySys: Sealed {
    fn load(path: &Path) -> Result<NativeHandle<Module>>;
    /// The symbol's address, or `None` if the module does not export it.
    fn symbol(module: &NativeHandle<Module>, name: &CStr) -> Option<*mut c_void>;
}

/// How one of a child's standard streams is wired at spawn time.
#[cfg_attr(oskit_backend = "fallback", allow(dead_code))]
pub(crate) enum ChildStdio<'a> {
    /// Leave the platform default in place.
    Default,
    /// Share the parent's stream.
    Inherit,
    /// Bind the stream to this descriptor (pipe end or redirect file).
    Handle(&'a NativeHandle<Descriptor>),
}

/// Everything the process backend needs to launch a child.
#[cfg_attr(oskit_backend = "fallback", allow(dead_code))]
pub(crate) struct SpawnRequest<'a> {
    pub(crate) args: &'a [String],
    /// Complete environment of the child; already merged by the front end.
    pub(crate) env: &'a [(OsString, OsString)],
    pub(crate) cwd: Option<&'a Path>,
    pub(crate) background: bool,
    pub(crate) stdin: ChildStdio<'a>,
    pub(crate) stdout: ChildStdio<'a>,
    pub(crate) stderr: ChildStdio<'a>,
}

/// Child processes.
pub(crate) trait ProcessSys: Sealed {
    type Child: Send;

    fn spawn(request: &SpawnRequest<'_>) -> Result<Self::Child>;
    fn pid(child: &Self::Child) -> u32;
    /// Non-blocking: `Some(exit code)` once the child has exited.
    fn try_wait(child: &mut Self::Child) -> Result<Option<i32>>;
    fn wait(child: &mut Self::Child) -> Result<i32>;
    fn kill(child: &mut Self::Child, force: bool) -> Result<()>;
}

/// OS entropy source.
pub(crate) trait EntropySys: Sealed {
    fn fill(buf: &mut [u8]) -> Result<()>;
}

/// Clocks and sleeping.
pub(crate) trait ClockSys: Sealed {
    /// Monotonic nanoseconds since an arbitrary, fixed origin.
    fn ticks() -> Result<u64>;
    /// Time since the Unix epoch.
    fn wall_clock() -> Result<Duration>;
    fn sleep(duration: Duration) -> Result<()>;
}

/// User locale.
pub(crate) trait LocaleSys: Sealed {
    /// The OS's raw locale name, e.g. `en_US.UTF-8` or `en-US`.
    fn current() -> Result<String>;
}

/// Physical memory.
pub(crate) trait MemorySys: Sealed {
    fn info() -> Result<MemoryInfo>;
    fn page_size() -> Result<usize>;
}

/// Power supply.
pub(crate) trait PowerSys: Sealed {
    fn status() -> Result<PowerStatus>;
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Text of a caught panic payload, for logging at thread boundaries.
#[cfg_attr(oskit_backend = "fallback", allow(dead_code))]
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
