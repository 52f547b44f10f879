// ── Fallback backend ──────────────────────────────────────────────────────────
//
// Compiled on targets with no native backend (or when `OSKIT_FORCE_FALLBACK`
// is set at build time).  Every operation fails with UNSUPPORTED_OPERATION at
// call time; nothing fails at build or link time.
//
// Objects that only a successful call could produce (threads, mutexes,
// children) are uninhabited, so code holding one is statically unreachable.

use std::ffi::{c_void, CStr};
use std::path::Path;
use std::time::Duration;

use super::{
    ClockSys, EntropySys, FileSys, HandleKind, LibrarySys, LocaleSys, MemorySys,
    MutexKind, MutexSys, PowerSys, ProcessSys, Sealed, SpawnRequest, ThreadSys,
};
use crate::error::{Error, Result};
use crate::file::{FileMode, SeekOrigin};
use crate::handle::NativeHandle;
use crate::memory::MemoryInfo;
use crate::power::PowerStatus;

pub(crate) const NAME: &str = "fallback";

// ── Handle kinds ──────────────────────────────────────────────────────────────

/// Descriptors; none can ever be created here.
#[derive(Debug)]
pub enum Descriptor {}

impl Sealed for Descriptor {}

impl HandleKind for Descriptor {
    type Raw = i64;
    const INVALID: i64 = -1;

    fn release(_raw: i64) {}
}

/// Loaded modules; none can ever be created here.
#[derive(Debug)]
pub enum Module {}

impl Sealed for Module {}

impl HandleKind for Module {
    type Raw = usize;
    const INVALID: usize = 0;

    fn release(_raw: usize) {}
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

/// Uninhabited stand-in for native objects.
pub(crate) enum Never {}

impl FileSys for Fs {
    fn open(_path: &Path, _mode: FileMode) -> Result<NativeHandle<Descriptor>> {
        Err(Error::unsupported("file open"))
    }

    fn read(_fd: &NativeHandle<Descriptor>, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::unsupported("file read"))
    }

    fn write(_fd: &NativeHandle<Descriptor>, _buf: &[u8]) -> Result<usize> {
        Err(Error::unsupported("file write"))
    }

    fn seek(_fd: &NativeHandle<Descriptor>, _offset: i64, _origin: SeekOrigin) -> Result<u64> {
        Err(Error::unsupported("file seek"))
    }

    fn size(_fd: &NativeHandle<Descriptor>) -> Result<u64> {
        Err(Error::unsupported("file size"))
    }

    fn flush(_fd: &NativeHandle<Descriptor>) -> Result<()> {
        Err(Error::unsupported("file flush"))
    }

    fn duplicate(_fd: &NativeHandle<Descriptor>) -> Result<NativeHandle<Descriptor>> {
        Err(Error::unsupported("descriptor duplication"))
    }

    fn pipe() -> Result<(NativeHandle<Descriptor>, NativeHandle<Descriptor>)> {
        Err(Error::unsupported("pipes"))
    }

    fn exists(_path: &Path) -> bool {
        false
    }

    fn remove(_path: &Path) -> Result<()> {
        Err(Error::unsupported("file removal"))
    }
}

impl ThreadSys for Threads {
    type Thread = Never;

    fn spawn(_main: Box<dyn FnOnce() + Send + 'static>) -> Result<Never> {
        Err(Error::unsupported("threads"))
    }

    fn id(thread: &Never) -> u64 {
        match *thread {}
    }

    fn current_id() -> u64 {
        0
    }

    fn join(thread: Never) -> Result<()> {
        match thread {}
    }

    fn detach(thread: Never) {
        match thread {}
    }

    fn yield_now() {}

    fn hardware_concurrency() -> usize {
        1
    }
}

#[allow(unsafe_code)]
impl MutexSys for Locks {
    type RawMutex = Never;

    fn create(_kind: MutexKind) -> Result<Never> {
        Err(Error::unsupported("mutexes"))
    }

    fn lock(mutex: &Never) {
        match *mutex {}
    }

    fn try_lock(mutex: &Never) -> bool {
        match *mutex {}
    }

    unsafe fn unlock(mutex: &Never) {
        match *mutex {}
    }
}

impl LibrarySys for Modules {
    fn load(_path: &Path) -> Result<NativeHandle<Module>> {
        Err(Error::unsupported("shared libraries"))
    }

    fn symbol(_module: &NativeHandle<Module>, _name: &CStr) -> Option<*mut c_void> {
        None
    }
}

impl ProcessSys for Processes {
    type Child = Never;

    fn spawn(_request: &SpawnRequest<'_>) -> Result<Never> {
        Err(Error::unsupported("child processes"))
    }

    fn pid(child: &Never) -> u32 {
        match *child {}
    }

    fn try_wait(child: &mut Never) -> Result<Option<i32>> {
        match *child {}
    }

    fn wait(child: &mut Never) -> Result<i32> {
        match *child {}
    }

    fn kill(child: &mut Never, _force: bool) -> Result<()> {
        match *child {}
    }
}

impl EntropySys for Entropy {
    fn fill(_buf: &mut [u8]) -> Result<()> {
        Err(Error::unsupported("entropy source"))
    }
}

impl ClockSys for Clock {
    fn ticks() -> Result<u64> {
        Err(Error::unsupported("monotonic clock"))
    }

    fn wall_clock() -> Result<Duration> {
        Err(Error::unsupported("wall clock"))
    }

    fn sleep(_duration: Duration) -> Result<()> {
        Err(Error::unsupported("sleep"))
    }
}

impl LocaleSys for Locale {
    fn current() -> Result<String> {
        Err(Error::unsupported("locale query"))
    }
}

impl MemorySys for Memory {
    fn info() -> Result<MemoryInfo> {
        Err(Error::unsupported("memory query"))
    }

    fn page_size() -> Result<usize> {
        Err(Error::unsupported("page size query"))
    }
}

impl PowerSys for Power {
    fn status() -> Result<PowerStatus> {
        Err(Error::unsupported("power query"))
    }
}
