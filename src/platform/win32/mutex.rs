// ── Mutexes ───────────────────────────────────────────────────────────────────
//
// Non-recursive: an SRW lock taken exclusively; re-acquiring it on the owning
// thread deadlocks.  Recursive: a critical section.  Both are boxed so the OS
// object never moves.

use std::cell::UnsafeCell;

use windows::Win32::System::Threading::{
    AcquireSRWLockExclusive, DeleteCriticalSection, EnterCriticalSection,
    InitializeCriticalSection, LeaveCriticalSection, ReleaseSRWLockExclusive,
    TryAcquireSRWLockExclusive, TryEnterCriticalSection, CRITICAL_SECTION, SRWLOCK,
};

use super::Locks;
use crate::error::Result;
use crate::platform::{MutexKind, MutexSys};

pub(crate) enum RawMutex {
    Srw(Box<UnsafeCell<SRWLOCK>>),
    Critical(Box<UnsafeCell<CRITICAL_SECTION>>),
}

// SAFETY: SRW locks and critical sections are built for cross-thread use;
// the cells are only touched through the synchronised Win32 calls below.
unsafe impl Send for RawMutex {}
// SAFETY: as above.
unsafe impl Sync for RawMutex {}

impl MutexSys for Locks {
    type RawMutex = RawMutex;

    fn create(kind: MutexKind) -> Result<RawMutex> {
        Ok(match kind {
            MutexKind::Normal => RawMutex::Srw(Box::new(UnsafeCell::new(SRWLOCK::default()))),
            MutexKind::Recursive => {
                let cs = Box::new(UnsafeCell::new(CRITICAL_SECTION::default()));
                // SAFETY: `cs` is boxed, so its address is stable until Drop.
                unsafe { InitializeCriticalSection(cs.get()) };
                RawMutex::Critical(cs)
            }
        })
    }

    fn lock(mutex: &RawMutex) {
        // SAFETY: the lock object is initialised and pinned by its box.
        unsafe {
            match mutex {
                RawMutex::Srw(lock) => AcquireSRWLockExclusive(lock.get()),
                RawMutex::Critical(cs) => EnterCriticalSection(cs.get()),
            }
        }
    }

    fn try_lock(mutex: &RawMutex) -> bool {
        // SAFETY: as in `lock`.
        unsafe {
            match mutex {
                RawMutex::Srw(lock) => TryAcquireSRWLockExclusive(lock.get()).as_bool(),
                RawMutex::Critical(cs) => TryEnterCriticalSection(cs.get()).as_bool(),
            }
        }
    }

    unsafe fn unlock(mutex: &RawMutex) {
        // SAFETY: the caller holds the lock.
        unsafe {
            match mutex {
                RawMutex::Srw(lock) => ReleaseSRWLockExclusive(lock.get()),
                RawMutex::Critical(cs) => LeaveCriticalSection(cs.get()),
            }
        }
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        if let RawMutex::Critical(cs) = self {
            // SAFETY: nobody else can reach the critical section any more.
            unsafe { DeleteCriticalSection(cs.get()) };
        }
    }
}
