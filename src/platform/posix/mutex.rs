// ── Mutexes (pthread_mutex_t) ─────────────────────────────────────────────────

use std::io;
use std::mem::MaybeUninit;

use super::{os_error, Locks};
use crate::error::{ErrorCode, Result};
use crate::platform::{MutexKind, MutexSys};

/// A heap-pinned `pthread_mutex_t`; the OS object must never move.
pub(crate) struct RawMutex {
    ptr: *mut libc::pthread_mutex_t,
}

// SAFETY: pthread mutexes are designed to be shared between threads; the
// pointer is owned and only ever passed to pthread_mutex_* calls.
unsafe impl Send for RawMutex {}
// SAFETY: as above.
unsafe impl Sync for RawMutex {}

fn check(rc: i32, call: &str) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(os_error(call, io::Error::from_raw_os_error(rc), ErrorCode::PlatformError))
    }
}

impl MutexSys for Locks {
    type RawMutex = RawMutex;

    fn create(kind: MutexKind) -> Result<RawMutex> {
        let kind = match kind {
            MutexKind::Normal => libc::PTHREAD_MUTEX_NORMAL,
            MutexKind::Recursive => libc::PTHREAD_MUTEX_RECURSIVE,
        };
        let ptr = Box::into_raw(Box::new(libc::PTHREAD_MUTEX_INITIALIZER));
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();

        // SAFETY: `attr` is initialised by pthread_mutexattr_init before any
        // other use and destroyed before it goes out of scope.  `ptr` points at
        // a live, statically initialised mutex.
        let rc = unsafe {
            let rc = libc::pthread_mutexattr_init(attr.as_mut_ptr());
            if rc != 0 {
                rc
            } else {
                let mut rc = libc::pthread_mutexattr_settype(attr.as_mut_ptr(), kind);
                if rc == 0 {
                    rc = libc::pthread_mutex_init(ptr, attr.as_ptr());
                }
                libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
                rc
            }
        };
        if let Err(e) = check(rc, "pthread_mutex_init") {
            // SAFETY: `ptr` came from Box::into_raw above and was never shared.
            drop(unsafe { Box::from_raw(ptr) });
            return Err(e);
        }
        Ok(RawMutex { ptr })
    }

    fn lock(mutex: &RawMutex) {
        // SAFETY: `ptr` is an initialised mutex for as long as `mutex` lives.
        let rc = unsafe { libc::pthread_mutex_lock(mutex.ptr) };
        debug_assert_eq!(rc, 0, "pthread_mutex_lock failed");
    }

    fn try_lock(mutex: &RawMutex) -> bool {
        // SAFETY: as in `lock`.
        unsafe { libc::pthread_mutex_trylock(mutex.ptr) == 0 }
    }

    unsafe fn unlock(mutex: &RawMutex) {
        // SAFETY: the caller holds the lock.
        let rc = unsafe { libc::pthread_mutex_unlock(mutex.ptr) };
        debug_assert_eq!(rc, 0, "pthread_mutex_unlock failed");
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        // SAFETY: nobody else can reach the mutex once we are being dropped.
        let rc = unsafe { libc::pthread_mutex_destroy(self.ptr) };
        if rc == 0 {
            // SAFETY: `ptr` came from Box::into_raw in `create`.
            drop(unsafe { Box::from_raw(self.ptr) });
        } else {
            // Freeing a mutex the OS still considers locked is undefined.
            log::warn!("mutex destroyed while locked; leaking it");
        }
    }
}
