// ── Threads (pthreads) ────────────────────────────────────────────────────────

use std::ffi::c_void;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use super::{os_error, Threads};
use crate::error::{ErrorCode, Result};
use crate::platform::{panic_message, ThreadSys};

type Main = Box<dyn FnOnce() + Send + 'static>;

/// A started, unjoined pthread.
pub(crate) struct NativeThread(libc::pthread_t);

// SAFETY: a pthread_t is an identifier; on some platforms it is a pointer,
// but it carries no thread affinity.
unsafe impl Send for NativeThread {}

fn thread_id(t: libc::pthread_t) -> u64 {
    t as usize as u64
}

/// Entry point of every thread; owns the boxed closure.
extern "C" fn trampoline(arg: *mut c_void) -> *mut c_void {
    // SAFETY: `arg` is the `Box<Main>` leaked by `spawn`, handed over once.
    let main: Main = *unsafe { Box::from_raw(arg.cast::<Main>()) };
    // Unwinding out of an `extern "C"` function aborts; stop it here.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(main)) {
        log::error!("thread body panicked: {}", panic_message(&*payload));
    }
    ptr::null_mut()
}

impl ThreadSys for Threads {
    type Thread = NativeThread;

    fn spawn(main: Main) -> Result<NativeThread> {
        let arg = Box::into_raw(Box::new(main)).cast::<c_void>();
        // SAFETY: all-zero is a valid placeholder; pthread_create overwrites it.
        let mut handle: libc::pthread_t = unsafe { std::mem::zeroed() };
        // SAFETY: `trampoline` takes ownership of `arg` only on success.
        let rc = unsafe { libc::pthread_create(&mut handle, ptr::null(), trampoline, arg) };
        if rc != 0 {
            // SAFETY: the thread was not created, so `arg` is still ours.
            drop(unsafe { Box::from_raw(arg.cast::<Main>()) });
            return Err(os_error(
                "pthread_create",
                io::Error::from_raw_os_error(rc),
                ErrorCode::PlatformError,
            ));
        }
        Ok(NativeThread(handle))
    }

    fn id(thread: &NativeThread) -> u64 {
        thread_id(thread.0)
    }

    fn current_id() -> u64 {
        // SAFETY: always safe to call.
        thread_id(unsafe { libc::pthread_self() })
    }

    fn join(thread: NativeThread) -> Result<()> {
        // SAFETY: `thread` is joinable and consumed here, so it is joined once.
        let rc = unsafe { libc::pthread_join(thread.0, ptr::null_mut()) };
        if rc != 0 {
            return Err(os_error(
                "pthread_join",
                io::Error::from_raw_os_error(rc),
                ErrorCode::PlatformError,
            ));
        }
        Ok(())
    }

    fn detach(thread: NativeThread) {
        // SAFETY: `thread` is joinable and consumed here.
        let rc = unsafe { libc::pthread_detach(thread.0) };
        if rc != 0 {
            log::warn!("pthread_detach failed: {}", io::Error::from_raw_os_error(rc));
        }
    }

    fn yield_now() {
        // SAFETY: always safe to call.
        unsafe { libc::sched_yield() };
    }

    fn hardware_concurrency() -> usize {
        // SAFETY: sysconf has no memory-safety preconditions.
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        usize::try_from(n).unwrap_or(1)
    }
}
