// ── Threads ───────────────────────────────────────────────────────────────────

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use windows::Win32::Foundation::WAIT_FAILED;
use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows::Win32::System::Threading::{
    CreateThread, GetCurrentThreadId, SwitchToThread, WaitForSingleObject, INFINITE,
    THREAD_CREATION_FLAGS,
};

use super::{adopt, raw_handle, Descriptor, Threads};
use crate::error::{Error, ErrorCode, Result};
use crate::handle::NativeHandle;
use crate::platform::{panic_message, ThreadSys};

type Main = Box<dyn FnOnce() + Send + 'static>;

/// A started, unjoined thread: its handle and id.
pub(crate) struct NativeThread {
    handle: NativeHandle<Descriptor>,
    id: u32,
}

/// Entry point of every thread; owns the boxed closure.
unsafe extern "system" fn trampoline(arg: *mut c_void) -> u32 {
    // SAFETY: `arg` is the `Box<Main>` leaked by `spawn`, handed over once.
    let main: Main = *unsafe { Box::from_raw(arg.cast::<Main>()) };
    // Unwinding out of an `extern "system"` function aborts; stop it here.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(main)) {
        log::error!("thread body panicked: {}", panic_message(&*payload));
    }
    0
}

impl ThreadSys for Threads {
    type Thread = NativeThread;

    fn spawn(main: Main) -> Result<NativeThread> {
        let arg = Box::into_raw(Box::new(main)).cast::<c_void>();
        let mut id = 0u32;
        // SAFETY: `trampoline` takes ownership of `arg` only if the thread is
        // created; `id` is a valid out-pointer.
        let created = unsafe {
            CreateThread(
                None,
                0,
                Some(trampoline),
                Some(arg.cast_const()),
                THREAD_CREATION_FLAGS(0),
                Some(&mut id),
            )
        };
        match created {
            Ok(handle) => Ok(NativeThread { handle: adopt(handle), id }),
            Err(e) => {
                // SAFETY: no thread was created, so `arg` is still ours.
                drop(unsafe { Box::from_raw(arg.cast::<Main>()) });
                Err(super::win_error("CreateThread", e, ErrorCode::PlatformError))
            }
        }
    }

    fn id(thread: &NativeThread) -> u64 {
        u64::from(thread.id)
    }

    fn current_id() -> u64 {
        // SAFETY: always safe to call.
        u64::from(unsafe { GetCurrentThreadId() })
    }

    fn join(thread: NativeThread) -> Result<()> {
        // SAFETY: the handle is live until `thread` drops at the end of scope.
        let waited = unsafe { WaitForSingleObject(raw_handle(&thread.handle), INFINITE) };
        if waited == WAIT_FAILED {
            return Err(Error::from_os(
                "WaitForSingleObject",
                &std::io::Error::last_os_error(),
                ErrorCode::PlatformError,
            ));
        }
        Ok(())
    }

    fn detach(thread: NativeThread) {
        // Closing the handle is all a detach is on Windows.
        drop(thread);
    }

    fn yield_now() {
        // SAFETY: always safe to call.
        let _ = unsafe { SwitchToThread() };
    }

    fn hardware_concurrency() -> usize {
        let mut info = SYSTEM_INFO::default();
        // SAFETY: `info` is a valid out-pointer.
        unsafe { GetSystemInfo(&mut info) };
        info.dwNumberOfProcessors as usize
    }
}
