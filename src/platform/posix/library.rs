// ── Shared libraries (dlopen) ─────────────────────────────────────────────────

use std::ffi::{c_void, CStr};
use std::path::Path;

use super::{c_path, Module, Modules};
use crate::error::{Error, ErrorCode, Result};
use crate::handle::NativeHandle;
use crate::platform::LibrarySys;

/// The dynamic linker's description of the last failure on this thread.
pub(super) fn dlerror_text() -> String {
    // SAFETY: dlerror returns NULL or a NUL-terminated, thread-local string
    // that stays valid until the next dl* call on this thread.
    unsafe {
        let msg = libc::dlerror();
        if msg.is_null() {
            "unknown dynamic linker error".to_owned()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

impl LibrarySys for Modules {
    fn load(path: &Path) -> Result<NativeHandle<Module>> {
        let c_path = c_path(path)?;
        // SAFETY: `c_path` is NUL-terminated; running the module's
        // initialisers is the point of loading it.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(Error::new(
                ErrorCode::PlatformError,
                format!("dlopen {}: {}", path.display(), dlerror_text()),
            ));
        }
        // SAFETY: a fresh dlopen reference, owned by the returned handle.
        Ok(unsafe { NativeHandle::from_raw(handle as usize) })
    }

    fn symbol(module: &NativeHandle<Module>, name: &CStr) -> Option<*mut c_void> {
        if !module.is_valid() {
            return None;
        }
        // SAFETY: `module` holds a live dlopen handle; `name` is
        // NUL-terminated.  The dlerror call clears stale state first.
        let addr = unsafe {
            libc::dlerror();
            libc::dlsym(module.get() as *mut c_void, name.as_ptr())
        };
        (!addr.is_null()).then_some(addr)
    }
}
