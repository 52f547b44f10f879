// ── Shared libraries ──────────────────────────────────────────────────────────

use std::ffi::{c_void, CStr};
use std::path::Path;

use windows::core::{PCSTR, PCWSTR};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use super::{wide, Module, Modules};
use crate::error::{Error, ErrorCode, Result};
use crate::handle::NativeHandle;
use crate::platform::LibrarySys;

impl LibrarySys for Modules {
    fn load(path: &Path) -> Result<NativeHandle<Module>> {
        let name = wide(path.as_os_str(), "library path")?;
        // SAFETY: `name` is NUL-terminated; running the module's DllMain is
        // the point of loading it.
        let module = unsafe { LoadLibraryW(PCWSTR(name.as_ptr())) }.map_err(|e| {
            Error::new(ErrorCode::PlatformError, format!("LoadLibrary {}: {e}", path.display()))
        })?;
        // SAFETY: a fresh module reference, owned by the returned handle.
        Ok(unsafe { NativeHandle::from_raw(module.0 as isize) })
    }

    fn symbol(module: &NativeHandle<Module>, name: &CStr) -> Option<*mut c_void> {
        if !module.is_valid() {
            return None;
        }
        // SAFETY: `module` is a live module handle; `name` is NUL-terminated.
        let proc = unsafe {
            GetProcAddress(HMODULE(module.get() as *mut c_void), PCSTR(name.as_ptr().cast()))
        };
        proc.map(|f| f as usize as *mut c_void)
    }
}
