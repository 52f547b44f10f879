// ── Shared libraries ──────────────────────────────────────────────────────────
//
// `SharedLibrary` is a front-end object pointing at a loaded OS module.
//
// Ownership model:
//   • Cloning shares one OS load.  The module handle lives in an `Arc`, so the
//     atomic strong count is the reference count; the module is unloaded when
//     the last front-end object is freed or dropped.
//   • `take()` is the move operation: the reference is transferred without
//     touching the count and the source is left unloaded.
//
// This is the only place in the crate where a native handle is shared.

#![allow(unsafe_code)]

use std::ffi::{c_void, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{self, ErrorCode, Record, Result};
use crate::handle::{Module, NativeHandle};
use crate::platform::{LibrarySys, Modules};

// ── LoadedModule ──────────────────────────────────────────────────────────────

/// The shared record: one OS load.  Unloads on drop.
struct LoadedModule {
    handle: NativeHandle<Module>,
    path: PathBuf,
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        log::debug!("unloading {}", self.path.display());
        self.handle.close();
    }
}

// ── SharedLibrary ─────────────────────────────────────────────────────────────

/// A dynamically loaded module.
#[derive(Clone, Default)]
pub struct SharedLibrary {
    module: Option<Arc<LoadedModule>>,
}

impl SharedLibrary {
    /// An unloaded library object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` and return the loaded library.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut lib = Self::new();
        lib.load(path)?;
        Ok(lib)
    }

    /// Load `path`.  Any module previously referenced by `self` is released
    /// first.  On failure the error is `PLATFORM_ERROR` (or a more specific
    /// code) carrying the OS's diagnostic text.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.free();
        let handle = Modules::load(path).record()?;
        log::debug!("loaded {}", path.display());
        self.module = Some(Arc::new(LoadedModule { handle, path: path.to_owned() }));
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }

    /// Whether the module exports `symbol`.  Never fails; an unloaded library
    /// has no symbols.
    pub fn has(&self, symbol: &str) -> bool {
        self.address(symbol).is_some()
    }

    /// Resolve `symbol` as a `T`, typically an `extern "C" fn` pointer type.
    ///
    /// Returns `None` (recording `RESOURCE_NOT_FOUND`) if the symbol is
    /// absent, and `None` (recording `INVALID_ARGUMENT`) if `T` is not
    /// pointer-sized.
    ///
    /// # Safety
    ///
    /// `T` must match the symbol's real type, and the value must not be used
    /// after the last `SharedLibrary` referencing this module is released.
    pub unsafe fn get<T: Copy>(&self, symbol: &str) -> Option<T> {
        if std::mem::size_of::<T>() != std::mem::size_of::<*mut c_void>() {
            error::raise(
                ErrorCode::InvalidArgument,
                format!("symbol type for `{symbol}` is not pointer-sized"),
            );
            return None;
        }
        let Some(addr) = self.address(symbol) else {
            error::raise(ErrorCode::ResourceNotFound, format!("symbol `{symbol}` not found"));
            return None;
        };
        // SAFETY: sizes checked above; the caller guarantees `T` is the
        // symbol's type.
        Some(unsafe { std::mem::transmute_copy::<*mut c_void, T>(&addr) })
    }

    /// Drop this object's reference.  Idempotent.
    pub fn free(&mut self) {
        self.module = None;
    }

    /// Move the reference out, leaving `self` unloaded.
    pub fn take(&mut self) -> Self {
        Self { module: self.module.take() }
    }

    /// Number of front-end objects sharing this load (0 if unloaded).
    pub fn use_count(&self) -> usize {
        self.module.as_ref().map_or(0, Arc::strong_count)
    }

    /// The path the module was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.module.as_deref().map(|m| m.path.as_path())
    }

    fn address(&self, symbol: &str) -> Option<*mut c_void> {
        let module = self.module.as_ref()?;
        let name = CString::new(symbol).ok()?;
        Modules::symbol(&module.handle, &name)
    }
}

impl fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedLibrary")
            .field("path", &self.path())
            .field("use_count", &self.use_count())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(
    test,
    not(oskit_backend = "fallback"),
    any(target_os = "linux", target_os = "macos", windows)
))]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    const SYSTEM_LIBRARY: &str = "libc.so.6";
    #[cfg(target_os = "macos")]
    const SYSTEM_LIBRARY: &str = "/usr/lib/libSystem.B.dylib";
    #[cfg(windows)]
    const SYSTEM_LIBRARY: &str = "kernel32.dll";

    #[cfg(unix)]
    const EXISTING_SYMBOL: &str = "strlen";
    #[cfg(windows)]
    const EXISTING_SYMBOL: &str = "lstrlenA";

    #[test]
    fn load_and_probe_symbols() {
        let lib = SharedLibrary::open(SYSTEM_LIBRARY).expect("load system library");
        assert!(lib.is_loaded());
        assert!(lib.has(EXISTING_SYMBOL));
        assert!(!lib.has("oskit_missing_symbol"));
        assert!(!lib.has("nul\0inside"));

        // SAFETY: the missing symbol is never called.
        let missing = unsafe { lib.get::<extern "C" fn()>("oskit_missing_symbol") };
        assert!(missing.is_none());
        assert_eq!(error::last_code(), ErrorCode::ResourceNotFound);
        error::clear();
    }

    #[cfg(unix)]
    #[test]
    fn typed_function_pointer_is_callable() {
        type Strlen = unsafe extern "C" fn(*const std::ffi::c_char) -> usize;
        let lib = SharedLibrary::open(SYSTEM_LIBRARY).expect("load");
        // SAFETY: `strlen` has exactly this signature.
        let strlen = unsafe { lib.get::<Strlen>("strlen") }.expect("strlen");
        // SAFETY: the argument is a valid NUL-terminated string.
        assert_eq!(unsafe { strlen(c"oskit".as_ptr()) }, 5);
    }

    #[test]
    fn non_pointer_sized_type_is_rejected() {
        let lib = SharedLibrary::open(SYSTEM_LIBRARY).expect("load");
        // SAFETY: rejected before any transmute happens.
        assert!(unsafe { lib.get::<u8>(EXISTING_SYMBOL) }.is_none());
        assert_eq!(error::last_code(), ErrorCode::InvalidArgument);
        error::clear();
    }

    #[test]
    fn missing_library_fails_and_records() {
        error::clear();
        let mut lib = SharedLibrary::new();
        assert!(lib.load("/nonexistent/liboskit_nope.so").is_err());
        assert!(!lib.is_loaded());
        assert!(!error::last_code().is_none());
        assert!(!error::get().message.is_empty());
        error::clear();
    }

    #[test]
    fn clone_shares_one_load() {
        let a = SharedLibrary::open(SYSTEM_LIBRARY).expect("load");
        assert_eq!(a.use_count(), 1);

        let b = a.clone();
        assert!(b.is_loaded());
        assert_eq!(a.use_count(), 2);

        drop(b);
        assert_eq!(a.use_count(), 1);
        assert!(a.has(EXISTING_SYMBOL));
    }

    #[test]
    fn take_moves_the_reference() {
        let mut a = SharedLibrary::open(SYSTEM_LIBRARY).expect("load");
        let b = a.take();
        assert!(!a.is_loaded());
        assert!(b.is_loaded());
        assert_eq!(b.use_count(), 1, "move must not touch the count");
    }

    #[test]
    fn free_is_idempotent() {
        let mut a = SharedLibrary::open(SYSTEM_LIBRARY).expect("load");
        let b = a.clone();
        a.free();
        a.free();
        assert!(!a.is_loaded());
        assert_eq!(a.use_count(), 0);
        assert!(b.is_loaded(), "other references keep the module loaded");
        assert_eq!(b.use_count(), 1);
    }
}
