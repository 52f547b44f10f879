// ── Native resource handle ────────────────────────────────────────────────────
//
// `NativeHandle<K>` exclusively owns zero or one OS resource of kind `K`
// (a file/pipe descriptor or a loaded module).  It is the ownership primitive
// underneath `File`, `SharedLibrary` and the process backends.
//
// States: invalid (default) or valid.  A valid handle is released exactly
// once: on `close()`/`reset()`, or on drop.  Copying is impossible; moving
// transfers ownership, and `take()` moves out while leaving an invalid handle
// behind.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;

pub use crate::platform::{Descriptor, HandleKind, Module};

/// Exclusive owner of one OS resource.
pub struct NativeHandle<K: HandleKind = Descriptor> {
    raw: K::Raw,
    _kind: PhantomData<K>,
}

impl<K: HandleKind> NativeHandle<K> {
    /// An invalid handle that owns nothing.
    pub const fn invalid() -> Self {
        Self { raw: K::INVALID, _kind: PhantomData }
    }

    /// Take ownership of `raw`.
    ///
    /// Passing the sentinel (or any other value the backend does not consider
    /// live) yields an invalid handle.
    ///
    /// # Safety
    ///
    /// `raw` must be a live resource of kind `K` that nothing else will
    /// release; the returned handle releases it.
    pub unsafe fn from_raw(raw: K::Raw) -> Self {
        if K::is_valid_raw(raw) {
            Self { raw, _kind: PhantomData }
        } else {
            Self::invalid()
        }
    }

    pub fn is_valid(&self) -> bool {
        K::is_valid_raw(self.raw)
    }

    /// The raw value, or the kind's sentinel if invalid.  Ownership is kept.
    pub fn get(&self) -> K::Raw {
        self.raw
    }

    /// Give up ownership without releasing the resource.
    pub fn into_raw(mut self) -> K::Raw {
        std::mem::replace(&mut self.raw, K::INVALID)
    }

    /// Move the resource out, leaving `self` invalid.
    pub fn take(&mut self) -> Self {
        Self { raw: std::mem::replace(&mut self.raw, K::INVALID), _kind: PhantomData }
    }

    /// Release the resource if valid.  Idempotent.
    pub fn close(&mut self) {
        let raw = std::mem::replace(&mut self.raw, K::INVALID);
        if K::is_valid_raw(raw) {
            K::release(raw);
        }
    }

    /// Alias of [`close`](Self::close).
    pub fn reset(&mut self) {
        self.close();
    }
}

impl<K: HandleKind> Default for NativeHandle<K> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<K: HandleKind> Drop for NativeHandle<K> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<K: HandleKind> fmt::Debug for NativeHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            f.debug_tuple("NativeHandle").field(&self.raw).finish()
        } else {
            f.write_str("NativeHandle(invalid)")
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, not(oskit_backend = "fallback")))]
mod tests {
    use super::*;
    use crate::platform::{FileSys, Fs};

    #[test]
    fn default_is_invalid() {
        let h: NativeHandle = NativeHandle::default();
        assert!(!h.is_valid());
        assert_eq!(h.get(), Descriptor::INVALID);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut r, mut w) = Fs::pipe().expect("pipe");
        assert!(r.is_valid() && w.is_valid());

        r.close();
        assert!(!r.is_valid());
        r.close();
        r.reset();
        assert!(!r.is_valid());

        w.reset();
        assert!(!w.is_valid());
    }

    #[test]
    fn dropping_write_end_yields_eof() {
        let (r, w) = Fs::pipe().expect("pipe");
        assert_eq!(Fs::write(&w, b"last").expect("write"), 4);
        drop(w);

        let mut buf = [0u8; 8];
        assert_eq!(Fs::read(&r, &mut buf).expect("read"), 4);
        assert_eq!(&buf[..4], b"last");
        assert_eq!(Fs::read(&r, &mut buf).expect("read at eof"), 0, "drop released the write end");
    }

    #[test]
    fn take_invalidates_source() {
        let (mut r, _w) = Fs::pipe().expect("pipe");
        let raw = r.get();

        let moved = r.take();
        assert!(!r.is_valid());
        assert!(moved.is_valid());
        assert_eq!(moved.get(), raw);
    }

    #[test]
    fn into_raw_round_trips_through_from_raw() {
        let (r, _w) = Fs::pipe().expect("pipe");
        let raw = r.into_raw();
        // SAFETY: `raw` came from `into_raw`, so nothing else owns it.
        let back: NativeHandle = unsafe { NativeHandle::from_raw(raw) };
        assert!(back.is_valid());
        assert_eq!(back.get(), raw);
    }

    #[test]
    fn from_raw_sentinel_is_invalid() {
        // SAFETY: the sentinel owns nothing.
        let h: NativeHandle = unsafe { NativeHandle::from_raw(Descriptor::INVALID) };
        assert!(!h.is_valid());
    }
}
