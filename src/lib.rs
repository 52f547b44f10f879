// ── oskit ─────────────────────────────────────────────────────────────────────
//
// Cross-platform operating-system primitives: files, native threads, mutexes,
// shared libraries, child processes with stdio wiring, entropy, clocks, and
// thin locale / memory / power queries.
//
// Every facility is a platform-independent front end over exactly one backend
// chosen at build time (`win32`, `posix`, or `fallback`; see `build.rs`).
// On the fallback backend everything still compiles and links, and every
// operation fails at call time with `ErrorCode::UnsupportedOperation`.
//
// Errors are returned as `oskit::Result` and also recorded in the calling
// thread's error context (`oskit::error::get()`).

// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except:
//   • `platform::{win32, posix}` – OS FFI
//   • `handle`                   – adopting raw descriptors
//   • `mutex`                    – the unlock contract
//   • `library`                  – typed symbol resolution
//   • `platform` (contract)      – declaring `MutexSys::unlock`
//   • `platform::fallback`       – implementing `MutexSys::unlock`
// Each unsafe block in those modules MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

pub mod error;
pub mod file;
pub mod handle;
pub mod library;
pub mod locale;
pub mod memory;
pub mod mutex;
pub mod power;
pub mod process;
pub mod random;
pub mod thread;
pub mod time;

mod platform;

pub use error::{Error, ErrorCode, Result};
pub use file::{File, FileMode, SeekOrigin};
pub use handle::NativeHandle;
pub use library::SharedLibrary;
pub use mutex::{LockGuard, Lockable, Mutex, RecursiveMutex};
pub use process::{Process, ProcessConfig, Stdio, StdioOption};
pub use thread::{Thread, ThreadId};

/// Name of the backend compiled into this build: `"win32"`, `"posix"` or
/// `"fallback"`.
pub fn backend() -> &'static str {
    platform::BACKEND
}

#[cfg(test)]
mod tests {
    #[test]
    fn backend_matches_build_configuration() {
        let expected = if cfg!(oskit_backend = "fallback") {
            "fallback"
        } else if cfg!(windows) {
            "win32"
        } else {
            "posix"
        };
        assert_eq!(super::backend(), expected);
    }
}
