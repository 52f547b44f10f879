// ── Error taxonomy & per-thread error context ─────────────────────────────────
//
// All fallible operations in oskit return `error::Result<T>`.  In addition,
// every failure is recorded in the calling thread's error context so that
// callers who only look at a success flag can still ask "what went wrong?"
// through `error::get()`.
//
// The context is thread-confined: each thread sees only the errors raised by
// its own calls.  No lock is involved.

use std::cell::RefCell;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

// ── Codes ─────────────────────────────────────────────────────────────────────

/// Stable error codes, grouped by category.
///
/// The numeric values are part of the public contract and never change; they
/// are meant for comparison across module (and process) boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    /// No error.
    #[default]
    None = 0,

    // Generic
    Failed = 1,
    RuntimeError = 2,
    NotConfigured = 3,

    // Capacity
    OutOfRange = 10,
    OutOfMemory = 11,
    SizeError = 12,

    // Validity
    InvalidData = 20,
    InvalidArgument = 21,
    UnsupportedFormat = 22,
    UnsupportedConversion = 23,
    UnsupportedOperation = 24,

    // Existence
    ResourceNotFound = 30,
    ResourceAlreadyExists = 31,

    // File
    FileOperationFailed = 40,
    FileOpenFailed = 41,
    FileReadFailed = 42,
    FileWriteFailed = 43,
    FileNoPermission = 44,
    FileInUse = 45,
    FileCorrupt = 46,

    /// An OS-reported failure; the message carries the OS's own text.
    PlatformError = 50,
}

impl ErrorCode {
    const ALL: [ErrorCode; 22] = [
        Self::None,
        Self::Failed,
        Self::RuntimeError,
        Self::NotConfigured,
        Self::OutOfRange,
        Self::OutOfMemory,
        Self::SizeError,
        Self::InvalidData,
        Self::InvalidArgument,
        Self::UnsupportedFormat,
        Self::UnsupportedConversion,
        Self::UnsupportedOperation,
        Self::ResourceNotFound,
        Self::ResourceAlreadyExists,
        Self::FileOperationFailed,
        Self::FileOpenFailed,
        Self::FileReadFailed,
        Self::FileWriteFailed,
        Self::FileNoPermission,
        Self::FileInUse,
        Self::FileCorrupt,
        Self::PlatformError,
    ];

    /// The stable numeric value of this code.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Look a code up by its numeric value.
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_u32() == value)
    }

    /// `true` for [`ErrorCode::None`].
    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Message used when an error is raised without explicit text.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::None => "no error",
            Self::Failed => "operation failed",
            Self::RuntimeError => "runtime error",
            Self::NotConfigured => "not configured",
            Self::OutOfRange => "value out of range",
            Self::OutOfMemory => "out of memory",
            Self::SizeError => "invalid size",
            Self::InvalidData => "invalid data",
            Self::InvalidArgument => "invalid argument",
            Self::UnsupportedFormat => "unsupported format",
            Self::UnsupportedConversion => "unsupported conversion",
            Self::UnsupportedOperation => "unsupported operation",
            Self::ResourceNotFound => "resource not found",
            Self::ResourceAlreadyExists => "resource already exists",
            Self::FileOperationFailed => "file operation failed",
            Self::FileOpenFailed => "failed to open file",
            Self::FileReadFailed => "failed to read file",
            Self::FileWriteFailed => "failed to write file",
            Self::FileNoPermission => "permission denied",
            Self::FileInUse => "file is in use",
            Self::FileCorrupt => "file is corrupt",
            Self::PlatformError => "platform error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_message())
    }
}

// ── Error value ───────────────────────────────────────────────────────────────

/// Every error that oskit can produce: a code plus diagnostic text.
///
/// This is also the value held by the per-thread error context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// An error carrying the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// `UNSUPPORTED_OPERATION` for `what`.
    pub(crate) fn unsupported(what: &str) -> Self {
        Self::new(ErrorCode::UnsupportedOperation, format!("{what} is not supported"))
    }

    /// Translate an OS error into the taxonomy.
    ///
    /// Well-known kinds map onto their own codes; everything else falls back to
    /// `fallback`.  The OS's text is kept, prefixed by `context`.
    pub(crate) fn from_os(context: &str, err: &io::Error, fallback: ErrorCode) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::ResourceNotFound,
            io::ErrorKind::PermissionDenied => ErrorCode::FileNoPermission,
            io::ErrorKind::AlreadyExists => ErrorCode::ResourceAlreadyExists,
            io::ErrorKind::InvalidInput => ErrorCode::InvalidArgument,
            io::ErrorKind::OutOfMemory => ErrorCode::OutOfMemory,
            _ => fallback,
        };
        Self::new(code, format!("{context}: {err}"))
    }

    pub fn is_none(&self) -> bool {
        self.code.is_none()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code.as_u32())
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::from_os("I/O error", &e, ErrorCode::PlatformError)
    }
}

// `File` implements `std::io::Read`/`Write`, which must speak `io::Error`.
impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match e.code {
            ErrorCode::ResourceNotFound => io::ErrorKind::NotFound,
            ErrorCode::FileNoPermission => io::ErrorKind::PermissionDenied,
            ErrorCode::ResourceAlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorCode::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorCode::OutOfMemory => io::ErrorKind::OutOfMemory,
            ErrorCode::UnsupportedOperation => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ── Thread-local context ──────────────────────────────────────────────────────

thread_local! {
    // Lives exactly as long as the owning thread.
    static LAST_ERROR: RefCell<Error> = RefCell::new(Error::default());
}

/// Record `code` and `message` as the calling thread's last error.
pub fn set(code: ErrorCode, message: impl Into<String>) {
    let err = Error::new(code, message);
    LAST_ERROR.with(|slot| *slot.borrow_mut() = err);
}

/// Record `code` with its default message.
pub fn set_code(code: ErrorCode) {
    set(code, code.default_message());
}

/// A copy of the calling thread's last error.
pub fn get() -> Error {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// The calling thread's last error code.
pub fn last_code() -> ErrorCode {
    LAST_ERROR.with(|slot| slot.borrow().code)
}

/// Reset the calling thread's context to "no error".
pub fn clear() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Error::default());
}

/// Records the error side of a `Result` into the thread's context.
///
/// Every public operation funnels its outcome through `.record()` before
/// returning, so the context always reflects the most recent failure.
pub(crate) trait Record {
    fn record(self) -> Self;
}

impl<T> Record for Result<T> {
    fn record(self) -> Self {
        if let Err(e) = &self {
            let e = e.clone();
            LAST_ERROR.with(|slot| *slot.borrow_mut() = e);
        }
        self
    }
}

/// Build `err`, record it, and return it.  Used for failures detected in the
/// front ends before any backend call is made.
pub(crate) fn raise(code: ErrorCode, message: impl Into<String>) -> Error {
    let err = Error::new(code, message);
    LAST_ERROR.with(|slot| *slot.borrow_mut() = err.clone());
    err
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_thread_has_no_error() {
        let code = std::thread::spawn(last_code).join().expect("join");
        assert_eq!(code, ErrorCode::None);
    }

    #[test]
    fn set_get_clear() {
        set(ErrorCode::FileCorrupt, "bad header");
        let e = get();
        assert_eq!(e.code, ErrorCode::FileCorrupt);
        assert_eq!(e.message, "bad header");

        clear();
        assert!(get().is_none());
    }

    #[test]
    fn set_code_uses_default_message() {
        set_code(ErrorCode::OutOfRange);
        assert_eq!(get().message, "value out of range");
        clear();
    }

    #[test]
    fn context_is_thread_confined() {
        set(ErrorCode::PlatformError, "main thread failure");

        let seen = std::thread::spawn(|| {
            let before = last_code();
            set(ErrorCode::InvalidData, "worker failure");
            (before, last_code())
        })
        .join()
        .expect("join");

        assert_eq!(seen, (ErrorCode::None, ErrorCode::InvalidData));
        // The worker's failure never reached this thread.
        assert_eq!(last_code(), ErrorCode::PlatformError);
        clear();
    }

    #[test]
    fn record_only_writes_failures() {
        clear();
        let ok: Result<u8> = Ok(1);
        assert!(ok.record().is_ok());
        assert!(get().is_none());

        let failed: Result<u8> = Err(Error::from_code(ErrorCode::SizeError));
        assert!(failed.record().is_err());
        assert_eq!(last_code(), ErrorCode::SizeError);
        clear();
    }

    #[test]
    fn numeric_codes_are_stable() {
        assert_eq!(ErrorCode::None.as_u32(), 0);
        assert_eq!(ErrorCode::UnsupportedOperation.as_u32(), 24);
        assert_eq!(ErrorCode::PlatformError.as_u32(), 50);
        assert_eq!(ErrorCode::from_u32(44), Some(ErrorCode::FileNoPermission));
        assert_eq!(ErrorCode::from_u32(9999), None);
    }

    #[test]
    fn os_errors_are_translated() {
        let not_found = io::Error::from(io::ErrorKind::NotFound);
        let e = Error::from_os("open(x)", &not_found, ErrorCode::FileOpenFailed);
        assert_eq!(e.code, ErrorCode::ResourceNotFound);
        assert!(e.message.starts_with("open(x): "));

        let other = io::Error::new(io::ErrorKind::Other, "weird");
        let e = Error::from_os("read", &other, ErrorCode::FileReadFailed);
        assert_eq!(e.code, ErrorCode::FileReadFailed);
    }

    #[test]
    fn codes_serialize_symbolically() {
        let e = Error::new(ErrorCode::PlatformError, "dlopen failed");
        let json = serde_json::to_string(&e).expect("serialize");
        assert_eq!(json, r#"{"code":"PLATFORM_ERROR","message":"dlopen failed"}"#);

        let back: Error = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, e);
    }

    #[test]
    fn converts_into_io_error() {
        let io_err: io::Error = Error::from_code(ErrorCode::ResourceNotFound).into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    }
}
