// ── Files and pipes ───────────────────────────────────────────────────────────

use std::ffi::{c_int, c_uint};
use std::path::Path;

use super::{c_path, last_error, os_error, retry, Descriptor, Fs};
use crate::error::{Error, ErrorCode, Result};
use crate::file::{FileMode, SeekOrigin};
use crate::handle::NativeHandle;
use crate::platform::FileSys;

/// Largest single read/write request; macOS rejects counts above `INT_MAX`.
const MAX_IO: usize = c_int::MAX as usize - 1;

fn open_flags(mode: FileMode) -> c_int {
    let access = match mode {
        FileMode::Read => libc::O_RDONLY,
        FileMode::Write => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
        FileMode::Append => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
        FileMode::ReadWriteExists => libc::O_RDWR,
        FileMode::ReadWriteCreate => libc::O_RDWR | libc::O_CREAT,
    };
    access | libc::O_CLOEXEC
}

/// Wrap a freshly created descriptor.
fn adopt(fd: c_int) -> NativeHandle<Descriptor> {
    // SAFETY: `fd` was just returned by the OS and has no other owner.
    unsafe { NativeHandle::from_raw(fd) }
}

impl FileSys for Fs {
    fn open(path: &Path, mode: FileMode) -> Result<NativeHandle<Descriptor>> {
        let c_path = c_path(path)?;
        let flags = open_flags(mode);
        // SAFETY: `c_path` is NUL-terminated and outlives the call.
        let fd = retry(|| unsafe { libc::open(c_path.as_ptr(), flags, 0o666 as c_uint) })
            .map_err(|e| {
                os_error(&format!("open {}", path.display()), e, ErrorCode::FileOpenFailed)
            })?;
        Ok(adopt(fd))
    }

    fn read(fd: &NativeHandle<Descriptor>, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len().min(MAX_IO);
        // SAFETY: `buf` is valid for `len` writable bytes.
        let n = retry(|| unsafe { libc::read(fd.get(), buf.as_mut_ptr().cast(), len) })
            .map_err(|e| os_error("read", e, ErrorCode::FileReadFailed))?;
        Ok(n as usize)
    }

    fn write(fd: &NativeHandle<Descriptor>, buf: &[u8]) -> Result<usize> {
        let len = buf.len().min(MAX_IO);
        // SAFETY: `buf` is valid for `len` readable bytes.
        let n = retry(|| unsafe { libc::write(fd.get(), buf.as_ptr().cast(), len) })
            .map_err(|e| os_error("write", e, ErrorCode::FileWriteFailed))?;
        Ok(n as usize)
    }

    fn seek(fd: &NativeHandle<Descriptor>, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let whence = match origin {
            SeekOrigin::Begin => libc::SEEK_SET,
            SeekOrigin::Current => libc::SEEK_CUR,
            SeekOrigin::End => libc::SEEK_END,
        };
        let offset = libc::off_t::try_from(offset).map_err(|_| {
            Error::new(ErrorCode::OutOfRange, format!("seek offset {offset} out of range"))
        })?;
        // SAFETY: plain lseek on an owned descriptor.
        let pos = unsafe { libc::lseek(fd.get(), offset, whence) };
        if pos < 0 {
            return Err(last_error("lseek", ErrorCode::FileOperationFailed));
        }
        Ok(pos as u64)
    }

    fn size(fd: &NativeHandle<Descriptor>) -> Result<u64> {
        // SAFETY: `stat` is plain old data; fstat fills it in.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: `st` is a valid out-pointer.
        if unsafe { libc::fstat(fd.get(), &mut st) } < 0 {
            return Err(last_error("fstat", ErrorCode::FileOperationFailed));
        }
        Ok(st.st_size as u64)
    }

    fn flush(fd: &NativeHandle<Descriptor>) -> Result<()> {
        // SAFETY: plain fsync on an owned descriptor.
        match retry(|| unsafe { libc::fsync(fd.get()) }) {
            Ok(_) => Ok(()),
            Err(e) => match e.raw_os_error() {
                // Pipes, ttys and read-only mounts have nothing to sync.
                Some(libc::EINVAL | libc::EROFS | libc::ENOTSUP) => Ok(()),
                _ => Err(os_error("fsync", e, ErrorCode::FileWriteFailed)),
            },
        }
    }

    fn duplicate(fd: &NativeHandle<Descriptor>) -> Result<NativeHandle<Descriptor>> {
        // SAFETY: F_DUPFD_CLOEXEC returns a new descriptor or -1.
        let dup = unsafe { libc::fcntl(fd.get(), libc::F_DUPFD_CLOEXEC, 0) };
        if dup < 0 {
            return Err(last_error("fcntl(F_DUPFD_CLOEXEC)", ErrorCode::PlatformError));
        }
        Ok(adopt(dup))
    }

    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    fn pipe() -> Result<(NativeHandle<Descriptor>, NativeHandle<Descriptor>)> {
        let mut fds = [-1 as c_int; 2];
        // SAFETY: `fds` has room for the two descriptors.
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
            return Err(last_error("pipe2", ErrorCode::PlatformError));
        }
        Ok((adopt(fds[0]), adopt(fds[1])))
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    )))]
    fn pipe() -> Result<(NativeHandle<Descriptor>, NativeHandle<Descriptor>)> {
        let mut fds = [-1 as c_int; 2];
        // SAFETY: `fds` has room for the two descriptors.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(last_error("pipe", ErrorCode::PlatformError));
        }
        let (read, write) = (adopt(fds[0]), adopt(fds[1]));
        // A fork on another thread may still catch these before this point.
        for fd in [read.get(), write.get()] {
            // SAFETY: plain fcntl on a descriptor owned above.
            if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
                return Err(last_error("fcntl(FD_CLOEXEC)", ErrorCode::PlatformError));
            }
        }
        Ok((read, write))
    }

    fn exists(path: &Path) -> bool {
        let Ok(c_path) = c_path(path) else {
            return false;
        };
        // SAFETY: `c_path` is NUL-terminated.
        unsafe { libc::access(c_path.as_ptr(), libc::F_OK) == 0 }
    }

    fn remove(path: &Path) -> Result<()> {
        let c_path = c_path(path)?;
        // SAFETY: `c_path` is NUL-terminated.
        if unsafe { libc::unlink(c_path.as_ptr()) } < 0 {
            return Err(last_error(
                &format!("unlink {}", path.display()),
                ErrorCode::FileOperationFailed,
            ));
        }
        Ok(())
    }
}
