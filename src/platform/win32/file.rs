// ── Files and pipes ───────────────────────────────────────────────────────────

use std::path::Path;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    DuplicateHandle, DUPLICATE_SAME_ACCESS, ERROR_BROKEN_PIPE, ERROR_INVALID_HANDLE, HANDLE,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, DeleteFileW, FlushFileBuffers, GetFileAttributesW, GetFileSizeEx, ReadFile,
    SetFilePointerEx, WriteFile, CREATE_ALWAYS, FILE_ATTRIBUTE_NORMAL, FILE_BEGIN,
    FILE_CREATION_DISPOSITION, FILE_CURRENT, FILE_END, FILE_GENERIC_READ, FILE_GENERIC_WRITE,
    FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, FILE_WRITE_DATA,
    INVALID_FILE_ATTRIBUTES, OPEN_ALWAYS, OPEN_EXISTING,
};
use windows::Win32::System::Pipes::CreatePipe;
use windows::Win32::System::Threading::GetCurrentProcess;

use super::{adopt, raw_handle, wide, win_error, Descriptor, Fs};
use crate::error::{ErrorCode, Result};
use crate::file::{FileMode, SeekOrigin};
use crate::handle::NativeHandle;
use crate::platform::FileSys;

fn access_and_disposition(mode: FileMode) -> (u32, FILE_CREATION_DISPOSITION) {
    let read = FILE_GENERIC_READ.0;
    let write = FILE_GENERIC_WRITE.0;
    match mode {
        FileMode::Read => (read, OPEN_EXISTING),
        FileMode::Write => (write, CREATE_ALWAYS),
        // Without FILE_WRITE_DATA every write lands at the end of the file.
        FileMode::Append => (write & !FILE_WRITE_DATA.0, OPEN_ALWAYS),
        FileMode::ReadWriteExists => (read | write, OPEN_EXISTING),
        FileMode::ReadWriteCreate => (read | write, OPEN_ALWAYS),
    }
}

impl FileSys for Fs {
    fn open(path: &Path, mode: FileMode) -> Result<NativeHandle<Descriptor>> {
        let name = wide(path.as_os_str(), "path")?;
        let (access, disposition) = access_and_disposition(mode);
        // SAFETY: `name` is NUL-terminated and outlives the call; the
        // returned handle is owned by the caller.
        let handle = unsafe {
            CreateFileW(
                PCWSTR(name.as_ptr()),
                access,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                None,
                disposition,
                FILE_ATTRIBUTE_NORMAL,
                HANDLE::default(),
            )
        }
        .map_err(|e| win_error(&format!("open {}", path.display()), e, ErrorCode::FileOpenFailed))?;
        Ok(adopt(handle))
    }

    fn read(fd: &NativeHandle<Descriptor>, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len().min(u32::MAX as usize);
        let mut read = 0u32;
        // SAFETY: `buf[..len]` is writable and `read` is a valid out-pointer.
        let result = unsafe { ReadFile(raw_handle(fd), Some(&mut buf[..len]), Some(&mut read), None) };
        match result {
            Ok(()) => Ok(read as usize),
            // The write end of a pipe was closed: end of stream.
            Err(e) if e.code() == ERROR_BROKEN_PIPE.to_hresult() => Ok(0),
            Err(e) => Err(win_error("ReadFile", e, ErrorCode::FileReadFailed)),
        }
    }

    fn write(fd: &NativeHandle<Descriptor>, buf: &[u8]) -> Result<usize> {
        let len = buf.len().min(u32::MAX as usize);
        let mut written = 0u32;
        // SAFETY: `buf[..len]` is readable and `written` is a valid out-pointer.
        unsafe { WriteFile(raw_handle(fd), Some(&buf[..len]), Some(&mut written), None) }
            .map_err(|e| win_error("WriteFile", e, ErrorCode::FileWriteFailed))?;
        Ok(written as usize)
    }

    fn seek(fd: &NativeHandle<Descriptor>, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let method = match origin {
            SeekOrigin::Begin => FILE_BEGIN,
            SeekOrigin::Current => FILE_CURRENT,
            SeekOrigin::End => FILE_END,
        };
        let mut pos = 0i64;
        // SAFETY: `pos` is a valid out-pointer.
        unsafe { SetFilePointerEx(raw_handle(fd), offset, Some(&mut pos), method) }
            .map_err(|e| win_error("SetFilePointerEx", e, ErrorCode::FileOperationFailed))?;
        Ok(pos as u64)
    }

    fn size(fd: &NativeHandle<Descriptor>) -> Result<u64> {
        let mut size = 0i64;
        // SAFETY: `size` is a valid out-pointer.
        unsafe { GetFileSizeEx(raw_handle(fd), &mut size) }
            .map_err(|e| win_error("GetFileSizeEx", e, ErrorCode::FileOperationFailed))?;
        Ok(size as u64)
    }

    fn flush(fd: &NativeHandle<Descriptor>) -> Result<()> {
        // SAFETY: plain call on an owned handle.
        match unsafe { FlushFileBuffers(raw_handle(fd)) } {
            Ok(()) => Ok(()),
            // Pipes and consoles have no buffers to flush.
            Err(e) if e.code() == ERROR_INVALID_HANDLE.to_hresult() => Ok(()),
            Err(e) => Err(win_error("FlushFileBuffers", e, ErrorCode::FileWriteFailed)),
        }
    }

    fn duplicate(fd: &NativeHandle<Descriptor>) -> Result<NativeHandle<Descriptor>> {
        let mut dup = HANDLE::default();
        // SAFETY: both process handles refer to this process; `dup` is a
        // valid out-pointer and becomes owned by the returned NativeHandle.
        unsafe {
            DuplicateHandle(
                GetCurrentProcess(),
                raw_handle(fd),
                GetCurrentProcess(),
                &mut dup,
                0,
                false,
                DUPLICATE_SAME_ACCESS,
            )
        }
        .map_err(|e| win_error("DuplicateHandle", e, ErrorCode::PlatformError))?;
        Ok(adopt(dup))
    }

    fn pipe() -> Result<(NativeHandle<Descriptor>, NativeHandle<Descriptor>)> {
        let mut read = HANDLE::default();
        let mut write = HANDLE::default();
        // SAFETY: both out-pointers are valid.  Without security attributes
        // neither end is inheritable.
        unsafe { CreatePipe(&mut read, &mut write, None, 0) }
            .map_err(|e| win_error("CreatePipe", e, ErrorCode::PlatformError))?;
        Ok((adopt(read), adopt(write)))
    }

    fn exists(path: &Path) -> bool {
        let Ok(name) = wide(path.as_os_str(), "path") else {
            return false;
        };
        // SAFETY: `name` is NUL-terminated.
        unsafe { GetFileAttributesW(PCWSTR(name.as_ptr())) != INVALID_FILE_ATTRIBUTES }
    }

    fn remove(path: &Path) -> Result<()> {
        let name = wide(path.as_os_str(), "path")?;
        // SAFETY: `name` is NUL-terminated.
        unsafe { DeleteFileW(PCWSTR(name.as_ptr())) }.map_err(|e| {
            win_error(&format!("delete {}", path.display()), e, ErrorCode::FileOperationFailed)
        })
    }
}
