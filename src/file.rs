// ── File ──────────────────────────────────────────────────────────────────────
//
// Stream abstraction over one OS file resource.  A `File` is also what a
// `Process` hands out for its CREATE pipes and accepts for REDIRECT, so the
// same type covers disk files and pipe ends.
//
// No `unsafe` here; all OS calls go through `platform::Fs`.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{self, ErrorCode, Record, Result};
use crate::handle::NativeHandle;
use crate::platform::{FileSys, Fs};

// ── Modes ─────────────────────────────────────────────────────────────────────

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileMode {
    /// Read only; the file must exist.
    Read,
    /// Write only; created if absent, truncated if present.
    Write,
    /// Write only, every write goes to the end; created if absent.
    Append,
    /// Read and write; fails if the file does not exist.
    ReadWriteExists,
    /// Read and write; created if absent, never truncated.
    ReadWriteCreate,
}

impl FileMode {
    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWriteExists | Self::ReadWriteCreate)
    }

    pub fn can_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Reference point for [`File::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeekOrigin {
    Begin,
    Current,
    End,
}

// ── File ──────────────────────────────────────────────────────────────────────

/// An open (or not yet opened) file.
///
/// Move-only.  Calls on the same `File` from two threads must be serialised
/// by the caller.
#[derive(Debug, Default)]
pub struct File {
    handle: NativeHandle,
    mode: Option<FileMode>,
    path: Option<PathBuf>,
    eof: bool,
}

impl File {
    /// A closed file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` in `mode` and return the open file.
    pub fn from_path(path: impl AsRef<Path>, mode: FileMode) -> Result<Self> {
        let mut file = Self::new();
        file.open(path, mode)?;
        Ok(file)
    }

    /// Wrap an already-open descriptor (pipe ends, duplicated handles).
    pub(crate) fn from_handle(handle: NativeHandle, mode: FileMode) -> Self {
        Self { handle, mode: Some(mode), path: None, eof: false }
    }

    pub(crate) fn handle(&self) -> &NativeHandle {
        &self.handle
    }

    /// Open `path`.  Any file previously held by `self` is closed first.
    pub fn open(&mut self, path: impl AsRef<Path>, mode: FileMode) -> Result<()> {
        let path = path.as_ref();
        self.close();
        let handle = Fs::open(path, mode).record()?;
        log::debug!("opened {} ({mode:?})", path.display());
        *self = Self { handle, mode: Some(mode), path: Some(path.to_owned()), eof: false };
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_valid()
    }

    /// Close the file.  Closing a closed file is a no-op.
    pub fn close(&mut self) {
        self.handle.close();
        self.mode = None;
        self.path = None;
        self.eof = false;
    }

    /// The mode the file was opened with, if open.
    pub fn mode(&self) -> Option<FileMode> {
        self.mode
    }

    /// The path the file was opened from (`None` for pipes).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total size in bytes.
    pub fn size(&self) -> Result<u64> {
        self.ensure_open("size")?;
        Fs::size(&self.handle).record()
    }

    /// Move the position; returns the new absolute position.  Clears the
    /// end-of-file flag.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        self.ensure_open("seek")?;
        let pos = Fs::seek(&self.handle, offset, origin).record()?;
        self.eof = false;
        Ok(pos)
    }

    /// Current position.
    pub fn tell(&self) -> Result<u64> {
        self.ensure_open("tell")?;
        Fs::seek(&self.handle, 0, SeekOrigin::Current).record()
    }

    /// `true` once a read has hit the end of the file.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Read up to `buf.len()` bytes; returns the number actually read.
    ///
    /// Zero bytes for a non-empty buffer means end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open("read")?;
        let n = Fs::read(&self.handle, buf).record()?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }

    /// Write up to `buf.len()` bytes; returns the number actually written.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_open("write")?;
        Fs::write(&self.handle, buf).record()
    }

    /// Write every byte of `buf`, retrying short writes.
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => {
                    return Err(error::raise(ErrorCode::FileWriteFailed, "write returned zero bytes"))
                }
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Read until end of file, appending to `out`.  Returns bytes read.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let start = out.len();
        let mut chunk = [0u8; 8 * 1024];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(out.len() - start);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open("flush")?;
        Fs::flush(&self.handle).record()
    }

    /// A second `File` sharing the same open file description.
    pub fn try_clone(&self) -> Result<Self> {
        self.ensure_open("try_clone")?;
        let handle = Fs::duplicate(&self.handle).record()?;
        Ok(Self { handle, mode: self.mode, path: self.path.clone(), eof: false })
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(error::raise(ErrorCode::FileOperationFailed, format!("{op}: file is not open")))
        }
    }

    // ── Whole-file helpers ────────────────────────────────────────────────────

    /// Read the entire file.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let mut file = Self::from_path(path, FileMode::Read)?;
        // Capacity hint only; a failed size query must not reach the error context.
        let hint = Fs::size(&file.handle).map_or(0, |len| usize::try_from(len).unwrap_or(0));
        let mut out = Vec::with_capacity(hint);
        file.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Read the entire file as UTF-8 text.
    pub fn read_text(path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let bytes = Self::read_file(path)?;
        String::from_utf8(bytes).map_err(|e| {
            error::raise(ErrorCode::InvalidData, format!("{}: not UTF-8: {e}", path.display()))
        })
    }

    /// Replace the file's contents with `data`, creating it if needed.
    pub fn write_file(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
        let mut file = Self::from_path(path, FileMode::Write)?;
        file.write_all(data)?;
        file.flush()
    }

    /// Append `data` to the file, creating it if needed.
    pub fn append_file(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
        let mut file = Self::from_path(path, FileMode::Append)?;
        file.write_all(data)?;
        file.flush()
    }

    pub fn exists(path: impl AsRef<Path>) -> bool {
        Fs::exists(path.as_ref())
    }

    pub fn remove(path: impl AsRef<Path>) -> Result<()> {
        Fs::remove(path.as_ref()).record()
    }
}

// ── std::io integration ───────────────────────────────────────────────────────

impl io::Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        File::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        File::flush(self).map_err(io::Error::from)
    }
}

impl io::Seek for File {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, origin) = match pos {
            io::SeekFrom::Start(n) => {
                let n = i64::try_from(n).map_err(|_| {
                    io::Error::from(error::raise(ErrorCode::OutOfRange, "seek offset too large"))
                })?;
                (n, SeekOrigin::Begin)
            }
            io::SeekFrom::Current(n) => (n, SeekOrigin::Current),
            io::SeekFrom::End(n) => (n, SeekOrigin::End),
        };
        File::seek(self, offset, origin).map_err(io::Error::from)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, not(oskit_backend = "fallback")))]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bin");

        let mut f = File::from_path(&path, FileMode::Write).expect("open for write");
        assert_eq!(f.write(b"hello world").expect("write"), 11);
        f.close();
        assert!(!f.is_open());

        let mut f = File::from_path(&path, FileMode::Read).expect("open for read");
        assert_eq!(f.size().expect("size"), 11);
        let mut buf = [0u8; 32];
        let n = f.read(&mut buf).expect("read");
        assert_eq!(&buf[..n], b"hello world");
        assert!(!f.eof());
        assert_eq!(f.read(&mut buf).expect("read at end"), 0);
        assert!(f.eof());
    }

    #[test]
    fn seek_and_tell() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seek.txt");
        File::write_file(&path, b"0123456789").expect("write_file");

        let mut f = File::from_path(&path, FileMode::Read).expect("open");
        assert_eq!(f.seek(4, SeekOrigin::Begin).expect("seek begin"), 4);
        assert_eq!(f.tell().expect("tell"), 4);
        assert_eq!(f.seek(2, SeekOrigin::Current).expect("seek current"), 6);
        assert_eq!(f.seek(-1, SeekOrigin::End).expect("seek end"), 9);

        let mut buf = [0u8; 4];
        assert_eq!(f.read(&mut buf).expect("read"), 1);
        assert_eq!(buf[0], b'9');

        f.read(&mut buf).expect("read at end");
        assert!(f.eof());
        f.seek(0, SeekOrigin::Begin).expect("rewind");
        assert!(!f.eof(), "seek clears eof");
    }

    #[test]
    fn read_write_exists_requires_file() {
        error::clear();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.txt");

        let err = File::from_path(&path, FileMode::ReadWriteExists).expect_err("must fail");
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
        assert_eq!(error::last_code(), ErrorCode::ResourceNotFound);

        let mut f = File::from_path(&path, FileMode::ReadWriteCreate).expect("create");
        f.write_all(b"abc").expect("write");
        assert!(File::exists(&path));

        // READ_WRITE_CREATE must not truncate an existing file.
        drop(f);
        let f = File::from_path(&path, FileMode::ReadWriteCreate).expect("reopen");
        assert_eq!(f.size().expect("size"), 3);
        error::clear();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn read_file_ignores_reported_size() {
        // procfs reports a size of zero for files that do have content.
        error::clear();
        let status = File::read_text("/proc/self/status").expect("read procfs");
        assert!(status.contains("Pid:"));
        assert_eq!(error::last_code(), ErrorCode::None);
    }

    #[test]
    fn append_mode_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.txt");

        File::append_file(&path, b"one\n").expect("append 1");
        File::append_file(&path, b"two\n").expect("append 2");
        assert_eq!(File::read_text(&path).expect("read"), "one\ntwo\n");

        File::write_file(&path, b"reset").expect("truncate");
        assert_eq!(File::read_file(&path).expect("read"), b"reset");
    }

    #[test]
    fn operations_on_closed_file_fail() {
        let mut f = File::new();
        assert!(!f.is_open());
        let mut buf = [0u8; 1];
        let err = f.read(&mut buf).expect_err("closed");
        assert_eq!(err.code, ErrorCode::FileOperationFailed);
        assert!(f.size().is_err());
        f.close();
        error::clear();
    }

    #[test]
    fn try_clone_shares_position() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clone.txt");
        File::write_file(&path, b"abcdef").expect("write_file");

        let mut a = File::from_path(&path, FileMode::Read).expect("open");
        let mut b = a.try_clone().expect("clone");
        let mut buf = [0u8; 3];
        a.read(&mut buf).expect("read a");
        b.read(&mut buf).expect("read b");
        assert_eq!(&buf, b"def");
    }

    #[test]
    fn remove_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gone.txt");
        File::write_file(&path, b"x").expect("write_file");
        File::remove(&path).expect("remove");
        assert!(!File::exists(&path));
        assert!(File::remove(&path).is_err());
        error::clear();
    }

    #[test]
    fn std_io_traits() {
        use std::io::{Read, Seek, SeekFrom, Write};

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("io.txt");
        let mut f = File::from_path(&path, FileMode::ReadWriteCreate).expect("open");
        writeln!(f, "line {}", 1).expect("writeln");
        Seek::seek(&mut f, SeekFrom::Start(0)).expect("seek");
        let mut s = String::new();
        f.read_to_string(&mut s).expect("read_to_string");
        assert_eq!(s, "line 1\n");
    }

    #[test]
    fn invalid_utf8_is_invalid_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bin.dat");
        File::write_file(&path, &[0xff, 0xfe, 0x00]).expect("write_file");
        let err = File::read_text(&path).expect_err("not utf-8");
        assert_eq!(err.code, ErrorCode::InvalidData);
        error::clear();
    }
}
