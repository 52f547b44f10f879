// ── Child processes (fork + execve) ───────────────────────────────────────────
//
// Everything the child needs (argv, envp, resolved program path, working
// directory) is converted to C strings before `fork`, so the child only makes
// async-signal-safe calls until `execve`.
//
// Exec failures travel back over a close-on-exec pipe: the child writes its
// errno and exits; a successful exec closes the pipe with nothing written.

use std::ffi::{c_char, c_int, CString, OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;

use super::{c_path, c_string, last_error, os_error, retry, Descriptor, Fs, Processes};
use crate::error::{Error, ErrorCode, Result};
use crate::handle::NativeHandle;
use crate::platform::{ChildStdio, FileSys, ProcessSys, SpawnRequest};

/// A forked child and, once reaped, its exit code.
pub(crate) struct Child {
    pid: libc::pid_t,
    status: Option<i32>,
}

/// Exit code from a `waitpid` status; signals are reported as `-signo`.
fn decode_status(status: c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        -libc::WTERMSIG(status)
    } else {
        -1
    }
}

// ── Program lookup ────────────────────────────────────────────────────────────

fn is_executable(path: &Path) -> bool {
    let Ok(c_path) = c_path(path) else {
        return false;
    };
    // SAFETY: `c_path` is NUL-terminated.
    let executable = unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 };
    executable && path.is_file()
}

/// Resolve `program` the way a shell would: names containing `/` are used as
/// is, anything else is searched on the child's `PATH` (or the parent's).
fn resolve_program(program: &str, env: &[(OsString, OsString)]) -> Result<PathBuf> {
    if program.contains('/') {
        return Ok(PathBuf::from(program));
    }
    let search = env
        .iter()
        .find(|(k, _)| k == "PATH")
        .map(|(_, v)| v.clone())
        .or_else(|| std::env::var_os("PATH"))
        .unwrap_or_else(|| OsString::from("/usr/bin:/bin"));

    search
        .as_bytes()
        .split(|&b| b == b':')
        .map(|dir| if dir.is_empty() { Path::new(".") } else { Path::new(OsStr::from_bytes(dir)) })
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| {
            Error::new(ErrorCode::ResourceNotFound, format!("program `{program}` not found on PATH"))
        })
}

/// `KEY=VALUE` as a C string, byte for byte.
fn env_entry(key: &OsStr, value: &OsStr) -> Result<CString> {
    let key = key.as_bytes();
    if key.is_empty() || key.contains(&b'=') {
        return Err(Error::new(
            ErrorCode::InvalidArgument,
            format!("invalid environment variable name `{}`", String::from_utf8_lossy(key)),
        ));
    }
    let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
    entry.extend_from_slice(key);
    entry.push(b'=');
    entry.extend_from_slice(value.as_bytes());
    CString::new(entry).map_err(|_| {
        Error::new(ErrorCode::InvalidArgument, "environment entry contains a NUL byte")
    })
}

impl ProcessSys for Processes {
    type Child = Child;

    fn spawn(request: &SpawnRequest<'_>) -> Result<Child> {
        let Some(program) = request.args.first() else {
            return Err(Error::new(ErrorCode::InvalidArgument, "no program given"));
        };
        let program_path = resolve_program(program, request.env)?;
        let program_c = c_path(&program_path)?;

        let args = request
            .args
            .iter()
            .map(|a| c_string("argument", a))
            .collect::<Result<Vec<_>>>()?;
        let vars = request
            .env
            .iter()
            .map(|(k, v)| env_entry(k, v))
            .collect::<Result<Vec<_>>>()?;
        let cwd = request
            .cwd
            .map(|dir| {
                CString::new(dir.as_os_str().as_bytes()).map_err(|_| {
                    Error::new(ErrorCode::InvalidArgument, "working directory contains a NUL byte")
                })
            })
            .transpose()?;

        let argv: Vec<*const c_char> =
            args.iter().map(|a| a.as_ptr()).chain(std::iter::once(ptr::null())).collect();
        let envp: Vec<*const c_char> =
            vars.iter().map(|v| v.as_ptr()).chain(std::iter::once(ptr::null())).collect();

        let (report_read, report_write) = Fs::pipe()?;
        let exec = Exec {
            program: &program_c,
            argv: &argv,
            envp: &envp,
            cwd: cwd.as_ref(),
            background: request.background,
            wires: [
                Wire::of(&request.stdin),
                Wire::of(&request.stdout),
                Wire::of(&request.stderr),
            ],
            report: report_write.get(),
        };

        // SAFETY: the child branch calls only async-signal-safe functions
        // (see `exec_child`) before exec or _exit.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(last_error("fork", ErrorCode::PlatformError));
        }
        if pid == 0 {
            // SAFETY: we are the freshly forked child.
            unsafe { exec_child(&exec) }
        }

        drop(report_write);
        match read_exec_status(&report_read) {
            Ok(None) => Ok(Child { pid, status: None }),
            Ok(Some(errno)) => {
                // Reap the child that failed to exec.
                waitpid(pid, 0)?;
                Err(os_error(
                    &format!("spawn `{program}`"),
                    io::Error::from_raw_os_error(errno),
                    ErrorCode::PlatformError,
                ))
            }
            Err(e) => {
                log::warn!("lost exec status of pid {pid}: {e}");
                Ok(Child { pid, status: None })
            }
        }
    }

    fn pid(child: &Child) -> u32 {
        child.pid as u32
    }

    fn try_wait(child: &mut Child) -> Result<Option<i32>> {
        if child.status.is_none() {
            child.status = waitpid(child.pid, libc::WNOHANG)?;
        }
        Ok(child.status)
    }

    fn wait(child: &mut Child) -> Result<i32> {
        if let Some(code) = child.status {
            return Ok(code);
        }
        let code = waitpid(child.pid, 0)?.unwrap_or(-1);
        child.status = Some(code);
        Ok(code)
    }

    fn kill(child: &mut Child, force: bool) -> Result<()> {
        if child.status.is_some() {
            return Ok(());
        }
        let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
        // SAFETY: `pid` is our unreaped child, so it cannot have been recycled.
        if unsafe { libc::kill(child.pid, signal) } < 0 {
            return Err(last_error("kill", ErrorCode::PlatformError));
        }
        Ok(())
    }
}
