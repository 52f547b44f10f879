// ── Child processes (CreateProcessW) ──────────────────────────────────────────
//
// Only handles that are inheritable get through to the child, and this
// backend never creates inheritable handles except here: each wired stream is
// duplicated as inheritable just for the CreateProcessW call.  The spawn lock
// keeps one launch from leaking those duplicates into a concurrent one.
//
// There is no graceful termination signal for arbitrary Windows processes;
// both kill modes end the child with TerminateProcess.

use std::ffi::{c_void, OsString};
use std::os::windows::ffi::OsStrExt;
use std::sync::Mutex;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    DuplicateHandle, DUPLICATE_SAME_ACCESS, HANDLE, WAIT_FAILED, WAIT_OBJECT_0,
};
use windows::Win32::System::Console::{
    GetStdHandle, STD_ERROR_HANDLE, STD_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};
use windows::Win32::System::Threading::{
    CreateProcessW, GetCurrentProcess, GetExitCodeProcess, TerminateProcess,
    WaitForSingleObject, CREATE_NEW_PROCESS_GROUP, CREATE_UNICODE_ENVIRONMENT, DETACHED_PROCESS,
    INFINITE, PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW,
};

use super::{adopt, raw_handle, wide, win_error, Descriptor, Processes};
use crate::error::{Error, ErrorCode, Result};
use crate::handle::NativeHandle;
use crate::platform::{ChildStdio, ProcessSys, SpawnRequest};

/// Exit code a child is given when killed.
const KILLED_EXIT_CODE: u32 = 1;

static SPAWN_LOCK: Mutex<()> = Mutex::new(());

pub(crate) struct Child {
    process: NativeHandle<Descriptor>,
    pid: u32,
    status: Option<i32>,
}

// ── Command line and environment ──────────────────────────────────────────────

/// Append `arg` quoted so that `CommandLineToArgvW` and the MSVC runtime
/// split it back into the same string.
fn append_quoted(arg: &str, cmd: &mut String) {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\x0b', '"']) {
        cmd.push_str(arg);
        return;
    }
    cmd.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        if c == '\\' {
            backslashes += 1;
            continue;
        }
        let escapes = if c == '"' { backslashes * 2 + 1 } else { backslashes };
        cmd.extend(std::iter::repeat('\\').take(escapes));
        cmd.push(c);
        backslashes = 0;
    }
    cmd.extend(std::iter::repeat('\\').take(backslashes * 2));
    cmd.push('"');
}

fn command_line(args: &[String]) -> Result<Vec<u16>> {
    let mut cmd = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            cmd.push(' ');
        }
        append_quoted(arg, &mut cmd);
    }
    wide(cmd.as_ref(), "command line")
}

/// `KEY=VALUE\0…\0\0` as UTF-16.
fn environment_block(env: &[(OsString, OsString)]) -> Result<Vec<u16>> {
    let mut block = Vec::new();
    for (key, value) in env {
        let key_wide: Vec<u16> = key.encode_wide().collect();
        // Keys such as `=C:` legitimately start with `=`.
        if key_wide.is_empty() || key_wide[1..].contains(&u16::from(b'=')) {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                format!("invalid environment variable name `{}`", key.to_string_lossy()),
            ));
        }
        let mut entry = key.clone();
        entry.push("=");
        entry.push(value);
        block.extend(wide(&entry, "environment entry")?);
    }
    if block.is_empty() {
        block.push(0);
    }
    block.push(0);
    Ok(block)
}

// ── Stdio ─────────────────────────────────────────────────────────────────────

/// An inheritable duplicate of `source`, closed after the spawn.
fn inheritable(source: HANDLE) -> Result<NativeHandle<Descriptor>> {
    let mut dup = HANDLE::default();
    // SAFETY: both process handles refer to this process; `dup` is a valid
    // out-pointer and becomes owned by the returned NativeHandle.
    unsafe {
        DuplicateHandle(
            GetCurrentProcess(),
            source,
            GetCurrentProcess(),
            &mut dup,
            0,
            true,
            DUPLICATE_SAME_ACCESS,
        )
    }
    .map_err(|e| win_error("DuplicateHandle", e, ErrorCode::PlatformError))?;
    Ok(adopt(dup))
}

/// The child's end of one stream; invalid means "no handle".
fn child_stream(stdio: &ChildStdio<'_>, which: STD_HANDLE) -> Result<NativeHandle<Descriptor>> {
    match stdio {
        ChildStdio::Default => Ok(NativeHandle::invalid()),
        ChildStdio::Handle(handle) => inheritable(raw_handle(handle)),
        ChildStdio::Inherit => {
            // SAFETY: plain query of this process's standard handle.
            let parent = unsafe { GetStdHandle(which) }
                .map_err(|e| win_error("GetStdHandle", e, ErrorCode::PlatformError))?;
            if parent.is_invalid() || parent.0.is_null() {
                // A GUI parent has nothing to share.
                return Ok(NativeHandle::invalid());
            }
            inheritable(parent)
        }
    }
}

fn stream_handle(fd: &NativeHandle<Descriptor>) -> HANDLE {
    if fd.is_valid() {
        raw_handle(fd)
    } else {
        HANDLE::default()
    }
}

// ── Waiting ───────────────────────────────────────────────────────────────────

fn exit_code(child: &Child) -> Result<i32> {
    let mut code = 0u32;
    // SAFETY: the process handle is live; `code` is a valid out-pointer.
    unsafe { GetExitCodeProcess(raw_handle(&child.process), &mut code) }
        .map_err(|e| win_error("GetExitCodeProcess", e, ErrorCode::PlatformError))?;
    Ok(code as i32)
}

fn wait_for(child: &mut Child, timeout_ms: u32) -> Result<Option<i32>> {
    if child.status.is_some() {
        return Ok(child.status);
    }
    // SAFETY: the process handle is live for as long as `child`.
    let waited = unsafe { WaitForSingleObject(raw_handle(&child.process), timeout_ms) };
    if waited == WAIT_FAILED {
        return Err(Error::from_os(
            "WaitForSingleObject",
            &std::io::Error::last_os_error(),
            ErrorCode::PlatformError,
        ));
    }
    if waited == WAIT_OBJECT_0 {
        child.status = Some(exit_code(child)?);
    }
    Ok(child.status)
}

impl ProcessSys for Processes {
    type Child = Child;

    fn spawn(request: &SpawnRequest<'_>) -> Result<Child> {
        let Some(program) = request.args.first() else {
            return Err(Error::new(ErrorCode::InvalidArgument, "no program given"));
        };
        let mut cmd = command_line(request.args)?;
        let env = environment_block(request.env)?;
        let cwd = request.cwd.map(|dir| wide(dir.as_os_str(), "working directory")).transpose()?;

        let flags = if request.background {
            CREATE_UNICODE_ENVIRONMENT | DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP
        } else {
            CREATE_UNICODE_ENVIRONMENT
        };

        let wired = [&request.stdin, &request.stdout, &request.stderr]
            .iter()
            .any(|s| !matches!(s, ChildStdio::Default));

        let mut info = PROCESS_INFORMATION::default();
        let launched = {
            let _guard = SPAWN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

            let stdin = child_stream(&request.stdin, STD_INPUT_HANDLE)?;
            let stdout = child_stream(&request.stdout, STD_OUTPUT_HANDLE)?;
            let stderr = child_stream(&request.stderr, STD_ERROR_HANDLE)?;

            let mut startup = STARTUPINFOW {
                cb: std::mem::size_of::<STARTUPINFOW>() as u32,
                ..Default::default()
            };
            if wired {
                startup.dwFlags = STARTF_USESTDHANDLES;
                startup.hStdInput = stream_handle(&stdin);
                startup.hStdOutput = stream_handle(&stdout);
                startup.hStdError = stream_handle(&stderr);
            }

            // SAFETY: every buffer outlives the call; `cmd` is mutable as
            // CreateProcessW requires; `startup` and `info` are valid.  The
            // inheritable duplicates close when this block ends.
            unsafe {
                CreateProcessW(
                    PCWSTR::null(),
                    PWSTR(cmd.as_mut_ptr()),
                    None,
                    None,
                    wired,
                    flags,
                    Some(env.as_ptr().cast::<c_void>()),
                    cwd.as_ref().map_or(PCWSTR::null(), |dir| PCWSTR(dir.as_ptr())),
                    &startup,
                    &mut info,
                )
            }
        };
        launched.map_err(|e| win_error(&format!("spawn `{program}`"), e, ErrorCode::PlatformError))?;

        drop(adopt(info.hThread));
        Ok(Child { process: adopt(info.hProcess), pid: info.dwProcessId, status: None })
    }

    fn pid(child: &Child) -> u32 {
        child.pid
    }

    fn try_wait(child: &mut Child) -> Result<Option<i32>> {
        wait_for(child, 0)
    }

    fn wait(child: &mut Child) -> Result<i32> {
        wait_for(child, INFINITE).map(|status| status.unwrap_or(-1))
    }

    fn kill(child: &mut Child, _force: bool) -> Result<()> {
        if child.status.is_some() {
            return Ok(());
        }
        // SAFETY: the process handle is live and carries terminate rights.
        unsafe { TerminateProcess(raw_handle(&child.process), KILLED_EXIT_CODE) }
            .map_err(|e| win_error("TerminateProcess", e, ErrorCode::PlatformError))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quoted(arg: &str) -> String {
        let mut cmd = String::new();
        append_quoted(arg, &mut cmd);
        cmd
    }

    #[test]
    fn plain_arguments_are_untouched() {
        assert_eq!(quoted("cmd.exe"), "cmd.exe");
        assert_eq!(quoted(r"C:\path\to\x"), r"C:\path\to\x");
    }

    #[test]
    fn spaces_and_quotes_are_escaped() {
        assert_eq!(quoted(""), r#""""#);
        assert_eq!(quoted("a b"), r#""a b""#);
        assert_eq!(quoted(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(quoted(r"dir with space\"), r#""dir with space\\""#);
    }

    #[test]
    fn environment_block_is_double_terminated() {
        let block = environment_block(&[(OsString::from("A"), OsString::from("1"))]).expect("block");
        assert_eq!(block, "A=1\0\0".encode_utf16().collect::<Vec<_>>());
        assert_eq!(environment_block(&[]).expect("empty"), vec![0, 0]);
    }
}
