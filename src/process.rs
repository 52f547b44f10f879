// ── Child processes ───────────────────────────────────────────────────────────
//
// `ProcessConfig` describes what to launch; `Process` owns one launched child.
//
// Stdio wiring, per stream and independent of the other two:
//   • NONE     – no explicit wiring; the platform default applies
//   • CREATE   – a pipe; the parent's end is exposed as a `File`
//   • REDIRECT – the stream is bound to a caller-supplied `File`
//   • INHERIT  – the child shares the parent's stream
//
// Environment: the config's mapping is merged over the parent's environment
// (entries add or override).  `inherit_env(false)` switches to replacement:
// the mapping becomes the child's whole environment.
//
// The config is a serde type so launch descriptions can live in JSON files.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{self, ErrorCode, Record, Result};
use crate::file::{File, FileMode};
use crate::handle::NativeHandle;
use crate::platform::{ChildStdio, FileSys, Fs, ProcessSys, Processes, SpawnRequest};

// ── Stdio ─────────────────────────────────────────────────────────────────────

/// The four ways a child stream can be wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StdioOption {
    #[default]
    None,
    Create,
    Redirect,
    Inherit,
}

/// Wiring for one child stream.  `Redirect` carries its `File` endpoint.
#[derive(Debug, Default)]
pub enum Stdio {
    #[default]
    None,
    Create,
    Redirect(File),
    Inherit,
}

impl Stdio {
    /// Redirect to a duplicate of `file`; the caller keeps its own `File`.
    pub fn redirect(file: &File) -> Result<Self> {
        Ok(Self::Redirect(file.try_clone()?))
    }

    pub fn option(&self) -> StdioOption {
        match self {
            Self::None => StdioOption::None,
            Self::Create => StdioOption::Create,
            Self::Redirect(_) => StdioOption::Redirect,
            Self::Inherit => StdioOption::Inherit,
        }
    }
}

impl Serialize for Stdio {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.option().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Stdio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match StdioOption::deserialize(deserializer)? {
            StdioOption::None => Ok(Self::None),
            StdioOption::Create => Ok(Self::Create),
            StdioOption::Inherit => Ok(Self::Inherit),
            StdioOption::Redirect => {
                Err(de::Error::custom("REDIRECT needs a live File and cannot be deserialized"))
            }
        }
    }
}

// ── ProcessConfig ─────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// Everything needed to launch a child.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Program followed by its arguments.  A program without a path separator
    /// is looked up on `PATH`.
    pub args: Vec<String>,
    /// Variables added to (or, with `inherit_env == false`, forming) the
    /// child's environment.  Keys are unique by construction.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub inherit_env: bool,
    /// Detach the child from the parent's console / session.
    #[serde(default)]
    pub background: bool,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub stdin: Stdio,
    #[serde(default)]
    pub stdout: Stdio,
    #[serde(default)]
    pub stderr: Stdio,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            env: BTreeMap::new(),
            inherit_env: true,
            background: false,
            cwd: None,
            stdin: Stdio::None,
            stdout: Stdio::None,
            stderr: Stdio::None,
        }
    }
}

impl ProcessConfig {
    /// A config running `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self { args: vec![program.into()], ..Self::default() }
    }

    /// Parse a JSON launch description.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| error::raise(ErrorCode::InvalidData, format!("process config: {e}")))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, stdio: Stdio) -> Self {
        self.stdin = stdio;
        self
    }

    pub fn stdout(mut self, stdio: Stdio) -> Self {
        self.stdout = stdio;
        self
    }

    pub fn stderr(mut self, stdio: Stdio) -> Self {
        self.stderr = stdio;
        self
    }

    /// The child's complete environment.  Inherited entries keep their raw
    /// bytes; they need not be UTF-8.
    fn resolved_env(&self) -> Vec<(OsString, OsString)> {
        let mut merged: BTreeMap<OsString, OsString> = if self.inherit_env {
            std::env::vars_os().collect()
        } else {
            BTreeMap::new()
        };
        merged.extend(self.env.iter().map(|(k, v)| (OsString::from(k), OsString::from(v))));
        merged.into_iter().collect()
    }
}

// ── Stream plumbing ───────────────────────────────────────────────────────────

/// Which way data flows through a stream, seen from the child.
#[derive(Clone, Copy)]
enum Direction {
    /// Child reads (stdin).
    Input,
    /// Child writes (stdout, stderr).
    Output,
}

/// The two sides of one wired stream.
struct Wiring {
    /// Kept by the parent and exposed through `get_stdin()` & co.
    parent: File,
    /// Handed to the child; closed in the parent once the child is running.
    child: Option<NativeHandle>,
    inherit: bool,
}

impl Wiring {
    fn prepare(stdio: Stdio, direction: Direction) -> Result<Self> {
        let mut wiring = Self { parent: File::new(), child: None, inherit: false };
        match stdio {
            Stdio::None => {}
            Stdio::Inherit => wiring.inherit = true,
            Stdio::Redirect(file) => {
                if !file.is_open() {
                    return Err(error::raise(
                        ErrorCode::InvalidArgument,
                        "REDIRECT endpoint is not an open file",
                    ));
                }
                wiring.child = Some(Fs::duplicate(file.handle()).record()?);
            }
            Stdio::Create => {
                let (read, write) = Fs::pipe().record()?;
                let (parent, child, mode) = match direction {
                    Direction::Input => (write, read, FileMode::Write),
                    Direction::Output => (read, write, FileMode::Read),
                };
                wiring.parent = File::from_handle(parent, mode);
                wiring.child = Some(child);
            }
        }
        Ok(wiring)
    }

    fn child_stdio(&self) -> ChildStdio<'_> {
        match (&self.child, self.inherit) {
            (Some(handle), _) => ChildStdio::Handle(handle),
            (None, true) => ChildStdio::Inherit,
            (None, false) => ChildStdio::Default,
        }
    }
}

// ── Process ───────────────────────────────────────────────────────────────────

type Child = <Processes as ProcessSys>::Child;

/// One child process.
///
/// Move-only.  The three stream endpoints always exist; they are open only
/// for streams configured as CREATE.
#[derive(Default)]
pub struct Process {
    child: Option<Child>,
    stdin: File,
    stdout: File,
    stderr: File,
    exit_code: Option<i32>,
}

impl Process {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `config` and return the running process.
    pub fn spawn(config: ProcessConfig) -> Result<Self> {
        let mut process = Self::new();
        process.start(config)?;
        Ok(process)
    }

    /// Launch the child described by `config`.
    ///
    /// Fails with `UNSUPPORTED_OPERATION` if this object already represents a
    /// started process.
    pub fn start(&mut self, config: ProcessConfig) -> Result<()> {
        if self.child.is_some() {
            return Err(error::raise(
                ErrorCode::UnsupportedOperation,
                "process object already represents a started process",
            ));
        }
        if config.args.first().map_or(true, String::is_empty) {
            return Err(error::raise(ErrorCode::InvalidArgument, "no program given"));
        }

        let env = config.resolved_env();
        let ProcessConfig { args, background, cwd, stdin, stdout, stderr, .. } = config;

        let mut stdin = Wiring::prepare(stdin, Direction::Input)?;
        let mut stdout = Wiring::prepare(stdout, Direction::Output)?;
        let mut stderr = Wiring::prepare(stderr, Direction::Output)?;

        let request = SpawnRequest {
            args: &args,
            env: &env,
            cwd: cwd.as_deref(),
            background,
            stdin: stdin.child_stdio(),
            stdout: stdout.child_stdio(),
            stderr: stderr.child_stdio(),
        };
        let child = Processes::spawn(&request).record()?;
        log::debug!("spawned `{}` as pid {}", args[0], Processes::pid(&child));

        // The child holds its own copies now.
        stdin.child.take();
        stdout.child.take();
        stderr.child.take();

        *self = Self {
            child: Some(child),
            stdin: stdin.parent,
            stdout: stdout.parent,
            stderr: stderr.parent,
            exit_code: None,
        };
        Ok(())
    }

    /// The child's process id, if started.
    pub fn get_pid(&self) -> Option<u32> {
        self.child.as_ref().map(Processes::pid)
    }

    /// Parent end of the child's stdin (open only for CREATE).
    pub fn get_stdin(&mut self) -> &mut File {
        &mut self.stdin
    }

    /// Parent end of the child's stdout (open only for CREATE).
    pub fn get_stdout(&mut self) -> &mut File {
        &mut self.stdout
    }

    /// Parent end of the child's stderr (open only for CREATE).
    pub fn get_stderr(&mut self) -> &mut File {
        &mut self.stderr
    }

    pub fn take_stdin(&mut self) -> File {
        std::mem::take(&mut self.stdin)
    }

    pub fn take_stdout(&mut self) -> File {
        std::mem::take(&mut self.stdout)
    }

    pub fn take_stderr(&mut self) -> File {
        std::mem::take(&mut self.stderr)
    }

    /// Non-blocking: `true` while the child is running.
    pub fn is_alive(&mut self) -> bool {
        self.child.is_some() && !self.is_complete()
    }

    /// Non-blocking: `true` once the child's exit has been observed.
    pub fn is_complete(&mut self) -> bool {
        if self.exit_code.is_some() {
            return true;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match Processes::try_wait(child).record() {
            Ok(Some(code)) => {
                self.exit_code = Some(code);
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    /// Block until the child exits; returns its exit code.
    pub fn join(&mut self) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let Some(child) = self.child.as_mut() else {
            return Err(error::raise(ErrorCode::UnsupportedOperation, "process was never started"));
        };
        let code = Processes::wait(child).record()?;
        log::debug!("pid {} exited with {code}", Processes::pid(child));
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Request termination: a graceful signal, or a forced kill if `force`.
    /// A child that has already exited is left alone.
    pub fn kill(&mut self, force: bool) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        let Some(child) = self.child.as_mut() else {
            return Err(error::raise(ErrorCode::UnsupportedOperation, "process was never started"));
        };
        Processes::kill(child, force).record()
    }

    /// The exit code, available only once [`is_complete`](Self::is_complete)
    /// is `true`.  Otherwise fails without side effects on the child.
    pub fn get_exit_code(&mut self) -> Result<i32> {
        if self.is_complete() {
            if let Some(code) = self.exit_code {
                return Ok(code);
            }
        }
        Err(error::raise(ErrorCode::UnsupportedOperation, "process has not completed"))
    }

    /// The cached exit code, without polling.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.child.is_some() && self.is_alive() {
            if let Some(pid) = self.get_pid() {
                log::warn!("dropping handle to running child pid {pid}; it keeps running");
            }
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.get_pid())
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn builder_collects_args_and_env() {
        let cfg = ProcessConfig::new("sh")
            .args(["-c", "true"])
            .env("A", "1")
            .env("A", "2")
            .background(true);
        assert_eq!(cfg.args, ["sh", "-c", "true"]);
        assert_eq!(cfg.env.get("A").map(String::as_str), Some("2"), "keys are unique");
        assert!(cfg.background);
        assert!(cfg.inherit_env);
    }

    #[test]
    fn env_merges_over_parent_by_default() {
        let path = std::env::var("PATH").unwrap_or_default();
        let cfg = ProcessConfig::new("x").env("OSKIT_MERGE_TEST", "yes");
        let env = cfg.resolved_env();
        assert!(env.iter().any(|(k, v)| k == "OSKIT_MERGE_TEST" && v == "yes"));
        if !path.is_empty() {
            assert!(env.iter().any(|(k, v)| k == "PATH" && v == path.as_str()));
        }
    }

    #[test]
    fn env_replaces_when_not_inheriting() {
        let cfg = ProcessConfig::new("x").inherit_env(false).env("ONLY", "this");
        assert_eq!(cfg.resolved_env(), vec![(OsString::from("ONLY"), OsString::from("this"))]);
    }

    #[test]
    fn config_loads_from_json() {
        let cfg = ProcessConfig::from_json(
            r#"{
                "args": ["cat"],
                "env": {"LANG": "C"},
                "stdin": "CREATE",
                "stdout": "CREATE",
                "stderr": "INHERIT"
            }"#,
        )
        .expect("parse");
        assert_eq!(cfg.args, ["cat"]);
        assert!(cfg.inherit_env, "inherit_env defaults to true");
        assert_eq!(cfg.stdin.option(), StdioOption::Create);
        assert_eq!(cfg.stdout.option(), StdioOption::Create);
        assert_eq!(cfg.stderr.option(), StdioOption::Inherit);
    }

    #[test]
    fn redirect_cannot_come_from_json() {
        let err = ProcessConfig::from_json(r#"{"args": ["cat"], "stdout": "REDIRECT"}"#)
            .expect_err("redirect needs a file");
        assert_eq!(err.code, ErrorCode::InvalidData);
        error::clear();
    }

    #[test]
    fn config_serializes_stdio_as_options() {
        let cfg = ProcessConfig::new("cat").stdout(Stdio::Create);
        let json = serde_json::to_value(&cfg).expect("serialize");
        assert_eq!(json["stdout"], "CREATE");
        assert_eq!(json["stdin"], "NONE");
    }
}

#[cfg(all(test, oskit_backend = "posix"))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessConfig {
        ProcessConfig::new("sh").args(["-c", script])
    }

    #[test]
    fn echo_round_trip_through_pipes() {
        let payload = b"oskit echo \x00\x01\xff round trip\n".repeat(64);

        let mut p = Process::spawn(
            ProcessConfig::new("cat").stdin(Stdio::Create).stdout(Stdio::Create),
        )
        .expect("spawn cat");
        assert!(p.get_pid().is_some());

        let mut stdin = p.take_stdin();
        stdin.write_all(&payload).expect("write stdin");
        stdin.close();

        let mut echoed = Vec::new();
        p.get_stdout().read_to_end(&mut echoed).expect("read stdout");
        assert_eq!(echoed, payload);

        assert_eq!(p.join().expect("join"), 0);
        assert!(p.is_complete());
        assert!(!p.is_alive());
    }

    #[test]
    fn exit_code_only_after_completion() {
        let mut p = Process::spawn(ProcessConfig::new("cat").stdin(Stdio::Create))
            .expect("spawn cat");

        assert!(p.is_alive());
        assert!(!p.is_complete());
        let err = p.get_exit_code().expect_err("still running");
        assert_eq!(err.code, ErrorCode::UnsupportedOperation);
        assert!(p.is_alive(), "a failed query must not disturb the child");

        p.get_stdin().close();
        assert_eq!(p.join().expect("join"), 0);
        assert_eq!(p.get_exit_code().expect("complete"), 0);
        error::clear();
    }

    #[test]
    fn nonzero_exit_code() {
        let mut p = Process::spawn(sh("exit 7")).expect("spawn");
        assert_eq!(p.join().expect("join"), 7);
        assert_eq!(p.exit_code(), Some(7));
    }

    #[test]
    fn environment_is_passed() {
        let mut p = Process::spawn(
            sh(r#"printf '%s' "$OSKIT_TEST_VALUE""#)
                .env("OSKIT_TEST_VALUE", "hello env")
                .stdout(Stdio::Create),
        )
        .expect("spawn");
        let mut out = Vec::new();
        p.get_stdout().read_to_end(&mut out).expect("read");
        p.join().expect("join");
        assert_eq!(out, b"hello env");
    }

    #[test]
    fn non_utf8_parent_environment_is_passed_through() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("OSKIT_RAW_BYTES", OsStr::from_bytes(b"\xff\xfe"));
        let spawned = Process::spawn(
            sh(r#"printf '%s' "$OSKIT_RAW_BYTES""#).stdout(Stdio::Create),
        );
        std::env::remove_var("OSKIT_RAW_BYTES");

        let mut p = spawned.expect("spawn with a non-UTF-8 variable inherited");
        let mut out = Vec::new();
        p.get_stdout().read_to_end(&mut out).expect("read");
        assert_eq!(p.join().expect("join"), 0);
        assert_eq!(out, b"\xff\xfe");
    }

    #[test]
    fn inherit_stdout_spawns_and_exposes_no_endpoint() {
        let mut p = Process::spawn(sh("exit 3").stdout(Stdio::Inherit)).expect("spawn");
        assert!(!p.get_stdout().is_open());
        assert!(!p.get_stdin().is_open());
        assert_eq!(p.join().expect("join"), 3);
    }

    #[test]
    fn background_child_gets_new_session() {
        let script = "if [ -r /proc/$$/stat ]; then cut -d' ' -f6 /proc/$$/stat; \
                      else ps -o sid= -p $$; fi";
        let mut p = Process::spawn(sh(script).background(true).stdout(Stdio::Create))
            .expect("spawn");
        let pid = p.get_pid().expect("pid");
        let mut out = Vec::new();
        p.get_stdout().read_to_end(&mut out).expect("read");
        assert_eq!(p.join().expect("join"), 0);

        let child_sid: i64 = String::from_utf8_lossy(&out).trim().parse().expect("session id");
        // SAFETY: getsid(0) only queries the calling process.
        #[allow(unsafe_code)]
        let parent_sid = i64::from(unsafe { libc::getsid(0) });
        assert_eq!(child_sid, i64::from(pid), "the child leads its own session");
        assert_ne!(child_sid, parent_sid);
    }

    #[test]
    fn stderr_is_captured_separately() {
        let mut p = Process::spawn(
            sh("printf out; printf err >&2").stdout(Stdio::Create).stderr(Stdio::Create),
        )
        .expect("spawn");
        let mut out = Vec::new();
        let mut err = Vec::new();
        p.get_stdout().read_to_end(&mut out).expect("stdout");
        p.get_stderr().read_to_end(&mut err).expect("stderr");
        p.join().expect("join");
        assert_eq!(out, b"out");
        assert_eq!(err, b"err");
    }

    #[test]
    fn stdout_redirects_into_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("redirected.txt");
        let target = File::from_path(&path, FileMode::Write).expect("open target");

        let mut p = Process::spawn(
            sh("printf redirected").stdout(Stdio::redirect(&target).expect("redirect")),
        )
        .expect("spawn");
        assert!(!p.get_stdout().is_open(), "REDIRECT exposes no parent endpoint");
        assert_eq!(p.join().expect("join"), 0);
        drop(target);

        assert_eq!(File::read_text(&path).expect("read"), "redirected");
    }

    #[test]
    fn working_directory_is_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut p = Process::spawn(sh("pwd -P").current_dir(dir.path()).stdout(Stdio::Create))
            .expect("spawn");
        let mut out = Vec::new();
        p.get_stdout().read_to_end(&mut out).expect("read");
        p.join().expect("join");

        let expected = std::fs::canonicalize(dir.path()).expect("canonicalize");
        assert_eq!(String::from_utf8_lossy(&out).trim_end(), expected.to_string_lossy());
    }

    #[test]
    fn forced_kill_reports_signal() {
        let mut p = Process::spawn(ProcessConfig::new("cat").stdin(Stdio::Create))
            .expect("spawn cat");
        p.kill(true).expect("kill");
        assert_eq!(p.join().expect("join"), -libc::SIGKILL);
    }

    #[test]
    fn graceful_kill_terminates() {
        let mut p = Process::spawn(ProcessConfig::new("cat").stdin(Stdio::Create))
            .expect("spawn cat");
        p.kill(false).expect("kill");
        assert_eq!(p.join().expect("join"), -libc::SIGTERM);
        // Killing a finished child is a no-op.
        p.kill(true).expect("kill after exit");
    }

    #[test]
    fn starting_twice_is_unsupported() {
        let mut p = Process::spawn(sh("exit 0")).expect("spawn");
        let err = p.start(sh("exit 0")).expect_err("already started");
        assert_eq!(err.code, ErrorCode::UnsupportedOperation);
        p.join().expect("join");
        error::clear();
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = Process::spawn(ProcessConfig::new("oskit-definitely-not-a-program"))
            .expect_err("no such program");
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
        assert_eq!(error::last_code(), ErrorCode::ResourceNotFound);
        error::clear();
    }

    #[test]
    fn empty_config_is_invalid() {
        let err = Process::spawn(ProcessConfig::default()).expect_err("no args");
        assert_eq!(err.code, ErrorCode::InvalidArgument);
        error::clear();
    }

    #[test]
    fn unstarted_process_reports_nothing() {
        let mut p = Process::new();
        assert_eq!(p.get_pid(), None);
        assert!(!p.is_alive());
        assert!(!p.is_complete());
        assert!(p.get_exit_code().is_err());
        assert!(!p.get_stdin().is_open());
        error::clear();
    }
}
