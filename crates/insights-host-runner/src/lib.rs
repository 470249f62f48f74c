use std::ffi::OsString;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

pub mod toolchain;

pub use toolchain::{
    toolchain_for, CompileRequest, PlatformFamily, Toolchain, TransformRequest, UnixToolchain,
    WindowsToolchain,
};

pub const DEFAULT_STDOUT_CAP_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_STDERR_CAP_BYTES: usize = 4 * 1024 * 1024;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Raised when a harness-level interrupt arrives while a child is running. The child's
/// process group has already been killed by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("interrupted")
    }
}

impl std::error::Error for Interrupted {}

#[cfg(unix)]
extern "C" fn on_sigint(_sig: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT into a flag that every wait loop polls, so in-flight children can be torn
/// down instead of being orphaned.
pub fn install_interrupt_handler() -> Result<()> {
    #[cfg(unix)]
    {
        let handler = on_sigint as extern "C" fn(libc::c_int);
        let prev = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
        if prev == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error()).context("install SIGINT handler");
        }
    }
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub stdin: Option<Vec<u8>>,
    pub cwd: Option<PathBuf>,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    pub stdout_cap: usize,
    pub stderr_cap: usize,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
            cwd: None,
            timeout: None,
            stdout_cap: DEFAULT_STDOUT_CAP_BYTES,
            stderr_cap: DEFAULT_STDERR_CAP_BYTES,
        }
    }

    pub fn with_output_caps(mut self, stdout_cap: usize, stderr_cap: usize) -> Self {
        self.stdout_cap = stdout_cap;
        self.stderr_cap = stderr_cap;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Shell-ish rendering for logs only.
    pub fn display_command(&self) -> String {
        let mut out = self.program.display().to_string();
        for a in &self.args {
            out.push(' ');
            out.push_str(&a.to_string_lossy());
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_status: i32,
    pub exit_signal: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    /// Bytes the child wrote, including anything dropped past the cap.
    pub stdout_total_bytes: u64,
    pub stderr_total_bytes: u64,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_status == 0
    }

    /// The captured text is incomplete and must not be compared or stored.
    pub fn truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }
}

pub fn run_process(inv: &Invocation) -> Result<ProcessOutput> {
    let started = Instant::now();

    let mut child = {
        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args);
        cmd.stdin(if inv.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        if let Some(cwd) = &inv.cwd {
            cmd.current_dir(cwd);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setpgid(0, 0) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        cmd.spawn()
            .with_context(|| format!("spawn: {}", inv.program.display()))?
    };
    log::debug!("spawned pid={} {}", child.id(), inv.display_command());

    let stdin_thread = match (child.stdin.take(), inv.stdin.clone()) {
        (Some(mut stdin), Some(input)) => Some(std::thread::spawn(
            move || -> std::io::Result<()> {
                stdin.write_all(&input)?;
                stdin.flush()?;
                drop(stdin);
                Ok(())
            },
        )),
        _ => None,
    };

    let stdout = child.stdout.take().context("take stdout")?;
    let stderr = child.stderr.take().context("take stderr")?;

    let (stdout_cap, stderr_cap) = (inv.stdout_cap, inv.stderr_cap);
    let stdout_thread = std::thread::spawn(move || read_capped(stdout, stdout_cap));
    let stderr_thread = std::thread::spawn(move || read_capped(stderr, stderr_cap));

    let waited = match wait_child_with_wall_timeout(&mut child, inv.timeout) {
        Ok(w) => w,
        Err(err) => {
            kill_process_group(&mut child);
            let _ = child.wait();
            return Err(err);
        }
    };
    if let Some(t) = stdin_thread {
        let _ = t.join();
    }
    let stdout_capture = stdout_thread
        .join()
        .unwrap_or_else(|_| Ok(CappedStream::default()))
        .context("read child stdout")?;
    let stderr_capture = stderr_thread
        .join()
        .unwrap_or_else(|_| Ok(CappedStream::default()))
        .context("read child stderr")?;
    for (name, capture, cap) in [
        ("stdout", &stdout_capture, stdout_cap),
        ("stderr", &stderr_capture, stderr_cap),
    ] {
        if capture.truncated() {
            log::warn!(
                "{name} of {} exceeded {cap} bytes ({} written)",
                inv.program.display(),
                capture.total_len
            );
        }
    }

    let (status, timed_out) = match waited {
        WaitOutcome::Exited(status) => (status, false),
        WaitOutcome::TimedOut(status) => {
            log::warn!(
                "timed out after {:?}: {}",
                started.elapsed(),
                inv.display_command()
            );
            (status, true)
        }
        WaitOutcome::Interrupted => return Err(Interrupted.into()),
    };

    #[cfg(unix)]
    let exit_signal = {
        use std::os::unix::process::ExitStatusExt as _;
        status.signal()
    };
    #[cfg(not(unix))]
    let exit_signal: Option<i32> = None;

    let exit_status = match status.code() {
        Some(code) => code,
        None => exit_signal.map(|s| 128 + s).unwrap_or(1),
    };

    Ok(ProcessOutput {
        exit_status,
        exit_signal,
        timed_out,
        stdout: String::from_utf8_lossy(&stdout_capture.bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_capture.bytes).into_owned(),
        stdout_truncated: stdout_capture.truncated(),
        stderr_truncated: stderr_capture.truncated(),
        stdout_total_bytes: stdout_capture.total_len,
        stderr_total_bytes: stderr_capture.total_len,
        duration: started.elapsed(),
    })
}

enum WaitOutcome {
    Exited(std::process::ExitStatus),
    TimedOut(std::process::ExitStatus),
    Interrupted,
}

fn wait_child_with_wall_timeout(
    child: &mut std::process::Child,
    timeout: Option<Duration>,
) -> Result<WaitOutcome> {
    let start = Instant::now();
    let deadline = timeout.and_then(|t| start.checked_add(t));

    loop {
        if let Some(status) = child.try_wait().context("try_wait child")? {
            return Ok(WaitOutcome::Exited(status));
        }
        if interrupted() {
            kill_process_group(child);
            let _ = child.wait();
            return Ok(WaitOutcome::Interrupted);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_process_group(child);
            let status = child.wait().context("wait child after kill")?;
            return Ok(WaitOutcome::TimedOut(status));
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// The child leads its own process group (see `pre_exec` above), so grandchildren such as
/// a compiler driver's `cc1plus` go down with it.
fn kill_process_group(child: &mut std::process::Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            unsafe {
                libc::killpg(pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
}

/// Child output kept up to a cap. The stream is always drained so the child never blocks
/// on a full pipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CappedStream {
    pub bytes: Vec<u8>,
    pub total_len: u64,
}

impl CappedStream {
    pub fn truncated(&self) -> bool {
        self.total_len > self.bytes.len() as u64
    }
}

pub fn read_capped<R: Read>(mut reader: R, cap: usize) -> std::io::Result<CappedStream> {
    let mut out = CappedStream::default();
    let mut chunk = [0u8; 8192];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        out.total_len += n as u64;
        let keep = n.min(cap.saturating_sub(out.bytes.len()));
        out.bytes.extend_from_slice(&chunk[..keep]);
    }

    Ok(out)
}

/// Locate an executable the way a shell would: paths with a directory component must
/// exist as files, bare names are searched on `PATH`.
pub fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.is_absolute() || program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let cand = dir.join(program);
        if cand.is_file() {
            return Some(cand);
        }
        if cfg!(windows) && program.extension().is_none() {
            let exe = cand.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

/// Scoped scratch directory, removed on drop on every exit path.
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(prefix: &str) -> Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let base = std::env::temp_dir();
        let pid = std::process::id();

        for _ in 0..10_000 {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = base.join(format!("{prefix}_{pid}_{n}"));
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(Self { path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("create temp dir: {}", path.display()))
                }
            }
        }
        anyhow::bail!("failed to create unique temp dir under {}", base.display())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("remove temp dir {}: {err}", self.path.display()),
        }
    }
}
