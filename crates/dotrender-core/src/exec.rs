//! Command execution and executable discovery.
//!
//! The command-line engine never spawns processes directly; it goes
//! through the [`CommandExecutor`] trait so tests can substitute a stub
//! executor and assert on the exact command that would have run.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// A fully resolved command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Resolved path of the executable.
    pub program: PathBuf,
    /// Arguments in invocation order.
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Human-readable command line for diagnostics.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured outcome of a finished command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs commands on behalf of the command-line engine.
pub trait CommandExecutor: Send + Sync {
    /// Run `spec` in `work_dir`, waiting at most `timeout`.
    ///
    /// A process still running at the deadline is killed and the call
    /// fails with [`Error::Timeout`].
    fn execute(&self, spec: &CommandSpec, work_dir: &Path, timeout: Duration) -> Result<ExecOutput>;
}

/// Executor backed by `std::process::Command`.
///
/// Stdout and stderr are drained on separate threads while the parent
/// polls for exit, so a chatty child cannot deadlock on a full pipe.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, spec: &CommandSpec, work_dir: &Path, timeout: Duration) -> Result<ExecOutput> {
        tracing::debug!(command = %spec.display(), "spawning layout process");

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Execution {
                message: format!("failed to spawn '{}': {e}", spec.program.display()),
                context: Some(spec.display()),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::execution("failed to capture child stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::execution("failed to capture child stderr"))?;

        let stdout_reader = thread::spawn(move || drain(stdout));
        let stderr_reader = thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    kill_child(&mut child);
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(Error::Timeout(timeout));
                }
                None => thread::sleep(Duration::from_millis(10)),
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(ExecOutput {
            status: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

fn drain(mut source: impl Read) -> String {
    let mut buf = String::new();
    let _ = source.read_to_string(&mut buf);
    buf
}

fn kill_child(child: &mut std::process::Child) {
    #[cfg(unix)]
    {
        unsafe {
            libc::kill(child.id() as i32, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

/// Platform identifier for executable-name candidates.
///
/// Separated from filesystem probing so candidate lists are unit-testable
/// without real executables present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    /// The platform this process runs on.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Ordered candidate filenames for a base executable name.
///
/// Pure function: same inputs, same list.
pub fn executable_names(base: &str, platform: Platform) -> Vec<String> {
    match platform {
        Platform::Windows => vec![
            format!("{base}.exe"),
            format!("{base}.cmd"),
            format!("{base}.bat"),
        ],
        Platform::Unix => vec![base.to_string()],
    }
}

/// Resolve a layout executable by probing candidate names.
///
/// With a search-path override, each directory is probed for each
/// candidate in order. Without one, the system PATH is consulted.
pub fn find_executable(base: &str, search_path: Option<&Path>) -> Result<PathBuf> {
    let candidates = executable_names(base, Platform::current());

    if let Some(dir) = search_path {
        for candidate in &candidates {
            let path = dir.join(candidate);
            if path.is_file() {
                return Ok(path);
            }
        }
    } else {
        for candidate in &candidates {
            if let Ok(path) = which::which(candidate) {
                return Ok(path);
            }
        }
    }

    Err(Error::Execution {
        message: format!("layout executable '{base}' not found"),
        context: Some(format!(
            "probed {} in {}",
            candidates.join(", "),
            search_path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "PATH".to_string())
        )),
    })
}
