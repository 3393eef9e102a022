//! External command execution.
//!
//! [`ProcessRunner`] is the seam between packaging logic and real child
//! processes. [`SystemProcessRunner`] spawns them; tests substitute
//! [`crate::fakes::ScriptedProcessRunner`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PackageError, PackageResult};

/// A command to run: program, arguments, working directory, and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Kill the child if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
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

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (0 = success, -1 = killed by signal).
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout and stderr joined by a newline, the way failures are reported.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Trimmed combined output, or `fallback` when both streams are empty.
    pub fn failure_detail(&self, fallback: impl FnOnce() -> String) -> String {
        let combined = self.combined();
        let trimmed = combined.trim();
        if trimmed.is_empty() {
            fallback()
        } else {
            trimmed.to_string()
        }
    }
}

/// Runs external commands, blocking or awaited.
///
/// Both variants must report the same [`ProcessOutput`] for the same command.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, cmd: &CommandSpec) -> PackageResult<ProcessOutput>;

    fn run_blocking(&self, cmd: &CommandSpec) -> PackageResult<ProcessOutput>;

    /// Full path of `binary` if it is on PATH.
    fn locate(&self, binary: &str) -> Option<PathBuf>;
}

/// Spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

fn finish(start: Instant, status: std::process::ExitStatus, stdout: &[u8], stderr: &[u8]) -> ProcessOutput {
    ProcessOutput {
        code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(stdout).to_string(),
        stderr: String::from_utf8_lossy(stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, cmd: &CommandSpec) -> PackageResult<ProcessOutput> {
        let start = Instant::now();
        debug!(command = %cmd.display(), "spawning");

        let mut command = tokio::process::Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| PackageError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        let waited = match cmd.timeout {
            // Dropping the future on timeout kills the child (kill_on_drop).
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| PackageError::Timeout {
                    program: cmd.program.clone(),
                    secs: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| PackageError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        Ok(finish(start, output.status, &output.stdout, &output.stderr))
    }

    fn run_blocking(&self, cmd: &CommandSpec) -> PackageResult<ProcessOutput> {
        let start = Instant::now();
        debug!(command = %cmd.display(), "spawning (blocking)");
        let spawn_err = |source| PackageError::Spawn {
            program: cmd.program.clone(),
            source,
        };

        let mut command = std::process::Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }

        let Some(limit) = cmd.timeout else {
            let output = command.output().map_err(spawn_err)?;
            return Ok(finish(start, output.status, &output.stdout, &output.stderr));
        };

        let mut child = command.spawn().map_err(spawn_err)?;
        // Drain pipes on threads so a chatty child cannot block on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            if let Some(status) = child.try_wait().map_err(spawn_err)? {
                break status;
            }
            if start.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PackageError::Timeout {
                    program: cmd.program.clone(),
                    secs: limit.as_secs(),
                });
            }
            std::thread::sleep(Duration::from_millis(25));
        };

        let collect = |handle: Option<std::thread::JoinHandle<Vec<u8>>>| {
            handle.and_then(|h| h.join().ok()).unwrap_or_default()
        };
        Ok(finish(start, status, &collect(stdout), &collect(stderr)))
    }

    fn locate(&self, binary: &str) -> Option<PathBuf> {
        which::which(binary).ok()
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}
