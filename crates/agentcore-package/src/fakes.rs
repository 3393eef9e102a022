//! In-memory process runner for tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::PackageResult;
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner};

/// Replays queued outputs in order and records every command it was given.
///
/// Commands with a fixed response (see [`Self::respond`]) always get it and
/// leave the queue alone. When the queue is empty each other command
/// succeeds with empty output.
#[derive(Debug, Default)]
pub struct ScriptedProcessRunner {
    outputs: Mutex<VecDeque<ProcessOutput>>,
    responses: Mutex<BTreeMap<String, ProcessOutput>>,
    calls: Mutex<Vec<CommandSpec>>,
    binaries: Mutex<BTreeSet<String>>,
}

impl ScriptedProcessRunner {
    /// A runner where `uv`, `npm` and `node` are available and report
    /// versions that satisfy the toolchain minimums.
    pub fn new() -> Self {
        let runner = Self::with_binaries(["uv", "npm", "node"]);
        runner
            .respond("node --version", "v20.10.0\n")
            .respond("uv --version", "uv 0.9.2\n");
        runner
    }

    pub fn with_binaries<I, S>(binaries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            binaries: Mutex::new(binaries.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn push_output(&self, output: ProcessOutput) -> &Self {
        lock(&self.outputs).push_back(output);
        self
    }

    /// Answer every `command` (as rendered by [`CommandSpec::display`]) with
    /// a successful run printing `stdout`.
    pub fn respond(&self, command: &str, stdout: &str) -> &Self {
        lock(&self.responses).insert(
            command.to_string(),
            ProcessOutput {
                stdout: stdout.to_string(),
                ..Default::default()
            },
        );
        self
    }

    pub fn push_success(&self) -> &Self {
        self.push_output(ProcessOutput::default())
    }

    pub fn push_failure(&self, code: i32, stdout: &str, stderr: &str) -> &Self {
        self.push_output(ProcessOutput {
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 0,
        })
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }

    fn next(&self, cmd: &CommandSpec) -> ProcessOutput {
        lock(&self.calls).push(cmd.clone());
        if let Some(output) = lock(&self.responses).get(&cmd.display()) {
            return output.clone();
        }
        lock(&self.outputs).pop_front().unwrap_or_default()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ProcessRunner for ScriptedProcessRunner {
    async fn run(&self, cmd: &CommandSpec) -> PackageResult<ProcessOutput> {
        Ok(self.next(cmd))
    }

    fn run_blocking(&self, cmd: &CommandSpec) -> PackageResult<ProcessOutput> {
        Ok(self.next(cmd))
    }

    fn locate(&self, binary: &str) -> Option<PathBuf> {
        lock(&self.binaries)
            .contains(binary)
            .then(|| PathBuf::from("/usr/bin").join(binary))
    }
}
