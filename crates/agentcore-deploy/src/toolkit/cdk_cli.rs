//! Toolkit session backed by the `cdk` command line.
//!
//! Each operation is one `cdk` invocation through a [`ProcessRunner`]. Its
//! output is replayed line by line to the session's [`IoHost`], with
//! resource progress lines tagged as stack activity, so an [`EventFilter`]
//! sees the same stream shape it would from an in-process toolkit.
//!
//! [`EventFilter`]: crate::events::EventFilter

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agentcore_package::{CommandSpec, ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    IoHost, StackDeployResult, StackOutputs, StackSelection, ToolkitFactory, ToolkitMessage,
    ToolkitRequest, ToolkitSession,
};
use crate::cloudformation::{check_bootstrap_status, BootstrapStatus, StackStatusReader};
use crate::error::{DeployError, DeployResult};
use crate::events::{
    extract_progress, DEPLOY_RESULT, STACK_ACTIVITY, STACK_MONITOR_END, STACK_MONITOR_START,
};

/// Code for plain CLI output lines with no better classification.
pub const CLI_OUTPUT: &str = "CDK_TOOLKIT_I0000";
/// Code for the destroy confirmation request.
pub const CONFIRM_DESTROY: &str = "CDK_TOOLKIT_I7010";
const CLI_FAILURE: &str = "CDK_TOOLKIT_E0000";

const OUTPUTS_FILE: &str = "agentcore-outputs.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CdkCliConfig {
    pub binary: String,
    /// Appended to every invocation.
    pub extra_args: Vec<String>,
    /// Directory holding `cdk.json`.
    pub project_dir: PathBuf,
    pub timeout_secs: Option<u64>,
    /// Exported as `AWS_PROFILE`.
    pub profile: Option<String>,
}

impl Default for CdkCliConfig {
    fn default() -> Self {
        Self {
            binary: "cdk".to_string(),
            extra_args: Vec::new(),
            project_dir: PathBuf::from("agentcore/cdk"),
            timeout_secs: None,
            profile: None,
        }
    }
}

impl CdkCliConfig {
    pub fn for_project_dir(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Default::default()
        }
    }

    fn outputs_path(&self) -> PathBuf {
        self.project_dir.join("cdk.out").join(OUTPUTS_FILE)
    }
}

/// Opens [`CdkCliToolkit`] sessions sharing one config and runner.
#[derive(Clone)]
pub struct CdkCliFactory {
    config: CdkCliConfig,
    runner: Arc<dyn ProcessRunner>,
    stacks: Arc<dyn StackStatusReader>,
}

impl CdkCliFactory {
    pub fn new(
        config: CdkCliConfig,
        runner: Arc<dyn ProcessRunner>,
        stacks: Arc<dyn StackStatusReader>,
    ) -> Self {
        Self {
            config,
            runner,
            stacks,
        }
    }
}

impl ToolkitFactory for CdkCliFactory {
    fn open(&self, host: Arc<dyn IoHost>) -> DeployResult<Box<dyn ToolkitSession>> {
        if self.runner.locate(&self.config.binary).is_none() {
            return Err(DeployError::toolkit(
                "open",
                format!(
                    "{} not found on PATH. Install the AWS CDK CLI (npm install -g aws-cdk).",
                    self.config.binary
                ),
            ));
        }
        Ok(Box::new(CdkCliToolkit {
            config: self.config.clone(),
            runner: self.runner.clone(),
            stacks: self.stacks.clone(),
            host,
        }))
    }
}

pub struct CdkCliToolkit {
    config: CdkCliConfig,
    runner: Arc<dyn ProcessRunner>,
    stacks: Arc<dyn StackStatusReader>,
    host: Arc<dyn IoHost>,
}

impl CdkCliToolkit {
    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = CommandSpec::new(&self.config.binary)
            .args(args)
            .args(self.config.extra_args.iter().cloned())
            .cwd(&self.config.project_dir)
            .timeout(self.config.timeout_secs.map(Duration::from_secs));
        if let Some(profile) = &self.config.profile {
            cmd = cmd.env("AWS_PROFILE", profile);
        }
        cmd
    }

    /// Run one cdk command, relaying its output and failing on non-zero exit.
    async fn run(&self, operation: &str, cmd: CommandSpec) -> DeployResult<ProcessOutput> {
        debug!(operation, command = %cmd.display(), "cdk");
        let output = self.runner.run(&cmd).await?;
        self.relay(&output);
        if output.success() {
            return Ok(output);
        }
        let detail = output.failure_detail(|| format!("cdk {operation} exited with code {}", output.code));
        self.host
            .notify(ToolkitMessage::new(CLI_FAILURE, "error", detail.clone()));
        Err(DeployError::toolkit(operation, detail))
    }

    fn relay(&self, output: &ProcessOutput) {
        // cdk writes progress to stderr; neither stream implies a level.
        let lines = output.stdout.lines().chain(output.stderr.lines());
        for line in lines.map(str::trim_end).filter(|l| !l.trim().is_empty()) {
            let code = if extract_progress(line).is_some() {
                STACK_ACTIVITY
            } else {
                CLI_OUTPUT
            };
            self.host.notify(ToolkitMessage::new(code, "info", line));
        }
    }

    fn selection_args(selection: &StackSelection) -> Vec<String> {
        match selection {
            StackSelection::AllStacks => vec!["--all".to_string()],
            StackSelection::PatternMustMatch(patterns) => patterns.clone(),
        }
    }

    async fn read_outputs(&self) -> DeployResult<BTreeMap<String, StackOutputs>> {
        let path = self.config.outputs_path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(DeployError::Io { path, source }),
        };
        let parsed: BTreeMap<String, BTreeMap<String, serde_json::Value>> =
            serde_json::from_str(&raw).map_err(|e| DeployError::parse("cdk outputs file", e))?;
        Ok(parsed
            .into_iter()
            .map(|(stack, outputs)| {
                let outputs = outputs
                    .into_iter()
                    .map(|(k, v)| match v {
                        serde_json::Value::String(s) => (k, s),
                        other => (k, other.to_string()),
                    })
                    .collect();
                (stack, outputs)
            })
            .collect())
    }
}

#[async_trait]
impl ToolkitSession for CdkCliToolkit {
    async fn bootstrap_check(&self, region: &str) -> DeployResult<BootstrapStatus> {
        check_bootstrap_status(self.stacks.as_ref(), region).await
    }

    async fn bootstrap(&self, environment: &str) -> DeployResult<()> {
        self.run("bootstrap", self.command(["bootstrap", environment]))
            .await
            .map(|_| ())
    }

    async fn synthesize(&self, selection: &StackSelection) -> DeployResult<Vec<String>> {
        let patterns = selection.patterns().to_vec();
        self.run(
            "synth",
            self.command(["synth", "--quiet"]).args(patterns.iter().cloned()),
        )
        .await?;
        let listed = self
            .run("synth", self.command(["list"]).args(patterns))
            .await?;
        Ok(listed
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn deploy(
        &self,
        selection: &StackSelection,
    ) -> DeployResult<BTreeMap<String, StackDeployResult>> {
        for pattern in selection.patterns() {
            self.host.notify(ToolkitMessage::new(
                STACK_MONITOR_START,
                "info",
                format!("{pattern}: deploying..."),
            ));
        }
        let outputs_path = self.config.outputs_path();
        let cmd = self
            .command(["deploy"])
            .args(Self::selection_args(selection))
            .args(["--require-approval", "never", "--outputs-file"])
            .arg(outputs_path.to_string_lossy());
        self.run("deploy", cmd).await?;

        let mut results = BTreeMap::new();
        for (stack, outputs) in self.read_outputs().await? {
            self.host.notify(ToolkitMessage::new(
                STACK_MONITOR_END,
                "info",
                format!("{stack}: deploy complete"),
            ));
            let result = StackDeployResult {
                outputs,
                stack_arn: None,
            };
            self.host.notify(
                ToolkitMessage::new(DEPLOY_RESULT, "result", format!("{stack} deployed"))
                    .with_data(json!({ "outputs": result.outputs })),
            );
            results.insert(stack, result);
        }
        Ok(results)
    }

    async fn destroy(&self, selection: &StackSelection) -> DeployResult<()> {
        let targets = match selection {
            StackSelection::AllStacks => "all stacks".to_string(),
            StackSelection::PatternMustMatch(p) => p.join(", "),
        };
        let answer = self.host.request_response(ToolkitRequest {
            message: ToolkitMessage::new(
                CONFIRM_DESTROY,
                "info",
                format!("Are you sure you want to delete: {targets}?"),
            ),
            default_response: serde_json::Value::Bool(true),
        });
        if answer == serde_json::Value::Bool(false) {
            return Err(DeployError::toolkit("destroy", "destroy was declined"));
        }
        let cmd = self
            .command(["destroy"])
            .args(Self::selection_args(selection))
            .arg("--force");
        self.run("destroy", cmd).await.map(|_| ())
    }

    async fn dispose(&self) -> DeployResult<()> {
        debug!("cdk session disposed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventFilter;
    use crate::fakes::FakeCloudFormation;
    use agentcore_package::fakes::ScriptedProcessRunner;
    use tempfile::TempDir;

    fn factory(runner: Arc<ScriptedProcessRunner>, dir: &std::path::Path) -> CdkCliFactory {
        CdkCliFactory::new(
            CdkCliConfig::for_project_dir(dir),
            runner,
            Arc::new(FakeCloudFormation::new()),
        )
    }

    #[test]
    fn missing_binary_fails_to_open() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["uv"]));
        let tmp = TempDir::new().unwrap();
        let err = factory(runner, tmp.path())
            .open(Arc::new(EventFilter::new()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("cdk not found on PATH"));
    }

    #[tokio::test]
    async fn synth_lists_stack_names() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["cdk"]));
        runner.push_success();
        runner.push_output(ProcessOutput {
            stdout: "ProjA-default\n\nProjA-dev\n".to_string(),
            ..Default::default()
        });
        let tmp = TempDir::new().unwrap();
        let session = factory(runner.clone(), tmp.path())
            .open(Arc::new(EventFilter::new()))
            .unwrap();

        let names = session.synthesize(&StackSelection::AllStacks).await.unwrap();
        assert_eq!(names, vec!["ProjA-default", "ProjA-dev"]);

        let calls = runner.calls();
        assert_eq!(calls[0].args[..2], ["synth", "--quiet"]);
        assert_eq!(calls[1].args, ["list"]);
        assert_eq!(calls[0].cwd.as_deref(), Some(tmp.path()));
    }

    #[tokio::test]
    async fn deploy_relays_progress_and_reads_outputs() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["cdk"]));
        runner.push_output(ProcessOutput {
            stderr: "ProjA-default | 1/3 | CREATE_IN_PROGRESS\nDone\n".to_string(),
            ..Default::default()
        });
        let tmp = TempDir::new().unwrap();
        let out_dir = tmp.path().join("cdk.out");
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(
            out_dir.join(OUTPUTS_FILE),
            r#"{"ProjA-default": {"BucketName": "x", "Count": 2}}"#,
        )
        .unwrap();

        let filter = EventFilter::new();
        filter.set_verbose(true);
        let mut filtered = filter.subscribe_filtered();
        let mut raw = filter.subscribe_raw();
        let session = factory(runner.clone(), tmp.path())
            .open(Arc::new(filter.clone()))
            .unwrap();

        let results = session
            .deploy(&StackSelection::exact("ProjA-default"))
            .await
            .unwrap();
        assert_eq!(results["ProjA-default"].outputs["BucketName"], "x");
        assert_eq!(results["ProjA-default"].outputs["Count"], "2");

        let args = &runner.calls()[0].args;
        assert_eq!(args[..2], ["deploy", "ProjA-default"]);
        assert!(args.windows(2).any(|w| w == ["--require-approval", "never"]));

        let codes: Vec<String> = filtered.drain().into_iter().map(|m| m.code).collect();
        assert_eq!(
            codes,
            vec![STACK_MONITOR_START, STACK_ACTIVITY, STACK_MONITOR_END, DEPLOY_RESULT]
        );
        assert!(raw.drain().iter().any(|m| m.message == "Done"));
    }

    #[tokio::test]
    async fn failing_command_is_toolkit_error() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["cdk"]));
        runner.push_failure(1, "", "Stack ProjA-default failed: ROLLBACK_COMPLETE");
        let tmp = TempDir::new().unwrap();
        let session = factory(runner, tmp.path())
            .open(Arc::new(EventFilter::new()))
            .unwrap();

        let err = session
            .destroy(&StackSelection::exact("ProjA-default"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "destroy failed: Stack ProjA-default failed: ROLLBACK_COMPLETE"
        );
    }
}
