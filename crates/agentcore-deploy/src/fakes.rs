//! In-memory fakes for the deploy layer's external collaborators (testing only).
//!
//! Every fake records what it was asked so tests can assert on call order
//! and counts without touching cdk or AWS.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use agentcore_state::ProjectSpec;
use async_trait::async_trait;
use serde_json::json;

use crate::cloudformation::{BootstrapStatus, StackDescription, StackOutput, StackStatusReader};
use crate::credentials::{CallerIdentity, CredentialStatus, CredentialsProvider};
use crate::discovery::{Tag, TagPage, TagQuery, TaggedResource, TaggingClient};
use crate::error::{DeployError, DeployResult};
use crate::events::{DEPLOY_RESULT, STACK_ACTIVITY, STACK_MONITOR_END, STACK_MONITOR_START};
use crate::orchestrator::{BootstrapDecision, BootstrapPrompt};
use crate::render::Renderer;
use crate::toolkit::{
    IoHost, StackDeployResult, StackSelection, ToolkitFactory, ToolkitMessage, ToolkitSession,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// CloudFormation
// ---------------------------------------------------------------------------

/// Stack descriptions keyed by `(region, stack name)`.
#[derive(Debug, Default)]
pub struct FakeCloudFormation {
    stacks: Mutex<BTreeMap<(String, String), StackDescription>>,
}

impl FakeCloudFormation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_stack(&self, region: &str, name: &str, status: &str, outputs: &[(&str, &str)]) {
        self.put_stack_description(
            region,
            StackDescription {
                stack_name: name.to_string(),
                stack_status: Some(status.to_string()),
                outputs: outputs
                    .iter()
                    .map(|(k, v)| StackOutput {
                        output_key: Some(k.to_string()),
                        output_value: Some(v.to_string()),
                    })
                    .collect(),
            },
        );
    }

    pub fn put_stack_description(&self, region: &str, stack: StackDescription) {
        lock(&self.stacks).insert((region.to_string(), stack.stack_name.clone()), stack);
    }

    pub fn remove_stack(&self, region: &str, name: &str) {
        lock(&self.stacks).remove(&(region.to_string(), name.to_string()));
    }
}

#[async_trait]
impl StackStatusReader for FakeCloudFormation {
    async fn describe_stack(
        &self,
        region: &str,
        stack_name: &str,
    ) -> DeployResult<Option<StackDescription>> {
        Ok(lock(&self.stacks)
            .get(&(region.to_string(), stack_name.to_string()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Tagging
// ---------------------------------------------------------------------------

/// Replays queued pages in order; an empty queue yields an empty last page.
#[derive(Debug, Default)]
pub struct FakeTaggingClient {
    pages: Mutex<VecDeque<TagPage>>,
    queries: Mutex<Vec<TagQuery>>,
}

impl FakeTaggingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one page of `(arn, tags)` entries.
    pub fn push_page(&self, resources: Vec<(Option<&str>, Vec<(&str, &str)>)>, token: Option<&str>) {
        let page = TagPage {
            resource_tag_mapping_list: resources
                .into_iter()
                .map(|(arn, tags)| TaggedResource {
                    resource_arn: arn.map(str::to_string),
                    tags: tags
                        .into_iter()
                        .map(|(key, value)| Tag {
                            key: key.to_string(),
                            value: value.to_string(),
                        })
                        .collect(),
                })
                .collect(),
            pagination_token: token.map(str::to_string),
        };
        lock(&self.pages).push_back(page);
    }

    pub fn queries(&self) -> Vec<TagQuery> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl TaggingClient for FakeTaggingClient {
    async fn get_resources(&self, query: &TagQuery) -> DeployResult<TagPage> {
        lock(&self.queries).push(query.clone());
        Ok(lock(&self.pages).pop_front().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeCredentials {
    status: CredentialStatus,
    checks: Mutex<u32>,
}

impl FakeCredentials {
    pub fn valid(account: &str) -> Self {
        Self::with_status(CredentialStatus::Valid(CallerIdentity {
            account: account.to_string(),
            arn: format!("arn:aws:iam::{account}:user/test"),
        }))
    }

    pub fn absent() -> Self {
        Self::with_status(CredentialStatus::Absent {
            detail: "Unable to locate credentials".to_string(),
        })
    }

    pub fn expired() -> Self {
        Self::with_status(CredentialStatus::Expired {
            detail: "ExpiredToken: The security token included in the request is expired"
                .to_string(),
        })
    }

    pub fn with_status(status: CredentialStatus) -> Self {
        Self {
            status,
            checks: Mutex::new(0),
        }
    }

    pub fn checks(&self) -> u32 {
        *lock(&self.checks)
    }
}

#[async_trait]
impl CredentialsProvider for FakeCredentials {
    async fn check(&self, _region: &str) -> DeployResult<CredentialStatus> {
        *lock(&self.checks) += 1;
        Ok(self.status.clone())
    }
}

// ---------------------------------------------------------------------------
// Toolkit
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ToolkitScript {
    needs_bootstrap: bool,
    stack_names: Vec<String>,
    deploy_results: BTreeMap<String, StackDeployResult>,
    /// Report outputs only through I5900 notifications, not the return value.
    outputs_via_messages_only: bool,
    failure: Option<(String, String)>,
    calls: Vec<String>,
    opened: u32,
    disposed: u32,
}

/// Scripted toolkit. Clones share one script, so a test keeps a handle while
/// the orchestrator owns the sessions it opens.
#[derive(Clone, Default)]
pub struct FakeToolkit {
    script: Arc<Mutex<ToolkitScript>>,
    host: Option<Arc<dyn IoHost>>,
}

impl FakeToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stacks<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.script).stack_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs(self, stack_name: &str, outputs: &[(&str, &str)]) -> Self {
        lock(&self.script).deploy_results.insert(
            stack_name.to_string(),
            StackDeployResult {
                outputs: outputs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                stack_arn: Some(format!(
                    "arn:aws:cloudformation:us-east-1:123456789012:stack/{stack_name}/0000"
                )),
            },
        );
        self
    }

    pub fn needing_bootstrap(self) -> Self {
        lock(&self.script).needs_bootstrap = true;
        self
    }

    pub fn outputs_via_messages_only(self) -> Self {
        lock(&self.script).outputs_via_messages_only = true;
        self
    }

    /// Make `operation` (`synthesize`, `deploy`, `destroy`, `bootstrap`) fail.
    pub fn failing(self, operation: &str, message: &str) -> Self {
        lock(&self.script).failure = Some((operation.to_string(), message.to_string()));
        self
    }

    /// Operation names in call order, e.g. `deploy:ProjA-default`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.script).calls.clone()
    }

    pub fn opened(&self) -> u32 {
        lock(&self.script).opened
    }

    pub fn disposed(&self) -> u32 {
        lock(&self.script).disposed
    }

    fn notify(&self, message: ToolkitMessage) {
        if let Some(host) = &self.host {
            host.notify(message);
        }
    }

    fn record(&self, operation: &str, selection: Option<&StackSelection>) -> DeployResult<()> {
        let mut script = lock(&self.script);
        let call = match selection {
            Some(StackSelection::AllStacks) => format!("{operation}:*"),
            Some(sel) => format!("{operation}:{}", sel.patterns().join(",")),
            None => operation.to_string(),
        };
        script.calls.push(call);
        match &script.failure {
            Some((op, message)) if op == operation => {
                let message = message.clone();
                drop(script);
                self.notify(ToolkitMessage::new("CDK_TOOLKIT_E5500", "error", &message));
                Err(DeployError::toolkit(operation, message))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ToolkitSession for FakeToolkit {
    async fn bootstrap_check(&self, _region: &str) -> DeployResult<BootstrapStatus> {
        self.record("bootstrap_check", None)?;
        let needs = lock(&self.script).needs_bootstrap;
        Ok(BootstrapStatus {
            is_bootstrapped: !needs,
            stack_status: (!needs).then(|| "CREATE_COMPLETE".to_string()),
        })
    }

    async fn bootstrap(&self, environment: &str) -> DeployResult<()> {
        self.record("bootstrap", None)?;
        self.notify(ToolkitMessage::new(
            "CDK_TOOLKIT_I9900",
            "info",
            format!("Environment {environment} bootstrapped."),
        ));
        lock(&self.script).needs_bootstrap = false;
        Ok(())
    }

    async fn synthesize(&self, selection: &StackSelection) -> DeployResult<Vec<String>> {
        self.record("synthesize", Some(selection))?;
        self.notify(ToolkitMessage::new("CDK_TOOLKIT_I1000", "info", "Synthesis time: 0.1s"));
        // Looks like deploy progress but arrives while the filter is quiet.
        self.notify(ToolkitMessage::new(STACK_ACTIVITY, "info", "synth | 1/1 | noise"));
        Ok(lock(&self.script).stack_names.clone())
    }

    async fn deploy(
        &self,
        selection: &StackSelection,
    ) -> DeployResult<BTreeMap<String, StackDeployResult>> {
        self.record("deploy", Some(selection))?;
        let (results, via_messages) = {
            let script = lock(&self.script);
            (script.deploy_results.clone(), script.outputs_via_messages_only)
        };
        for (stack, result) in &results {
            self.notify(ToolkitMessage::new(STACK_MONITOR_START, "info", format!("{stack} monitoring")));
            self.notify(ToolkitMessage::new(
                STACK_ACTIVITY,
                "info",
                format!("{stack} | 1/2 | CREATE_IN_PROGRESS | AWS::S3::Bucket"),
            ));
            self.notify(ToolkitMessage::new(
                STACK_ACTIVITY,
                "info",
                format!("{stack} | 2/2 | CREATE_COMPLETE | AWS::CloudFormation::Stack"),
            ));
            self.notify(ToolkitMessage::new(STACK_MONITOR_END, "info", format!("{stack} done")));
            self.notify(
                ToolkitMessage::new(DEPLOY_RESULT, "result", format!("{stack} deployed")).with_data(
                    json!({ "outputs": result.outputs, "stackArn": result.stack_arn }),
                ),
            );
        }
        if via_messages {
            return Ok(BTreeMap::new());
        }
        Ok(results)
    }

    async fn destroy(&self, selection: &StackSelection) -> DeployResult<()> {
        self.record("destroy", Some(selection))
    }

    async fn dispose(&self) -> DeployResult<()> {
        lock(&self.script).disposed += 1;
        Ok(())
    }
}

impl ToolkitFactory for FakeToolkit {
    fn open(&self, host: Arc<dyn IoHost>) -> DeployResult<Box<dyn ToolkitSession>> {
        lock(&self.script).opened += 1;
        Ok(Box::new(FakeToolkit {
            script: self.script.clone(),
            host: Some(host),
        }))
    }
}

// ---------------------------------------------------------------------------
// Renderer and prompt
// ---------------------------------------------------------------------------

/// Renderer that only counts invocations.
#[derive(Debug, Default)]
pub struct CountingRenderer {
    renders: Mutex<u32>,
}

impl CountingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> u32 {
        *lock(&self.renders)
    }
}

#[async_trait]
impl Renderer for CountingRenderer {
    async fn render(&self, _project: &ProjectSpec) -> DeployResult<()> {
        *lock(&self.renders) += 1;
        Ok(())
    }
}

/// Always gives the same answer and records each environment asked about.
#[derive(Debug)]
pub struct FixedPrompt {
    decision: BootstrapDecision,
    asked: Mutex<Vec<String>>,
}

impl FixedPrompt {
    pub fn new(decision: BootstrapDecision) -> Self {
        Self {
            decision,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

#[async_trait]
impl BootstrapPrompt for FixedPrompt {
    async fn confirm_bootstrap(&self, environment: &str) -> DeployResult<BootstrapDecision> {
        lock(&self.asked).push(environment.to_string());
        Ok(self.decision)
    }
}
