//! Infrastructure toolkit sessions.
//!
//! A [`ToolkitSession`] owns one toolkit handle for a project and exposes the
//! bootstrap / synthesize / deploy / destroy lifecycle. Sessions report what
//! they are doing through an [`IoHost`]: every notification goes to
//! [`IoHost::notify`], and every request is answered by
//! [`IoHost::request_response`] without blocking on a human.

pub mod cdk_cli;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cloudformation::BootstrapStatus;
use crate::error::DeployResult;

pub use cdk_cli::{CdkCliConfig, CdkCliFactory, CdkCliToolkit};

/// One notification from the toolkit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolkitMessage {
    pub code: Option<String>,
    pub level: Option<String>,
    pub message: String,
    pub time: Option<DateTime<Utc>>,
    /// Structured payload; deploy results carry `outputs` and `stackArn`.
    pub data: Option<Value>,
}

impl ToolkitMessage {
    pub fn new(code: impl Into<String>, level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            level: Some(level.into()),
            message: message.into(),
            time: Some(Utc::now()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }
}

/// A question the toolkit asks, with the answer it will accept by default.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolkitRequest {
    pub message: ToolkitMessage,
    pub default_response: Value,
}

/// Receives everything a toolkit session reports.
pub trait IoHost: Send + Sync {
    fn notify(&self, message: ToolkitMessage);

    /// Answer a toolkit request. Implementations must not wait for input.
    fn request_response(&self, request: ToolkitRequest) -> Value;
}

/// Drops notifications and answers every request with its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentIoHost;

impl IoHost for SilentIoHost {
    fn notify(&self, _message: ToolkitMessage) {}

    fn request_response(&self, request: ToolkitRequest) -> Value {
        request.default_response
    }
}

/// Which stacks an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackSelection {
    AllStacks,
    /// Every pattern must match at least one stack.
    PatternMustMatch(Vec<String>),
}

impl StackSelection {
    pub fn exact(stack_name: impl Into<String>) -> Self {
        StackSelection::PatternMustMatch(vec![stack_name.into()])
    }

    pub fn patterns(&self) -> &[String] {
        match self {
            StackSelection::AllStacks => &[],
            StackSelection::PatternMustMatch(p) => p,
        }
    }
}

/// Output key to value for one stack.
pub type StackOutputs = BTreeMap<String, String>;

/// What a successful deploy reported for one stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDeployResult {
    pub outputs: StackOutputs,
    pub stack_arn: Option<String>,
}

#[async_trait]
pub trait ToolkitSession: Send + Sync {
    /// Whether the environment in `region` still needs bootstrapping.
    async fn bootstrap_check(&self, region: &str) -> DeployResult<BootstrapStatus>;

    /// Bootstrap `aws://{account}/{region}`.
    async fn bootstrap(&self, environment: &str) -> DeployResult<()>;

    /// Synthesize the app and return the stack names it produces.
    async fn synthesize(&self, selection: &StackSelection) -> DeployResult<Vec<String>>;

    async fn deploy(
        &self,
        selection: &StackSelection,
    ) -> DeployResult<BTreeMap<String, StackDeployResult>>;

    async fn destroy(&self, selection: &StackSelection) -> DeployResult<()>;

    /// Release the toolkit handle. Called exactly once per session.
    async fn dispose(&self) -> DeployResult<()>;
}

/// Opens toolkit sessions wired to a given host.
pub trait ToolkitFactory: Send + Sync {
    fn open(&self, host: Arc<dyn IoHost>) -> DeployResult<Box<dyn ToolkitSession>>;
}
