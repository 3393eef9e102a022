//! AgentCore Deploy: drives the infrastructure toolkit and keeps local state
//! in step with the cloud
//!
//! ## Layer 2 - Orchestration
//!
//! Focus: one deploy or destroy run at a time, from credentials preflight
//! through packaging, synthesis and deploy to persisted state.
//!
//! ## Key Components
//!
//! - `DeploymentOrchestrator`: phase state machine over a single toolkit session
//! - `ToolkitSession` / `CdkCliToolkit`: bootstrap, synth, deploy, destroy
//! - `EventFilter`: progress extraction and audit stream from toolkit messages
//! - `StackLocator`: tag-based stack discovery
//! - `build_deployed_state`: target-scoped merge into deployed state
//! - `AwsCli`: tagging, stack and credentials reads via the `aws` CLI

pub mod audit;
pub mod aws;
pub mod cloudformation;
pub mod credentials;
pub mod discovery;
mod error;
pub mod events;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod outputs;
pub mod reconcile;
pub mod render;
pub mod session;
pub mod telemetry;
pub mod toolkit;

pub use aws::AwsCli;
pub use cloudformation::{
    check_bootstrap_status, check_stack_deployability, check_stack_status, get_stack_outputs,
    BootstrapStatus, StackDescription, StackStatusReader, StackStatusResult,
};
pub use credentials::{CallerIdentity, CredentialStatus, CredentialsProvider};
pub use discovery::{DiscoveredStack, StackLocator, TaggingClient, DEFAULT_TARGET};
pub use error::{DeployError, DeployResult};
pub use events::{DeployMessage, EventFilter, RawMessage, ResourceProgress, Subscription};
pub use metrics::METRICS;
pub use orchestrator::destroy::{CleanupOutcome, DestroyOutcome, DestroyedStack};
pub use orchestrator::{
    discover_deployed_targets, refresh_target_state, select_target, stack_name_for,
    BootstrapDecision, BootstrapPrompt, Collaborators, DeployReport, DeployedTarget,
    DeploymentOrchestrator, OrchestratorOptions, Phase, PlannedDeploy, PreflightReport,
};
pub use outputs::parse_agent_outputs;
pub use reconcile::build_deployed_state;
pub use render::{PrebuiltSources, Renderer};
pub use session::SessionGuard;
pub use toolkit::{
    CdkCliConfig, CdkCliFactory, CdkCliToolkit, IoHost, StackSelection, ToolkitFactory,
    ToolkitMessage, ToolkitSession,
};
