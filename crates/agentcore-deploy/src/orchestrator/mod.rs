//! DeploymentOrchestrator: the deploy / destroy state machine.
//!
//! ```text
//! idle -> preflight -> [bootstrap_confirm -> bootstrapping] -> packaging
//!      -> synthesizing -> deploying -> complete
//! idle -> preflight -> destroying -> complete
//! any non-terminal phase -> error
//! ```
//!
//! Each run opens one toolkit session wired to the orchestrator's
//! [`EventFilter`] and releases it exactly once: on `complete`, on `error`,
//! or, after [`DeploymentOrchestrator::plan`], when the caller finishes the
//! handoff with [`DeploymentOrchestrator::deploy_planned`] (or drops it).
//! Nothing is retried here; any component failure ends the run.

pub mod destroy;
pub mod targets;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use agentcore_package::{
    check_dependency_versions, pack_all, ArtifactResult, DependencyCheck, PackageOptions,
    ProcessRunner,
};
use agentcore_state::{ConfigStore, DeployedState, DeploymentTarget, ProjectSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{warn, Instrument, Span};

use crate::audit::AuditTrail;
use crate::cloudformation::{check_stack_deployability, format_cdk_environment, StackStatusReader};
use crate::credentials::CredentialsProvider;
use crate::discovery::{parse_stack_name_from_arn, StackLocator};
use crate::error::{DeployError, DeployResult};
use crate::events::{DeployMessage, EventFilter};
use crate::metrics::METRICS;
use crate::obs;
use crate::outputs::parse_agent_outputs;
use crate::reconcile::{build_deployed_state, read_existing_state};
use crate::render::Renderer;
use crate::session::SessionGuard;
use crate::toolkit::{StackDeployResult, StackOutputs, StackSelection, ToolkitFactory, ToolkitSession};

pub use targets::{discover_deployed_targets, refresh_target_state, select_target, DeployedTarget};

/// Stack name the CDK app uses for a project and target.
pub fn stack_name_for(project: &str, target: &str) -> String {
    format!("AgentCore-{project}-{target}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Preflight,
    BootstrapConfirm,
    Bootstrapping,
    Packaging,
    Synthesizing,
    Deploying,
    Destroying,
    Complete,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Preflight => "preflight",
            Phase::BootstrapConfirm => "bootstrap_confirm",
            Phase::Bootstrapping => "bootstrapping",
            Phase::Packaging => "packaging",
            Phase::Synthesizing => "synthesizing",
            Phase::Deploying => "deploying",
            Phase::Destroying => "destroying",
            Phase::Complete => "complete",
            Phase::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapDecision {
    Confirm,
    Skip,
}

/// Asked when the target environment has not been bootstrapped.
#[async_trait]
pub trait BootstrapPrompt: Send + Sync {
    async fn confirm_bootstrap(&self, environment: &str) -> DeployResult<BootstrapDecision>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorOptions {
    /// Bootstrap without asking.
    pub auto_confirm_bootstrap: bool,
    /// Forward filtered messages during synthesis too, overriding the quiet
    /// default for that phase. Deploy always forwards.
    pub verbose: bool,
    /// Defaults to the first configured target.
    pub target_name: Option<String>,
    pub package: PackageOptions,
    /// Where audit logs are written; none are written when unset.
    pub log_dir: Option<PathBuf>,
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ConfigStore>,
    pub credentials: Arc<dyn CredentialsProvider>,
    pub stacks: Arc<dyn StackStatusReader>,
    pub locator: StackLocator,
    pub runner: Arc<dyn ProcessRunner>,
    pub renderer: Arc<dyn Renderer>,
    pub prompt: Arc<dyn BootstrapPrompt>,
    pub toolkit: Arc<dyn ToolkitFactory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub target: String,
    pub account: String,
    pub region: String,
    pub needs_bootstrap: bool,
    pub toolchain: DependencyCheck,
    /// Filled in once synthesis has run.
    pub stack_names: Vec<String>,
}

#[derive(Debug)]
pub struct DeployReport {
    pub run_id: String,
    pub preflight: PreflightReport,
    pub artifacts: Vec<(String, ArtifactResult)>,
    pub stack_name: String,
    pub outputs: StackOutputs,
    pub state: DeployedState,
    /// Filtered messages observed while deploying.
    pub messages: Vec<DeployMessage>,
    pub audit_log: Option<PathBuf>,
}

/// A synthesized deploy holding its toolkit session open.
pub struct PlannedDeploy {
    run: Run,
    guard: SessionGuard,
    plan: Plan,
}

impl PlannedDeploy {
    pub fn preflight(&self) -> &PreflightReport {
        &self.plan.preflight
    }

    pub fn artifacts(&self) -> &[(String, ArtifactResult)] {
        &self.plan.artifacts
    }
}

struct Plan {
    project: ProjectSpec,
    target: DeploymentTarget,
    preflight: PreflightReport,
    artifacts: Vec<(String, ArtifactResult)>,
}

struct Run {
    id: String,
    operation: &'static str,
    started: Instant,
    audit: AuditTrail,
    span: Span,
}

pub struct DeploymentOrchestrator {
    deps: Collaborators,
    options: OrchestratorOptions,
    events: EventFilter,
    run_id: String,
    phase: Phase,
    history: Vec<Phase>,
}

impl DeploymentOrchestrator {
    pub fn new(deps: Collaborators, options: OrchestratorOptions) -> Self {
        Self {
            deps,
            options,
            events: EventFilter::new(),
            run_id: String::new(),
            phase: Phase::Idle,
            history: vec![Phase::Idle],
        }
    }

    /// Subscribe here for progress and audit streams.
    pub fn events(&self) -> &EventFilter {
        &self.events
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Phases of the latest run, in order, starting at `Idle`.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Run the whole deploy: plan, then deploy the plan.
    pub async fn deploy(&mut self) -> DeployResult<DeployReport> {
        let planned = self.plan().await?;
        self.deploy_planned(planned).await
    }

    /// Preflight, bootstrap, package and synthesize, keeping the session
    /// open for [`Self::deploy_planned`].
    pub async fn plan(&mut self) -> DeployResult<PlannedDeploy> {
        let mut run = self.begin("deploy");
        let mut guard = match self.open_session() {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(&mut run, None, e).await),
        };
        let span = run.span.clone();
        match self.plan_steps(&guard, &run.id).instrument(span).await {
            Ok(plan) => Ok(PlannedDeploy { run, guard, plan }),
            Err(e) => Err(self.fail(&mut run, Some(&mut guard), e).await),
        }
    }

    /// Deploy a plan, persist the observed state and release the session.
    pub async fn deploy_planned(&mut self, planned: PlannedDeploy) -> DeployResult<DeployReport> {
        let PlannedDeploy {
            mut run,
            mut guard,
            plan,
        } = planned;
        self.run_id = run.id.clone();

        let span = run.span.clone();
        match self.deploy_steps(&guard, &plan, &run.id).instrument(span).await {
            Ok(mut report) => {
                self.finish(&mut run, &mut guard).await;
                METRICS.inc_deploys_completed();
                report.audit_log = self.persist_audit(&mut run).await;
                Ok(report)
            }
            Err(e) => Err(self.fail(&mut run, Some(&mut guard), e).await),
        }
    }

    // -- steps ---------------------------------------------------------------

    async fn plan_steps(&mut self, guard: &SessionGuard, run_id: &str) -> DeployResult<Plan> {
        let (project, target) = self.preflight(run_id, "deploy").await?;
        let toolchain = check_dependency_versions(&project, self.deps.runner.as_ref())
            .await
            .into_result()?;
        // Stored state is merged after the deploy; refuse to start if it cannot be.
        read_existing_state(self.deps.store.as_ref()).await?;
        let session = guard.session()?;

        let bootstrap = session.bootstrap_check(&target.region).await?;
        let needs_bootstrap = !bootstrap.is_bootstrapped;
        if needs_bootstrap {
            self.bootstrap(session, &target).await?;
        }

        self.transition(Phase::Packaging);
        self.deps.renderer.render(&project).await?;
        let artifacts = pack_all(&project, &self.options.package, self.deps.runner.clone()).await?;
        for _ in &artifacts {
            METRICS.inc_packages_built();
        }

        self.transition(Phase::Synthesizing);
        self.events.set_verbose(self.options.verbose);
        let mut stack_names = session.synthesize(&StackSelection::AllStacks).await?;
        if stack_names.is_empty() {
            stack_names.push(stack_name_for(&project.name, &target.name));
        }
        let blocked =
            check_stack_deployability(self.deps.stacks.as_ref(), &target.region, &stack_names)
                .await?;
        if let Some((stack_name, status)) = blocked {
            let message = status
                .message
                .unwrap_or_else(|| format!("Stack \"{stack_name}\" cannot be deployed."));
            return Err(DeployError::StackBlocked {
                stack_name,
                message,
            });
        }

        let preflight = PreflightReport {
            target: target.name.clone(),
            account: target.account.clone(),
            region: target.region.clone(),
            needs_bootstrap,
            toolchain,
            stack_names,
        };
        Ok(Plan {
            project,
            target,
            preflight,
            artifacts,
        })
    }

    async fn deploy_steps(
        &mut self,
        guard: &SessionGuard,
        plan: &Plan,
        run_id: &str,
    ) -> DeployResult<DeployReport> {
        self.transition(Phase::Deploying);
        self.events.set_verbose(true);
        let mut progress = self.events.subscribe_filtered();

        let selection = StackSelection::PatternMustMatch(plan.preflight.stack_names.clone());
        let mut results = guard.session()?.deploy(&selection).await?;
        let messages = progress.drain();
        merge_result_messages(&mut results, &messages);

        let stack_name = plan
            .preflight
            .stack_names
            .first()
            .cloned()
            .unwrap_or_else(|| stack_name_for(&plan.project.name, &plan.target.name));
        let outputs = results
            .remove(&stack_name)
            .map(|r| r.outputs)
            .unwrap_or_default();

        let state = self.persist_state(plan, &stack_name, &outputs).await?;
        Ok(DeployReport {
            run_id: run_id.to_string(),
            preflight: plan.preflight.clone(),
            artifacts: plan.artifacts.clone(),
            stack_name,
            outputs,
            state,
            messages,
            audit_log: None,
        })
    }

    /// Read project and targets, pick the target and check credentials.
    async fn preflight(
        &mut self,
        run_id: &str,
        operation: &str,
    ) -> DeployResult<(ProjectSpec, DeploymentTarget)> {
        self.transition(Phase::Preflight);
        let project = self.deps.store.read_project_spec().await?;
        let targets = self.deps.store.read_deployment_targets().await?;
        let target = select_target(&targets, self.options.target_name.as_deref())?.clone();
        obs::record_target(&project.name, &target.name);
        obs::emit_deploy_started(run_id, operation, &project.name, &target.name);

        let identity = self
            .deps
            .credentials
            .check(&target.region)
            .await?
            .into_identity()?;
        if identity.account != target.account {
            warn!(
                credentials_account = %identity.account,
                target_account = %target.account,
                "credentials belong to a different account than the target"
            );
        }
        Ok((project, target))
    }

    async fn bootstrap(
        &mut self,
        session: &dyn ToolkitSession,
        target: &DeploymentTarget,
    ) -> DeployResult<()> {
        let environment = format_cdk_environment(&target.account, &target.region);
        self.transition(Phase::BootstrapConfirm);
        let decision = if self.options.auto_confirm_bootstrap {
            BootstrapDecision::Confirm
        } else {
            self.deps.prompt.confirm_bootstrap(&environment).await?
        };
        if decision == BootstrapDecision::Skip {
            return Err(DeployError::BootstrapRequired { environment });
        }
        self.transition(Phase::Bootstrapping);
        session.bootstrap(&environment).await
    }

    async fn persist_state(
        &self,
        plan: &Plan,
        stack_name: &str,
        outputs: &StackOutputs,
    ) -> DeployResult<DeployedState> {
        let agent_names: Vec<&str> = plan.project.agents.iter().map(|a| a.name.as_str()).collect();
        let agents = parse_agent_outputs(outputs, stack_name, &agent_names);
        let agent_count = agents.len();

        let existing = read_existing_state(self.deps.store.as_ref()).await?;
        let kms = existing
            .as_ref()
            .and_then(|s| s.target(&plan.target.name))
            .and_then(|t| t.resources.identity_kms_key_arn.clone());
        let state = build_deployed_state(
            &plan.target.name,
            stack_name,
            agents,
            existing.as_ref(),
            kms.as_deref(),
        );
        self.deps.store.write_deployed_state(&state).await?;
        obs::emit_state_persisted(&plan.target.name, stack_name, agent_count);
        Ok(state)
    }

    // -- run bookkeeping -----------------------------------------------------

    fn begin(&mut self, operation: &'static str) -> Run {
        let id = uuid::Uuid::new_v4().to_string();
        self.run_id = id.clone();
        self.phase = Phase::Idle;
        self.history = vec![Phase::Idle];
        Run {
            span: obs::deploy_span(&id, operation),
            audit: AuditTrail::attach(&self.events),
            started: Instant::now(),
            operation,
            id,
        }
    }

    fn open_session(&self) -> DeployResult<SessionGuard> {
        let host = Arc::new(self.events.clone());
        Ok(SessionGuard::new(self.deps.toolkit.open(host)?))
    }

    fn transition(&mut self, to: Phase) {
        obs::emit_phase(&self.run_id, self.phase.as_str(), to.as_str());
        self.phase = to;
        self.history.push(to);
    }

    async fn finish(&mut self, run: &mut Run, guard: &mut SessionGuard) {
        self.transition(Phase::Complete);
        self.events.set_verbose(false);
        if let Err(e) = guard.dispose().await {
            warn!(error = %e, "toolkit dispose failed");
        }
        obs::emit_deploy_finished(&run.id, run.operation, elapsed_ms(run), true);
    }

    /// Enter `error`, release the session and attach the audit trail.
    async fn fail(
        &mut self,
        run: &mut Run,
        guard: Option<&mut SessionGuard>,
        error: DeployError,
    ) -> DeployError {
        self.transition(Phase::Error);
        self.events.set_verbose(false);
        if let Some(guard) = guard {
            if let Err(e) = guard.dispose().await {
                warn!(error = %e, "toolkit dispose failed");
            }
        }
        let audit = run.audit.lines().to_vec();
        self.persist_audit(run).await;
        obs::emit_deploy_finished(&run.id, run.operation, elapsed_ms(run), false);
        error.with_audit(audit)
    }

    async fn persist_audit(&self, run: &mut Run) -> Option<PathBuf> {
        let dir = self.options.log_dir.as_ref()?;
        match run.audit.persist(dir, run.operation).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "could not write audit log");
                None
            }
        }
    }
}

fn elapsed_ms(run: &Run) -> u64 {
    run.started.elapsed().as_millis() as u64
}

/// Fill in stacks the deploy call did not report from I5900 messages.
fn merge_result_messages(
    results: &mut BTreeMap<String, StackDeployResult>,
    messages: &[DeployMessage],
) {
    for message in messages {
        let (Some(outputs), Some(arn)) = (&message.outputs, &message.stack_arn) else {
            continue;
        };
        let Some(stack_name) = parse_stack_name_from_arn(arn) else {
            continue;
        };
        results
            .entry(stack_name.to_string())
            .or_insert_with(|| StackDeployResult {
                outputs: outputs.clone(),
                stack_arn: Some(arn.clone()),
            });
    }
}
