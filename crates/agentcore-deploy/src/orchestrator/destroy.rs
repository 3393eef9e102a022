//! Destroy flow: locate the target's stack, destroy exactly that stack,
//! then drop the target from deployed state as a best-effort follow-up.

use agentcore_state::StateError;
use serde::Serialize;
use tracing::Instrument;

use super::{DeploymentOrchestrator, Phase};
use crate::error::{DeployError, DeployResult};
use crate::obs;
use crate::session::SessionGuard;
use crate::toolkit::StackSelection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyedStack {
    pub stack_name: String,
    pub target_name: String,
}

/// What happened to local bookkeeping after the stack was destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum CleanupOutcome {
    Removed,
    /// Deployed state had no entry for the target (or no state file).
    NotTracked,
    Failed(String),
}

/// A successful destroy. `cleanup` never turns the primary result into a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyOutcome {
    pub primary: DestroyedStack,
    pub cleanup: CleanupOutcome,
}

impl DeploymentOrchestrator {
    pub async fn destroy(&mut self) -> DeployResult<DestroyOutcome> {
        let mut run = self.begin("destroy");
        let mut guard = match self.open_session() {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(&mut run, None, e).await),
        };
        let span = run.span.clone();
        match self.destroy_steps(&guard, &run.id).instrument(span).await {
            Ok(outcome) => {
                self.finish(&mut run, &mut guard).await;
                self.persist_audit(&mut run).await;
                Ok(outcome)
            }
            Err(e) => Err(self.fail(&mut run, Some(&mut guard), e).await),
        }
    }

    async fn destroy_steps(
        &mut self,
        guard: &SessionGuard,
        run_id: &str,
    ) -> DeployResult<DestroyOutcome> {
        let (project, target) = self.preflight(run_id, "destroy").await?;

        let stack = self
            .deps
            .locator
            .find_stack(&target.region, &project.name, &target.name)
            .await?
            .ok_or_else(|| DeployError::NoDeployedStack {
                project: project.name.clone(),
                target: target.name.clone(),
            })?;

        self.transition(Phase::Destroying);
        self.events.set_verbose(true);
        guard
            .session()?
            .destroy(&StackSelection::exact(&stack.stack_name))
            .await?;

        let cleanup = self.remove_target_state(&target.name).await;
        Ok(DestroyOutcome {
            primary: DestroyedStack {
                stack_name: stack.stack_name,
                target_name: target.name,
            },
            cleanup,
        })
    }

    async fn remove_target_state(&self, target_name: &str) -> CleanupOutcome {
        let state = match self.deps.store.read_deployed_state().await {
            Ok(state) => state,
            Err(StateError::NotFound { .. }) => return CleanupOutcome::NotTracked,
            Err(e) => {
                obs::emit_destroy_cleanup_failed(target_name, &e);
                return CleanupOutcome::Failed(e.to_string());
            }
        };
        if state.target(target_name).is_none() {
            return CleanupOutcome::NotTracked;
        }
        match self
            .deps
            .store
            .write_deployed_state(&state.without_target(target_name))
            .await
        {
            Ok(()) => CleanupOutcome::Removed,
            Err(e) => {
                obs::emit_destroy_cleanup_failed(target_name, &e);
                CleanupOutcome::Failed(e.to_string())
            }
        }
    }
}
