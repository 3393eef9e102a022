//! Target selection and cloud-to-local state repair.

use agentcore_state::{ConfigStore, DeployedState, DeploymentTarget};
use serde::Serialize;
use tracing::warn;

use crate::cloudformation::{get_stack_outputs, StackStatusReader};
use crate::discovery::{DiscoveredStack, StackLocator};
use crate::error::{DeployError, DeployResult};
use crate::outputs::parse_agent_outputs;
use crate::reconcile::{build_deployed_state, read_existing_state};

/// The named target, or the first one when no name is given.
pub fn select_target<'a>(
    targets: &'a [DeploymentTarget],
    name: Option<&str>,
) -> DeployResult<&'a DeploymentTarget> {
    match name {
        Some(name) => targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| DeployError::TargetNotFound {
                name: name.to_string(),
                available: targets
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        None => targets.first().ok_or(DeployError::NoTargets),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedTarget {
    pub target: DeploymentTarget,
    pub stack: DiscoveredStack,
}

/// Configured targets that have a stack in the cloud. Lookup failures for
/// one target are logged and that target is skipped.
pub async fn discover_deployed_targets(
    store: &dyn ConfigStore,
    locator: &StackLocator,
) -> DeployResult<Vec<DeployedTarget>> {
    let project = store.read_project_spec().await?;
    let targets = store.read_deployment_targets().await?;

    let mut deployed = Vec::new();
    for target in targets {
        match locator
            .find_stack(&target.region, &project.name, &target.name)
            .await
        {
            Ok(Some(stack)) => deployed.push(DeployedTarget { target, stack }),
            Ok(None) => {}
            Err(e) => warn!(target = %target.name, error = %e, "stack lookup failed"),
        }
    }
    Ok(deployed)
}

/// Rebuild one target's deployed state from its live stack outputs.
///
/// Returns `None` when the target has no stack. Other targets in the stored
/// state are kept as they are; stored state that fails to read or validate is
/// an error and nothing is written.
pub async fn refresh_target_state(
    store: &dyn ConfigStore,
    locator: &StackLocator,
    stacks: &dyn StackStatusReader,
    target_name: &str,
) -> DeployResult<Option<DeployedState>> {
    let project = store.read_project_spec().await?;
    let targets = store.read_deployment_targets().await?;
    let target = select_target(&targets, Some(target_name))?;

    let Some(stack) = locator
        .find_stack(&target.region, &project.name, &target.name)
        .await?
    else {
        return Ok(None);
    };

    let outputs = get_stack_outputs(stacks, &target.region, &stack.stack_name).await?;
    let agent_names: Vec<&str> = project.agents.iter().map(|a| a.name.as_str()).collect();
    let agents = parse_agent_outputs(&outputs, &stack.stack_name, &agent_names);

    let existing = read_existing_state(store).await?;
    let kms = existing
        .as_ref()
        .and_then(|s| s.target(target_name))
        .and_then(|t| t.resources.identity_kms_key_arn.clone());
    let state = build_deployed_state(
        target_name,
        &stack.stack_name,
        agents,
        existing.as_ref(),
        kms.as_deref(),
    );
    store.write_deployed_state(&state).await?;
    Ok(Some(state))
}
