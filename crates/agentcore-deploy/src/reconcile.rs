//! StateReconciler: scoped merge of freshly observed resources into the
//! deployed-state document.

use std::collections::BTreeMap;

use agentcore_state::{
    AgentResourceState, ConfigStore, DeployedResourceState, DeployedState, StateError, TargetState,
};

use crate::error::DeployResult;

/// The stored deployed state to merge into, or `None` when there is none yet.
///
/// Any other read failure is returned: merging into an empty document would
/// drop every sibling target, so an unreadable or orphaned state file has to
/// be fixed by the caller first.
pub async fn read_existing_state(store: &dyn ConfigStore) -> DeployResult<Option<DeployedState>> {
    match store.read_deployed_state().await {
        Ok(state) => Ok(Some(state)),
        Err(StateError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace `target_name` wholesale and copy every other target verbatim.
///
/// The named target is always present in the result, even with no agents,
/// so "deployed with zero agents" stays distinguishable from "never deployed".
pub fn build_deployed_state(
    target_name: &str,
    stack_name: &str,
    agents: BTreeMap<String, AgentResourceState>,
    existing: Option<&DeployedState>,
    identity_kms_key_arn: Option<&str>,
) -> DeployedState {
    let mut state = existing.cloned().unwrap_or_default();
    state.targets.insert(
        target_name.to_string(),
        TargetState {
            resources: DeployedResourceState {
                agents,
                stack_name: Some(stack_name.to_string()),
                identity_kms_key_arn: identity_kms_key_arn.map(str::to_string),
            },
        },
    );
    state
}
