//! The `ConfigStore` trait: typed access to the three project documents.
//!
//! Reads fail with [`StateError::NotFound`], [`StateError::Parse`] or
//! [`StateError::Validation`]. Writes validate before anything touches the
//! backing store. In-memory fakes live in [`crate::fakes`].

use async_trait::async_trait;

use crate::deployed::DeployedState;
use crate::error::StateError;
use crate::schema::{DeploymentTarget, ProjectSpec};

/// Result type for config store operations
pub type StateResult<T> = std::result::Result<T, StateError>;

pub const PROJECT_FILE_TYPE: &str = "AgentCore Project Config";
pub const TARGETS_FILE_TYPE: &str = "AWS Targets";
pub const STATE_FILE_TYPE: &str = "State";

/// Owner of the on-disk project documents.
///
/// Callers always receive owned copies and hand back whole documents; no
/// mutable handle to a stored document ever escapes the store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn read_project_spec(&self) -> StateResult<ProjectSpec>;

    async fn write_project_spec(&self, spec: &ProjectSpec) -> StateResult<()>;

    async fn read_deployment_targets(&self) -> StateResult<Vec<DeploymentTarget>>;

    async fn write_deployment_targets(&self, targets: &[DeploymentTarget]) -> StateResult<()>;

    /// Read deployed state, rejecting target keys absent from the target list.
    async fn read_deployed_state(&self) -> StateResult<DeployedState>;

    /// Validate against the current target list, then persist.
    async fn write_deployed_state(&self, state: &DeployedState) -> StateResult<()>;
}

/// Run a validator and wrap its issues in a typed error.
pub(crate) fn ensure_valid(
    path: impl Into<std::path::PathBuf>,
    file_type: &str,
    result: Result<(), Vec<String>>,
) -> StateResult<()> {
    result.map_err(|issues| StateError::Validation {
        path: path.into(),
        file_type: file_type.to_string(),
        issues,
    })
}

/// Names of the given targets, for referential checks.
pub(crate) fn target_names(targets: &[DeploymentTarget]) -> Vec<&str> {
    targets.iter().map(|t| t.name.as_str()).collect()
}
