//! In-memory fake for [`ConfigStore`] (testing only)
//!
//! Applies the same validation and not-found rules as the filesystem store
//! so contract tests can run against either.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::deployed::DeployedState;
use crate::error::StateError;
use crate::schema::{validate_targets, DeploymentTarget, ProjectSpec};
use crate::store::{
    ensure_valid, target_names, ConfigStore, StateResult, PROJECT_FILE_TYPE, STATE_FILE_TYPE,
    TARGETS_FILE_TYPE,
};

#[derive(Debug, Default)]
struct Documents {
    project: Option<ProjectSpec>,
    targets: Option<Vec<DeploymentTarget>>,
    state: Option<DeployedState>,
}

/// Config store holding each document in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    docs: Mutex<Documents>,
    state_writes: Mutex<u32>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a project and its targets.
    pub fn with_documents(project: ProjectSpec, targets: Vec<DeploymentTarget>) -> Self {
        let store = Self::default();
        {
            let mut docs = store.lock();
            docs.project = Some(project);
            docs.targets = Some(targets);
        }
        store
    }

    /// Seed deployed state without validation, e.g. to model orphaned targets.
    pub fn seed_deployed_state(&self, state: DeployedState) {
        self.lock().state = Some(state);
    }

    /// Current deployed state, bypassing validation.
    pub fn deployed_state(&self) -> Option<DeployedState> {
        self.lock().state.clone()
    }

    /// Number of successful `write_deployed_state` calls.
    pub fn state_writes(&self) -> u32 {
        *self
            .state_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, Documents> {
        self.docs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn not_found(file: &str, file_type: &str) -> StateError {
        StateError::NotFound {
            path: PathBuf::from(file),
            file_type: file_type.to_string(),
        }
    }

    fn current_targets(&self) -> StateResult<Vec<DeploymentTarget>> {
        self.lock()
            .targets
            .clone()
            .ok_or_else(|| Self::not_found("aws-targets.json", TARGETS_FILE_TYPE))
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn read_project_spec(&self) -> StateResult<ProjectSpec> {
        self.lock()
            .project
            .clone()
            .ok_or_else(|| Self::not_found("agentcore.json", PROJECT_FILE_TYPE))
    }

    async fn write_project_spec(&self, spec: &ProjectSpec) -> StateResult<()> {
        ensure_valid("agentcore.json", PROJECT_FILE_TYPE, spec.validate())?;
        self.lock().project = Some(spec.clone());
        Ok(())
    }

    async fn read_deployment_targets(&self) -> StateResult<Vec<DeploymentTarget>> {
        self.current_targets()
    }

    async fn write_deployment_targets(&self, targets: &[DeploymentTarget]) -> StateResult<()> {
        ensure_valid("aws-targets.json", TARGETS_FILE_TYPE, validate_targets(targets))?;
        self.lock().targets = Some(targets.to_vec());
        Ok(())
    }

    async fn read_deployed_state(&self) -> StateResult<DeployedState> {
        let targets = self.current_targets()?;
        let state = self
            .lock()
            .state
            .clone()
            .ok_or_else(|| Self::not_found("deployed-state.json", STATE_FILE_TYPE))?;
        ensure_valid(
            "deployed-state.json",
            STATE_FILE_TYPE,
            state.check_targets(&target_names(&targets)),
        )?;
        Ok(state)
    }

    async fn write_deployed_state(&self, state: &DeployedState) -> StateResult<()> {
        let targets = self.current_targets()?;
        ensure_valid(
            "deployed-state.json",
            STATE_FILE_TYPE,
            state.check_targets(&target_names(&targets)),
        )?;
        self.lock().state = Some(state.clone());
        *self
            .state_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}
