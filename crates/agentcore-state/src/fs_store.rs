//! Filesystem-backed [`ConfigStore`] rooted at a project's `agentcore/` directory.

use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::deployed::DeployedState;
use crate::error::StateError;
use crate::paths::PathResolver;
use crate::schema::{validate_targets, DeploymentTarget, ProjectSpec};
use crate::store::{
    ensure_valid, target_names, ConfigStore, StateResult, PROJECT_FILE_TYPE, STATE_FILE_TYPE,
    TARGETS_FILE_TYPE,
};

/// JSON files under `agentcore/`, pretty-printed on write.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    paths: PathResolver,
}

impl FsConfigStore {
    pub fn new(paths: PathResolver) -> Self {
        Self { paths }
    }

    /// Store for the project found at or above `start`.
    pub fn discover(start: impl AsRef<Path>) -> StateResult<Self> {
        PathResolver::discover(start).map(Self::new)
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Whether the deployed-state file has been written yet.
    pub fn has_deployed_state(&self) -> bool {
        self.paths.deployed_state_file().is_file()
    }

    async fn read_json<T: DeserializeOwned>(path: &Path, file_type: &str) -> StateResult<T> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound {
                    path: path.to_path_buf(),
                    file_type: file_type.to_string(),
                })
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> StateResult<()> {
        let write_err = |reason: String| StateError::Write {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| write_err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(value).map_err(|e| write_err(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| write_err(e.to_string()))?;
        debug!(path = %path.display(), "config written");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FsConfigStore {
    async fn read_project_spec(&self) -> StateResult<ProjectSpec> {
        let path = self.paths.project_file();
        let spec: ProjectSpec = Self::read_json(&path, PROJECT_FILE_TYPE).await?;
        ensure_valid(&path, PROJECT_FILE_TYPE, spec.validate())?;
        Ok(spec)
    }

    async fn write_project_spec(&self, spec: &ProjectSpec) -> StateResult<()> {
        let path = self.paths.project_file();
        ensure_valid(&path, PROJECT_FILE_TYPE, spec.validate())?;
        Self::write_json(&path, spec).await
    }

    async fn read_deployment_targets(&self) -> StateResult<Vec<DeploymentTarget>> {
        let path = self.paths.targets_file();
        let targets: Vec<DeploymentTarget> = Self::read_json(&path, TARGETS_FILE_TYPE).await?;
        ensure_valid(&path, TARGETS_FILE_TYPE, validate_targets(&targets))?;
        Ok(targets)
    }

    async fn write_deployment_targets(&self, targets: &[DeploymentTarget]) -> StateResult<()> {
        let path = self.paths.targets_file();
        ensure_valid(&path, TARGETS_FILE_TYPE, validate_targets(targets))?;
        Self::write_json(&path, &targets).await
    }

    async fn read_deployed_state(&self) -> StateResult<DeployedState> {
        let targets = self.read_deployment_targets().await?;
        let path = self.paths.deployed_state_file();
        let state: DeployedState = Self::read_json(&path, STATE_FILE_TYPE).await?;
        ensure_valid(
            &path,
            STATE_FILE_TYPE,
            state.check_targets(&target_names(&targets)),
        )?;
        Ok(state)
    }

    async fn write_deployed_state(&self, state: &DeployedState) -> StateResult<()> {
        let targets = self.read_deployment_targets().await?;
        let path = self.paths.deployed_state_file();
        ensure_valid(
            &path,
            STATE_FILE_TYPE,
            state.check_targets(&target_names(&targets)),
        )?;
        Self::write_json(&path, state).await
    }
}
