//! Project layout on disk.
//!
//! ```text
//! <project root>/
//!   agentcore/
//!     agentcore.json
//!     aws-targets.json
//!     deployed-state.json
//!     cdk/
//!     .cli/logs/
//!   .agentcore/artifacts/
//! ```

use std::path::{Path, PathBuf};

use crate::error::StateError;

/// Name of the config directory at the project root.
pub const CONFIG_DIR: &str = "agentcore";
pub const PROJECT_FILE: &str = "agentcore.json";
pub const TARGETS_FILE: &str = "aws-targets.json";
pub const DEPLOYED_STATE_FILE: &str = "deployed-state.json";
/// CLI-private directory inside the config dir.
pub const CLI_SYSTEM_DIR: &str = ".cli";
pub const CLI_LOGS_DIR: &str = "logs";
pub const CDK_DIR: &str = "cdk";
/// Build output directory at the project root.
pub const BUILD_DIR: &str = ".agentcore";

/// Resolves every well-known path from the config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    config_root: PathBuf,
}

impl PathResolver {
    /// `config_root` is the `agentcore/` directory itself.
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
        }
    }

    /// Resolver for a project root (the parent of `agentcore/`).
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self::new(project_root.as_ref().join(CONFIG_DIR))
    }

    /// Find the nearest project at or above `start`.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, StateError> {
        find_config_root(start.as_ref())
            .map(Self::new)
            .ok_or(StateError::NoProject)
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    pub fn project_root(&self) -> PathBuf {
        self.config_root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config_root.clone())
    }

    pub fn project_file(&self) -> PathBuf {
        self.config_root.join(PROJECT_FILE)
    }

    pub fn targets_file(&self) -> PathBuf {
        self.config_root.join(TARGETS_FILE)
    }

    pub fn deployed_state_file(&self) -> PathBuf {
        self.config_root.join(DEPLOYED_STATE_FILE)
    }

    pub fn cdk_project_dir(&self) -> PathBuf {
        self.config_root.join(CDK_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.config_root.join(CLI_SYSTEM_DIR).join(CLI_LOGS_DIR)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.project_root().join(BUILD_DIR).join("artifacts")
    }
}

/// Walk up from `start` looking for a directory containing `agentcore/agentcore.json`.
///
/// Returns the `agentcore/` path, or `None` once the filesystem root is passed.
pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_DIR))
        .find(|candidate| candidate.join(PROJECT_FILE).is_file())
}
