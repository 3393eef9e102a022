//! The Renderer seam: produces the CDK app and agent sources to package.

use std::path::PathBuf;

use agentcore_state::ProjectSpec;
use async_trait::async_trait;
use tracing::debug;

use crate::error::{DeployError, DeployResult};

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Make the source tree for `project` ready on disk.
    async fn render(&self, project: &ProjectSpec) -> DeployResult<()>;
}

/// Uses a CDK project that is already on disk, failing if it is missing.
#[derive(Debug, Clone)]
pub struct PrebuiltSources {
    cdk_dir: PathBuf,
}

impl PrebuiltSources {
    pub fn new(cdk_dir: impl Into<PathBuf>) -> Self {
        Self {
            cdk_dir: cdk_dir.into(),
        }
    }
}

#[async_trait]
impl Renderer for PrebuiltSources {
    async fn render(&self, project: &ProjectSpec) -> DeployResult<()> {
        let exists = tokio::fs::try_exists(&self.cdk_dir)
            .await
            .map_err(|source| DeployError::Io {
                path: self.cdk_dir.clone(),
                source,
            })?;
        if !exists {
            return Err(DeployError::CdkProjectMissing(self.cdk_dir.clone()));
        }
        debug!(project = %project.name, cdk_dir = %self.cdk_dir.display(), "using prebuilt sources");
        Ok(())
    }
}
