//! Raw toolkit message log for one run.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{DeployError, DeployResult};
use crate::events::{EventFilter, RawMessage, Subscription};

/// Collects every raw toolkit message from the moment it is attached.
pub struct AuditTrail {
    subscription: Subscription<RawMessage>,
    lines: Vec<String>,
}

impl AuditTrail {
    pub fn attach(filter: &EventFilter) -> Self {
        Self {
            subscription: filter.subscribe_raw(),
            lines: Vec::new(),
        }
    }

    /// All lines seen so far, oldest first.
    pub fn lines(&mut self) -> &[String] {
        let fresh = self.subscription.drain();
        self.lines.extend(fresh.iter().map(RawMessage::line));
        &self.lines
    }

    /// Write the trail to `{dir}/{operation}-{timestamp}.log`.
    pub async fn persist(&mut self, dir: &Path, operation: &str) -> DeployResult<PathBuf> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| DeployError::Io { path, source }
        };
        tokio::fs::create_dir_all(dir).await.map_err(io(dir))?;
        let name = format!("{operation}-{}.log", Utc::now().format("%Y%m%d-%H%M%S%.3f"));
        let path = dir.join(name);
        let mut body = self.lines().join("\n");
        body.push('\n');
        tokio::fs::write(&path, body).await.map_err(io(&path))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::{IoHost, ToolkitMessage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn persists_lines_in_order() {
        let filter = EventFilter::new();
        let mut audit = AuditTrail::attach(&filter);
        filter.notify(ToolkitMessage::new("CDK_TOOLKIT_I1000", "info", "first"));
        filter.notify(ToolkitMessage::new("CDK_TOOLKIT_E5500", "error", "second"));

        let tmp = TempDir::new().unwrap();
        let path = audit.persist(&tmp.path().join("logs"), "deploy").await.unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body, "[CDK_TOOLKIT_I1000] first\n[CDK_TOOLKIT_E5500] second\n");
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("deploy-"));
    }
}
