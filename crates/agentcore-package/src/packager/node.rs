//! Node packager: production dependencies via `npm install --omit=dev`.

use std::sync::Arc;

use agentcore_state::{AgentSpec, Language, RuntimeVersion};

use super::{
    check_spec, ensure_file, ensure_tool, offload, resolve_project_paths, seal_artifact,
    stage_sources, PackageOptions, ProjectPaths,
};
use crate::archive::{ArchiveBuilder, ArtifactResult};
use crate::error::{PackageError, PackageResult, NPM_INSTALL_HINT};
use crate::obs;
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner};

/// `NODE_20` -> `20`
pub fn extract_node_version(runtime: &RuntimeVersion) -> PackageResult<String> {
    let raw = runtime.as_str();
    let major = raw.strip_prefix("NODE_").ok_or_else(|| {
        PackageError::UnsupportedRuntime(format!("Unsupported Node runtime value: {raw}"))
    })?;
    if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
        return Err(PackageError::UnsupportedRuntime(format!(
            "Invalid Node runtime value: {raw}"
        )));
    }
    Ok(major.to_string())
}

#[derive(Clone)]
pub struct NodePackager {
    runner: Arc<dyn ProcessRunner>,
    archive: ArchiveBuilder,
}

fn install_command(paths: &ProjectPaths, options: &PackageOptions) -> CommandSpec {
    CommandSpec::new("npm")
        .args(["install", "--omit=dev", "--prefix"])
        .arg(paths.staging_dir.display().to_string())
        .cwd(&paths.src_dir)
        .timeout(options.install_timeout())
}

fn judge(output: &ProcessOutput) -> PackageResult<()> {
    if output.success() {
        return Ok(());
    }
    Err(PackageError::InstallFailed {
        tool: "npm".to_string(),
        detail: output
            .failure_detail(|| format!("npm install failed with exit code {}", output.code)),
    })
}

impl NodePackager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            archive: ArchiveBuilder::new(),
        }
    }

    pub fn with_archive(mut self, archive: ArchiveBuilder) -> Self {
        self.archive = archive;
        self
    }

    fn plan(&self, agent: &AgentSpec, options: &PackageOptions) -> PackageResult<ProjectPaths> {
        check_spec(agent, Language::Node)?;
        extract_node_version(&agent.runtime_version)?;
        let paths = resolve_project_paths(agent, options)?;
        ensure_tool(self.runner.as_ref(), "npm", NPM_INSTALL_HINT)?;
        ensure_file(&paths.src_dir.join("package.json"))?;
        Ok(paths)
    }

    pub async fn pack(
        &self,
        agent: &AgentSpec,
        options: &PackageOptions,
    ) -> PackageResult<ArtifactResult> {
        let paths = self.plan(agent, options)?;

        let (archive, staged) = (self.archive, paths.clone());
        offload(move || stage_sources(&archive, &staged)).await?;

        obs::emit_install_attempt(&paths.agent_name, "npm", "-", 1);
        let output = self.runner.run(&install_command(&paths, options)).await?;
        judge(&output)?;

        let archive = self.archive;
        offload(move || seal_artifact(&archive, &paths)).await
    }

    pub fn pack_blocking(
        &self,
        agent: &AgentSpec,
        options: &PackageOptions,
    ) -> PackageResult<ArtifactResult> {
        let paths = self.plan(agent, options)?;
        stage_sources(&self.archive, &paths)?;

        obs::emit_install_attempt(&paths.agent_name, "npm", "-", 1);
        let output = self.runner.run_blocking(&install_command(&paths, options))?;
        judge(&output)?;

        seal_artifact(&self.archive, &paths)
    }
}
