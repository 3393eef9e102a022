//! Python packager: installs dependencies with `uv` against an ordered list
//! of platform candidates, falling back on platform-incompatibility failures.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use agentcore_state::{AgentSpec, Language, RuntimeVersion};

use super::{
    check_spec, ensure_file, ensure_tool, offload, resolve_project_paths, seal_artifact,
    stage_sources, PackageOptions, ProjectPaths,
};
use crate::archive::{ArchiveBuilder, ArtifactResult};
use crate::error::{PackageError, PackageResult, UV_INSTALL_HINT};
use crate::obs;
use crate::platform::{detect_unavailable_platform, platform_candidates};
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner};
use crate::shebang::rewrite_script_shebangs;

/// `PYTHON_3_12` -> `3.12`
pub fn extract_python_version(runtime: &RuntimeVersion) -> PackageResult<String> {
    let raw = runtime.as_str();
    let rest = raw.strip_prefix("PYTHON_").ok_or_else(|| {
        PackageError::UnsupportedRuntime(format!("Unsupported Python runtime value: {raw}"))
    })?;
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    match rest.split_once('_') {
        Some((major, minor)) if numeric(major) && numeric(minor) => Ok(format!("{major}.{minor}")),
        _ => Err(PackageError::UnsupportedRuntime(format!(
            "Invalid Python runtime value: {raw}"
        ))),
    }
}

#[derive(Clone)]
pub struct PythonPackager {
    runner: Arc<dyn ProcessRunner>,
    archive: ArchiveBuilder,
}

/// Everything decided before the first filesystem write.
struct Plan {
    paths: ProjectPaths,
    python_version: String,
    pyproject: PathBuf,
    candidates: Vec<String>,
    options: PackageOptions,
}

impl Plan {
    fn install_command(&self, platform: &str) -> CommandSpec {
        CommandSpec::new("uv")
            .args(["pip", "install", "--no-config", "--target"])
            .arg(self.paths.staging_dir.display().to_string())
            .args(["--python-version", self.python_version.as_str()])
            .args(["--python-platform", platform])
            .args(["--only-binary", ":all:", "--upgrade", "-r"])
            .arg(self.pyproject.display().to_string())
            .cwd(&self.paths.code_dir)
            .timeout(self.options.install_timeout())
    }

    /// Decide what one finished install attempt means for the loop.
    fn judge(
        &self,
        platform: &str,
        output: &ProcessOutput,
        last_error: &mut Option<String>,
    ) -> ControlFlow<PackageResult<()>> {
        if output.success() {
            return ControlFlow::Break(Ok(()));
        }
        match detect_unavailable_platform(&output.stdout, &output.stderr) {
            Some(issue) => {
                obs::emit_platform_fallback(&self.paths.agent_name, platform, &issue.message);
                *last_error = Some(issue.message);
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(Err(PackageError::InstallFailed {
                tool: "uv".to_string(),
                detail: output
                    .failure_detail(|| format!("uv pip install failed with exit code {}", output.code)),
            })),
        }
    }

    fn exhausted(&self, last_error: Option<String>) -> PackageError {
        PackageError::PlatformInstallFailure {
            candidates: self.candidates.clone(),
            last_error: last_error.unwrap_or_else(|| "no platform candidates".to_string()),
        }
    }
}

impl PythonPackager {
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

    fn plan(&self, agent: &AgentSpec, options: &PackageOptions) -> PackageResult<Plan> {
        check_spec(agent, Language::Python)?;
        let python_version = extract_python_version(&agent.runtime_version)?;
        let paths = resolve_project_paths(agent, options)?;
        ensure_tool(self.runner.as_ref(), "uv", UV_INSTALL_HINT)?;
        let pyproject = options
            .pyproject_path
            .clone()
            .unwrap_or_else(|| paths.code_dir.join("pyproject.toml"));
        ensure_file(&pyproject)?;

        Ok(Plan {
            paths,
            python_version,
            pyproject,
            candidates: platform_candidates(options.python_platform.as_deref()),
            options: options.clone(),
        })
    }

    pub async fn pack(
        &self,
        agent: &AgentSpec,
        options: &PackageOptions,
    ) -> PackageResult<ArtifactResult> {
        let plan = self.plan(agent, options)?;

        let (archive, paths) = (self.archive, plan.paths.clone());
        offload(move || stage_sources(&archive, &paths)).await?;

        let mut last_error = None;
        let mut installed = None;
        for (i, platform) in plan.candidates.iter().enumerate() {
            obs::emit_install_attempt(&plan.paths.agent_name, "uv", platform, i + 1);
            let output = self.runner.run(&plan.install_command(platform)).await?;
            if let ControlFlow::Break(done) = plan.judge(platform, &output, &mut last_error) {
                installed = Some(done);
                break;
            }
        }
        installed.unwrap_or_else(|| Err(plan.exhausted(last_error)))?;

        let (archive, paths) = (self.archive, plan.paths.clone());
        offload(move || {
            rewrite_script_shebangs(&paths.staging_dir)?;
            seal_artifact(&archive, &paths)
        })
        .await
    }

    pub fn pack_blocking(
        &self,
        agent: &AgentSpec,
        options: &PackageOptions,
    ) -> PackageResult<ArtifactResult> {
        let plan = self.plan(agent, options)?;
        stage_sources(&self.archive, &plan.paths)?;

        let mut last_error = None;
        let mut installed = None;
        for (i, platform) in plan.candidates.iter().enumerate() {
            obs::emit_install_attempt(&plan.paths.agent_name, "uv", platform, i + 1);
            let output = self.runner.run_blocking(&plan.install_command(platform))?;
            if let ControlFlow::Break(done) = plan.judge(platform, &output, &mut last_error) {
                installed = Some(done);
                break;
            }
        }
        installed.unwrap_or_else(|| Err(plan.exhausted(last_error)))?;

        rewrite_script_shebangs(&plan.paths.staging_dir)?;
        seal_artifact(&self.archive, &plan.paths)
    }
}
