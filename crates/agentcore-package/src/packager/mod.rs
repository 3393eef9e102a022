//! Runtime packagers.
//!
//! A closed set of packagers, one per language family, chosen by
//! [`select_packager`]. Both variants share staging and archiving and differ
//! only in how dependencies get installed into the staging tree.
//!
//! Every packager offers an awaited [`Packager::pack`] and a blocking
//! [`Packager::pack_blocking`]; for identical inputs they produce identical
//! [`ArtifactResult`]s.

pub mod node;
pub mod python;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use agentcore_state::paths::BUILD_DIR;
use agentcore_state::{AgentSpec, BuildKind, Language, ProjectSpec};
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveBuilder, ArtifactResult};
use crate::error::{PackageError, PackageResult};
use crate::process::ProcessRunner;

pub use node::{extract_node_version, NodePackager};
pub use python::{extract_python_version, PythonPackager};

/// Caller overrides for packaging. Unset fields follow project convention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageOptions {
    /// Project root; defaults to the current directory.
    pub project_root: Option<PathBuf>,
    /// Source directory; defaults to `<projectRoot>/<codeLocation>`.
    pub src_dir: Option<PathBuf>,
    /// Python project file; defaults to `<codeDir>/pyproject.toml`.
    pub pyproject_path: Option<PathBuf>,
    /// Artifact base directory; defaults to `<projectRoot>/.agentcore/artifacts`.
    pub artifact_dir: Option<PathBuf>,
    /// Platform tag tried before the default candidates.
    pub python_platform: Option<String>,
    /// Name used for artifact naming and staging isolation.
    pub agent_name: Option<String>,
    /// Write the zip exactly here instead of `<artifactDir>/<agent>.zip`.
    pub output_path: Option<PathBuf>,
    /// Kill the installer after this many seconds.
    pub install_timeout_secs: Option<u64>,
}

impl PackageOptions {
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: Some(root.into()),
            ..Default::default()
        }
    }

    pub(crate) fn install_timeout(&self) -> Option<Duration> {
        self.install_timeout_secs.map(Duration::from_secs)
    }
}

/// Fully resolved locations for one pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub agent_name: String,
    pub project_root: PathBuf,
    /// The agent's own directory; installers run here.
    pub code_dir: PathBuf,
    pub src_dir: PathBuf,
    /// Scoped by agent name so packs for different agents never collide.
    pub staging_dir: PathBuf,
    pub artifact_path: PathBuf,
}

/// `<name>.zip`
pub fn artifact_zip_name(name: &str) -> String {
    format!("{name}.zip")
}

pub fn resolve_project_paths(
    agent: &AgentSpec,
    options: &PackageOptions,
) -> PackageResult<ProjectPaths> {
    let project_root = match &options.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().map_err(|e| PackageError::io(".", e))?,
    };
    let agent_name = options
        .agent_name
        .clone()
        .unwrap_or_else(|| agent.name.clone());
    let code_dir = project_root.join(&agent.code_location);
    let src_dir = options.src_dir.clone().unwrap_or_else(|| code_dir.clone());
    let artifacts_dir = options
        .artifact_dir
        .clone()
        .unwrap_or_else(|| project_root.join(BUILD_DIR).join("artifacts"));
    let staging_dir = artifacts_dir.join("staging").join(&agent_name);
    let artifact_path = options
        .output_path
        .clone()
        .unwrap_or_else(|| artifacts_dir.join(artifact_zip_name(&agent_name)));

    Ok(ProjectPaths {
        agent_name,
        project_root,
        code_dir,
        src_dir,
        staging_dir,
        artifact_path,
    })
}

/// Reject specs this packager variant cannot handle.
pub(crate) fn check_spec(agent: &AgentSpec, language: Language) -> PackageResult<()> {
    if agent.build != BuildKind::CodeZip {
        return Err(PackageError::UnsupportedBuildKind {
            language,
            build: agent.build,
        });
    }
    if agent.runtime_version.language() != Some(language) {
        return Err(PackageError::RuntimeMismatch {
            language,
            runtime: agent.runtime_version.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_tool(runner: &dyn ProcessRunner, binary: &str, hint: &str) -> PackageResult<()> {
    match runner.locate(binary) {
        Some(_) => Ok(()),
        None => Err(PackageError::MissingDependencyTool {
            binary: binary.to_string(),
            hint: hint.to_string(),
        }),
    }
}

pub(crate) fn ensure_file(path: &Path) -> PackageResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PackageError::MissingProjectFile {
            path: path.to_path_buf(),
        })
    }
}

/// Wipe staging and copy the source tree into it.
pub(crate) fn stage_sources(archive: &ArchiveBuilder, paths: &ProjectPaths) -> PackageResult<()> {
    archive.reset_dir(&paths.staging_dir)?;
    archive.copy_tree(&paths.src_dir, &paths.staging_dir)?;
    Ok(())
}

/// Zip staging and measure.
pub(crate) fn seal_artifact(
    archive: &ArchiveBuilder,
    paths: &ProjectPaths,
) -> PackageResult<ArtifactResult> {
    let result = archive.build(&paths.staging_dir, &paths.artifact_path)?;
    crate::obs::emit_artifact_packed(
        &paths.agent_name,
        &result.artifact_path.display().to_string(),
        result.size_bytes,
        &result.sha256,
    );
    Ok(result)
}

/// Run blocking filesystem work off the async executor.
pub(crate) async fn offload<T, F>(work: F) -> PackageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> PackageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PackageError::Join(e.to_string()))?
}

/// One of the supported packagers.
#[derive(Clone)]
pub enum Packager {
    Python(PythonPackager),
    Node(NodePackager),
}

impl std::fmt::Debug for Packager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Packager::{}", self.language())
    }
}

impl Packager {
    pub fn language(&self) -> Language {
        match self {
            Packager::Python(_) => Language::Python,
            Packager::Node(_) => Language::Node,
        }
    }

    pub async fn pack(
        &self,
        agent: &AgentSpec,
        options: &PackageOptions,
    ) -> PackageResult<ArtifactResult> {
        match self {
            Packager::Python(p) => p.pack(agent, options).await,
            Packager::Node(p) => p.pack(agent, options).await,
        }
    }

    pub fn pack_blocking(
        &self,
        agent: &AgentSpec,
        options: &PackageOptions,
    ) -> PackageResult<ArtifactResult> {
        match self {
            Packager::Python(p) => p.pack_blocking(agent, options),
            Packager::Node(p) => p.pack_blocking(agent, options),
        }
    }
}

/// Pick the packager for an agent's build kind and language.
pub fn select_packager(
    agent: &AgentSpec,
    runner: Arc<dyn ProcessRunner>,
) -> PackageResult<Packager> {
    if agent.build != BuildKind::CodeZip {
        return Err(PackageError::UnsupportedBuildKind {
            language: agent.target_language,
            build: agent.build,
        });
    }
    Ok(match agent.target_language {
        Language::Python => Packager::Python(PythonPackager::new(runner)),
        Language::Node => Packager::Node(NodePackager::new(runner)),
    })
}

pub async fn pack_runtime(
    agent: &AgentSpec,
    options: &PackageOptions,
    runner: Arc<dyn ProcessRunner>,
) -> PackageResult<ArtifactResult> {
    select_packager(agent, runner)?.pack(agent, options).await
}

pub fn pack_runtime_blocking(
    agent: &AgentSpec,
    options: &PackageOptions,
    runner: Arc<dyn ProcessRunner>,
) -> PackageResult<ArtifactResult> {
    select_packager(agent, runner)?.pack_blocking(agent, options)
}

/// Look up an agent by name, listing the available names when absent.
pub fn validate_agent_exists<'a>(
    project: &'a ProjectSpec,
    name: &str,
) -> PackageResult<&'a AgentSpec> {
    project.agent(name).ok_or_else(|| PackageError::AgentNotFound {
        name: name.to_string(),
        available: project
            .agents
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Pack every CodeZip agent in the project, one after another.
///
/// Per-agent `agentName` and `outputPath` overrides are cleared so each
/// agent gets its own staging directory and artifact.
pub async fn pack_all(
    project: &ProjectSpec,
    options: &PackageOptions,
    runner: Arc<dyn ProcessRunner>,
) -> PackageResult<Vec<(String, ArtifactResult)>> {
    let mut results = Vec::new();
    for agent in project
        .agents
        .iter()
        .filter(|a| a.build == BuildKind::CodeZip)
    {
        let per_agent = PackageOptions {
            agent_name: None,
            output_path: None,
            ..options.clone()
        };
        let artifact = pack_runtime(agent, &per_agent, runner.clone()).await?;
        results.push((agent.name.clone(), artifact));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedProcessRunner;
    use agentcore_state::{NetworkMode, RuntimeVersion};

    fn agent(language: Language, runtime: &str, build: BuildKind) -> AgentSpec {
        AgentSpec {
            name: "Main".to_string(),
            build,
            target_language: language,
            entrypoint: "main.py".to_string(),
            code_location: "app/Main".to_string(),
            runtime_version: RuntimeVersion::new(runtime),
            network_mode: NetworkMode::Public,
        }
    }

    #[test]
    fn paths_follow_convention() {
        let spec = agent(Language::Python, "PYTHON_3_12", BuildKind::CodeZip);
        let paths = resolve_project_paths(&spec, &PackageOptions::for_project("/p")).unwrap();
        assert_eq!(paths.code_dir, PathBuf::from("/p/app/Main"));
        assert_eq!(paths.src_dir, paths.code_dir);
        assert_eq!(
            paths.staging_dir,
            PathBuf::from("/p/.agentcore/artifacts/staging/Main")
        );
        assert_eq!(
            paths.artifact_path,
            PathBuf::from("/p/.agentcore/artifacts/Main.zip")
        );
    }

    #[test]
    fn staging_is_scoped_by_agent_name() {
        let spec = agent(Language::Python, "PYTHON_3_12", BuildKind::CodeZip);
        let mut options = PackageOptions::for_project("/p");
        options.agent_name = Some("Other".to_string());
        let a = resolve_project_paths(&spec, &PackageOptions::for_project("/p")).unwrap();
        let b = resolve_project_paths(&spec, &options).unwrap();
        assert_ne!(a.staging_dir, b.staging_dir);
        assert!(b.artifact_path.ends_with("Other.zip"));
    }

    #[test]
    fn factory_picks_variant_by_language() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        let py = select_packager(
            &agent(Language::Python, "PYTHON_3_12", BuildKind::CodeZip),
            runner.clone(),
        )
        .unwrap();
        assert_eq!(py.language(), Language::Python);
        let node = select_packager(
            &agent(Language::Node, "NODE_20", BuildKind::CodeZip),
            runner.clone(),
        )
        .unwrap();
        assert_eq!(node.language(), Language::Node);
    }

    #[test]
    fn factory_rejects_container_builds() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        let err = select_packager(
            &agent(Language::Python, "PYTHON_3_12", BuildKind::Container),
            runner,
        )
        .unwrap_err();
        assert!(err.to_string().contains("only supports CodeZip"));
    }

    #[test]
    fn missing_agent_lists_available() {
        let mut project = ProjectSpec::new("ProjA");
        project
            .agents
            .push(agent(Language::Python, "PYTHON_3_12", BuildKind::CodeZip));
        let err = validate_agent_exists(&project, "Nope").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Agent 'Nope' not found. Available agents: Main"
        );
        assert!(validate_agent_exists(&project, "Main").is_ok());
    }
}
