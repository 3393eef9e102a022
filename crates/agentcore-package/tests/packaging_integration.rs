//! End-to-end packaging against a scripted process runner.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use agentcore_package::fakes::ScriptedProcessRunner;
use agentcore_package::{
    pack_all, pack_runtime, pack_runtime_blocking, ArchiveBuilder, PackageError, PackageOptions,
    ProcessRunner, PythonPackager, PYTHON_PLATFORM_CANDIDATES,
};
use agentcore_state::{AgentSpec, BuildKind, Language, NetworkMode, ProjectSpec, RuntimeVersion};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const PLATFORM_REJECTION: &str = "  × No solution found when resolving dependencies:\n  hint: Wheels are available for `pydantic-core` (v2.27.2) on the following platforms: manylinux_2_17_x86_64, manylinux_2_28_aarch64";

fn python_agent(name: &str) -> AgentSpec {
    AgentSpec {
        name: name.to_string(),
        build: BuildKind::CodeZip,
        target_language: Language::Python,
        entrypoint: "main.py".to_string(),
        code_location: format!("app/{name}"),
        runtime_version: RuntimeVersion::new("PYTHON_3_12"),
        network_mode: NetworkMode::Public,
    }
}

fn node_agent(name: &str) -> AgentSpec {
    AgentSpec {
        target_language: Language::Node,
        entrypoint: "index.js".to_string(),
        runtime_version: RuntimeVersion::new("NODE_20"),
        ..python_agent(name)
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A project with one Python agent `Main` and its sources on disk.
fn python_project() -> (TempDir, AgentSpec, PackageOptions) {
    let dir = tempfile::tempdir().unwrap();
    let agent = python_agent("Main");
    let code = dir.path().join(&agent.code_location);
    write(&code.join("main.py"), "print('hello')\n");
    write(
        &code.join("pyproject.toml"),
        "[project]\nname = \"main\"\nversion = \"0.1.0\"\ndependencies = []\n",
    );
    write(&code.join("__pycache__/main.cpython-312.pyc"), "cache");
    let options = PackageOptions::for_project(dir.path());
    (dir, agent, options)
}

fn zip_entries(path: &Path) -> Vec<String> {
    let file = fs::File::open(path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

fn platform_arg(cmd: &agentcore_package::CommandSpec) -> String {
    let idx = cmd
        .args
        .iter()
        .position(|a| a == "--python-platform")
        .expect("platform flag");
    cmd.args[idx + 1].clone()
}

// ---------------------------------------------------------------------------
// Python platform fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_candidate_success_makes_one_attempt() {
    let (_dir, agent, options) = python_project();
    let runner = Arc::new(ScriptedProcessRunner::new());
    runner.push_success();

    let result = pack_runtime(&agent, &options, runner.clone()).await.unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(platform_arg(&calls[0]), PYTHON_PLATFORM_CANDIDATES[0]);
    assert!(calls[0].args.iter().any(|a| a == "3.12"));
    assert!(calls[0].args.iter().any(|a| a == ":all:"));
    assert!(result.artifact_path.ends_with(".agentcore/artifacts/Main.zip"));
    assert!(result.size_bytes > 0);

    let entries = zip_entries(&result.artifact_path);
    assert!(entries.contains(&"main.py".to_string()));
    assert!(entries.iter().all(|e| !e.contains("__pycache__")));
}

#[tokio::test]
async fn falls_back_until_a_candidate_installs() {
    let (_dir, agent, options) = python_project();
    let runner = Arc::new(ScriptedProcessRunner::new());
    runner
        .push_failure(1, "", PLATFORM_REJECTION)
        .push_success();

    pack_runtime(&agent, &options, runner.clone()).await.unwrap();

    let platforms: Vec<String> = runner.calls().iter().map(platform_arg).collect();
    assert_eq!(
        platforms,
        vec![PYTHON_PLATFORM_CANDIDATES[0], PYTHON_PLATFORM_CANDIDATES[1]]
    );
}

#[tokio::test]
async fn exhausting_candidates_reports_all_of_them() {
    let (_dir, agent, options) = python_project();
    let runner = Arc::new(ScriptedProcessRunner::new());
    for _ in PYTHON_PLATFORM_CANDIDATES {
        runner.push_failure(1, "", PLATFORM_REJECTION);
    }

    let err = pack_runtime(&agent, &options, runner.clone())
        .await
        .unwrap_err();

    assert_eq!(runner.calls().len(), PYTHON_PLATFORM_CANDIDATES.len());
    let text = err.to_string();
    assert!(text.starts_with("uv pip install failed for all platform candidates ("));
    for candidate in PYTHON_PLATFORM_CANDIDATES {
        assert!(text.contains(candidate));
    }
    assert!(text.contains("following platforms"));
}

#[tokio::test]
async fn non_platform_failure_stops_after_one_attempt() {
    let (_dir, agent, options) = python_project();
    let runner = Arc::new(ScriptedProcessRunner::new());
    runner.push_failure(2, "", "error: Failed to fetch: network unreachable");

    let err = pack_runtime(&agent, &options, runner.clone())
        .await
        .unwrap_err();

    assert_eq!(runner.calls().len(), 1);
    assert!(matches!(err, PackageError::InstallFailed { .. }));
    assert_eq!(err.to_string(), "error: Failed to fetch: network unreachable");
}

#[tokio::test]
async fn preferred_platform_is_tried_first() {
    let (_dir, agent, mut options) = python_project();
    options.python_platform = Some("aarch64-manylinux_2_34".to_string());
    let runner = Arc::new(ScriptedProcessRunner::new());
    runner.push_success();

    pack_runtime(&agent, &options, runner.clone()).await.unwrap();
    assert_eq!(platform_arg(&runner.calls()[0]), "aarch64-manylinux_2_34");
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repacking_unchanged_sources_is_identical() {
    let (_dir, agent, options) = python_project();
    let runner = Arc::new(ScriptedProcessRunner::new());

    let first = pack_runtime(&agent, &options, runner.clone()).await.unwrap();
    let second = pack_runtime(&agent, &options, runner.clone()).await.unwrap();

    assert_eq!(first.size_bytes, second.size_bytes);
    assert_eq!(first.sha256, second.sha256);
    assert_eq!(zip_entries(&first.artifact_path), zip_entries(&second.artifact_path));
}

#[tokio::test]
async fn blocking_and_async_packs_agree() {
    let (_dir, agent, options) = python_project();
    let runner = Arc::new(ScriptedProcessRunner::new());

    let awaited = pack_runtime(&agent, &options, runner.clone()).await.unwrap();

    let blocking_runner: Arc<dyn ProcessRunner> = runner.clone();
    let (agent_b, options_b) = (agent.clone(), options.clone());
    let blocking = tokio::task::spawn_blocking(move || {
        pack_runtime_blocking(&agent_b, &options_b, blocking_runner)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(awaited, blocking);
    assert_eq!(runner.calls()[0], runner.calls()[1]);
}

#[tokio::test]
async fn stale_staging_files_do_not_leak() {
    let (dir, agent, options) = python_project();
    let runner = Arc::new(ScriptedProcessRunner::new());
    let stale = dir
        .path()
        .join(".agentcore/artifacts/staging/Main/leftover.txt");
    write(&stale, "old");

    let result = pack_runtime(&agent, &options, runner).await.unwrap();
    assert!(!zip_entries(&result.artifact_path).contains(&"leftover.txt".to_string()));
}

#[tokio::test]
async fn oversize_artifact_is_rejected() {
    let (dir, agent, options) = python_project();
    let mut payload = String::new();
    // Low-entropy text still compresses past a tiny ceiling.
    for i in 0..2000 {
        payload.push_str(&format!("line {i} {}\n", i * 7919));
    }
    write(&dir.path().join("app/Main/data.txt"), &payload);

    let runner = Arc::new(ScriptedProcessRunner::new());
    let packager = PythonPackager::new(runner).with_archive(ArchiveBuilder::with_limit(64));
    let err = packager.pack(&agent, &options).await.unwrap_err();
    assert!(matches!(err, PackageError::ArtifactTooLarge { limit: 64, .. }));
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_uv_fails_before_any_install() {
    let (_dir, agent, options) = python_project();
    let runner = Arc::new(ScriptedProcessRunner::with_binaries(["npm"]));

    let err = pack_runtime(&agent, &options, runner.clone())
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("uv is required."));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn missing_pyproject_is_reported() {
    let (dir, agent, options) = python_project();
    fs::remove_file(dir.path().join("app/Main/pyproject.toml")).unwrap();
    let runner = Arc::new(ScriptedProcessRunner::new());

    let err = pack_runtime(&agent, &options, runner).await.unwrap_err();
    assert!(matches!(err, PackageError::MissingProjectFile { .. }));
}

#[tokio::test]
async fn container_build_is_rejected() {
    let (_dir, mut agent, options) = python_project();
    agent.build = BuildKind::Container;
    let runner = Arc::new(ScriptedProcessRunner::new());

    let err = pack_runtime(&agent, &options, runner).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Python packager only supports CodeZip build type."
    );
}

#[tokio::test]
async fn runtime_family_must_match_language() {
    let (_dir, mut agent, options) = python_project();
    agent.runtime_version = RuntimeVersion::new("NODE_20");
    let runner = Arc::new(ScriptedProcessRunner::new());

    let err = pack_runtime(&agent, &options, runner).await.unwrap_err();
    assert!(matches!(err, PackageError::RuntimeMismatch { .. }));
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[tokio::test]
async fn node_installs_once_without_dev_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let agent = node_agent("Web");
    let code = dir.path().join(&agent.code_location);
    write(&code.join("index.js"), "console.log('hi')\n");
    write(&code.join("package.json"), "{\"name\":\"web\"}\n");
    write(&code.join("node_modules/dev-only/index.js"), "x");

    let runner = Arc::new(ScriptedProcessRunner::new());
    runner.push_failure(1, "", "npm ERR! code E404");
    let options = PackageOptions::for_project(dir.path());

    let err = pack_runtime(&agent, &options, runner.clone())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "npm ERR! code E404");
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "npm");
    assert!(calls[0].args.iter().any(|a| a == "--omit=dev"));

    let result = pack_runtime(&agent, &options, runner).await.unwrap();
    let entries = zip_entries(&result.artifact_path);
    assert!(entries.contains(&"index.js".to_string()));
    assert!(entries.iter().all(|e| !e.starts_with("node_modules/dev-only")));
}

#[tokio::test]
async fn node_scripts_keep_their_interpreter_lines() {
    let dir = tempfile::tempdir().unwrap();
    let agent = node_agent("Web");
    let code = dir.path().join(&agent.code_location);
    let script = "#!C:\\Python312\\python.exe\r\nimport sys\r\n";
    write(&code.join("index.js"), "console.log('hi')\n");
    write(&code.join("package.json"), "{\"name\":\"web\"}\n");
    write(&code.join("bin/tool"), script);
    let options = PackageOptions::for_project(dir.path());
    let runner = Arc::new(ScriptedProcessRunner::new());

    let awaited = pack_runtime(&agent, &options, runner.clone()).await.unwrap();
    let blocking = pack_runtime_blocking(&agent, &options, runner).unwrap();

    for result in [awaited, blocking] {
        let file = fs::File::open(&result.artifact_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut packed = String::new();
        archive
            .by_name("bin/tool")
            .unwrap()
            .read_to_string(&mut packed)
            .unwrap();
        assert_eq!(packed, script);
    }
    assert_eq!(fs::read_to_string(code.join("bin/tool")).unwrap(), script);
}

#[tokio::test]
async fn python_scripts_get_linux_interpreter_lines() {
    let (dir, agent, options) = python_project();
    let code = dir.path().join(&agent.code_location);
    write(&code.join("bin/tool"), "#!C:\\Python312\\python.exe\r\nrun()\r\n");
    let runner = Arc::new(ScriptedProcessRunner::new());

    let result = pack_runtime(&agent, &options, runner).await.unwrap();

    let file = fs::File::open(&result.artifact_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut packed = String::new();
    archive
        .by_name("bin/tool")
        .unwrap()
        .read_to_string(&mut packed)
        .unwrap();
    assert_eq!(packed, "#!/usr/bin/env python3\nrun()\n");
}

// ---------------------------------------------------------------------------
// Whole project
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pack_all_builds_one_artifact_per_agent() {
    let (dir, main, options) = python_project();
    let other = python_agent("Helper");
    let code = dir.path().join(&other.code_location);
    write(&code.join("main.py"), "print('helper')\n");
    write(&code.join("pyproject.toml"), "[project]\nname = \"helper\"\n");

    let mut project = ProjectSpec::new("ProjA");
    project.agents.push(main);
    project.agents.push(other);

    let runner = Arc::new(ScriptedProcessRunner::new());
    let results = pack_all(&project, &options, runner).await.unwrap();

    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Main", "Helper"]);
    assert_ne!(results[0].1.artifact_path, results[1].1.artifact_path);

    let mut contents = String::new();
    let file = fs::File::open(&results[1].1.artifact_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    archive
        .by_name("main.py")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "print('helper')\n");
}
