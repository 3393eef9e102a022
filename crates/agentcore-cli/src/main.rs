//! AgentCore CLI
//!
//! The `agentcore` command packages agents and deploys them to AWS through
//! the CDK toolkit.
//!
//! ## Commands
//!
//! - `package`: Build deployable zips for one or all CodeZip agents
//! - `deploy`: Preflight, package, synthesize and deploy a target
//! - `destroy`: Tear down a target's stack and drop its local state
//! - `status`: Show (or refresh) deployed state for a target
//! - `discover`: List configured targets that have a stack in the cloud

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentcore_deploy::{
    discover_deployed_targets, refresh_target_state, telemetry, AwsCli, BootstrapDecision,
    BootstrapPrompt, CdkCliConfig, CdkCliFactory, Collaborators, DeployError, DeployResult,
    DeploymentOrchestrator, OrchestratorOptions, PrebuiltSources, StackLocator, METRICS,
};
use agentcore_package::{
    pack_all, pack_runtime, validate_agent_exists, PackageOptions, ProcessRunner,
    SystemProcessRunner,
};
use agentcore_state::{ConfigStore, DeployedState, FsConfigStore, PathResolver};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "agentcore")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Package and deploy AgentCore agent projects", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs and results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Project directory (searched upwards for agentcore/agentcore.json)
    #[arg(long, global = true, env = "AGENTCORE_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package agents into deployable zips
    Package {
        /// Agent to package (default: every CodeZip agent)
        #[arg(short, long)]
        agent: Option<String>,

        /// Write the zip exactly here (single agent only)
        #[arg(short, long, requires = "agent")]
        output: Option<PathBuf>,

        /// Python platform tag tried before the defaults
        #[arg(long)]
        python_platform: Option<String>,
    },

    /// Deploy the project to a target
    Deploy {
        /// Deployment target (default: first configured target)
        #[arg(short, long, env = "AGENTCORE_TARGET")]
        target: Option<String>,

        /// Bootstrap the environment without asking
        #[arg(short, long)]
        yes: bool,

        /// AWS profile for the toolkit and AWS calls
        #[arg(long, env = "AWS_PROFILE")]
        profile: Option<String>,
    },

    /// Destroy a target's stack
    Destroy {
        /// Deployment target (default: first configured target)
        #[arg(short, long, env = "AGENTCORE_TARGET")]
        target: Option<String>,

        /// AWS profile for the toolkit and AWS calls
        #[arg(long, env = "AWS_PROFILE")]
        profile: Option<String>,
    },

    /// Show deployed state
    Status {
        /// Only this target
        #[arg(short, long)]
        target: Option<String>,

        /// Rebuild the target's state from its live stack outputs
        #[arg(long, requires = "target")]
        refresh: bool,

        /// AWS profile for the refresh
        #[arg(long, env = "AWS_PROFILE")]
        profile: Option<String>,
    },

    /// List targets with a deployed stack
    Discover {
        /// AWS profile for the tagging query
        #[arg(long, env = "AWS_PROFILE")]
        profile: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json, level);

    let start = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let paths = PathResolver::discover(&start)
        .with_context(|| format!("No AgentCore project found at or above {:?}", start))?;
    let out = Output { json: cli.json };

    let result = match cli.command {
        Commands::Package {
            agent,
            output,
            python_platform,
        } => cmd_package(&paths, agent.as_deref(), output, python_platform, out).await,
        Commands::Deploy {
            target,
            yes,
            profile,
        } => cmd_deploy(&paths, target, yes, cli.verbose, profile, out).await,
        Commands::Destroy { target, profile } => cmd_destroy(&paths, target, profile, out).await,
        Commands::Status {
            target,
            refresh,
            profile,
        } => cmd_status(&paths, target.as_deref(), refresh, profile, out).await,
        Commands::Discover { profile } => cmd_discover(&paths, profile, out).await,
    };

    METRICS.flush();
    result
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn emit(&self, value: serde_json::Value) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Ok(())
    }
}

/// Asks on the terminal; anything but y/yes skips.
struct StdinPrompt;

#[async_trait]
impl BootstrapPrompt for StdinPrompt {
    async fn confirm_bootstrap(&self, environment: &str) -> DeployResult<BootstrapDecision> {
        print!("{environment} has not been bootstrapped. Bootstrap now? [y/N] ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|source| DeployError::Io {
                path: PathBuf::from("<stdin>"),
                source,
            })?;
        Ok(parse_answer(&line))
    }
}

fn parse_answer(line: &str) -> BootstrapDecision {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => BootstrapDecision::Confirm,
        _ => BootstrapDecision::Skip,
    }
}

fn collaborators(paths: &PathResolver, profile: Option<String>) -> Collaborators {
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemProcessRunner::new());
    let aws = Arc::new(AwsCli::new(runner.clone()).with_profile(profile.clone()));
    let cdk = CdkCliConfig {
        profile,
        ..CdkCliConfig::for_project_dir(paths.cdk_project_dir())
    };

    Collaborators {
        store: Arc::new(FsConfigStore::new(paths.clone())),
        credentials: aws.clone(),
        stacks: aws.clone(),
        locator: StackLocator::new(aws.clone()),
        runner: runner.clone(),
        renderer: Arc::new(PrebuiltSources::new(paths.cdk_project_dir())),
        prompt: Arc::new(StdinPrompt),
        toolkit: Arc::new(CdkCliFactory::new(cdk, runner, aws)),
    }
}

fn orchestrator_options(paths: &PathResolver, target: Option<String>) -> OrchestratorOptions {
    OrchestratorOptions {
        target_name: target,
        package: PackageOptions::for_project(paths.project_root()),
        log_dir: Some(paths.logs_dir()),
        ..Default::default()
    }
}

/// Print filtered toolkit messages as they arrive.
fn spawn_progress(orch: &DeploymentOrchestrator, out: Output) -> Option<JoinHandle<()>> {
    if out.json {
        return None;
    }
    let mut messages = orch.events().subscribe_filtered();
    Some(tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            match msg.progress {
                Some(p) => println!("  [{}/{}] {}", p.completed, p.total, msg.message),
                None => println!("  {}", msg.message),
            }
        }
    }))
}

fn print_audit_hint(err: &DeployError, log_dir: &Path) {
    if let DeployError::Toolkit { audit, .. } = err {
        if !audit.is_empty() {
            eprintln!(
                "{} toolkit lines recorded; see {:?} for the full log",
                audit.len(),
                log_dir
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_package(
    paths: &PathResolver,
    agent: Option<&str>,
    output: Option<PathBuf>,
    python_platform: Option<String>,
    out: Output,
) -> Result<()> {
    let store = FsConfigStore::new(paths.clone());
    let project = store
        .read_project_spec()
        .await
        .context("Failed to read project spec")?;
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemProcessRunner::new());
    let options = PackageOptions {
        python_platform,
        output_path: output,
        ..PackageOptions::for_project(paths.project_root())
    };

    let artifacts = match agent {
        Some(name) => {
            let spec = validate_agent_exists(&project, name)?;
            info!(agent = %name, "Packaging agent");
            vec![(name.to_string(), pack_runtime(spec, &options, runner).await?)]
        }
        None => pack_all(&project, &options, runner).await?,
    };

    if out.json {
        return out.emit(json!(artifacts
            .iter()
            .map(|(name, artifact)| json!({ "agent": name, "artifact": artifact }))
            .collect::<Vec<_>>()));
    }
    if artifacts.is_empty() {
        println!("No CodeZip agents to package.");
    }
    for (name, artifact) in &artifacts {
        println!(
            "{}: {:?} ({} bytes, sha256 {})",
            name, artifact.artifact_path, artifact.size_bytes, artifact.sha256
        );
    }
    Ok(())
}

async fn cmd_deploy(
    paths: &PathResolver,
    target: Option<String>,
    yes: bool,
    verbose: bool,
    profile: Option<String>,
    out: Output,
) -> Result<()> {
    let options = OrchestratorOptions {
        auto_confirm_bootstrap: yes,
        verbose,
        ..orchestrator_options(paths, target)
    };
    let mut orch = DeploymentOrchestrator::new(collaborators(paths, profile), options);
    let progress = spawn_progress(&orch, out);

    let result = orch.deploy().await;
    if let Some(handle) = progress {
        handle.abort();
    }
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            print_audit_hint(&e, &paths.logs_dir());
            return Err(e).context("Deploy failed");
        }
    };

    if out.json {
        return out.emit(json!({
            "runId": report.run_id,
            "preflight": report.preflight,
            "stackName": report.stack_name,
            "outputs": report.outputs,
            "artifacts": report.artifacts
                .iter()
                .map(|(name, artifact)| json!({ "agent": name, "artifact": artifact }))
                .collect::<Vec<_>>(),
            "state": report.state,
            "auditLog": report.audit_log,
        }));
    }
    println!(
        "Deployed {} to {} ({}/{})",
        report.stack_name,
        report.preflight.target,
        report.preflight.account,
        report.preflight.region
    );
    for (key, value) in &report.outputs {
        println!("  {key} = {value}");
    }
    if let Some(log) = &report.audit_log {
        println!("Log: {:?}", log);
    }
    Ok(())
}

async fn cmd_destroy(
    paths: &PathResolver,
    target: Option<String>,
    profile: Option<String>,
    out: Output,
) -> Result<()> {
    let options = orchestrator_options(paths, target);
    let mut orch = DeploymentOrchestrator::new(collaborators(paths, profile), options);
    let progress = spawn_progress(&orch, out);

    let result = orch.destroy().await;
    if let Some(handle) = progress {
        handle.abort();
    }
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            print_audit_hint(&e, &paths.logs_dir());
            return Err(e).context("Destroy failed");
        }
    };

    if out.json {
        return out.emit(serde_json::to_value(&outcome)?);
    }
    println!(
        "Destroyed {} (target '{}')",
        outcome.primary.stack_name, outcome.primary.target_name
    );
    println!("Local state: {:?}", outcome.cleanup);
    Ok(())
}

async fn cmd_status(
    paths: &PathResolver,
    target: Option<&str>,
    refresh: bool,
    profile: Option<String>,
    out: Output,
) -> Result<()> {
    let state = match (refresh, target) {
        (true, Some(name)) => {
            let deps = collaborators(paths, profile);
            let refreshed = refresh_target_state(
                deps.store.as_ref(),
                &deps.locator,
                deps.stacks.as_ref(),
                name,
            )
            .await?;
            match refreshed {
                Some(state) => state,
                None => {
                    println!("No deployed stack for target '{}'", name);
                    return Ok(());
                }
            }
        }
        _ => read_state_or_default(&FsConfigStore::new(paths.clone())).await?,
    };

    let state = match target {
        Some(name) => DeployedState {
            targets: state
                .targets
                .into_iter()
                .filter(|(key, _)| key == name)
                .collect(),
        },
        None => state,
    };

    if out.json {
        return out.emit(serde_json::to_value(&state)?);
    }
    print_state(&state);
    Ok(())
}

async fn cmd_discover(paths: &PathResolver, profile: Option<String>, out: Output) -> Result<()> {
    let deps = collaborators(paths, profile);
    let deployed = discover_deployed_targets(deps.store.as_ref(), &deps.locator).await?;

    if out.json {
        return out.emit(serde_json::to_value(&deployed)?);
    }
    if deployed.is_empty() {
        println!("No deployed targets found.");
    }
    for entry in &deployed {
        println!(
            "{:<16} {}  {}",
            entry.target.name, entry.target.region, entry.stack.stack_name
        );
    }
    Ok(())
}

async fn read_state_or_default(store: &FsConfigStore) -> Result<DeployedState> {
    if !store.has_deployed_state() {
        return Ok(DeployedState::default());
    }
    store
        .read_deployed_state()
        .await
        .context("Failed to read deployed state")
}

fn print_state(state: &DeployedState) {
    if state.targets.is_empty() {
        println!("Nothing deployed.");
        return;
    }
    for (name, target) in &state.targets {
        let stack = target.resources.stack_name.as_deref().unwrap_or("-");
        println!("{name}: {stack}");
        for (agent, resources) in &target.resources.agents {
            println!("  {agent}: {}", resources.runtime_arn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_state::{DeploymentTarget, ProjectSpec, TargetState};

    #[test]
    fn bootstrap_answer_defaults_to_skip() {
        assert_eq!(parse_answer("y\n"), BootstrapDecision::Confirm);
        assert_eq!(parse_answer(" YES "), BootstrapDecision::Confirm);
        assert_eq!(parse_answer("\n"), BootstrapDecision::Skip);
        assert_eq!(parse_answer("nope"), BootstrapDecision::Skip);
    }

    #[test]
    fn parses_deploy_flags() {
        let cli = Cli::try_parse_from([
            "agentcore",
            "--json",
            "deploy",
            "--target",
            "prod",
            "--yes",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Deploy { target, yes, .. } => {
                assert_eq!(target.as_deref(), Some("prod"));
                assert!(yes);
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn package_output_requires_agent() {
        assert!(Cli::try_parse_from(["agentcore", "package", "--output", "a.zip"]).is_err());
        assert!(Cli::try_parse_from(["agentcore", "status", "--refresh"]).is_err());
    }

    #[test]
    fn options_point_logs_into_the_project() {
        let paths = PathResolver::for_project("/work/proj");
        let options = orchestrator_options(&paths, Some("dev".to_string()));
        assert_eq!(options.target_name.as_deref(), Some("dev"));
        assert_eq!(options.log_dir, Some(paths.logs_dir()));
        assert_eq!(
            options.package.project_root,
            Some(PathBuf::from("/work/proj"))
        );
        assert!(!options.auto_confirm_bootstrap);
    }

    #[tokio::test]
    async fn status_reads_missing_state_as_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::new(PathResolver::for_project(temp_dir.path()));
        store
            .write_project_spec(&ProjectSpec::new("ProjA"))
            .await
            .unwrap();
        store
            .write_deployment_targets(&[DeploymentTarget {
                name: "default".to_string(),
                account: "123456789012".to_string(),
                region: "us-east-1".to_string(),
                description: None,
            }])
            .await
            .unwrap();

        assert!(read_state_or_default(&store).await.unwrap().targets.is_empty());

        let mut state = DeployedState::default();
        state
            .targets
            .insert("default".to_string(), TargetState::default());
        store.write_deployed_state(&state).await.unwrap();
        assert_eq!(read_state_or_default(&store).await.unwrap(), state);
    }
}
