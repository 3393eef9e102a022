//! Typed project documents: the project spec and the deployment target list.
//!
//! Every document validates into a flat list of `path: message` issues so a
//! single read reports everything wrong with the file at once.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PROJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{0,22}$").expect("project name regex"));
static AGENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,47}$").expect("agent name regex"));
static MEMORY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{0,47}$").expect("memory name regex"));
static CREDENTIAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,255}$").expect("credential name regex"));
static TARGET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9-]{0,63}$").expect("target name regex"));

/// Regions the AgentCore runtime is available in.
pub const SUPPORTED_REGIONS: &[&str] = &[
    "ap-northeast-1",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "eu-central-1",
    "eu-west-1",
    "us-east-1",
    "us-east-2",
    "us-west-2",
];

// ---------------------------------------------------------------------------
// Issue collection
// ---------------------------------------------------------------------------

/// Accumulates `path: message` validation issues.
#[derive(Debug, Default)]
pub struct Issues(Vec<String>);

impl Issues {
    pub fn push(&mut self, path: impl fmt::Display, message: impl fmt::Display) {
        self.0.push(format!("{path}: {message}"));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise every issue in order.
    pub fn finish(self) -> Result<(), Vec<String>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

fn check_unique<'a>(
    issues: &mut Issues,
    field: &str,
    names: impl Iterator<Item = &'a str>,
    label: &str,
) {
    let mut seen = HashSet::new();
    for (i, name) in names.enumerate() {
        if !seen.insert(name) {
            issues.push(
                format!("{field}[{i}].name"),
                format!("Duplicate {label} name: {name}"),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// How an agent's code is shipped to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildKind {
    /// Zip archive of source plus installed dependencies.
    CodeZip,
    /// Container image built from the agent directory.
    Container,
}

/// Language family of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    Node,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "Python"),
            Language::Node => write!(f, "Node"),
        }
    }
}

/// Runtime identifier such as `PYTHON_3_12` or `NODE_20`.
///
/// Kept as the raw string so unknown values survive a read/write cycle and
/// are rejected where they are used rather than at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeVersion(pub String);

impl RuntimeVersion {
    pub fn new(value: impl Into<String>) -> Self {
        RuntimeVersion(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Language family implied by the runtime prefix.
    pub fn language(&self) -> Option<Language> {
        if self.0.starts_with("PYTHON_") {
            Some(Language::Python)
        } else if self.0.starts_with("NODE_") {
            Some(Language::Node)
        } else {
            None
        }
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkMode {
    #[default]
    Public,
    Private,
}

/// One deployable agent in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub name: String,
    pub build: BuildKind,
    pub target_language: Language,
    /// Module or file the runtime invokes, e.g. `main.py`.
    pub entrypoint: String,
    /// Agent source directory, relative to the project root.
    pub code_location: String,
    pub runtime_version: RuntimeVersion,
    #[serde(default)]
    pub network_mode: NetworkMode,
}

impl AgentSpec {
    fn validate(&self, issues: &mut Issues, path: &str) {
        if !AGENT_NAME.is_match(&self.name) {
            issues.push(
                format!("{path}.name"),
                "Must begin with a letter and contain only alphanumeric characters and underscores (max 48 chars)",
            );
        }
        if self.entrypoint.trim().is_empty() {
            issues.push(format!("{path}.entrypoint"), "Entrypoint is required");
        }
        if self.code_location.trim().is_empty() {
            issues.push(format!("{path}.codeLocation"), "Code location is required");
        }
        match self.runtime_version.language() {
            None => issues.push(
                format!("{path}.runtimeVersion"),
                format!("Unknown runtime version: {}", self.runtime_version),
            ),
            Some(lang) if lang != self.target_language => issues.push(
                format!("{path}.runtimeVersion"),
                format!(
                    "{} runtime cannot be used with a {} agent",
                    self.runtime_version, self.target_language
                ),
            ),
            Some(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Memories & credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryStrategyType {
    Semantic,
    Summarization,
    UserPreference,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStrategy {
    #[serde(rename = "type")]
    pub kind: MemoryStrategyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// Days before short-term events expire.
    pub event_expiry_duration: u32,
    #[serde(default)]
    pub strategies: Vec<MemoryStrategy>,
}

impl Memory {
    fn validate(&self, issues: &mut Issues, path: &str) {
        if self.kind != "AgentCoreMemory" {
            issues.push(
                format!("{path}.type"),
                format!("got \"{}\", expected \"AgentCoreMemory\"", self.kind),
            );
        }
        if !MEMORY_NAME.is_match(&self.name) {
            issues.push(
                format!("{path}.name"),
                "Must begin with a letter and contain only alphanumeric characters and underscores (max 48 chars)",
            );
        }
        if !(7..=365).contains(&self.event_expiry_duration) {
            issues.push(
                format!("{path}.eventExpiryDuration"),
                "Must be between 7 and 365 days",
            );
        }
        let mut seen = HashSet::new();
        for (i, strategy) in self.strategies.iter().enumerate() {
            if !seen.insert(strategy.kind) {
                issues.push(
                    format!("{path}.strategies[{i}].type"),
                    format!("Duplicate memory strategy type: {:?}", strategy.kind),
                );
            }
            if let Some(name) = &strategy.name {
                if !MEMORY_NAME.is_match(name) {
                    issues.push(format!("{path}.strategies[{i}].name"), "Invalid strategy name");
                }
            }
            if matches!(&strategy.namespaces, Some(ns) if ns.is_empty()) {
                issues.push(
                    format!("{path}.strategies[{i}].namespaces"),
                    "At least one namespace is required when namespaces are set",
                );
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

impl Credential {
    fn validate(&self, issues: &mut Issues, path: &str) {
        if self.kind != "ApiKeyCredentialProvider" {
            issues.push(
                format!("{path}.type"),
                format!("got \"{}\", expected \"ApiKeyCredentialProvider\"", self.kind),
            );
        }
        if !CREDENTIAL_NAME.is_match(&self.name) {
            issues.push(
                format!("{path}.name"),
                "Must contain only alphanumeric characters, underscores, dots, and hyphens (3-255 chars)",
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

fn default_version() -> u32 {
    1
}

/// Contents of `agentcore.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub memories: Vec<Memory>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

impl ProjectSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            agents: Vec::new(),
            memories: Vec::new(),
            credentials: Vec::new(),
        }
    }

    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Issues::default();

        if self.name.is_empty() {
            issues.push("name", "Project name is required");
        } else if !PROJECT_NAME.is_match(&self.name) {
            issues.push(
                "name",
                "Project name must start with a letter and contain only alphanumeric characters (max 23 chars)",
            );
        }

        for (i, agent) in self.agents.iter().enumerate() {
            agent.validate(&mut issues, &format!("agents[{i}]"));
        }
        check_unique(
            &mut issues,
            "agents",
            self.agents.iter().map(|a| a.name.as_str()),
            "agent",
        );

        for (i, memory) in self.memories.iter().enumerate() {
            memory.validate(&mut issues, &format!("memories[{i}]"));
        }
        check_unique(
            &mut issues,
            "memories",
            self.memories.iter().map(|m| m.name.as_str()),
            "memory",
        );

        for (i, credential) in self.credentials.iter().enumerate() {
            credential.validate(&mut issues, &format!("credentials[{i}]"));
        }
        check_unique(
            &mut issues,
            "credentials",
            self.credentials.iter().map(|c| c.name.as_str()),
            "credential",
        );

        issues.finish()
    }
}

// ---------------------------------------------------------------------------
// Deployment targets
// ---------------------------------------------------------------------------

/// A named (account, region) destination, stored in `aws-targets.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTarget {
    pub name: String,
    pub account: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DeploymentTarget {
    fn validate(&self, issues: &mut Issues, path: &str) {
        if !TARGET_NAME.is_match(&self.name) {
            issues.push(
                format!("{path}.name"),
                "Must start with a letter and contain only alphanumeric characters and hyphens (max 64 chars)",
            );
        }
        if self.account.len() != 12 || !self.account.chars().all(|c| c.is_ascii_digit()) {
            issues.push(
                format!("{path}.account"),
                "AWS account ID must be exactly 12 digits",
            );
        }
        if !SUPPORTED_REGIONS.contains(&self.region.as_str()) {
            let expected = SUPPORTED_REGIONS
                .iter()
                .map(|r| format!("\"{r}\""))
                .collect::<Vec<_>>()
                .join(" | ");
            issues.push(
                format!("{path}.region"),
                format!("got \"{}\", expected {expected}", self.region),
            );
        }
        if matches!(&self.description, Some(d) if d.chars().count() > 256) {
            issues.push(
                format!("{path}.description"),
                "Description must be 256 characters or less",
            );
        }
    }
}

/// Validate the full target list, including name uniqueness.
pub fn validate_targets(targets: &[DeploymentTarget]) -> Result<(), Vec<String>> {
    let mut issues = Issues::default();
    for (i, target) in targets.iter().enumerate() {
        target.validate(&mut issues, &format!("[{i}]"));
    }
    let mut seen = HashSet::new();
    for (i, target) in targets.iter().enumerate() {
        if !seen.insert(target.name.as_str()) {
            issues.push(
                format!("[{i}].name"),
                format!("Duplicate deployment target name: {}", target.name),
            );
        }
    }
    issues.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, runtime: &str, language: Language) -> AgentSpec {
        AgentSpec {
            name: name.to_string(),
            build: BuildKind::CodeZip,
            target_language: language,
            entrypoint: "main.py".to_string(),
            code_location: format!("app/{name}"),
            runtime_version: RuntimeVersion::new(runtime),
            network_mode: NetworkMode::Public,
        }
    }

    fn target(name: &str) -> DeploymentTarget {
        DeploymentTarget {
            name: name.to_string(),
            account: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            description: None,
        }
    }

    #[test]
    fn valid_project_passes() {
        let mut project = ProjectSpec::new("ProjA");
        project.agents.push(agent("Main", "PYTHON_3_12", Language::Python));
        project.agents.push(agent("Helper", "NODE_20", Language::Node));
        assert!(project.validate().is_ok());
    }

    #[test]
    fn duplicate_agent_names_reported() {
        let mut project = ProjectSpec::new("ProjA");
        project.agents.push(agent("A", "PYTHON_3_12", Language::Python));
        project.agents.push(agent("A", "PYTHON_3_12", Language::Python));
        let issues = project.validate().unwrap_err();
        assert_eq!(issues, vec!["agents[1].name: Duplicate agent name: A"]);
    }

    #[test]
    fn runtime_must_match_language() {
        let mut project = ProjectSpec::new("ProjA");
        project.agents.push(agent("A", "PYTHON_3_12", Language::Node));
        let issues = project.validate().unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("agents[0].runtimeVersion"));
    }

    #[test]
    fn project_name_rules() {
        assert!(ProjectSpec::new("").validate().is_err());
        assert!(ProjectSpec::new("1abc").validate().is_err());
        assert!(ProjectSpec::new("has-dash").validate().is_err());
        assert!(ProjectSpec::new("A".repeat(24)).validate().is_err());
        assert!(ProjectSpec::new("A".repeat(23)).validate().is_ok());
    }

    #[test]
    fn memory_rules() {
        let mut project = ProjectSpec::new("ProjA");
        project.memories.push(Memory {
            kind: "AgentCoreMemory".to_string(),
            name: "short_term".to_string(),
            event_expiry_duration: 3,
            strategies: vec![
                MemoryStrategy {
                    kind: MemoryStrategyType::Semantic,
                    name: None,
                    description: None,
                    namespaces: None,
                },
                MemoryStrategy {
                    kind: MemoryStrategyType::Semantic,
                    name: None,
                    description: None,
                    namespaces: None,
                },
            ],
        });
        let issues = project.validate().unwrap_err();
        assert!(issues
            .iter()
            .any(|i| i.starts_with("memories[0].eventExpiryDuration")));
        assert!(issues
            .iter()
            .any(|i| i.contains("Duplicate memory strategy type")));
    }

    #[test]
    fn credential_name_length() {
        let mut project = ProjectSpec::new("ProjA");
        project.credentials.push(Credential {
            kind: "ApiKeyCredentialProvider".to_string(),
            name: "ab".to_string(),
        });
        assert!(project.validate().is_err());
        project.credentials[0].name = "openai.key-1".to_string();
        assert!(project.validate().is_ok());
    }

    #[test]
    fn targets_validate_fields_and_uniqueness() {
        assert!(validate_targets(&[target("default"), target("prod")]).is_ok());

        let issues = validate_targets(&[target("default"), target("default")]).unwrap_err();
        assert_eq!(
            issues,
            vec!["[1].name: Duplicate deployment target name: default"]
        );

        let mut bad = target("dev");
        bad.account = "12345".to_string();
        bad.region = "mars-north-1".to_string();
        let issues = validate_targets(&[bad]).unwrap_err();
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn project_json_uses_camel_case() {
        let mut project = ProjectSpec::new("ProjA");
        project.agents.push(agent("Main", "PYTHON_3_12", Language::Python));
        let json = serde_json::to_value(&project).unwrap();
        let agent = &json["agents"][0];
        assert_eq!(agent["codeLocation"], "app/Main");
        assert_eq!(agent["runtimeVersion"], "PYTHON_3_12");
        assert_eq!(agent["networkMode"], "PUBLIC");
        assert_eq!(agent["build"], "CodeZip");
    }

    #[test]
    fn unknown_runtime_survives_parse() {
        let json = r#"{
            "name": "ProjA",
            "agents": [{
                "name": "A", "build": "CodeZip", "targetLanguage": "Python",
                "entrypoint": "main.py", "codeLocation": "app/A",
                "runtimeVersion": "RUBY_3"
            }]
        }"#;
        let project: ProjectSpec = serde_json::from_str(json).unwrap();
        assert_eq!(project.agents[0].runtime_version.as_str(), "RUBY_3");
        assert_eq!(project.version, 1);
        assert!(project.validate().is_err());
    }
}
