//! Minimum toolchain versions.
//!
//! The CDK app needs Node 18 or newer to synthesize. Python CodeZip agents
//! additionally need a `uv` recent enough to understand `--python-platform`.

use std::sync::LazyLock;

use agentcore_state::{BuildKind, Language, ProjectSpec};
use regex::Regex;
use semver::Version;
use serde::Serialize;

use crate::error::{PackageError, PackageResult};
use crate::obs;
use crate::process::{CommandSpec, ProcessRunner};

pub const NODE_MIN_VERSION: Version = Version::new(18, 0, 0);
pub const UV_MIN_VERSION: Version = Version::new(0, 9, 2);

static NODE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v?(\d+\.\d+\.\d+)").expect("node version regex"));
static UV_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"uv\s+(\d+\.\d+\.\d+)").expect("uv version regex"));

/// `v18.17.0`, `18.17.0-rc.1` or `0.9.2` -> major.minor.patch; trailing text is ignored.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    let mut parts = raw.splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch: String = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(Version::new(major, minor, patch.parse().ok()?))
}

/// Outcome of checking one binary against its minimum version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheck {
    pub binary: String,
    /// Reported version; `None` when the binary is missing or unreadable.
    pub current: Option<String>,
    pub required: String,
    pub satisfied: bool,
}

impl VersionCheck {
    /// User-facing reason this check failed, `None` when satisfied.
    pub fn error_message(&self) -> Option<String> {
        if self.satisfied {
            return None;
        }
        Some(match (&self.current, self.binary.as_str()) {
            (None, "uv") => format!(
                "'uv' not found. Install uv >= {} from https://github.com/astral-sh/uv#installation",
                self.required
            ),
            (None, binary) => format!("'{binary}' not found. Install {binary} >= {}", self.required),
            (Some(current), binary) => format!(
                "{binary} {current} is below minimum required version {}",
                self.required
            ),
        })
    }
}

async fn check_binary(
    runner: &dyn ProcessRunner,
    binary: &str,
    pattern: &Regex,
    minimum: &Version,
) -> VersionCheck {
    let mut check = VersionCheck {
        binary: binary.to_string(),
        current: None,
        required: minimum.to_string(),
        satisfied: false,
    };
    if runner.locate(binary).is_none() {
        return check;
    }
    let output = match runner.run(&CommandSpec::new(binary).arg("--version")).await {
        Ok(output) if output.success() => output,
        _ => return check,
    };
    let Some(reported) = pattern
        .captures(output.stdout.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
    else {
        return check;
    };
    check.satisfied = parse_version(&reported).is_some_and(|v| v >= *minimum);
    check.current = Some(reported);
    check
}

pub async fn check_node_version(runner: &dyn ProcessRunner) -> VersionCheck {
    check_binary(runner, "node", &NODE_VERSION, &NODE_MIN_VERSION).await
}

pub async fn check_uv_version(runner: &dyn ProcessRunner) -> VersionCheck {
    check_binary(runner, "uv", &UV_VERSION, &UV_MIN_VERSION).await
}

/// True when any agent is packaged with `uv`.
pub fn requires_uv(project: &ProjectSpec) -> bool {
    project
        .agents
        .iter()
        .any(|a| a.target_language == Language::Python && a.build == BuildKind::CodeZip)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyCheck {
    pub node: VersionCheck,
    /// Only checked when the project needs `uv`.
    pub uv: Option<VersionCheck>,
    pub errors: Vec<String>,
}

impl DependencyCheck {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> PackageResult<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(PackageError::DependencyVersions {
                errors: self.errors,
            })
        }
    }
}

/// Node is always checked; uv only for projects with Python CodeZip agents.
pub async fn check_dependency_versions(
    project: &ProjectSpec,
    runner: &dyn ProcessRunner,
) -> DependencyCheck {
    let node = check_node_version(runner).await;
    let uv = if requires_uv(project) {
        Some(check_uv_version(runner).await)
    } else {
        None
    };

    let mut errors = Vec::new();
    for check in std::iter::once(&node).chain(uv.as_ref()) {
        obs::emit_version_check(
            &check.binary,
            check.current.as_deref().unwrap_or("-"),
            &check.required,
            check.satisfied,
        );
        errors.extend(check.error_message());
    }
    DependencyCheck { node, uv, errors }
}
