//! Error types for the packaging layer.

use std::path::PathBuf;

use agentcore_state::{BuildKind, Language};

/// Install hint shown when `uv` is not on PATH.
pub const UV_INSTALL_HINT: &str =
    "Install uv from https://github.com/astral-sh/uv#installation and ensure it is on your PATH.";

/// Install hint shown when `npm` is not on PATH.
pub const NPM_INSTALL_HINT: &str =
    "Install Node.js and npm from https://nodejs.org/ and ensure npm is on your PATH.";

/// Errors produced while packaging an agent.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("{language} packager only supports CodeZip build type.")]
    UnsupportedBuildKind { language: Language, build: BuildKind },

    #[error("{language} packager only supports {language} runtimes. Received: {runtime}")]
    RuntimeMismatch { language: Language, runtime: String },

    #[error("{0}")]
    UnsupportedRuntime(String),

    #[error("{binary} is required. {hint}")]
    MissingDependencyTool { binary: String, hint: String },

    /// One line per toolchain binary that is missing or too old.
    #[error("{}", .errors.join("\n"))]
    DependencyVersions { errors: Vec<String> },

    #[error("Required project file not found: {}", .path.display())]
    MissingProjectFile { path: PathBuf },

    #[error("Agent '{name}' not found. Available agents: {available}")]
    AgentNotFound { name: String, available: String },

    /// Every platform candidate was rejected for platform incompatibility.
    #[error(
        "uv pip install failed for all platform candidates ({}). Last error: {last_error}",
        .candidates.join(", ")
    )]
    PlatformInstallFailure {
        candidates: Vec<String>,
        last_error: String,
    },

    /// The installer failed for a reason other than platform support.
    /// Displays the installer's own output unchanged.
    #[error("{detail}")]
    InstallFailed { tool: String, detail: String },

    #[error("Packaged artifact exceeds {limit} bytes (actual: {actual}).")]
    ArtifactTooLarge { limit: u64, actual: u64 },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("packaging task aborted: {0}")]
    Join(String),
}

impl PackageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for packaging operations.
pub type PackageResult<T> = std::result::Result<T, PackageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_message_includes_hint() {
        let err = PackageError::MissingDependencyTool {
            binary: "uv".to_string(),
            hint: UV_INSTALL_HINT.to_string(),
        };
        assert_eq!(
            err.to_string(),
            "uv is required. Install uv from https://github.com/astral-sh/uv#installation and ensure it is on your PATH."
        );
    }

    #[test]
    fn exhaustion_names_candidates() {
        let err = PackageError::PlatformInstallFailure {
            candidates: vec!["a".to_string(), "b".to_string()],
            last_error: "no wheels".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("all platform candidates (a, b)"));
        assert!(text.ends_with("Last error: no wheels"));
    }

    #[test]
    fn build_and_runtime_messages() {
        let err = PackageError::UnsupportedBuildKind {
            language: Language::Python,
            build: BuildKind::Container,
        };
        assert_eq!(
            err.to_string(),
            "Python packager only supports CodeZip build type."
        );

        let err = PackageError::RuntimeMismatch {
            language: Language::Node,
            runtime: "PYTHON_3_12".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Node packager only supports Node runtimes. Received: PYTHON_3_12"
        );
    }

    #[test]
    fn size_error_matches_format() {
        let err = PackageError::ArtifactTooLarge {
            limit: 100,
            actual: 250,
        };
        assert_eq!(
            err.to_string(),
            "Packaged artifact exceeds 100 bytes (actual: 250)."
        );
    }
}
