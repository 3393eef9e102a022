//! Deploy-level error taxonomy.

use std::path::PathBuf;

use agentcore_package::PackageError;
use agentcore_state::StateError;

/// Errors produced while orchestrating a deploy or destroy.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Package(#[from] PackageError),

    /// No credentials are configured at all.
    #[error("No AWS credentials found. Run `aws configure` or set AWS_PROFILE. ({0})")]
    CredentialsAbsent(String),

    /// Credentials exist but the session token is no longer valid.
    #[error("AWS credentials have expired. Re-authenticate and try again. ({0})")]
    CredentialsExpired(String),

    #[error("Deploy requires bootstrap of {environment}, which was skipped.")]
    BootstrapRequired { environment: String },

    #[error("{message}")]
    StackBlocked { stack_name: String, message: String },

    /// The toolkit reported a failure; `audit` holds every raw message seen
    /// during the run, oldest first.
    #[error("{operation} failed: {message}")]
    Toolkit {
        operation: String,
        message: String,
        audit: Vec<String>,
    },

    #[error("Stack {0} not found")]
    StackNotFound(String),

    #[error("No deployed stack found for project {project} target {target}")]
    NoDeployedStack { project: String, target: String },

    #[error("Deployment target '{name}' not found. Available targets: {available}")]
    TargetNotFound { name: String, available: String },

    #[error("No deployment targets configured. Add one to aws-targets.json.")]
    NoTargets,

    #[error("CDK project not found at {}.", .0.display())]
    CdkProjectMissing(PathBuf),

    #[error("aws {operation} failed: {detail}")]
    Aws { operation: String, detail: String },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("toolkit session already disposed")]
    SessionDisposed,
}

impl DeployError {
    pub(crate) fn toolkit(operation: &str, message: impl Into<String>) -> Self {
        DeployError::Toolkit {
            operation: operation.to_string(),
            message: message.into(),
            audit: Vec::new(),
        }
    }

    pub(crate) fn parse(what: impl Into<String>, source: serde_json::Error) -> Self {
        DeployError::Parse {
            what: what.into(),
            source,
        }
    }

    /// Attach the audit trail to a toolkit failure; other errors pass through.
    pub fn with_audit(self, lines: Vec<String>) -> Self {
        match self {
            DeployError::Toolkit {
                operation, message, ..
            } => DeployError::Toolkit {
                operation,
                message,
                audit: lines,
            },
            other => other,
        }
    }

    /// True for either credentials failure.
    pub fn is_credentials(&self) -> bool {
        matches!(
            self,
            DeployError::CredentialsAbsent(_) | DeployError::CredentialsExpired(_)
        )
    }
}

/// Result type for deploy operations.
pub type DeployResult<T> = std::result::Result<T, DeployError>;
