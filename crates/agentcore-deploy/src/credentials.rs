//! Cloud credentials preflight.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

const ABSENT_SIGNATURES: &[&str] = &[
    "Unable to locate credentials",
    "NoCredentialProviders",
    "could not load credentials",
];

const EXPIRED_SIGNATURES: &[&str] = &[
    "ExpiredToken",
    "token has expired",
    "RequestExpired",
    "InvalidClientTokenId",
];

/// Who the current credentials belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid(CallerIdentity),
    /// Nothing configured. `detail` is the provider's own message.
    Absent { detail: String },
    /// Configured but rejected as expired.
    Expired { detail: String },
}

impl CredentialStatus {
    /// Turn a non-valid status into its typed error.
    pub fn into_identity(self) -> DeployResult<CallerIdentity> {
        match self {
            CredentialStatus::Valid(identity) => Ok(identity),
            CredentialStatus::Absent { detail } => Err(DeployError::CredentialsAbsent(detail)),
            CredentialStatus::Expired { detail } => Err(DeployError::CredentialsExpired(detail)),
        }
    }
}

#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Check credentials against `region`. Transport failures are errors;
    /// missing or expired credentials are statuses.
    async fn check(&self, region: &str) -> DeployResult<CredentialStatus>;
}

/// Classify a failed identity lookup by its error text.
pub fn classify_credentials_failure(detail: &str) -> Option<CredentialStatus> {
    let lower = detail.to_ascii_lowercase();
    let hit = |sigs: &[&str]| sigs.iter().any(|s| lower.contains(&s.to_ascii_lowercase()));
    if hit(EXPIRED_SIGNATURES) {
        Some(CredentialStatus::Expired {
            detail: detail.trim().to_string(),
        })
    } else if hit(ABSENT_SIGNATURES) {
        Some(CredentialStatus::Absent {
            detail: detail.trim().to_string(),
        })
    } else {
        None
    }
}
