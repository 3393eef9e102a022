//! CloudFormation stack reads: bootstrap status, deployability, outputs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// Stack created by `cdk bootstrap`.
pub const CDK_TOOLKIT_STACK_NAME: &str = "CDKToolkit";

const IN_PROGRESS_STATUSES: &[&str] = &[
    "CREATE_IN_PROGRESS",
    "UPDATE_IN_PROGRESS",
    "DELETE_IN_PROGRESS",
    "ROLLBACK_IN_PROGRESS",
    "UPDATE_ROLLBACK_IN_PROGRESS",
    "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
    "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
    "DELETE_COMPLETE_CLEANUP_IN_PROGRESS",
    "REVIEW_IN_PROGRESS",
    "IMPORT_IN_PROGRESS",
    "IMPORT_ROLLBACK_IN_PROGRESS",
];

const FAILED_STATUSES: &[&str] = &[
    "CREATE_FAILED",
    "ROLLBACK_FAILED",
    "DELETE_FAILED",
    "UPDATE_ROLLBACK_FAILED",
    "IMPORT_ROLLBACK_FAILED",
];

const BOOTSTRAP_USABLE: &[&str] = &["CREATE_COMPLETE", "UPDATE_COMPLETE", "UPDATE_ROLLBACK_COMPLETE"];

/// One stack output as CloudFormation reports it; either half may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackOutput {
    pub output_key: Option<String>,
    pub output_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackDescription {
    pub stack_name: String,
    pub stack_status: Option<String>,
    #[serde(default)]
    pub outputs: Vec<StackOutput>,
}

/// Reads stack descriptions. `Ok(None)` means the stack does not exist.
#[async_trait]
pub trait StackStatusReader: Send + Sync {
    async fn describe_stack(
        &self,
        region: &str,
        stack_name: &str,
    ) -> DeployResult<Option<StackDescription>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStatus {
    pub is_bootstrapped: bool,
    pub stack_status: Option<String>,
}

/// The environment is bootstrapped when the toolkit stack exists in a usable state.
pub async fn check_bootstrap_status(
    reader: &dyn StackStatusReader,
    region: &str,
) -> DeployResult<BootstrapStatus> {
    let Some(stack) = reader.describe_stack(region, CDK_TOOLKIT_STACK_NAME).await? else {
        return Ok(BootstrapStatus {
            is_bootstrapped: false,
            stack_status: None,
        });
    };
    let is_bootstrapped = stack
        .stack_status
        .as_deref()
        .is_some_and(|s| BOOTSTRAP_USABLE.contains(&s));
    Ok(BootstrapStatus {
        is_bootstrapped,
        stack_status: stack.stack_status,
    })
}

/// `aws://{account}/{region}`
pub fn format_cdk_environment(account: &str, region: &str) -> String {
    format!("aws://{account}/{region}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackStatusResult {
    pub can_deploy: bool,
    pub exists: bool,
    pub status: Option<String>,
    /// Why deploy is blocked, when it is.
    pub message: Option<String>,
}

pub async fn check_stack_status(
    reader: &dyn StackStatusReader,
    region: &str,
    stack_name: &str,
) -> DeployResult<StackStatusResult> {
    let Some(stack) = reader.describe_stack(region, stack_name).await? else {
        return Ok(StackStatusResult {
            can_deploy: true,
            exists: false,
            status: None,
            message: None,
        });
    };
    let Some(status) = stack.stack_status else {
        return Ok(StackStatusResult {
            can_deploy: true,
            exists: true,
            status: None,
            message: None,
        });
    };

    let message = if IN_PROGRESS_STATUSES.contains(&status.as_str()) {
        Some(format!(
            "Stack \"{stack_name}\" is currently in {status} state. Please wait for the operation to complete before deploying."
        ))
    } else if FAILED_STATUSES.contains(&status.as_str()) {
        Some(format!(
            "Stack \"{stack_name}\" is in {status} state. Manual intervention may be required before deploying."
        ))
    } else {
        None
    };

    Ok(StackStatusResult {
        can_deploy: message.is_none(),
        exists: true,
        status: Some(status),
        message,
    })
}

/// The first stack that blocks deploy, if any.
pub async fn check_stack_deployability(
    reader: &dyn StackStatusReader,
    region: &str,
    stack_names: &[String],
) -> DeployResult<Option<(String, StackStatusResult)>> {
    for name in stack_names {
        let result = check_stack_status(reader, region, name).await?;
        if !result.can_deploy {
            return Ok(Some((name.clone(), result)));
        }
    }
    Ok(None)
}

/// Output key to value, skipping outputs with a missing key or value.
pub async fn get_stack_outputs(
    reader: &dyn StackStatusReader,
    region: &str,
    stack_name: &str,
) -> DeployResult<BTreeMap<String, String>> {
    let stack = reader
        .describe_stack(region, stack_name)
        .await?
        .ok_or_else(|| DeployError::StackNotFound(stack_name.to_string()))?;
    Ok(stack
        .outputs
        .into_iter()
        .filter_map(|o| Some((o.output_key?, o.output_value?)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeCloudFormation;

    #[tokio::test]
    async fn missing_toolkit_stack_needs_bootstrap() {
        let cfn = FakeCloudFormation::new();
        let status = check_bootstrap_status(&cfn, "us-east-1").await.unwrap();
        assert!(!status.is_bootstrapped);
        assert_eq!(status.stack_status, None);
    }

    #[tokio::test]
    async fn toolkit_stack_usable_states() {
        for (status, usable) in [
            ("CREATE_COMPLETE", true),
            ("UPDATE_ROLLBACK_COMPLETE", true),
            ("ROLLBACK_COMPLETE", false),
            ("DELETE_IN_PROGRESS", false),
        ] {
            let cfn = FakeCloudFormation::new();
            cfn.put_stack("us-east-1", CDK_TOOLKIT_STACK_NAME, status, &[]);
            let got = check_bootstrap_status(&cfn, "us-east-1").await.unwrap();
            assert_eq!(got.is_bootstrapped, usable, "{status}");
        }
    }

    #[tokio::test]
    async fn in_progress_and_failed_stacks_block() {
        let cfn = FakeCloudFormation::new();
        cfn.put_stack("us-east-1", "A", "UPDATE_COMPLETE", &[]);
        cfn.put_stack("us-east-1", "B", "UPDATE_IN_PROGRESS", &[]);
        cfn.put_stack("us-east-1", "C", "ROLLBACK_FAILED", &[]);

        let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let (name, result) = check_stack_deployability(&cfn, "us-east-1", &names)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(name, "B");
        assert_eq!(
            result.message.as_deref(),
            Some("Stack \"B\" is currently in UPDATE_IN_PROGRESS state. Please wait for the operation to complete before deploying.")
        );

        let failed = check_stack_status(&cfn, "us-east-1", "C").await.unwrap();
        assert!(failed.message.unwrap().contains("Manual intervention may be required"));
    }

    #[tokio::test]
    async fn missing_stack_is_deployable() {
        let cfn = FakeCloudFormation::new();
        let result = check_stack_status(&cfn, "us-east-1", "Nope").await.unwrap();
        assert!(result.can_deploy);
        assert!(!result.exists);
        let names = vec!["Nope".to_string()];
        assert!(check_stack_deployability(&cfn, "us-east-1", &names)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn outputs_skip_incomplete_entries() {
        let cfn = FakeCloudFormation::new();
        cfn.put_stack_description(
            "us-east-1",
            StackDescription {
                stack_name: "S".to_string(),
                stack_status: Some("CREATE_COMPLETE".to_string()),
                outputs: vec![
                    StackOutput {
                        output_key: Some("BucketName".to_string()),
                        output_value: Some("x".to_string()),
                    },
                    StackOutput {
                        output_key: Some("NoValue".to_string()),
                        output_value: None,
                    },
                    StackOutput {
                        output_key: None,
                        output_value: Some("orphan".to_string()),
                    },
                ],
            },
        );

        let outputs = get_stack_outputs(&cfn, "us-east-1", "S").await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs["BucketName"], "x");

        let err = get_stack_outputs(&cfn, "us-east-1", "Missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Stack Missing not found");
    }

    #[test]
    fn environment_format() {
        assert_eq!(
            format_cdk_environment("123456789012", "us-west-2"),
            "aws://123456789012/us-west-2"
        );
    }
}
