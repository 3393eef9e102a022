//! Cloud reads through the `aws` command line.
//!
//! [`AwsCli`] implements the tagging search, stack reads and the
//! credentials check by invoking `aws ... --output json` through a
//! [`ProcessRunner`] and parsing its JSON with serde.

use std::sync::Arc;

use agentcore_package::{CommandSpec, ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::cloudformation::{StackDescription, StackStatusReader};
use crate::credentials::{
    classify_credentials_failure, CallerIdentity, CredentialStatus, CredentialsProvider,
};
use crate::discovery::{TagPage, TagQuery, TaggingClient};
use crate::error::{DeployError, DeployResult};

#[derive(Clone)]
pub struct AwsCli {
    runner: Arc<dyn ProcessRunner>,
    binary: String,
    profile: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacks {
    #[serde(default)]
    stacks: Vec<StackDescription>,
}

impl AwsCli {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            binary: "aws".to_string(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    fn command(&self, service: &str, operation: &str, region: &str) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.binary)
            .args([service, operation, "--region", region, "--output", "json"]);
        if let Some(profile) = &self.profile {
            cmd = cmd.args(["--profile", profile.as_str()]);
        }
        cmd
    }

    async fn run(&self, operation: &str, cmd: &CommandSpec) -> DeployResult<ProcessOutput> {
        if self.runner.locate(&self.binary).is_none() {
            return Err(DeployError::Aws {
                operation: operation.to_string(),
                detail: format!("{} CLI not found on PATH", self.binary),
            });
        }
        Ok(self.runner.run(cmd).await?)
    }

    fn failure(operation: &str, output: &ProcessOutput) -> DeployError {
        DeployError::Aws {
            operation: operation.to_string(),
            detail: output.failure_detail(|| format!("exit code {}", output.code)),
        }
    }

    fn parse<T: DeserializeOwned>(what: &str, output: &ProcessOutput) -> DeployResult<T> {
        serde_json::from_str(&output.stdout).map_err(|e| DeployError::parse(what, e))
    }
}

#[async_trait]
impl TaggingClient for AwsCli {
    async fn get_resources(&self, query: &TagQuery) -> DeployResult<TagPage> {
        const OP: &str = "resourcegroupstaggingapi get-resources";
        // One service page per call; StackLocator follows PaginationToken itself.
        let mut cmd = self
            .command("resourcegroupstaggingapi", "get-resources", &query.region)
            .arg("--no-paginate")
            .arg("--tag-filters")
            .arg(format!("Key={},Values={}", query.tag_key, query.tag_values.join(",")));
        if !query.resource_types.is_empty() {
            cmd = cmd
                .arg("--resource-type-filters")
                .args(query.resource_types.iter().cloned());
        }
        if let Some(token) = &query.pagination_token {
            cmd = cmd.args(["--pagination-token", token.as_str()]);
        }

        let output = self.run(OP, &cmd).await?;
        if !output.success() {
            return Err(Self::failure(OP, &output));
        }
        Self::parse("tagging response", &output)
    }
}

#[async_trait]
impl StackStatusReader for AwsCli {
    async fn describe_stack(
        &self,
        region: &str,
        stack_name: &str,
    ) -> DeployResult<Option<StackDescription>> {
        const OP: &str = "cloudformation describe-stacks";
        let cmd = self
            .command("cloudformation", "describe-stacks", region)
            .args(["--stack-name", stack_name]);

        let output = self.run(OP, &cmd).await?;
        if !output.success() {
            if output.combined().contains("does not exist") {
                return Ok(None);
            }
            return Err(Self::failure(OP, &output));
        }
        let parsed: DescribeStacks = Self::parse("describe-stacks response", &output)?;
        Ok(parsed.stacks.into_iter().next())
    }
}

#[async_trait]
impl CredentialsProvider for AwsCli {
    async fn check(&self, region: &str) -> DeployResult<CredentialStatus> {
        const OP: &str = "sts get-caller-identity";
        let cmd = self.command("sts", "get-caller-identity", region);

        let output = self.run(OP, &cmd).await?;
        if output.success() {
            let identity: CallerIdentity = Self::parse("caller identity", &output)?;
            return Ok(CredentialStatus::Valid(identity));
        }
        classify_credentials_failure(&output.combined()).ok_or_else(|| Self::failure(OP, &output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_package::fakes::ScriptedProcessRunner;

    fn cli(runner: &Arc<ScriptedProcessRunner>) -> AwsCli {
        AwsCli::new(runner.clone()).with_profile(Some("dev".to_string()))
    }

    fn stdout(body: &str) -> ProcessOutput {
        ProcessOutput {
            stdout: body.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tag_query_arguments_and_parsing() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["aws"]));
        runner.push_output(stdout(
            r#"{
                "PaginationToken": "next",
                "ResourceTagMappingList": [{
                    "ResourceARN": "arn:aws:cloudformation:us-east-1:1:stack/S/1",
                    "Tags": [{"Key": "agentcore:project-name", "Value": "ProjA"}]
                }]
            }"#,
        ));

        let page = cli(&runner)
            .get_resources(&TagQuery {
                region: "us-east-1".to_string(),
                tag_key: "agentcore:project-name".to_string(),
                tag_values: vec!["ProjA".to_string()],
                resource_types: vec!["cloudformation:stack".to_string()],
                pagination_token: Some("prev".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(page.pagination_token.as_deref(), Some("next"));
        assert_eq!(page.resource_tag_mapping_list[0].tags[0].value, "ProjA");

        let args = &runner.calls()[0].args;
        assert_eq!(args[..2], ["resourcegroupstaggingapi", "get-resources"]);
        assert!(args.contains(&"Key=agentcore:project-name,Values=ProjA".to_string()));
        assert!(args.contains(&"--no-paginate".to_string()));
        assert!(args.windows(2).any(|w| w == ["--pagination-token", "prev"]));
        assert!(!args.contains(&"--starting-token".to_string()));
        assert!(args.windows(2).any(|w| w == ["--profile", "dev"]));
    }

    #[tokio::test]
    async fn missing_stack_is_none() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["aws"]));
        runner.push_failure(
            254,
            "",
            "An error occurred (ValidationError) when calling the DescribeStacks operation: Stack with id Nope does not exist",
        );
        assert!(cli(&runner)
            .describe_stack("us-east-1", "Nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn describes_existing_stack() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["aws"]));
        runner.push_output(stdout(
            r#"{"Stacks": [{"StackName": "S", "StackStatus": "UPDATE_COMPLETE",
                "Outputs": [{"OutputKey": "BucketName", "OutputValue": "x"}]}]}"#,
        ));
        let stack = cli(&runner)
            .describe_stack("us-east-1", "S")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stack.stack_status.as_deref(), Some("UPDATE_COMPLETE"));
        assert_eq!(stack.outputs[0].output_value.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn credentials_are_classified() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["aws"]));
        runner.push_output(stdout(
            r#"{"UserId": "AID", "Account": "123456789012", "Arn": "arn:aws:iam::123456789012:user/me"}"#,
        ));
        runner.push_failure(255, "", "Unable to locate credentials. You can configure credentials by running \"aws configure\".");
        runner.push_failure(255, "", "An error occurred (ExpiredToken) when calling the GetCallerIdentity operation");
        runner.push_failure(255, "", "Could not connect to the endpoint URL");
        let aws = cli(&runner);

        match aws.check("us-east-1").await.unwrap() {
            CredentialStatus::Valid(identity) => assert_eq!(identity.account, "123456789012"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(aws.check("us-east-1").await.unwrap(), CredentialStatus::Absent { .. }));
        assert!(matches!(aws.check("us-east-1").await.unwrap(), CredentialStatus::Expired { .. }));
        assert!(matches!(aws.check("us-east-1").await.unwrap_err(), DeployError::Aws { .. }));
    }

    #[tokio::test]
    async fn missing_cli_is_reported() {
        let runner = Arc::new(ScriptedProcessRunner::with_binaries(["uv"]));
        let err = cli(&runner).check("us-east-1").await.unwrap_err();
        assert!(err.to_string().contains("aws CLI not found on PATH"));
        assert!(runner.calls().is_empty());
    }
}
