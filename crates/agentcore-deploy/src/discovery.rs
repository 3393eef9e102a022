//! StackLocator: finds a project's deployed stacks by tag search.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeployResult;
use crate::metrics::METRICS;

pub const TAG_PROJECT_NAME: &str = "agentcore:project-name";
pub const TAG_TARGET_NAME: &str = "agentcore:target-name";
pub const STACK_RESOURCE_TYPE: &str = "cloudformation:stack";
/// Target assumed when a stack carries no target tag.
pub const DEFAULT_TARGET: &str = "default";

/// One page request against the tagging index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQuery {
    pub region: String,
    pub tag_key: String,
    pub tag_values: Vec<String>,
    pub resource_types: Vec<String>,
    pub pagination_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaggedResource {
    #[serde(rename = "ResourceARN")]
    pub resource_arn: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagPage {
    #[serde(default)]
    pub resource_tag_mapping_list: Vec<TaggedResource>,
    /// Absent or empty on the last page.
    pub pagination_token: Option<String>,
}

/// Paginated tag search over cloud resources.
#[async_trait]
pub trait TaggingClient: Send + Sync {
    async fn get_resources(&self, query: &TagQuery) -> DeployResult<TagPage>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredStack {
    pub stack_name: String,
    pub stack_arn: String,
    pub target_name: String,
}

/// Stack name from `arn:...:stack/NAME/ID`. Stack sets and other resource
/// kinds yield `None`.
pub fn parse_stack_name_from_arn(arn: &str) -> Option<&str> {
    let (_, path) = arn.split_once(":stack/")?;
    let name = path.split('/').next()?;
    (!name.is_empty()).then_some(name)
}

#[derive(Clone)]
pub struct StackLocator {
    client: Arc<dyn TaggingClient>,
}

impl StackLocator {
    pub fn new(client: Arc<dyn TaggingClient>) -> Self {
        Self { client }
    }

    /// Every stack tagged with `project_name`, across all pages.
    pub async fn discover_stacks_by_project(
        &self,
        region: &str,
        project_name: &str,
    ) -> DeployResult<Vec<DiscoveredStack>> {
        let mut stacks = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let query = TagQuery {
                region: region.to_string(),
                tag_key: TAG_PROJECT_NAME.to_string(),
                tag_values: vec![project_name.to_string()],
                resource_types: vec![STACK_RESOURCE_TYPE.to_string()],
                pagination_token: token.take(),
            };
            let page = self.client.get_resources(&query).await?;

            for resource in page.resource_tag_mapping_list {
                let Some(arn) = resource.resource_arn else {
                    continue;
                };
                let Some(stack_name) = parse_stack_name_from_arn(&arn) else {
                    continue;
                };
                let target_name = resource
                    .tags
                    .iter()
                    .find(|t| t.key == TAG_TARGET_NAME)
                    .map(|t| t.value.clone())
                    .unwrap_or_else(|| DEFAULT_TARGET.to_string());
                stacks.push(DiscoveredStack {
                    stack_name: stack_name.to_string(),
                    stack_arn: arn.clone(),
                    target_name,
                });
            }

            match page.pagination_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        debug!(project = %project_name, region = %region, count = stacks.len(), "discovered stacks");
        METRICS.add_stacks_discovered(stacks.len() as u64);
        Ok(stacks)
    }

    /// The stack for one target, or `None` when it has not been deployed.
    pub async fn find_stack(
        &self,
        region: &str,
        project_name: &str,
        target_name: &str,
    ) -> DeployResult<Option<DiscoveredStack>> {
        Ok(self
            .discover_stacks_by_project(region, project_name)
            .await?
            .into_iter()
            .find(|s| s.target_name == target_name))
    }
}
