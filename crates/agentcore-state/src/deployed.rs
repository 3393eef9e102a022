//! Deployed-state document (`deployed-state.json`).
//!
//! Keys of [`DeployedState::targets`] refer to deployment target names by
//! value. Nothing structural stops a target from being removed while its
//! state lingers; [`DeployedState::check_targets`] reports such orphans.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Remote identifiers recorded for one deployed agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResourceState {
    pub runtime_id: String,
    pub runtime_arn: String,
    pub role_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_interpreter_id: Option<String>,
}

/// Everything known about one target's deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedResourceState {
    #[serde(default)]
    pub agents: BTreeMap<String, AgentResourceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_kms_key_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    #[serde(default)]
    pub resources: DeployedResourceState,
}

/// Contents of `deployed-state.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedState {
    #[serde(default)]
    pub targets: BTreeMap<String, TargetState>,
}

impl DeployedState {
    pub fn target(&self, name: &str) -> Option<&TargetState> {
        self.targets.get(name)
    }

    /// Copy of this state with `name` removed. Other targets are untouched.
    pub fn without_target(&self, name: &str) -> DeployedState {
        let mut next = self.clone();
        next.targets.remove(name);
        next
    }

    /// Names present in this document but absent from `known_targets`.
    pub fn orphaned_targets<'a>(&'a self, known_targets: &[&str]) -> Vec<&'a str> {
        self.targets
            .keys()
            .map(String::as_str)
            .filter(|name| !known_targets.contains(name))
            .collect()
    }

    pub fn check_targets(&self, known_targets: &[&str]) -> Result<(), Vec<String>> {
        let orphans = self.orphaned_targets(known_targets);
        if orphans.is_empty() {
            return Ok(());
        }
        Err(vec![format!(
            "targets: Deployed state contains target names not present in aws-targets: {}",
            orphans.join(", ")
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_document() {
        let json = r#"{
            "targets": {
                "default": {
                    "resources": {
                        "agents": {
                            "Main": {
                                "runtimeId": "rt-1",
                                "runtimeArn": "arn:aws:bedrock-agentcore:us-east-1:1:runtime/rt-1",
                                "roleArn": "arn:aws:iam::1:role/r",
                                "memoryIds": ["m-1", "m-2"]
                            }
                        },
                        "stackName": "AgentCore-ProjA-default"
                    }
                }
            }
        }"#;
        let state: DeployedState = serde_json::from_str(json).unwrap();
        let resources = &state.target("default").unwrap().resources;
        assert_eq!(
            resources.stack_name.as_deref(),
            Some("AgentCore-ProjA-default")
        );
        let main = &resources.agents["Main"];
        assert_eq!(main.runtime_id, "rt-1");
        assert_eq!(
            main.memory_ids.as_deref(),
            Some(&["m-1".to_string(), "m-2".to_string()][..])
        );
        assert!(main.browser_id.is_none());
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let mut state = DeployedState::default();
        state.targets.insert("dev".to_string(), TargetState::default());
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"targets":{"dev":{"resources":{"agents":{}}}}}"#);
    }

    #[test]
    fn orphans_are_detected() {
        let mut state = DeployedState::default();
        state.targets.insert("dev".to_string(), TargetState::default());
        state.targets.insert("gone".to_string(), TargetState::default());

        assert_eq!(state.orphaned_targets(&["dev"]), vec!["gone"]);
        let issues = state.check_targets(&["dev"]).unwrap_err();
        assert!(issues[0].contains("not present in aws-targets: gone"));
        assert!(state.check_targets(&["dev", "gone"]).is_ok());
    }

    #[test]
    fn without_target_keeps_siblings() {
        let mut state = DeployedState::default();
        state.targets.insert("dev".to_string(), TargetState::default());
        state.targets.insert("prod".to_string(), TargetState::default());
        let next = state.without_target("dev");
        assert!(next.target("dev").is_none());
        assert_eq!(next.target("prod"), state.target("prod"));
    }
}
