//! Error types for agentcore-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, reading, validating, or writing config documents
#[derive(Error, Debug)]
pub enum StateError {
    /// No `agentcore/agentcore.json` was found walking up from the start directory
    #[error("No agentcore project found. Run \"agentcore create\" first.")]
    NoProject,

    /// Config file does not exist
    #[error("{file_type} config file not found at: {}", .path.display())]
    NotFound { path: PathBuf, file_type: String },

    /// Config file exists but could not be read
    #[error("Failed to read config file at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected shape
    #[error("Failed to parse JSON in config file at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Document parsed but broke one or more rules
    #[error("{}:\n{}", .path.display(), format_issues(.issues))]
    Validation {
        path: PathBuf,
        file_type: String,
        issues: Vec<String>,
    },

    /// Config file (or its directory) could not be written
    #[error("Failed to write config file at {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
}

impl StateError {
    /// Validation issues carried by this error, empty for other variants.
    pub fn issues(&self) -> &[String] {
        match self {
            StateError::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}

fn format_issues(issues: &[String]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {issue}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_issue() {
        let err = StateError::Validation {
            path: PathBuf::from("agentcore/agentcore.json"),
            file_type: "AgentCore Project Config".to_string(),
            issues: vec![
                "name: Project name is required".to_string(),
                "agents[1].name: Duplicate agent name: A".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("agentcore/agentcore.json:\n"));
        assert!(text.contains("  - name: Project name is required"));
        assert!(text.contains("  - agents[1].name: Duplicate agent name: A"));
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn not_found_names_file_type() {
        let err = StateError::NotFound {
            path: PathBuf::from("/p/agentcore/aws-targets.json"),
            file_type: "AWS Targets".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "AWS Targets config file not found at: /p/agentcore/aws-targets.json"
        );
    }
}
