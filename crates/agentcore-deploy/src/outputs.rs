//! Maps CloudFormation stack outputs back to per-agent resource state.
//!
//! The CDK app exports one output per agent field, named
//! `ApplicationAgent{PascalName}{Field}Output{hash}`.

use std::collections::BTreeMap;

use agentcore_state::AgentResourceState;

const OUTPUT_PREFIX: &str = "ApplicationAgent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    RuntimeId,
    RuntimeArn,
    RoleArn,
    MemoryIds,
    BrowserId,
    CodeInterpreterId,
}

const FIELDS: &[(&str, Field)] = &[
    ("RuntimeId", Field::RuntimeId),
    ("RuntimeArn", Field::RuntimeArn),
    ("RoleArn", Field::RoleArn),
    ("MemoryIds", Field::MemoryIds),
    ("BrowserId", Field::BrowserId),
    ("CodeInterpreterId", Field::CodeInterpreterId),
];

/// `my_agent` -> `MyAgent`, `data-pipeline` -> `DataPipeline`.
pub fn to_pascal_id(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn match_field(key: &str, pascal: &str) -> Option<Field> {
    let rest = key.strip_prefix(OUTPUT_PREFIX)?.strip_prefix(pascal)?;
    FIELDS.iter().find_map(|(label, field)| {
        rest.strip_prefix(label)
            .filter(|tail| tail.starts_with("Output"))
            .map(|_| *field)
    })
}

#[derive(Default)]
struct Partial {
    runtime_id: Option<String>,
    runtime_arn: Option<String>,
    role_arn: Option<String>,
    memory_ids: Option<Vec<String>>,
    browser_id: Option<String>,
    code_interpreter_id: Option<String>,
}

impl Partial {
    fn set(&mut self, field: Field, value: &str) {
        let value = value.to_string();
        match field {
            Field::RuntimeId => self.runtime_id = Some(value),
            Field::RuntimeArn => self.runtime_arn = Some(value),
            Field::RoleArn => self.role_arn = Some(value),
            Field::MemoryIds => {
                self.memory_ids = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }
            Field::BrowserId => self.browser_id = Some(value),
            Field::CodeInterpreterId => self.code_interpreter_id = Some(value),
        }
    }

    fn finish(self) -> Option<AgentResourceState> {
        Some(AgentResourceState {
            runtime_id: self.runtime_id?,
            runtime_arn: self.runtime_arn?,
            role_arn: self.role_arn?,
            session_id: None,
            memory_ids: self.memory_ids,
            browser_id: self.browser_id,
            code_interpreter_id: self.code_interpreter_id,
        })
    }
}

/// Resource state for each named agent that has all required outputs.
///
/// Agents missing any of runtime id, runtime ARN or role ARN are skipped;
/// outputs that belong to no listed agent are ignored.
pub fn parse_agent_outputs(
    outputs: &BTreeMap<String, String>,
    stack_name: &str,
    agent_names: &[&str],
) -> BTreeMap<String, AgentResourceState> {
    let mut parsed = BTreeMap::new();
    for name in agent_names {
        let pascal = to_pascal_id(name);
        let mut partial = Partial::default();
        for (key, value) in outputs {
            if let Some(field) = match_field(key, &pascal) {
                partial.set(field, value);
            }
        }
        match partial.finish() {
            Some(state) => {
                parsed.insert(name.to_string(), state);
            }
            None => tracing::debug!(agent = %name, stack = %stack_name, "incomplete agent outputs"),
        }
    }
    parsed
}
