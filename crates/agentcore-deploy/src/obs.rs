//! Structured lifecycle events for deploy and destroy runs.
//!
//! [`deploy_span`] tags everything logged during one orchestrator run with
//! the run id, project and target; the `emit_*` functions log one event each.

use tracing::{info, warn, Level, Span};

use crate::telemetry::toolkit_level;

/// Span for one run. Attach it with `tracing::Instrument` so it stays
/// current across awaits; `project` and `target` are recorded once known.
pub fn deploy_span(run_id: &str, operation: &str) -> Span {
    tracing::info_span!(
        "agentcore.deploy",
        run_id = %run_id,
        operation = %operation,
        project = tracing::field::Empty,
        target = tracing::field::Empty,
    )
}

/// Fill in the current run span's project and target.
pub fn record_target(project: &str, target: &str) {
    let span = Span::current();
    span.record("project", project);
    span.record("target", target);
}

pub fn emit_deploy_started(run_id: &str, operation: &str, project: &str, target: &str) {
    info!(
        event = "deploy.started",
        run_id = %run_id,
        operation = %operation,
        project = %project,
        target = %target,
    );
}

pub fn emit_phase(run_id: &str, from: &str, to: &str) {
    info!(event = "deploy.phase", run_id = %run_id, from = %from, to = %to);
}

pub fn emit_deploy_finished(run_id: &str, operation: &str, duration_ms: u64, success: bool) {
    info!(
        event = "deploy.finished",
        run_id = %run_id,
        operation = %operation,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Log a raw toolkit message at the level the toolkit assigned it.
pub fn emit_toolkit_message(code: &str, level: &str, message: &str) {
    let level = toolkit_level(level);
    if level == Level::ERROR {
        tracing::error!(event = "toolkit.message", code = %code, "{}", message);
    } else if level == Level::WARN {
        warn!(event = "toolkit.message", code = %code, "{}", message);
    } else if level == Level::DEBUG {
        tracing::debug!(event = "toolkit.message", code = %code, "{}", message);
    } else {
        info!(event = "toolkit.message", code = %code, "{}", message);
    }
}

pub fn emit_state_persisted(target: &str, stack_name: &str, agents: usize) {
    info!(
        event = "state.persisted",
        target = %target,
        stack_name = %stack_name,
        agents = agents,
    );
}

/// The stack is gone but local bookkeeping could not be updated.
pub fn emit_destroy_cleanup_failed(target: &str, error: &dyn std::fmt::Display) {
    warn!(event = "destroy.cleanup_failed", target = %target, error = %error);
}
