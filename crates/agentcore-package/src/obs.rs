//! Structured packaging events.

use tracing::{info, warn};

/// One installer invocation against a platform candidate (or `-` for Node).
pub fn emit_install_attempt(agent: &str, tool: &str, platform: &str, attempt: usize) {
    info!(
        event = "package.install_attempt",
        agent = %agent,
        tool = %tool,
        platform = %platform,
        attempt = attempt,
    );
}

/// A candidate was rejected for platform incompatibility; the next one follows.
pub fn emit_platform_fallback(agent: &str, platform: &str, reason: &str) {
    warn!(
        event = "package.platform_fallback",
        agent = %agent,
        platform = %platform,
        reason = %reason,
    );
}

pub fn emit_artifact_packed(agent: &str, path: &str, size_bytes: u64, sha256: &str) {
    info!(
        event = "package.finished",
        agent = %agent,
        artifact = %path,
        size_bytes = size_bytes,
        sha256 = %sha256,
    );
}

pub fn emit_version_check(binary: &str, current: &str, required: &str, satisfied: bool) {
    if satisfied {
        info!(
            event = "package.version_check",
            binary = %binary,
            current = %current,
            required = %required,
        );
    } else {
        warn!(
            event = "package.version_check",
            binary = %binary,
            current = %current,
            required = %required,
            satisfied = false,
        );
    }
}
