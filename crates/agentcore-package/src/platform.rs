//! Platform candidates for native Python dependencies, and detection of
//! installer output that means "no wheel for this platform".

use std::sync::LazyLock;

use regex::Regex;

/// Platform tags tried in order when installing Python dependencies.
/// The runtime is always Linux on arm64.
pub const PYTHON_PLATFORM_CANDIDATES: &[&str] = &[
    "aarch64-manylinux2014",
    "aarch64-manylinux_2_28",
    "aarch64-manylinux_2_34",
];

static PLATFORM_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)platforms:\s*([^\n]+)").expect("platform hint regex"));
static MANYLINUX_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(manylinux[^\s,]+)").expect("manylinux token regex"));
static NO_WHEELS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(has no wheels with a matching platform tag|no compatible (?:wheels|tags) found)")
        .expect("no wheels regex")
});

/// An installer failure caused by missing platform support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIssue {
    /// The relevant lines of installer output.
    pub message: String,
    /// Platform tags the installer said were available, when it listed any.
    pub platforms: Vec<String>,
}

/// Candidate list with an optional caller override tried first.
pub fn platform_candidates(preferred: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(PYTHON_PLATFORM_CANDIDATES.len() + 1);
    for candidate in preferred.into_iter().chain(PYTHON_PLATFORM_CANDIDATES.iter().copied()) {
        if !out.iter().any(|c| c == candidate) {
            out.push(candidate.to_string());
        }
    }
    out
}

/// Inspect combined installer output for a platform-incompatibility signature.
pub fn detect_unavailable_platform(stdout: &str, stderr: &str) -> Option<PlatformIssue> {
    let combined = format!("{stdout}\n{stderr}");

    if let Some(hint) = PLATFORM_HINT.captures(&combined).and_then(|c| c.get(1)) {
        let platforms: Vec<String> = MANYLINUX_TOKEN
            .captures_iter(hint.as_str())
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect();
        if !platforms.is_empty() {
            return Some(PlatformIssue {
                message: relevant_block(&combined, &PLATFORM_HINT, 3),
                platforms,
            });
        }
    }

    if NO_WHEELS.is_match(&combined) {
        return Some(PlatformIssue {
            message: relevant_block(&combined, &NO_WHEELS, 3),
            platforms: Vec::new(),
        });
    }

    None
}

/// The first line matching `pattern` with `context` trimmed lines either side.
fn relevant_block(text: &str, pattern: &Regex, context: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let Some(index) = lines.iter().position(|line| pattern.is_match(line)) else {
        return text.trim().to_string();
    };
    let start = index.saturating_sub(context);
    let end = (index + context + 1).min(lines.len());
    lines[start..end]
        .iter()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
