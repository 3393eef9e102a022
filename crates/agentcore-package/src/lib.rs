//! AgentCore Package: turns an agent's source tree into a deployable zip
//!
//! ## Layer 1 - Build
//!
//! Focus: installing runtime dependencies for the Linux arm64 target,
//! staging them with the agent source, and emitting a deterministic,
//! size-bounded archive.
//!
//! ## Key Components
//!
//! - `Packager`: closed set of per-language packagers (Python via `uv`, Node via `npm`)
//! - `ProcessRunner`: seam for child processes, blocking or awaited
//! - `ArchiveBuilder`: staging copy, deterministic zip, size ceiling
//! - `detect_unavailable_platform`: recognizes "no wheel for this platform" failures
//! - `check_dependency_versions`: Node and uv minimum-version checks

pub mod archive;
mod error;
pub mod fakes;
pub mod obs;
pub mod packager;
pub mod platform;
pub mod process;
pub mod shebang;
pub mod versions;

pub use archive::{ArchiveBuilder, ArtifactResult, MAX_ARTIFACT_BYTES};
pub use error::{PackageError, PackageResult, NPM_INSTALL_HINT, UV_INSTALL_HINT};
pub use packager::{
    extract_node_version, extract_python_version, pack_all, pack_runtime, pack_runtime_blocking,
    resolve_project_paths, select_packager, validate_agent_exists, NodePackager, PackageOptions,
    Packager, ProjectPaths, PythonPackager,
};
pub use platform::{
    detect_unavailable_platform, platform_candidates, PlatformIssue, PYTHON_PLATFORM_CANDIDATES,
};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, SystemProcessRunner};
pub use versions::{
    check_dependency_versions, check_node_version, check_uv_version, parse_version, requires_uv,
    DependencyCheck, VersionCheck, NODE_MIN_VERSION, UV_MIN_VERSION,
};
