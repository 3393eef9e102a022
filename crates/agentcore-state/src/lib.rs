//! AgentCore State: project documents and their persistence
//!
//! This crate owns the three documents a project keeps under `agentcore/`:
//! the project spec, the deployment target list, and the deployed state.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: typed documents, validation, and a single owner for on-disk state.
//!
//! ## Key Components
//!
//! - `ConfigStore`: async read/write of typed documents
//! - `FsConfigStore`: JSON files under the project's config directory
//! - `PathResolver`: well-known paths and project discovery
//! - `MemoryConfigStore`: in-memory fake for tests

pub mod deployed;
mod error;
pub mod fakes;
pub mod fs_store;
pub mod paths;
pub mod schema;
pub mod store;

pub use deployed::{AgentResourceState, DeployedResourceState, DeployedState, TargetState};
pub use error::StateError;
pub use fs_store::FsConfigStore;
pub use paths::{find_config_root, PathResolver, CONFIG_DIR};
pub use schema::{
    validate_targets, AgentSpec, BuildKind, Credential, DeploymentTarget, Language, Memory,
    MemoryStrategy, MemoryStrategyType, NetworkMode, ProjectSpec, RuntimeVersion,
    SUPPORTED_REGIONS,
};
pub use store::{ConfigStore, StateResult};
