//! tenantops data models.
//!
//! - `solution`: the persisted client/environment registry document
//! - `resource`: resource kinds, states and creation specs shared with backends
//!
//! Models are mostly data. Higher layers (registry, planner, engine) apply
//! validation and policy.

pub mod resource;
pub mod solution;

pub use resource::{ResourceId, ResourceKind, ResourceSpec, ResourceState};
pub use solution::{
    BaselineRecord, ClientConfig, CollectionConfig, DataStoreConfig, EnvironmentConfig,
    EnvironmentKey, FunctionMapping, FunctionSet, SolutionConfig, SolutionInfo,
};
