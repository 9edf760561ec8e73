//! tenantops-core
//!
//! Core of the tenantops multi-tenant deployment orchestrator:
//! - client/environment registry (load, validate, lookup, add, save)
//! - deterministic resource naming
//! - dependency-ordered provisioning plans
//! - idempotent, retry-safe plan execution with bounded parallelism
//! - baseline data seeding and validation
//! - live status probing and compensating teardown
//!
//! The crate performs no I/O of its own besides reading and writing the
//! registry document; cloud access goes through the [`backend`] traits.

pub mod backend;
pub mod config;
pub mod engine;
pub mod errors;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod seed;
pub mod status;
pub mod teardown;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use crate::errors::{TenantOpsError, TenantOpsResult};

/// Convenience re-exports.
pub mod prelude {
    pub use crate::backend::{
        CollectionRef, ControlPlane, ControlPlaneHandle, DataStore, DataStoreHandle,
        InsertOutcome, MemoryBackend,
    };
    pub use crate::config::{validate_config, EngineConfig, RetryPolicy};
    pub use crate::engine::{DeploymentReport, FailureReason, ProvisionEngine, StepOutcome, StepResult};
    pub use crate::errors::{
        ConfigError, DataStoreError, PermanentKind, ProvisionError, TransientKind,
    };
    pub use crate::model::{
        BaselineRecord, ClientConfig, EnvironmentConfig, EnvironmentKey, ResourceId, ResourceKind,
        ResourceSpec, ResourceState, SolutionConfig,
    };
    pub use crate::naming::NameDeriver;
    pub use crate::orchestrator::{Orchestrator, RunReport};
    pub use crate::plan::{ProvisioningPlan, ProvisioningStep};
    pub use crate::seed::{EnvironmentSeedReport, SeedResult};
    pub use crate::status::{EnvironmentPhase, StatusReport};
    pub use crate::teardown::{DeleteOutcome, TeardownReport};
    pub use crate::validation::{EnvironmentValidationReport, ValidationResult};
    pub use crate::{TenantOpsError, TenantOpsResult};
}
