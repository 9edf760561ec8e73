//! Stage composition.
//!
//! `Orchestrator` wires the engine to a control plane and a data store and
//! runs Build → Apply → Seed → Validate for one (client, environment) pair.
//! Each stage is also exposed on its own. Pairs share no mutable state, so
//! `run_many` simply drives them concurrently.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::{ControlPlaneHandle, DataStoreHandle};
use crate::engine::{DeploymentReport, ProvisionEngine};
use crate::errors::ConfigError;
use crate::model::{EnvironmentKey, SolutionConfig};
use crate::plan::{self, ProvisioningPlan};
use crate::registry;
use crate::seed::{self, EnvironmentSeedReport};
use crate::status::{self, StatusReport};
use crate::teardown::{self, TeardownReport};
use crate::validation::{self, EnvironmentValidationReport};

/// Result of a full run for one pair.
///
/// Seeding and validation only run after a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub deployment: DeploymentReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<EnvironmentSeedReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<EnvironmentValidationReport>,
    pub success: bool,
}

#[derive(Clone)]
pub struct Orchestrator {
    engine: ProvisionEngine,
    control_plane: ControlPlaneHandle,
    data_store: DataStoreHandle,
}

impl Orchestrator {
    pub fn new(
        engine: ProvisionEngine,
        control_plane: ControlPlaneHandle,
        data_store: DataStoreHandle,
    ) -> Self {
        Self {
            engine,
            control_plane,
            data_store,
        }
    }

    pub fn engine(&self) -> &ProvisionEngine {
        &self.engine
    }

    pub fn plan(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
    ) -> Result<ProvisioningPlan, ConfigError> {
        plan::build(cfg, client, env)
    }

    pub async fn deploy(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
    ) -> Result<DeploymentReport, ConfigError> {
        self.deploy_with_cancel(cfg, client, env, &CancellationToken::new())
            .await
    }

    pub async fn deploy_with_cancel(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
        cancel: &CancellationToken,
    ) -> Result<DeploymentReport, ConfigError> {
        let plan = plan::build(cfg, client, env)?;
        Ok(self
            .engine
            .apply_with_cancel(&plan, self.control_plane.as_ref(), cancel)
            .await)
    }

    pub async fn seed(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
    ) -> Result<EnvironmentSeedReport, ConfigError> {
        let env_cfg = registry::lookup(cfg, client, env)?;
        Ok(seed::seed_environment(self.data_store.as_ref(), client, env, env_cfg).await)
    }

    pub async fn validate(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
    ) -> Result<EnvironmentValidationReport, ConfigError> {
        let env_cfg = registry::lookup(cfg, client, env)?;
        Ok(validation::validate_environment(self.data_store.as_ref(), client, env, env_cfg).await)
    }

    /// Live status. An unknown pair is reported as unconfigured, not an error.
    pub async fn status(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
    ) -> StatusReport {
        let (Ok(env_cfg), Ok(plan)) = (
            registry::lookup(cfg, client, env),
            plan::build(cfg, client, env),
        ) else {
            return StatusReport::unconfigured(client, env);
        };

        status::probe(
            &plan,
            env_cfg,
            self.control_plane.as_ref(),
            self.data_store.as_ref(),
            self.engine.config().call_timeout,
            true,
        )
        .await
    }

    pub async fn teardown(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
        cancel: &CancellationToken,
    ) -> Result<TeardownReport, ConfigError> {
        let plan = plan::build(cfg, client, env)?;
        Ok(teardown::teardown(
            &plan,
            self.control_plane.as_ref(),
            self.engine.config(),
            cancel,
        )
        .await)
    }

    /// Build → Apply → Seed → Validate for one pair.
    pub async fn run(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
    ) -> Result<RunReport, ConfigError> {
        self.run_with_cancel(cfg, client, env, &CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::run`]; cancellation only affects the deployment stage.
    pub async fn run_with_cancel(
        &self,
        cfg: &SolutionConfig,
        client: &str,
        env: EnvironmentKey,
        cancel: &CancellationToken,
    ) -> Result<RunReport, ConfigError> {
        let deployment = self.deploy_with_cancel(cfg, client, env, cancel).await?;
        if !deployment.success {
            return Ok(RunReport {
                deployment,
                seed: None,
                validation: None,
                success: false,
            });
        }

        let seed = self.seed(cfg, client, env).await?;
        let validation = self.validate(cfg, client, env).await?;
        let success = seed.success && validation.success;

        Ok(RunReport {
            deployment,
            seed: Some(seed),
            validation: Some(validation),
            success,
        })
    }

    /// Run several pairs concurrently. Results keep the input order.
    pub async fn run_many(
        &self,
        cfg: &SolutionConfig,
        pairs: &[(String, EnvironmentKey)],
    ) -> Vec<Result<RunReport, ConfigError>> {
        join_all(
            pairs
                .iter()
                .map(|(client, env)| self.run(cfg, client, *env)),
        )
        .await
    }
}
