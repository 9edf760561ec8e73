//! Compensating deletion.
//!
//! Deletes the resources of a plan in reverse plan order, one at a time, so
//! dependents go before what they depend on. Transient errors are retried
//! under the engine's retry policy. A failed delete is recorded and the
//! remaining resources are still attempted.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::ControlPlane;
use crate::config::EngineConfig;
use crate::engine::retry::{backoff, with_timeout};
use crate::model::{EnvironmentKey, ResourceKind};
use crate::plan::{ProvisioningPlan, ProvisioningStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteOutcome {
    Deleted,
    Absent,
    Failed,
}

impl DeleteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Absent => "absent",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: DeleteOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub client: String,
    pub env: EnvironmentKey,
    /// In deletion order (reverse plan order).
    pub steps: Vec<DeleteResult>,
    pub success: bool,
}

impl TeardownReport {
    pub fn count(&self, outcome: DeleteOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }
}

/// Delete every resource of `plan`, newest first.
pub async fn teardown(
    plan: &ProvisioningPlan,
    cp: &dyn ControlPlane,
    cfg: &EngineConfig,
    cancel: &CancellationToken,
) -> TeardownReport {
    tracing::info!(client = %plan.client, env = %plan.env, steps = plan.len(), "tearing down");

    let mut steps = Vec::with_capacity(plan.len());
    for step in plan.steps.iter().rev() {
        let res = delete_step(step, cp, cfg, cancel).await;
        match res.outcome {
            DeleteOutcome::Failed => tracing::error!(
                kind = %res.kind,
                name = %res.name,
                detail = res.detail.as_deref().unwrap_or_default(),
                "delete failed"
            ),
            outcome => tracing::info!(
                kind = %res.kind,
                name = %res.name,
                outcome = outcome.as_str(),
                "resource removed"
            ),
        }
        steps.push(res);
    }

    let success = steps.iter().all(|s| s.outcome != DeleteOutcome::Failed);
    TeardownReport {
        client: plan.client.clone(),
        env: plan.env,
        steps,
        success,
    }
}

async fn delete_step(
    step: &ProvisioningStep,
    cp: &dyn ControlPlane,
    cfg: &EngineConfig,
    cancel: &CancellationToken,
) -> DeleteResult {
    let id = step.spec.id();
    let mut retries_used: u32 = 0;

    let (outcome, detail) = loop {
        if cancel.is_cancelled() {
            break (DeleteOutcome::Failed, Some("cancelled".to_string()));
        }
        match with_timeout(cfg.call_timeout, cp.delete_resource(&id)).await {
            Ok(true) => break (DeleteOutcome::Deleted, None),
            Ok(false) => break (DeleteOutcome::Absent, None),
            Err(e) if e.is_transient() && retries_used + 1 < cfg.retry.max_attempts => {
                tracing::warn!(resource = %id, error = %e, "retrying delete");
                if !backoff(&cfg.retry, retries_used, cancel).await {
                    break (DeleteOutcome::Failed, Some(format!("cancelled while retrying: {e}")));
                }
                retries_used += 1;
            }
            Err(e) => break (DeleteOutcome::Failed, Some(e.to_string())),
        }
    };

    DeleteResult {
        kind: step.kind,
        name: step.name.clone(),
        outcome,
        detail,
        attempts: retries_used + 1,
    }
}
