//! Provision engine.
//!
//! Applies a [`ProvisioningPlan`] against a [`ControlPlane`]:
//! - dependency-driven scheduling: a step starts once every dependency is terminal
//! - bounded parallelism over independent steps (`max_concurrency`)
//! - probe before create; existing resources are never re-created
//! - transient errors retried with exponential backoff, permanent ones fail fast
//! - readiness polling after create instead of fixed sleeps
//!
//! `apply` never fails as a whole. Every failure is isolated to its step and
//! the steps that depend on it; everything else still runs.

pub mod report;
pub(crate) mod retry;

use std::collections::VecDeque;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::ControlPlane;
use crate::config::{validate_config, EngineConfig};
use crate::errors::{PermanentKind, ProvisionError, TenantOpsResult};
use crate::model::{ResourceState, ResourceSpec};
use crate::plan::{ProvisioningPlan, ProvisioningStep};

pub use report::{now_rfc3339, DeploymentReport, FailureReason, StepOutcome, StepResult};

/// Why a single attempt did not finish the step.
enum AttemptError {
    Provision(ProvisionError),
    NotReady(String),
    Cancelled,
}

impl From<ProvisionError> for AttemptError {
    fn from(e: ProvisionError) -> Self {
        Self::Provision(e)
    }
}

/// Applies plans under an [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct ProvisionEngine {
    cfg: EngineConfig,
}

impl ProvisionEngine {
    pub fn new(cfg: EngineConfig) -> TenantOpsResult<Self> {
        validate_config(&cfg)?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Apply `plan` to completion.
    pub async fn apply(&self, plan: &ProvisioningPlan, cp: &dyn ControlPlane) -> DeploymentReport {
        self.apply_with_cancel(plan, cp, &CancellationToken::new())
            .await
    }

    /// Apply `plan`, stopping early once `cancel` fires.
    ///
    /// After cancellation no new step starts and unstarted steps are failed
    /// with `cancelled`. Steps already running finish their current call;
    /// created resources are kept.
    pub async fn apply_with_cancel(
        &self,
        plan: &ProvisioningPlan,
        cp: &dyn ControlPlane,
        cancel: &CancellationToken,
    ) -> DeploymentReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = now_rfc3339();
        tracing::info!(
            run_id = %run_id,
            client = %plan.client,
            env = %plan.env,
            steps = plan.len(),
            max_concurrency = self.cfg.max_concurrency,
            "applying provisioning plan"
        );

        let n = plan.steps.len();
        let mut results: Vec<Option<StepResult>> = vec![None; n];
        let mut remaining: Vec<usize> = plan.steps.iter().map(|s| s.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for step in &plan.steps {
            for dep in &step.depends_on {
                if let Some(list) = dependents.get_mut(*dep) {
                    list.push(step.index);
                }
            }
        }
        let mut ready: VecDeque<usize> = (0..n).filter(|i| remaining[*i] == 0).collect();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while let Some(&i) = ready.front() {
                let step = &plan.steps[i];

                let immediate = if cancel.is_cancelled() {
                    Some(StepResult::failed(
                        i,
                        step.kind,
                        &step.name,
                        FailureReason::Cancelled,
                        "run cancelled before the step started",
                    ))
                } else {
                    blocked_by(step, &results).map(|dep| {
                        StepResult::failed(
                            i,
                            step.kind,
                            &step.name,
                            FailureReason::BlockedByDependency,
                            format!("dependency {dep} did not succeed"),
                        )
                    })
                };

                if let Some(res) = immediate {
                    ready.pop_front();
                    tracing::warn!(
                        run_id = %run_id,
                        step = i,
                        kind = %step.kind,
                        name = %step.name,
                        reason = res.reason.map(|r| r.as_str()).unwrap_or_default(),
                        "step skipped"
                    );
                    results[i] = Some(res);
                    release(i, &dependents, &mut remaining, &mut ready);
                    continue;
                }

                if in_flight.len() >= self.cfg.max_concurrency {
                    break;
                }
                ready.pop_front();
                tracing::debug!(run_id = %run_id, step = i, kind = %step.kind, name = %step.name, "step started");
                in_flight.push(self.run_step(step, cp, cancel));
            }

            let Some(res) = in_flight.next().await else {
                break;
            };
            let i = res.index;
            match res.outcome {
                StepOutcome::Failed => tracing::error!(
                    run_id = %run_id,
                    step = i,
                    kind = %res.kind,
                    name = %res.name,
                    reason = res.reason.map(|r| r.as_str()).unwrap_or_default(),
                    detail = res.detail.as_deref().unwrap_or_default(),
                    attempts = res.attempts,
                    "step failed"
                ),
                outcome => tracing::info!(
                    run_id = %run_id,
                    step = i,
                    kind = %res.kind,
                    name = %res.name,
                    outcome = outcome.as_str(),
                    attempts = res.attempts,
                    elapsed_ms = res.elapsed_ms,
                    "step finished"
                ),
            }
            results[i] = Some(res);
            release(i, &dependents, &mut remaining, &mut ready);
        }

        let steps: Vec<StepResult> = results
            .into_iter()
            .zip(&plan.steps)
            .map(|(res, step)| {
                res.unwrap_or_else(|| {
                    StepResult::failed(
                        step.index,
                        step.kind,
                        &step.name,
                        FailureReason::Unreachable,
                        "dependencies never resolved",
                    )
                })
            })
            .collect();
        let success = steps.iter().all(StepResult::is_ok);

        let report = DeploymentReport {
            run_id,
            solution: plan.solution.clone(),
            client: plan.client.clone(),
            env: plan.env,
            started_at,
            finished_at: now_rfc3339(),
            steps,
            success,
        };
        tracing::info!(
            run_id = %report.run_id,
            client = %report.client,
            env = %report.env,
            created = report.created(),
            already_existed = report.already_existed(),
            failed = report.count(StepOutcome::Failed),
            success = report.success,
            "provisioning plan applied"
        );
        report
    }

    /// Ensure one resource exists and is ready, retrying transient errors.
    async fn run_step(
        &self,
        step: &ProvisioningStep,
        cp: &dyn ControlPlane,
        cancel: &CancellationToken,
    ) -> StepResult {
        let started = Instant::now();
        let policy = &self.cfg.retry;
        let mut created = false;
        let mut retries_used: u32 = 0;

        let result = loop {
            match self.attempt(&step.spec, cp, cancel, &mut created).await {
                Ok(outcome) => break StepResult::ok(step.index, step.kind, &step.name, outcome),
                Err(AttemptError::NotReady(detail)) => {
                    break StepResult::failed(
                        step.index,
                        step.kind,
                        &step.name,
                        FailureReason::NotReady,
                        detail,
                    )
                }
                Err(AttemptError::Cancelled) => {
                    break StepResult::failed(
                        step.index,
                        step.kind,
                        &step.name,
                        FailureReason::Cancelled,
                        "cancelled while waiting for readiness",
                    )
                }
                Err(AttemptError::Provision(e)) if !e.is_transient() => {
                    break StepResult::failed(
                        step.index,
                        step.kind,
                        &step.name,
                        FailureReason::Permanent,
                        e.to_string(),
                    )
                }
                Err(AttemptError::Provision(e)) => {
                    if retries_used.saturating_add(1) >= policy.max_attempts {
                        break StepResult::failed(
                            step.index,
                            step.kind,
                            &step.name,
                            FailureReason::RetriesExhausted,
                            format!("{e} (after {} attempt(s))", retries_used + 1),
                        );
                    }

                    tracing::warn!(
                        kind = %step.kind,
                        name = %step.name,
                        error = %e,
                        retry_attempt = retries_used + 1,
                        retry_in_ms = retry::millis(policy.delay_for(retries_used)),
                        "retrying step after transient error"
                    );
                    if !retry::backoff(policy, retries_used, cancel).await {
                        break StepResult::failed(
                            step.index,
                            step.kind,
                            &step.name,
                            FailureReason::Cancelled,
                            format!("cancelled while retrying: {e}"),
                        );
                    }
                    retries_used += 1;
                }
            }
        };

        result.with_timing(retries_used + 1, retry::millis(started.elapsed()))
    }

    /// One probe-create-poll pass.
    ///
    /// Every pass starts with a probe, so a create that landed despite a
    /// transient error is detected instead of repeated. `created` remembers
    /// across passes that this run issued the create.
    async fn attempt(
        &self,
        spec: &ResourceSpec,
        cp: &dyn ControlPlane,
        cancel: &CancellationToken,
        created: &mut bool,
    ) -> Result<StepOutcome, AttemptError> {
        let id = spec.id();
        let timeout = self.cfg.call_timeout;
        let settled = |created: bool| {
            if created {
                StepOutcome::Created
            } else {
                StepOutcome::AlreadyExisted
            }
        };

        match retry::with_timeout(timeout, cp.resource_exists(&id)).await? {
            Some(ResourceState::Succeeded) => return Ok(settled(*created)),
            Some(ResourceState::Provisioning) => {
                self.await_ready(spec, cp, cancel).await?;
                return Ok(settled(*created));
            }
            Some(ResourceState::Failed) => {
                tracing::info!(resource = %id, "resource in failed state, recreating");
            }
            None => {}
        }

        retry::with_timeout(timeout, cp.create_resource(spec)).await?;
        *created = true;
        self.await_ready(spec, cp, cancel).await?;
        Ok(StepOutcome::Created)
    }

    /// Poll until the resource reports a terminal state, bounded by the retry
    /// policy. The wait between polls stops as soon as `cancel` fires.
    async fn await_ready(
        &self,
        spec: &ResourceSpec,
        cp: &dyn ControlPlane,
        cancel: &CancellationToken,
    ) -> Result<(), AttemptError> {
        let id = spec.id();
        let policy = &self.cfg.retry;

        for poll in 0..policy.max_attempts {
            match retry::with_timeout(self.cfg.call_timeout, cp.resource_exists(&id)).await? {
                Some(ResourceState::Succeeded) => return Ok(()),
                Some(ResourceState::Failed) => {
                    return Err(ProvisionError::permanent(
                        PermanentKind::Rejected,
                        format!("{id} finished provisioning in failed state"),
                    )
                    .into())
                }
                Some(ResourceState::Provisioning) | None => {}
            }

            if !retry::backoff(policy, poll, cancel).await {
                return Err(AttemptError::Cancelled);
            }
        }

        Err(AttemptError::NotReady(format!(
            "{id} not ready after {} poll(s)",
            policy.max_attempts
        )))
    }
}

/// Index of the first dependency that did not succeed, if any.
fn blocked_by(step: &ProvisioningStep, results: &[Option<StepResult>]) -> Option<usize> {
    step.depends_on.iter().copied().find(|dep| {
        results
            .get(*dep)
            .and_then(Option::as_ref)
            .map_or(true, |r| !r.is_ok())
    })
}

fn release(
    done: usize,
    dependents: &[Vec<usize>],
    remaining: &mut [usize],
    ready: &mut VecDeque<usize>,
) {
    for &d in &dependents[done] {
        remaining[d] = remaining[d].saturating_sub(1);
        if remaining[d] == 0 {
            ready.push_back(d);
        }
    }
}
