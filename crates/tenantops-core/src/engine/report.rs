//! Per-step results and the aggregated deployment report.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::model::{EnvironmentKey, ResourceKind};

/// Terminal outcome of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    Created,
    AlreadyExisted,
    Failed,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExisted => "already-existed",
            Self::Failed => "failed",
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// A dependency did not succeed; the step never ran.
    BlockedByDependency,
    /// Transient errors outlasted the retry policy.
    RetriesExhausted,
    /// The control plane refused the request.
    Permanent,
    /// The resource never reached a terminal state while polling.
    NotReady,
    /// The run was cancelled before the step finished.
    Cancelled,
    /// The step's dependencies never resolved (cyclic or dangling plan).
    Unreachable,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockedByDependency => "blocked-by-dependency",
            Self::RetriesExhausted => "retries-exhausted",
            Self::Permanent => "permanent",
            Self::NotReady => "not-ready",
            Self::Cancelled => "cancelled",
            Self::Unreachable => "unreachable",
        }
    }
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub index: usize,
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Control-plane attempts made (0 if the step never ran).
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl StepResult {
    pub fn ok(index: usize, kind: ResourceKind, name: &str, outcome: StepOutcome) -> Self {
        Self {
            index,
            kind,
            name: name.to_string(),
            outcome,
            reason: None,
            detail: None,
            attempts: 0,
            elapsed_ms: 0,
        }
    }

    pub fn failed(
        index: usize,
        kind: ResourceKind,
        name: &str,
        reason: FailureReason,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            index,
            kind,
            name: name.to_string(),
            outcome: StepOutcome::Failed,
            reason: Some(reason),
            detail: Some(detail.into()),
            attempts: 0,
            elapsed_ms: 0,
        }
    }

    pub fn with_timing(mut self, attempts: u32, elapsed_ms: u64) -> Self {
        self.attempts = attempts;
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Aggregated result of applying one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub run_id: String,
    pub solution: String,
    pub client: String,
    pub env: EnvironmentKey,
    pub started_at: String,
    pub finished_at: String,
    /// In plan order.
    pub steps: Vec<StepResult>,
    /// Every step created or already existed.
    pub success: bool,
}

impl DeploymentReport {
    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }

    pub fn created(&self) -> usize {
        self.count(StepOutcome::Created)
    }

    pub fn already_existed(&self) -> usize {
        self.count(StepOutcome::AlreadyExisted)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| !s.is_ok())
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Current UTC time as RFC 3339.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
