//! Environment status probing.
//!
//! Status is never persisted. It is recomputed from live control-plane and
//! data-store queries every time:
//!
//! ```text
//! unconfigured -> planned -> provisioned{partial|complete}
//!              -> seeded{partial|complete} -> validated{pass|fail}
//! ```
//!
//! `validated` is only reported when the probe runs the validator and every
//! baseline record is in place (or a collection cannot be read); a plain
//! presence probe stops at `seeded`. A control-plane error on any resource
//! reports `unreachable` instead of guessing a phase.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::backend::{ControlPlane, DataStore};
use crate::engine::retry::with_timeout;
use crate::model::{EnvironmentConfig, EnvironmentKey, ResourceKind, ResourceState};
use crate::plan::ProvisioningPlan;
use crate::validation::{self, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Completeness {
    Partial,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Derived lifecycle phase of one (client, environment) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "detail", rename_all = "kebab-case")]
pub enum EnvironmentPhase {
    Unconfigured,
    /// At least one resource could not be probed.
    Unreachable,
    Planned,
    Provisioned(Completeness),
    Seeded(Completeness),
    Validated(Verdict),
}

impl EnvironmentPhase {
    pub fn label(&self) -> String {
        match self {
            Self::Unconfigured => "unconfigured".to_string(),
            Self::Unreachable => "unreachable".to_string(),
            Self::Planned => "planned".to_string(),
            Self::Provisioned(c) => format!("provisioned ({})", completeness_str(*c)),
            Self::Seeded(c) => format!("seeded ({})", completeness_str(*c)),
            Self::Validated(Verdict::Pass) => "validated (pass)".to_string(),
            Self::Validated(Verdict::Fail) => "validated (fail)".to_string(),
        }
    }
}

fn completeness_str(c: Completeness) -> &'static str {
    match c {
        Completeness::Partial => "partial",
        Completeness::Complete => "complete",
    }
}

/// What the control plane reported for one planned resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Presence {
    Present { state: ResourceState },
    Absent,
    Error { message: String },
}

impl Presence {
    fn is_ready(&self) -> bool {
        matches!(self, Self::Present { state } if state.is_ready())
    }

    fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    fn exists(&self) -> bool {
        matches!(self, Self::Present { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub kind: ResourceKind,
    pub name: String,
    pub presence: Presence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub client: String,
    pub env: EnvironmentKey,
    pub phase: EnvironmentPhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<ValidationResult>,
}

impl StatusReport {
    pub fn unconfigured(client: &str, env: EnvironmentKey) -> Self {
        Self {
            client: client.to_string(),
            env,
            phase: EnvironmentPhase::Unconfigured,
            resources: Vec::new(),
            collections: Vec::new(),
        }
    }
}

/// Probe every planned resource and, once all are ready, the baseline data.
pub async fn probe(
    plan: &ProvisioningPlan,
    env: &EnvironmentConfig,
    cp: &dyn ControlPlane,
    ds: &dyn DataStore,
    call_timeout: Duration,
    run_validation: bool,
) -> StatusReport {
    let resources: Vec<ResourceStatus> = join_all(plan.steps.iter().map(|step| async move {
        let id = step.spec.id();
        let presence = match with_timeout(call_timeout, cp.resource_exists(&id)).await {
            Ok(Some(state)) => Presence::Present { state },
            Ok(None) => Presence::Absent,
            Err(e) => Presence::Error {
                message: e.to_string(),
            },
        };
        ResourceStatus {
            kind: step.kind,
            name: step.name.clone(),
            presence,
        }
    }))
    .await;

    let mut report = StatusReport {
        client: plan.client.clone(),
        env: plan.env,
        phase: EnvironmentPhase::Planned,
        resources,
        collections: Vec::new(),
    };

    if report.resources.iter().any(|r| r.presence.is_error()) {
        report.phase = EnvironmentPhase::Unreachable;
        tracing::warn!(
            client = %report.client,
            env = %report.env,
            "control plane probe failed"
        );
        return report;
    }
    if !report.resources.iter().any(|r| r.presence.exists()) {
        return report;
    }
    if !report.resources.iter().all(|r| r.presence.is_ready()) {
        report.phase = EnvironmentPhase::Provisioned(Completeness::Partial);
        return report;
    }

    report.collections = join_all(
        env.cosmos_db
            .collections
            .iter()
            .map(|coll| validation::validate(ds, env, coll)),
    )
    .await;
    report.phase = data_phase(&report.collections, run_validation);

    tracing::debug!(
        client = %report.client,
        env = %report.env,
        phase = %report.phase.label(),
        "environment probed"
    );
    report
}

/// Phase of a fully provisioned environment, from its baseline coverage.
///
/// Nothing seeded is `provisioned (complete)`, a partial seed is
/// `seeded (partial)`. A complete seed is `validated (pass)` when validating
/// and `seeded (complete)` otherwise. An unreadable collection fails
/// validation.
fn data_phase(collections: &[ValidationResult], run_validation: bool) -> EnvironmentPhase {
    let present: usize = collections.iter().map(|c| c.present.len()).sum();
    let missing: usize = collections.iter().map(|c| c.missing.len()).sum();
    let unreadable = collections.iter().any(|c| c.error.is_some());

    match (present, missing, unreadable) {
        (_, _, true) if run_validation => EnvironmentPhase::Validated(Verdict::Fail),
        (0, _, _) => EnvironmentPhase::Provisioned(Completeness::Complete),
        (_, 0, false) if run_validation => EnvironmentPhase::Validated(Verdict::Pass),
        (_, 0, false) => EnvironmentPhase::Seeded(Completeness::Complete),
        _ => EnvironmentPhase::Seeded(Completeness::Partial),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_with_detail() {
        let v = serde_json::to_value(EnvironmentPhase::Seeded(Completeness::Partial)).unwrap();
        assert_eq!(v["phase"], "seeded");
        assert_eq!(v["detail"], "partial");

        let v = serde_json::to_value(EnvironmentPhase::Planned).unwrap();
        assert_eq!(v["phase"], "planned");
    }

    fn coll(present: &[&str], missing: &[&str], error: Option<&str>) -> ValidationResult {
        ValidationResult {
            collection: "usuarios".to_string(),
            present: present.iter().map(|s| s.to_string()).collect(),
            missing: missing.iter().map(|s| s.to_string()).collect(),
            extra: Vec::new(),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn data_phase_follows_seed_coverage() {
        let empty = [coll(&[], &["a", "b"], None)];
        let partial = [coll(&["a"], &["b"], None)];
        let full = [coll(&["a", "b"], &[], None)];
        let broken = [coll(&[], &[], Some("collection not found"))];

        for validate in [false, true] {
            assert_eq!(
                data_phase(&empty, validate),
                EnvironmentPhase::Provisioned(Completeness::Complete)
            );
            assert_eq!(
                data_phase(&partial, validate),
                EnvironmentPhase::Seeded(Completeness::Partial)
            );
        }
        assert_eq!(data_phase(&full, true), EnvironmentPhase::Validated(Verdict::Pass));
        assert_eq!(data_phase(&full, false), EnvironmentPhase::Seeded(Completeness::Complete));
        assert_eq!(data_phase(&broken, true), EnvironmentPhase::Validated(Verdict::Fail));
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(
            EnvironmentPhase::Validated(Verdict::Fail).label(),
            "validated (fail)"
        );
    }
}
