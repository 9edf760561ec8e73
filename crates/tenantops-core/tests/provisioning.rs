//! End-to-end behaviour of the core pipeline against the in-memory backend.
//!
//! Uses the shared fixture `tests/fixtures/solution.json` at the workspace
//! root (clients `elite` and `acme`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;

use tenantops_core::backend::memory::{Fault, Op};
use tenantops_core::prelude::*;
use tenantops_core::status::{Completeness, Verdict};
use tenantops_core::{plan, registry, status};

const ELITE: &str = "elite";
const MAIN: EnvironmentKey = EnvironmentKey::Main;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("tests")
        .join("fixtures")
        .join("solution.json")
}

fn solution() -> SolutionConfig {
    registry::load(fixture_path()).expect("fixture must load")
}

fn engine(max_concurrency: usize, retry: RetryPolicy) -> ProvisionEngine {
    ProvisionEngine::new(
        EngineConfig::default()
            .with_max_concurrency(max_concurrency)
            .with_retry(retry),
    )
    .unwrap()
}

fn orchestrator(backend: &Arc<MemoryBackend>) -> Orchestrator {
    Orchestrator::new(
        engine(4, RetryPolicy::immediate(5)),
        backend.clone(),
        backend.clone(),
    )
}

fn elite_plan() -> ProvisioningPlan {
    plan::build(&solution(), ELITE, MAIN).unwrap()
}

#[tokio::test]
async fn elite_main_end_to_end_then_rerun() {
    let cfg = solution();
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&backend);

    let first = orch.run(&cfg, ELITE, MAIN).await.unwrap();
    assert!(first.success);
    assert_eq!(first.deployment.created(), 10);
    assert_eq!(first.deployment.already_existed(), 0);

    let snap = backend.snapshot();
    assert_eq!(snap.count(ResourceKind::ResourceGroup), 1);
    assert_eq!(snap.count(ResourceKind::StorageAccount), 1);
    assert_eq!(snap.count(ResourceKind::DataStoreAccount), 1);
    assert_eq!(snap.count(ResourceKind::DataStoreDatabase), 1);
    assert_eq!(snap.count(ResourceKind::DataStoreCollection), 2);
    assert_eq!(snap.count(ResourceKind::ComputePlan), 1);
    assert_eq!(snap.count(ResourceKind::DeployedFunctionUnit), 3);

    let seed = first.seed.as_ref().unwrap();
    assert_eq!(seed.created(), 6);
    let validation = first.validation.as_ref().unwrap();
    assert!(validation.success);
    for coll in &validation.collections {
        assert!(coll.missing.is_empty(), "{}: {:?}", coll.collection, coll.missing);
        assert_eq!(coll.present.len(), 3);
    }

    let second = orch.run(&cfg, ELITE, MAIN).await.unwrap();
    assert!(second.success);
    assert_eq!(second.deployment.created(), 0);
    assert_eq!(second.deployment.already_existed(), 10);
    let seed = second.seed.as_ref().unwrap();
    assert_eq!(seed.created(), 0);
    assert_eq!(seed.already_existed(), 6);
    assert_ne!(first.deployment.run_id, second.deployment.run_id);
}

#[tokio::test]
async fn second_apply_creates_nothing() {
    let backend = MemoryBackend::new();
    let engine = engine(4, RetryPolicy::immediate(5));
    let plan = elite_plan();

    let first = engine.apply(&plan, &backend).await;
    assert!(first.success);

    backend.clear_calls();
    let second = engine.apply(&plan, &backend).await;
    assert!(second.success);
    assert!(second
        .steps
        .iter()
        .all(|s| s.outcome == StepOutcome::AlreadyExisted));
    assert_eq!(backend.count_calls(Op::Create, None), 0);
}

#[tokio::test(start_paused = true)]
async fn dependencies_are_terminal_before_a_step_starts() {
    let backend = MemoryBackend::new().with_latency(Duration::from_millis(5));
    let plan = elite_plan();
    let report = engine(4, RetryPolicy::immediate(5)).apply(&plan, &backend).await;
    assert!(report.success);

    let mut first_call: HashMap<(ResourceKind, String), u64> = HashMap::new();
    let mut last_call: HashMap<(ResourceKind, String), u64> = HashMap::new();
    for call in backend.calls() {
        let key = (call.kind.unwrap(), call.name.clone());
        first_call.entry(key.clone()).or_insert(call.seq);
        last_call.insert(key, call.seq);
    }

    for step in &plan.steps {
        let start = first_call[&(step.kind, step.name.clone())];
        for dep in &step.depends_on {
            let d = &plan.steps[*dep];
            let end = last_call[&(d.kind, d.name.clone())];
            assert!(end < start, "{} started before {} finished", step.name, d.name);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn parallelism_is_bounded() {
    let plan = elite_plan();

    let serial = MemoryBackend::new().with_latency(Duration::from_millis(10));
    assert!(engine(1, RetryPolicy::immediate(5)).apply(&plan, &serial).await.success);
    assert_eq!(serial.max_in_flight(), 1);

    let pair = MemoryBackend::new().with_latency(Duration::from_millis(10));
    assert!(engine(2, RetryPolicy::immediate(5)).apply(&plan, &pair).await.success);
    assert_eq!(pair.max_in_flight(), 2);
}

#[tokio::test]
async fn permanent_failure_blocks_only_dependents() {
    let backend = MemoryBackend::new();
    backend.inject(
        Op::Create,
        "plan-tenantops-elite-main",
        Fault::Permanent(PermanentKind::QuotaExceeded),
    );
    let report = engine(4, RetryPolicy::immediate(5))
        .apply(&elite_plan(), &backend)
        .await;

    assert!(!report.success);
    let plan_step = report.step("plan-tenantops-elite-main").unwrap();
    assert_eq!(plan_step.reason, Some(FailureReason::Permanent));
    assert_eq!(plan_step.attempts, 1);

    for s in report.steps.iter().filter(|s| s.kind == ResourceKind::DeployedFunctionUnit) {
        assert_eq!(s.reason, Some(FailureReason::BlockedByDependency));
        assert_eq!(s.attempts, 0);
    }
    for s in report.steps.iter().filter(|s| {
        !matches!(s.kind, ResourceKind::ComputePlan | ResourceKind::DeployedFunctionUnit)
    }) {
        assert_eq!(s.outcome, StepOutcome::Created, "{}", s.name);
    }
    assert_eq!(
        backend.count_calls(Op::Create, Some(ResourceKind::DeployedFunctionUnit)),
        0
    );
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let backend = MemoryBackend::new();
    backend.inject(
        Op::Create,
        "sttenantopselitemain",
        Fault::Transient { kind: TransientKind::RateLimited, times: 2 },
    );
    let report = engine(4, RetryPolicy::immediate(5))
        .apply(&elite_plan(), &backend)
        .await;

    assert!(report.success);
    let storage = report.step("sttenantopselitemain").unwrap();
    assert_eq!(storage.outcome, StepOutcome::Created);
    assert_eq!(storage.attempts, 3);
}

#[tokio::test]
async fn exhausted_retries_fail_the_step() {
    let backend = MemoryBackend::new();
    backend.inject(
        Op::Create,
        "sttenantopselitemain",
        Fault::Transient { kind: TransientKind::DependencyNotVisible, times: 10 },
    );
    let report = engine(4, RetryPolicy::immediate(3))
        .apply(&elite_plan(), &backend)
        .await;

    let storage = report.step("sttenantopselitemain").unwrap();
    assert_eq!(storage.reason, Some(FailureReason::RetriesExhausted));
    assert_eq!(storage.attempts, 3);
    assert_eq!(
        backend.count_calls(Op::Create, Some(ResourceKind::StorageAccount)),
        3
    );
}

#[tokio::test]
async fn landed_create_is_not_repeated() {
    let backend = MemoryBackend::new();
    backend.inject(Op::Create, "tenantops-elite-main", Fault::LandThenTimeout);
    let report = engine(4, RetryPolicy::immediate(5))
        .apply(&elite_plan(), &backend)
        .await;

    assert!(report.success);
    let account = report.step("tenantops-elite-main").unwrap();
    assert_eq!(account.outcome, StepOutcome::Created);
    assert_eq!(account.attempts, 2);
    assert_eq!(
        backend.count_calls(Op::Create, Some(ResourceKind::DataStoreAccount)),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn readiness_is_polled_after_create() {
    let backend = MemoryBackend::new().with_provisioning_polls(2);
    let report = engine(4, RetryPolicy::default())
        .apply(&elite_plan(), &backend)
        .await;
    assert!(report.success);
    assert_eq!(report.created(), 10);
}

#[tokio::test]
async fn stuck_resource_is_not_ready() {
    let plan = elite_plan();
    let backend = MemoryBackend::new();
    backend.put_resource(plan.steps[0].spec.clone(), ResourceState::Provisioning);

    let report = engine(4, RetryPolicy::immediate(3)).apply(&plan, &backend).await;
    assert_eq!(report.steps[0].reason, Some(FailureReason::NotReady));
    assert!(report.steps[1..]
        .iter()
        .all(|s| s.reason == Some(FailureReason::BlockedByDependency)));
}

#[tokio::test]
async fn failed_resource_is_recreated() {
    let plan = elite_plan();
    let backend = MemoryBackend::new();
    backend.put_resource(plan.steps[0].spec.clone(), ResourceState::Succeeded);
    backend.put_resource(plan.steps[1].spec.clone(), ResourceState::Failed);

    let report = engine(4, RetryPolicy::immediate(3)).apply(&plan, &backend).await;
    assert!(report.success);
    assert_eq!(report.steps[0].outcome, StepOutcome::AlreadyExisted);
    assert_eq!(report.steps[1].outcome, StepOutcome::Created);
}

#[tokio::test(start_paused = true)]
async fn hung_calls_time_out_as_transient() {
    let backend = MemoryBackend::new();
    backend.inject(
        Op::Probe,
        "sttenantopselitemain",
        Fault::Hang,
    );
    let engine = ProvisionEngine::new(
        EngineConfig::default()
            .with_call_timeout(Duration::from_secs(1))
            .with_retry(RetryPolicy::immediate(2)),
    )
    .unwrap();

    let report = engine.apply(&elite_plan(), &backend).await;
    let storage = report.step("sttenantopselitemain").unwrap();
    assert_eq!(storage.reason, Some(FailureReason::RetriesExhausted));
    assert!(storage.detail.as_deref().unwrap().contains("timeout"));
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let backend = MemoryBackend::new();
    let token = CancellationToken::new();
    token.cancel();

    let report = engine(4, RetryPolicy::immediate(3))
        .apply_with_cancel(&elite_plan(), &backend, &token)
        .await;
    assert!(!report.success);
    assert!(report
        .steps
        .iter()
        .all(|s| s.reason == Some(FailureReason::Cancelled)));
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_the_run() {
    let backend = MemoryBackend::new();
    backend.inject(
        Op::Create,
        "rg-tenantops-elite-main",
        Fault::Transient { kind: TransientKind::RateLimited, times: 10 },
    );
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let report = engine(4, RetryPolicy::default())
        .apply_with_cancel(&elite_plan(), &backend, &token)
        .await;
    assert!(report
        .steps
        .iter()
        .all(|s| s.reason == Some(FailureReason::Cancelled)));
    assert!(backend.snapshot().resources.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_readiness_polling() {
    let backend = MemoryBackend::new().with_provisioning_polls(100);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let report = engine(4, RetryPolicy::default())
        .apply_with_cancel(&elite_plan(), &backend, &token)
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    let rg = report.step("rg-tenantops-elite-main").unwrap();
    assert_eq!(rg.reason, Some(FailureReason::Cancelled));
    assert!(report
        .steps
        .iter()
        .all(|s| s.reason == Some(FailureReason::Cancelled)));
}

#[tokio::test]
async fn clients_do_not_share_resources() {
    let cfg = solution();
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&backend);

    let pairs = registry::entries(&cfg)
        .into_iter()
        .filter(|(_, env)| *env == MAIN)
        .collect::<Vec<_>>();
    let results = orch.run_many(&cfg, &pairs).await;
    assert_eq!(results.len(), 2);

    for res in results {
        let run = res.unwrap();
        assert!(run.success, "{}", run.deployment.client);
        assert_eq!(run.deployment.already_existed(), 0, "{}", run.deployment.client);
    }
    assert_eq!(backend.snapshot().count(ResourceKind::ResourceGroup), 2);
}

#[tokio::test]
async fn unknown_pairs_fail_before_planning() {
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&backend);
    let cfg = solution();

    assert_matches!(
        orch.run(&cfg, "ghost", MAIN).await,
        Err(ConfigError::ClientNotFound(_))
    );
    assert_matches!(
        orch.deploy(&cfg, "acme", EnvironmentKey::Testing).await,
        Err(ConfigError::EnvironmentNotFound { .. })
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn status_tracks_the_lifecycle() {
    let cfg = solution();
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&backend);

    let unknown = orch.status(&cfg, "ghost", MAIN).await;
    assert_eq!(unknown.phase, EnvironmentPhase::Unconfigured);

    assert_eq!(orch.status(&cfg, ELITE, MAIN).await.phase, EnvironmentPhase::Planned);

    assert!(orch.deploy(&cfg, ELITE, MAIN).await.unwrap().success);
    assert_eq!(
        orch.status(&cfg, ELITE, MAIN).await.phase,
        EnvironmentPhase::Provisioned(Completeness::Complete)
    );

    let plan = elite_plan();
    let env = registry::lookup(&cfg, ELITE, MAIN).unwrap();
    let usuarios = env.collection("usuarios").unwrap();
    let first = usuarios.default_data[0].clone();
    backend
        .insert_record(&CollectionRef::for_collection(env, usuarios), &first)
        .await
        .unwrap();
    assert_eq!(
        orch.status(&cfg, ELITE, MAIN).await.phase,
        EnvironmentPhase::Seeded(Completeness::Partial)
    );

    assert!(orch.seed(&cfg, ELITE, MAIN).await.unwrap().success);
    let timeout = Duration::from_secs(5);
    let presence = status::probe(&plan, env, &*backend, &*backend, timeout, false).await;
    assert_eq!(presence.phase, EnvironmentPhase::Seeded(Completeness::Complete));
    assert_eq!(
        orch.status(&cfg, ELITE, MAIN).await.phase,
        EnvironmentPhase::Validated(Verdict::Pass)
    );

    backend.put_resource(plan.steps[1].spec.clone(), ResourceState::Provisioning);
    assert_eq!(
        orch.status(&cfg, ELITE, MAIN).await.phase,
        EnvironmentPhase::Provisioned(Completeness::Partial)
    );
}

#[tokio::test]
async fn control_plane_errors_report_unreachable() {
    let cfg = solution();
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&backend);
    assert!(orch.run(&cfg, ELITE, MAIN).await.unwrap().success);

    let plan = elite_plan();
    for step in &plan.steps {
        backend.inject(Op::Probe, step.name.clone(), Fault::Permanent(PermanentKind::Rejected));
    }
    let report = orch.status(&cfg, ELITE, MAIN).await;
    assert_eq!(report.phase, EnvironmentPhase::Unreachable);
    assert!(report.collections.is_empty());

    backend.clear_faults();
    backend.inject(Op::Probe, plan.steps[0].name.clone(), Fault::Permanent(PermanentKind::Rejected));
    assert_eq!(
        orch.status(&cfg, ELITE, MAIN).await.phase,
        EnvironmentPhase::Unreachable
    );
}

#[tokio::test]
async fn teardown_reverses_the_plan() {
    let cfg = solution();
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&backend);
    assert!(orch.run(&cfg, ELITE, MAIN).await.unwrap().success);

    let token = CancellationToken::new();
    let report = orch.teardown(&cfg, ELITE, MAIN, &token).await.unwrap();
    assert!(report.success);
    assert_eq!(report.count(DeleteOutcome::Deleted), 10);
    assert_eq!(report.steps.last().unwrap().kind, ResourceKind::ResourceGroup);
    assert!(backend.snapshot().resources.is_empty());
    assert!(backend.snapshot().collections.is_empty());

    let again = orch.teardown(&cfg, ELITE, MAIN, &token).await.unwrap();
    assert!(again.success);
    assert_eq!(again.count(DeleteOutcome::Absent), 10);
}
