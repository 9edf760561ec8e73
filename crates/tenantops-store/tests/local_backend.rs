//! Local backend: state survives reopening across invocations.

use std::path::PathBuf;
use std::sync::Arc;

use tenantops_core::prelude::*;
use tenantops_core::registry;
use tenantops_store::LocalBackend;
use tokio_util::sync::CancellationToken;

fn fixture() -> SolutionConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("tests")
        .join("fixtures")
        .join("solution.json");
    registry::load(path).expect("fixture must load")
}

fn orchestrator(backend: Arc<LocalBackend>) -> Orchestrator {
    let engine = ProvisionEngine::new(
        EngineConfig::default().with_retry(RetryPolicy::immediate(3)),
    )
    .unwrap();
    Orchestrator::new(engine, backend.clone(), backend)
}

#[tokio::test]
async fn rerun_after_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = fixture();

    let first = {
        let backend = Arc::new(LocalBackend::open(dir.path()).unwrap());
        orchestrator(backend).run(&cfg, "elite", EnvironmentKey::Main).await.unwrap()
    };
    assert!(first.success);
    assert_eq!(first.deployment.created(), 10);

    let backend = Arc::new(LocalBackend::open(dir.path()).unwrap());
    let snap = backend.snapshot();
    assert_eq!(snap.count(ResourceKind::DataStoreCollection), 2);

    let second = orchestrator(backend)
        .run(&cfg, "elite", EnvironmentKey::Main)
        .await
        .unwrap();
    assert!(second.success);
    assert_eq!(second.deployment.created(), 0);
    assert_eq!(second.seed.unwrap().already_existed(), 6);
}

#[tokio::test]
async fn teardown_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = fixture();
    let token = CancellationToken::new();

    {
        let backend = Arc::new(LocalBackend::open(dir.path()).unwrap());
        let orch = orchestrator(backend);
        assert!(orch.run(&cfg, "acme", EnvironmentKey::Main).await.unwrap().success);
        let report = orch
            .teardown(&cfg, "acme", EnvironmentKey::Main, &token)
            .await
            .unwrap();
        assert!(report.success);
    }

    let reopened = LocalBackend::open(dir.path()).unwrap();
    assert!(reopened.snapshot().resources.is_empty());
    assert!(reopened.snapshot().collections.is_empty());
}

