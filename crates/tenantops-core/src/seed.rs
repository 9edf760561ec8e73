//! Baseline data seeding.
//!
//! Inserts each baseline record keyed by `id`. An id that already exists is
//! counted as already-existed, never overwritten. Any other error is recorded
//! against the id and seeding continues with the next record.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::backend::{CollectionRef, DataStore, InsertOutcome};
use crate::model::{CollectionConfig, EnvironmentConfig, EnvironmentKey};

/// Seeding outcome for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedResult {
    pub collection: String,
    pub created_count: usize,
    pub already_existed_count: usize,
    pub failed_ids: Vec<String>,
    /// Error message per failed id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl SeedResult {
    pub fn is_success(&self) -> bool {
        self.failed_ids.is_empty()
    }
}

/// Seeding outcome for every collection of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSeedReport {
    pub client: String,
    pub env: EnvironmentKey,
    pub collections: Vec<SeedResult>,
    pub success: bool,
}

impl EnvironmentSeedReport {
    pub fn created(&self) -> usize {
        self.collections.iter().map(|c| c.created_count).sum()
    }

    pub fn already_existed(&self) -> usize {
        self.collections.iter().map(|c| c.already_existed_count).sum()
    }
}

/// Seed the baseline records of one collection.
pub async fn seed(ds: &dyn DataStore, env: &EnvironmentConfig, coll: &CollectionConfig) -> SeedResult {
    let address = CollectionRef::for_collection(env, coll);
    let mut result = SeedResult {
        collection: address.collection.clone(),
        ..SeedResult::default()
    };

    for record in &coll.default_data {
        let Some(id) = record.id() else {
            continue;
        };
        match ds.insert_record(&address, record).await {
            Ok(InsertOutcome::Created) => result.created_count += 1,
            Ok(InsertOutcome::Conflict) => result.already_existed_count += 1,
            Err(e) => {
                tracing::warn!(collection = %address, id, error = %e, "record insert failed");
                result.failed_ids.push(id.to_string());
                result.errors.insert(id.to_string(), e.to_string());
            }
        }
    }

    tracing::info!(
        collection = %address,
        created = result.created_count,
        already_existed = result.already_existed_count,
        failed = result.failed_ids.len(),
        "collection seeded"
    );
    result
}

/// Seed every collection of an environment. Collections are independent:
/// one failing does not stop the others.
pub async fn seed_environment(
    ds: &dyn DataStore,
    client: &str,
    env_key: EnvironmentKey,
    env: &EnvironmentConfig,
) -> EnvironmentSeedReport {
    let collections = join_all(
        env.cosmos_db
            .collections
            .iter()
            .map(|coll| seed(ds, env, coll)),
    )
    .await;
    let success = collections.iter().all(SeedResult::is_success);

    EnvironmentSeedReport {
        client: client.to_string(),
        env: env_key,
        collections,
        success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{Fault, Op};
    use crate::backend::MemoryBackend;
    use crate::errors::TransientKind;
    use crate::model::{ResourceKind, ResourceSpec, ResourceState};
    use crate::{registry, test_support};

    fn backend_with_collections(env: &EnvironmentConfig) -> MemoryBackend {
        let b = MemoryBackend::new();
        for coll in &env.cosmos_db.collections {
            let addr = CollectionRef::for_collection(env, coll);
            b.put_resource(
                ResourceSpec::new(
                    ResourceKind::DataStoreCollection,
                    &addr.collection,
                    &env.resource_group,
                    &env.location,
                )
                .property("account", &addr.account)
                .property("database", &addr.database)
                .property("partitionKey", &addr.partition_key),
                ResourceState::Succeeded,
            );
        }
        b
    }

    #[tokio::test]
    async fn second_seed_only_conflicts() {
        let cfg = test_support::solution();
        let env = registry::lookup(&cfg, "elite", EnvironmentKey::Main).unwrap();
        let b = backend_with_collections(env);

        let first = seed_environment(&b, "elite", EnvironmentKey::Main, env).await;
        assert!(first.success);
        assert_eq!(first.created(), 6);

        let second = seed_environment(&b, "elite", EnvironmentKey::Main, env).await;
        assert!(second.success);
        assert_eq!(second.created(), 0);
        assert_eq!(second.already_existed(), 6);
    }

    #[tokio::test]
    async fn failing_record_does_not_stop_the_rest() {
        let cfg = test_support::solution();
        let env = registry::lookup(&cfg, "elite", EnvironmentKey::Main).unwrap();
        let b = backend_with_collections(env);
        b.inject(
            Op::Insert,
            "usuario2",
            Fault::Transient { kind: TransientKind::RateLimited, times: 1 },
        );

        let usuarios = env.collection("usuarios").unwrap();
        let res = seed(&b, env, usuarios).await;
        assert_eq!(res.created_count, 2);
        assert_eq!(res.failed_ids, vec!["usuario2"]);
        assert!(res.errors["usuario2"].contains("usuario2"));
        assert!(!res.is_success());
    }

    #[tokio::test]
    async fn missing_collection_fails_every_id() {
        let cfg = test_support::solution();
        let env = registry::lookup(&cfg, "elite", EnvironmentKey::Main).unwrap();
        let b = MemoryBackend::new();

        let report = seed_environment(&b, "elite", EnvironmentKey::Main, env).await;
        assert!(!report.success);
        assert_eq!(report.collections[1].failed_ids, vec!["perro", "gato", "raton"]);
    }
}
