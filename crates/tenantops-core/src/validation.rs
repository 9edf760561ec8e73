//! Baseline data validation. Read-only.

use std::collections::BTreeSet;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::backend::{CollectionRef, DataStore};
use crate::model::{CollectionConfig, EnvironmentConfig, EnvironmentKey};

/// Baseline coverage of one collection.
///
/// `present` and `missing` follow baseline order. `extra` lists ids found in
/// the store but not in the baseline; it is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub collection: String,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    /// Set when the collection could not be listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.missing.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentValidationReport {
    pub client: String,
    pub env: EnvironmentKey,
    pub collections: Vec<ValidationResult>,
    pub success: bool,
}

/// Compare the ids stored in one collection with its baseline.
pub async fn validate(
    ds: &dyn DataStore,
    env: &EnvironmentConfig,
    coll: &CollectionConfig,
) -> ValidationResult {
    let address = CollectionRef::for_collection(env, coll);
    let mut result = ValidationResult {
        collection: address.collection.clone(),
        ..ValidationResult::default()
    };

    let records = match ds.list_records(&address).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(collection = %address, error = %e, "collection listing failed");
            result.error = Some(e.to_string());
            return result;
        }
    };

    let stored: Vec<String> = records
        .iter()
        .filter_map(|r| r.get("id").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect();
    let stored_set: BTreeSet<&str> = stored.iter().map(String::as_str).collect();

    let baseline = coll.baseline_ids();
    let baseline_set: BTreeSet<&str> = baseline.iter().map(String::as_str).collect();

    for id in &baseline {
        if stored_set.contains(id.as_str()) {
            result.present.push(id.clone());
        } else {
            result.missing.push(id.clone());
        }
    }
    result.extra = stored
        .iter()
        .filter(|id| !baseline_set.contains(id.as_str()))
        .cloned()
        .collect();

    tracing::info!(
        collection = %address,
        present = result.present.len(),
        missing = result.missing.len(),
        extra = result.extra.len(),
        "collection validated"
    );
    result
}

/// Validate every collection of an environment.
pub async fn validate_environment(
    ds: &dyn DataStore,
    client: &str,
    env_key: EnvironmentKey,
    env: &EnvironmentConfig,
) -> EnvironmentValidationReport {
    let collections = join_all(
        env.cosmos_db
            .collections
            .iter()
            .map(|coll| validate(ds, env, coll)),
    )
    .await;
    let success = collections.iter().all(ValidationResult::is_valid);

    EnvironmentValidationReport {
        client: client.to_string(),
        env: env_key,
        collections,
        success,
    }
}
