//! Backend seams.
//!
//! The orchestrator talks to the outside world through two async traits:
//! - [`ControlPlane`]: probe, create and delete cloud resources
//! - [`DataStore`]: list and insert records of a document collection
//!
//! Backends classify their own errors (transient vs permanent); the engine
//! never inspects messages. Implementations must be safe to share across
//! tasks.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DataStoreError, ProvisionError};
use crate::model::{
    BaselineRecord, CollectionConfig, EnvironmentConfig, ResourceId, ResourceSpec, ResourceState,
};
use crate::naming::NameDeriver;

pub use memory::MemoryBackend;

/// Cloud control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Current state of a resource, or `None` if it does not exist.
    async fn resource_exists(&self, id: &ResourceId)
        -> Result<Option<ResourceState>, ProvisionError>;

    /// Request creation. Success means the request was accepted; the
    /// resource may still report `Provisioning` afterwards.
    async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ProvisionError>;

    /// Delete a resource. Returns `false` if it did not exist.
    async fn delete_resource(&self, id: &ResourceId) -> Result<bool, ProvisionError>;
}

/// Outcome of a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertOutcome {
    Created,
    /// A record with the same id already exists. Not an error.
    Conflict,
}

/// Fully qualified collection address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRef {
    pub account: String,
    pub database: String,
    pub collection: String,
    pub partition_key: String,
}

impl CollectionRef {
    /// Address of `coll` inside the data store configured for `env`.
    pub fn for_collection(env: &EnvironmentConfig, coll: &CollectionConfig) -> Self {
        Self {
            account: env.cosmos_db.account_name.clone(),
            database: env.cosmos_db.database_name.clone(),
            collection: NameDeriver::collection_name(&coll.name),
            partition_key: coll.partition_key.clone(),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.database, self.collection)
    }
}

/// Document store holding the seeded collections.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Every record currently in the collection.
    async fn list_records(&self, coll: &CollectionRef) -> Result<Vec<Value>, DataStoreError>;

    /// Insert keyed by the record's `id`.
    async fn insert_record(
        &self,
        coll: &CollectionRef,
        record: &BaselineRecord,
    ) -> Result<InsertOutcome, DataStoreError>;
}

/// Shared handle to a control plane.
pub type ControlPlaneHandle = Arc<dyn ControlPlane>;

/// Shared handle to a data store.
pub type DataStoreHandle = Arc<dyn DataStore>;
