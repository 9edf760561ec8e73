//! In-memory backend.
//!
//! Implements both [`ControlPlane`] and [`DataStore`] over a plain
//! [`BackendState`] value. Used by tests and as the engine of the file-backed
//! local backend.
//!
//! Test hooks:
//! - fault injection per (operation, name): transient errors N times,
//!   permanent errors, "landed then failed" creates, hanging calls
//! - readiness lag: newly created resources report `Provisioning` for a
//!   configurable number of probes
//! - a sequenced call log and an in-flight high-water mark
//!
//! Creating anything but a resource group inside a missing resource group
//! fails with `dependency-not-yet-visible`, like a real control plane that
//! has not caught up yet.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CollectionRef, ControlPlane, DataStore, InsertOutcome};
use crate::errors::{DataStoreError, PermanentKind, ProvisionError, TransientKind};
use crate::model::{BaselineRecord, ResourceId, ResourceKind, ResourceSpec, ResourceState};

/// A resource known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResource {
    pub spec: ResourceSpec,
    pub state: ResourceState,
}

/// A document collection and its records keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCollection {
    pub address: CollectionRef,
    #[serde(default)]
    pub records: BTreeMap<String, Value>,
}

/// Complete backend state. Serializable so it can be persisted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendState {
    #[serde(default)]
    pub resources: BTreeMap<String, StoredResource>,

    #[serde(default)]
    pub collections: BTreeMap<String, StoredCollection>,
}

impl BackendState {
    pub fn resource_key(id: &ResourceId) -> String {
        format!("{}/{}/{}", id.kind, id.resource_group, id.name)
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&StoredResource> {
        self.resources.get(&Self::resource_key(id))
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources
            .values()
            .filter(|r| r.spec.kind == kind)
            .count()
    }

    pub fn collection(&self, address: &CollectionRef) -> Option<&StoredCollection> {
        self.collections.get(&address.to_string())
    }

    fn collection_address(spec: &ResourceSpec) -> CollectionRef {
        let prop = |k: &str| spec.properties.get(k).cloned().unwrap_or_default();
        CollectionRef {
            account: prop("account"),
            database: prop("database"),
            collection: spec.name.clone(),
            partition_key: prop("partitionKey"),
        }
    }

    fn insert_resource(&mut self, spec: ResourceSpec, state: ResourceState) {
        if spec.kind == ResourceKind::DataStoreCollection {
            let address = Self::collection_address(&spec);
            self.collections
                .entry(address.to_string())
                .or_insert_with(|| StoredCollection {
                    address,
                    records: BTreeMap::new(),
                });
        }
        self.resources
            .insert(Self::resource_key(&spec.id()), StoredResource { spec, state });
    }

    /// Remove a resource. Deleting a resource group removes everything in it.
    fn remove_resource(&mut self, id: &ResourceId) -> bool {
        let Some(removed) = self.resources.remove(&Self::resource_key(id)) else {
            return false;
        };

        let mut dropped = vec![removed];
        if id.kind == ResourceKind::ResourceGroup {
            let inside: Vec<String> = self
                .resources
                .iter()
                .filter(|(_, r)| r.spec.resource_group == id.name)
                .map(|(k, _)| k.clone())
                .collect();
            for key in inside {
                if let Some(r) = self.resources.remove(&key) {
                    dropped.push(r);
                }
            }
        }

        for r in dropped {
            if r.spec.kind == ResourceKind::DataStoreCollection {
                let address = Self::collection_address(&r.spec);
                self.collections.remove(&address.to_string());
            }
        }
        true
    }
}

/// Backend operation, for fault keys and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Op {
    Probe,
    Create,
    Delete,
    List,
    Insert,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Insert => "insert",
        }
    }
}

/// Injected behaviour for one (operation, name) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail with a transient error for the next `times` calls.
    Transient { kind: TransientKind, times: u32 },
    /// Fail with a permanent error on every call.
    Permanent(PermanentKind),
    /// Apply the call, then report a transient timeout once.
    LandThenTimeout,
    /// Never complete.
    Hang,
}

/// One entry of the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub seq: u64,
    pub op: Op,
    pub kind: Option<ResourceKind>,
    pub name: String,
}

enum Trip {
    Pass,
    Fail(ProvisionError),
    LandThenFail(ProvisionError),
    Hang,
}

#[derive(Default)]
struct Inner {
    state: BackendState,
    faults: HashMap<(Op, String), Fault>,
    pending_polls: HashMap<String, u32>,
    calls: Vec<Call>,
}

/// In-memory control plane plus data store.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    seq: AtomicU64,
    latency: Duration,
    provisioning_polls: u32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: BackendState) -> Self {
        let backend = Self::default();
        backend.inner.lock().state = state;
        backend
    }

    /// Delay every call by `latency` (tokio time, so paused-clock tests stay fast).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// New resources report `Provisioning` for this many probes.
    pub fn with_provisioning_polls(mut self, polls: u32) -> Self {
        self.provisioning_polls = polls;
        self
    }

    pub fn inject(&self, op: Op, name: impl Into<String>, fault: Fault) {
        self.inner.lock().faults.insert((op, name.into()), fault);
    }

    pub fn clear_faults(&self) {
        self.inner.lock().faults.clear();
    }

    /// Place a resource directly, bypassing faults and the call log.
    pub fn put_resource(&self, spec: ResourceSpec, state: ResourceState) {
        self.inner.lock().state.insert_resource(spec, state);
    }

    pub fn resource_state(&self, id: &ResourceId) -> Option<ResourceState> {
        self.inner.lock().state.resource(id).map(|r| r.state)
    }

    pub fn snapshot(&self) -> BackendState {
        self.inner.lock().state.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Number of logged calls of `op`, optionally restricted to one kind.
    pub fn count_calls(&self, op: Op, kind: Option<ResourceKind>) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.op == op && (kind.is_none() || c.kind == kind))
            .count()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        guard
    }

    fn trip(&self, op: Op, kind: Option<ResourceKind>, name: &str) -> Trip {
        let mut inner = self.inner.lock();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        inner.calls.push(Call {
            seq,
            op,
            kind,
            name: name.to_string(),
        });

        let key = (op, name.to_string());
        let Some(fault) = inner.faults.get(&key).cloned() else {
            return Trip::Pass;
        };
        let message = format!("injected {} failure on {name}", op.as_str());

        match fault {
            Fault::Transient { kind, times } => {
                if times <= 1 {
                    inner.faults.remove(&key);
                } else {
                    inner
                        .faults
                        .insert(key, Fault::Transient { kind, times: times - 1 });
                }
                Trip::Fail(ProvisionError::transient(kind, message))
            }
            Fault::Permanent(kind) => Trip::Fail(ProvisionError::permanent(kind, message)),
            Fault::LandThenTimeout => {
                inner.faults.remove(&key);
                Trip::LandThenFail(ProvisionError::transient(
                    TransientKind::Timeout,
                    format!("{} on {name} timed out after being applied", op.as_str()),
                ))
            }
            Fault::Hang => Trip::Hang,
        }
    }
}

fn to_data_error(err: ProvisionError) -> DataStoreError {
    match err {
        ProvisionError::Transient { message, .. } => DataStoreError::Transient(message),
        ProvisionError::Permanent { message, .. } => DataStoreError::Rejected(message),
    }
}

#[async_trait]
impl ControlPlane for MemoryBackend {
    async fn resource_exists(
        &self,
        id: &ResourceId,
    ) -> Result<Option<ResourceState>, ProvisionError> {
        let _guard = self.enter().await;
        match self.trip(Op::Probe, Some(id.kind), &id.name) {
            Trip::Pass | Trip::LandThenFail(_) => {}
            Trip::Fail(e) => return Err(e),
            Trip::Hang => return futures::future::pending().await,
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let key = BackendState::resource_key(id);
        let Some(res) = inner.state.resources.get_mut(&key) else {
            return Ok(None);
        };

        if res.state == ResourceState::Provisioning {
            if let Some(left) = inner.pending_polls.get_mut(&key) {
                if *left == 0 {
                    inner.pending_polls.remove(&key);
                    res.state = ResourceState::Succeeded;
                } else {
                    *left -= 1;
                }
            }
        }
        Ok(Some(res.state))
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ProvisionError> {
        let _guard = self.enter().await;
        let after = match self.trip(Op::Create, Some(spec.kind), &spec.name) {
            Trip::Pass => None,
            Trip::LandThenFail(e) => Some(e),
            Trip::Fail(e) => return Err(e),
            Trip::Hang => return futures::future::pending().await,
        };

        let mut inner = self.inner.lock();
        if spec.kind != ResourceKind::ResourceGroup {
            let rg = ResourceId::new(
                ResourceKind::ResourceGroup,
                &spec.resource_group,
                &spec.resource_group,
            );
            if inner.state.resource(&rg).is_none() {
                return Err(ProvisionError::transient(
                    TransientKind::DependencyNotVisible,
                    format!("resource group {} not found", spec.resource_group),
                ));
            }
        }

        let key = BackendState::resource_key(&spec.id());
        let state = if self.provisioning_polls > 0 {
            inner.pending_polls.insert(key, self.provisioning_polls);
            ResourceState::Provisioning
        } else {
            ResourceState::Succeeded
        };
        inner.state.insert_resource(spec.clone(), state);

        match after {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn delete_resource(&self, id: &ResourceId) -> Result<bool, ProvisionError> {
        let _guard = self.enter().await;
        let after = match self.trip(Op::Delete, Some(id.kind), &id.name) {
            Trip::Pass => None,
            Trip::LandThenFail(e) => Some(e),
            Trip::Fail(e) => return Err(e),
            Trip::Hang => return futures::future::pending().await,
        };

        let mut inner = self.inner.lock();
        inner.pending_polls.remove(&BackendState::resource_key(id));
        let existed = inner.state.remove_resource(id);

        match after {
            Some(e) => Err(e),
            None => Ok(existed),
        }
    }
}

#[async_trait]
impl DataStore for MemoryBackend {
    async fn list_records(&self, coll: &CollectionRef) -> Result<Vec<Value>, DataStoreError> {
        let _guard = self.enter().await;
        match self.trip(Op::List, None, &coll.collection) {
            Trip::Pass | Trip::LandThenFail(_) => {}
            Trip::Fail(e) => return Err(to_data_error(e)),
            Trip::Hang => return futures::future::pending().await,
        }

        let inner = self.inner.lock();
        let stored = inner
            .state
            .collection(coll)
            .ok_or_else(|| DataStoreError::CollectionNotFound(coll.to_string()))?;
        Ok(stored.records.values().cloned().collect())
    }

    async fn insert_record(
        &self,
        coll: &CollectionRef,
        record: &BaselineRecord,
    ) -> Result<InsertOutcome, DataStoreError> {
        let _guard = self.enter().await;
        let id = record
            .id()
            .ok_or_else(|| DataStoreError::Rejected("record has no string id".to_string()))?;

        let after = match self.trip(Op::Insert, None, id) {
            Trip::Pass => None,
            Trip::LandThenFail(e) => Some(to_data_error(e)),
            Trip::Fail(e) => return Err(to_data_error(e)),
            Trip::Hang => return futures::future::pending().await,
        };

        let mut inner = self.inner.lock();
        let stored = inner
            .state
            .collections
            .get_mut(&coll.to_string())
            .ok_or_else(|| DataStoreError::CollectionNotFound(coll.to_string()))?;

        let outcome = if stored.records.contains_key(id) {
            InsertOutcome::Conflict
        } else {
            stored.records.insert(id.to_string(), record.as_value());
            InsertOutcome::Created
        };

        match after {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn rg() -> ResourceSpec {
        ResourceSpec::new(ResourceKind::ResourceGroup, "rg-a", "rg-a", "eastus")
    }

    fn coll_spec() -> ResourceSpec {
        ResourceSpec::new(ResourceKind::DataStoreCollection, "usuarios", "rg-a", "eastus")
            .property("account", "acct")
            .property("database", "db")
            .property("partitionKey", "/id")
    }

    fn coll_ref() -> CollectionRef {
        CollectionRef {
            account: "acct".into(),
            database: "db".into(),
            collection: "usuarios".into(),
            partition_key: "/id".into(),
        }
    }

    #[tokio::test]
    async fn create_inside_missing_group_is_transient() {
        let b = MemoryBackend::new();
        let err = b.create_resource(&coll_spec()).await.unwrap_err();
        assert_matches!(
            err,
            ProvisionError::Transient { kind: TransientKind::DependencyNotVisible, .. }
        );
    }

    #[tokio::test]
    async fn provisioning_lag_resolves_after_polls() {
        let b = MemoryBackend::new().with_provisioning_polls(2);
        b.create_resource(&rg()).await.unwrap();
        let id = rg().id();
        assert_eq!(b.resource_exists(&id).await.unwrap(), Some(ResourceState::Provisioning));
        assert_eq!(b.resource_exists(&id).await.unwrap(), Some(ResourceState::Provisioning));
        assert_eq!(b.resource_exists(&id).await.unwrap(), Some(ResourceState::Succeeded));
    }

    #[tokio::test]
    async fn inserts_conflict_on_existing_id() {
        let b = MemoryBackend::new();
        b.create_resource(&rg()).await.unwrap();
        b.create_resource(&coll_spec()).await.unwrap();

        let r = BaselineRecord::new("usuario1");
        assert_eq!(b.insert_record(&coll_ref(), &r).await.unwrap(), InsertOutcome::Created);
        assert_eq!(b.insert_record(&coll_ref(), &r).await.unwrap(), InsertOutcome::Conflict);
        assert_eq!(b.list_records(&coll_ref()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transient_fault_clears_after_n_calls() {
        let b = MemoryBackend::new();
        b.inject(
            Op::Create,
            "rg-a",
            Fault::Transient { kind: TransientKind::RateLimited, times: 2 },
        );
        assert!(b.create_resource(&rg()).await.is_err());
        assert!(b.create_resource(&rg()).await.is_err());
        b.create_resource(&rg()).await.unwrap();
        assert_eq!(b.count_calls(Op::Create, Some(ResourceKind::ResourceGroup)), 3);
    }

    #[tokio::test]
    async fn deleting_group_cascades() {
        let b = MemoryBackend::new();
        b.create_resource(&rg()).await.unwrap();
        b.create_resource(&coll_spec()).await.unwrap();

        assert!(b.delete_resource(&rg().id()).await.unwrap());
        let snap = b.snapshot();
        assert!(snap.resources.is_empty());
        assert!(snap.collections.is_empty());
        assert!(!b.delete_resource(&rg().id()).await.unwrap());
    }

    #[tokio::test]
    async fn listing_unknown_collection_fails() {
        let b = MemoryBackend::new();
        assert_matches!(
            b.list_records(&coll_ref()).await,
            Err(DataStoreError::CollectionNotFound(_))
        );
    }
}
