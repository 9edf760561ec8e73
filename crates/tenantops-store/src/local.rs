//! Local backend persisted to `<state root>/state.json`.
//!
//! All semantics (readiness, conflicts, cascade deletes) come from the core
//! in-memory backend; this type only loads its state on open and writes it
//! back after every mutating call. Writes go to a temp file renamed into
//! place and are serialized through a lock, so the file always holds the
//! latest complete snapshot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use tenantops_core::backend::memory::BackendState;
use tenantops_core::backend::{CollectionRef, ControlPlane, DataStore, InsertOutcome, MemoryBackend};
use tenantops_core::errors::{DataStoreError, PermanentKind, ProvisionError};
use tenantops_core::model::{BaselineRecord, ResourceId, ResourceSpec, ResourceState};

use crate::errors::{StoreError, StoreResult};

/// Default state root, relative to the working directory.
pub const DEFAULT_STATE_ROOT: &str = ".tenantops";

/// State file name inside the state root.
pub const STATE_FILE: &str = "state.json";

pub struct LocalBackend {
    path: PathBuf,
    memory: MemoryBackend,
    write_lock: Mutex<()>,
}

impl LocalBackend {
    /// Open (or start empty) the state under `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let path = root.as_ref().join(STATE_FILE);
        let state = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<BackendState>(&text).map_err(|e| {
                StoreError::Corrupt {
                    path: path.clone(),
                    message: e.to_string(),
                }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BackendState::default(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        tracing::debug!(
            path = %path.display(),
            resources = state.resources.len(),
            collections = state.collections.len(),
            "local state opened"
        );
        Ok(Self {
            path,
            memory: MemoryBackend::from_state(state),
            write_lock: Mutex::new(()),
        })
    }

    pub fn state_path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> BackendState {
        self.memory.snapshot()
    }

    /// Write the current state to disk.
    pub fn persist(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let state = self.memory.snapshot();

        let bytes = serde_json::to_vec_pretty(&state).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }

    fn persist_for_control_plane(&self) -> Result<(), ProvisionError> {
        self.persist().map_err(|e| {
            tracing::error!(error = %e, "failed to persist local state");
            ProvisionError::permanent(PermanentKind::Rejected, e.to_string())
        })
    }
}

#[async_trait]
impl ControlPlane for LocalBackend {
    async fn resource_exists(
        &self,
        id: &ResourceId,
    ) -> Result<Option<ResourceState>, ProvisionError> {
        self.memory.resource_exists(id).await
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ProvisionError> {
        self.memory.create_resource(spec).await?;
        self.persist_for_control_plane()
    }

    async fn delete_resource(&self, id: &ResourceId) -> Result<bool, ProvisionError> {
        let existed = self.memory.delete_resource(id).await?;
        if existed {
            self.persist_for_control_plane()?;
        }
        Ok(existed)
    }
}

#[async_trait]
impl DataStore for LocalBackend {
    async fn list_records(&self, coll: &CollectionRef) -> Result<Vec<Value>, DataStoreError> {
        self.memory.list_records(coll).await
    }

    async fn insert_record(
        &self,
        coll: &CollectionRef,
        record: &BaselineRecord,
    ) -> Result<InsertOutcome, DataStoreError> {
        let outcome = self.memory.insert_record(coll, record).await?;
        if outcome == InsertOutcome::Created {
            self.persist().map_err(|e| DataStoreError::Rejected(e.to_string()))?;
        }
        Ok(outcome)
    }
}
