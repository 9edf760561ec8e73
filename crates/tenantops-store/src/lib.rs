//! tenantops-store
//!
//! File-backed stand-in for the cloud: a single JSON state file under a state
//! root directory holds every provisioned resource and every seeded record.
//! Lets the CLI run the full pipeline locally and re-run it idempotently
//! across invocations.

pub mod errors;
pub mod local;

pub use crate::errors::{StoreError, StoreResult};
pub use crate::local::{LocalBackend, DEFAULT_STATE_ROOT, STATE_FILE};
