//! Error taxonomy for tenantops.
//!
//! Errors are split by how the orchestrator reacts to them:
//! - [`ConfigError`]: fatal to the current operation, surfaced immediately, never retried
//! - [`ProvisionError`]: classified transient or permanent by the backend; the engine
//!   retries transient ones and records the rest as step failures
//! - [`DataStoreError`]: recorded per record id by the seeder, per collection by the validator
//!
//! [`TenantOpsError`] wraps all of them for callers that want a single type.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result alias used across the crate.
pub type TenantOpsResult<T> = Result<T, TenantOpsError>;

/// Configuration errors. These abort the whole run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config document not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to parse config document: {message}")]
    Parse { message: String },

    #[error("config i/o error: {message}")]
    Io { message: String },

    #[error("client not found: {0}")]
    ClientNotFound(String),

    #[error("environment {env} not found for client {client}")]
    EnvironmentNotFound { client: String, env: String },

    #[error("client already registered: {0}")]
    DuplicateClient(String),

    #[error("client {client} environment {env} references unknown function: {function}")]
    InvalidFunctionReference {
        client: String,
        env: String,
        function: String,
    },

    #[error("invalid client key {key:?}: {reason}")]
    InvalidClientKey { key: String, reason: String },

    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("{kind} name {configured:?} for {client}/{env} does not match derived name {derived:?} (set allowNameOverride to keep it)")]
    NameMismatch {
        client: String,
        env: String,
        kind: String,
        configured: String,
        derived: String,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Transient failure classes. Retried with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransientKind {
    Timeout,
    RateLimited,
    DependencyNotVisible,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate-limited",
            Self::DependencyNotVisible => "dependency-not-yet-visible",
        }
    }
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permanent failure classes. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermanentKind {
    QuotaExceeded,
    NamingConflict,
    MalformedSpec,
    Rejected,
}

impl PermanentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota-exceeded",
            Self::NamingConflict => "naming-conflict",
            Self::MalformedSpec => "malformed-spec",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a control-plane call.
///
/// The classification is supplied by the backend so the retry policy is a pure
/// function of the variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    #[error("transient ({kind}): {message}")]
    Transient { kind: TransientKind, message: String },

    #[error("permanent ({kind}): {message}")]
    Permanent { kind: PermanentKind, message: String },
}

impl ProvisionError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::Transient {
            kind,
            message: message.into(),
        }
    }

    pub fn permanent(kind: PermanentKind, message: impl Into<String>) -> Self {
        Self::Permanent {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Error returned by a data-store call.
///
/// A conflicting insert is not an error; see `InsertOutcome::Conflict`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataStoreError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("transient data store error: {0}")]
    Transient(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Top-level error for callers that combine stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenantOpsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    DataStore(#[from] DataStoreError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl TenantOpsError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// True for errors that abort a run before anything is planned.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
