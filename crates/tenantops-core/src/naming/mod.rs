//! Deterministic resource naming.
//!
//! `NameDeriver` maps (solution, client, environment, resource kind) to the
//! canonical identifier of a resource. It performs no I/O and holds no state
//! besides its inputs: identical inputs always produce identical names, which
//! is what makes re-running a deployment safe.
//!
//! Templates are versioned through [`NamingScheme`]. Changing a template would
//! rename already-provisioned resources, so a change is a new scheme variant.
//!
//! | kind | template (`v1`) |
//! |---|---|
//! | resource group | `{prefix}-{solution}-{client}-{env}` |
//! | storage account | `st{solution}{client}{env}` |
//! | data-store account | `{solution}-{client}-{env}` |
//! | data-store database | `{solution}-{client}` |
//! | data-store collection | `{collection}` |
//! | compute plan | `plan-{solution}-{client}-{env}` |
//! | deployed function unit | `func-{solution}-{client}-{env}-{function}` |

pub mod hashing;
pub mod normalize;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::model::{EnvironmentKey, ResourceKind, SolutionConfig};

pub use normalize::NameRule;

/// Fixed prefix of storage account names.
pub const STORAGE_PREFIX: &str = "st";

/// Longest client key that still leaves the storage account name un-truncated
/// for the shortest solution name: the storage limit minus its prefix and the
/// longest environment key.
pub const MAX_CLIENT_KEY_LEN: usize =
    STORAGE_ACCOUNT_RULE.max_len - STORAGE_PREFIX.len() - EnvironmentKey::LONGEST.len();

pub const RESOURCE_GROUP_RULE: NameRule = NameRule {
    min_len: 1,
    max_len: 90,
    allow_hyphen: true,
    extra: &['_', '.', '(', ')'],
};

pub const STORAGE_ACCOUNT_RULE: NameRule = NameRule {
    min_len: 3,
    max_len: 24,
    allow_hyphen: false,
    extra: &[],
};

pub const DATA_STORE_ACCOUNT_RULE: NameRule = NameRule {
    min_len: 3,
    max_len: 44,
    allow_hyphen: true,
    extra: &[],
};

pub const DATABASE_RULE: NameRule = NameRule {
    min_len: 1,
    max_len: 255,
    allow_hyphen: true,
    extra: &['_'],
};

pub const COLLECTION_RULE: NameRule = DATABASE_RULE;

pub const COMPUTE_PLAN_RULE: NameRule = NameRule {
    min_len: 1,
    max_len: 40,
    allow_hyphen: true,
    extra: &[],
};

pub const FUNCTION_UNIT_RULE: NameRule = NameRule {
    min_len: 2,
    max_len: 60,
    allow_hyphen: true,
    extra: &[],
};

/// Naming rule for a resource kind.
pub fn rule_for(kind: ResourceKind) -> &'static NameRule {
    match kind {
        ResourceKind::ResourceGroup => &RESOURCE_GROUP_RULE,
        ResourceKind::StorageAccount => &STORAGE_ACCOUNT_RULE,
        ResourceKind::DataStoreAccount => &DATA_STORE_ACCOUNT_RULE,
        ResourceKind::DataStoreDatabase => &DATABASE_RULE,
        ResourceKind::DataStoreCollection => &COLLECTION_RULE,
        ResourceKind::ComputePlan => &COMPUTE_PLAN_RULE,
        ResourceKind::DeployedFunctionUnit => &FUNCTION_UNIT_RULE,
    }
}

/// Known naming schemes. Selected per document through
/// `solution.namingScheme`; absent means the current default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NamingScheme {
    #[default]
    #[serde(rename = "v1")]
    V1,
}

impl NamingScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
        }
    }
}

/// Derives canonical names for one solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameDeriver {
    scheme: NamingScheme,
    solution: String,
    prefix: String,
}

impl NameDeriver {
    pub fn new(solution: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            scheme: NamingScheme::V1,
            solution: solution.into(),
            prefix: prefix.into(),
        }
    }

    pub fn for_config(cfg: &SolutionConfig) -> Self {
        Self::new(&cfg.solution.name, &cfg.solution.resource_group_prefix)
            .with_scheme(cfg.solution.naming_scheme)
    }

    pub fn with_scheme(mut self, scheme: NamingScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn scheme(&self) -> NamingScheme {
        self.scheme
    }

    pub fn resource_group(&self, client: &str, env: EnvironmentKey) -> String {
        self.template(ResourceKind::ResourceGroup, client, env, None)
    }

    pub fn storage_account(&self, client: &str, env: EnvironmentKey) -> String {
        self.template(ResourceKind::StorageAccount, client, env, None)
    }

    pub fn data_store_account(&self, client: &str, env: EnvironmentKey) -> String {
        self.template(ResourceKind::DataStoreAccount, client, env, None)
    }

    pub fn database(&self, client: &str, env: EnvironmentKey) -> String {
        self.template(ResourceKind::DataStoreDatabase, client, env, None)
    }

    pub fn collection(&self, collection: &str) -> String {
        Self::collection_name(collection)
    }

    /// Collection names do not depend on solution, client or environment.
    pub fn collection_name(collection: &str) -> String {
        normalize::canonical(collection, &COLLECTION_RULE)
    }

    pub fn compute_plan(&self, client: &str, env: EnvironmentKey) -> String {
        self.template(ResourceKind::ComputePlan, client, env, None)
    }

    pub fn function_unit(&self, client: &str, env: EnvironmentKey, function: &str) -> String {
        self.template(ResourceKind::DeployedFunctionUnit, client, env, Some(function))
    }

    /// Generic entry point. `member` is the collection or function name for
    /// the kinds that need one and is ignored otherwise.
    pub fn derive(
        &self,
        kind: ResourceKind,
        client: &str,
        env: EnvironmentKey,
        member: Option<&str>,
    ) -> Result<String, ConfigError> {
        match (kind, member) {
            (ResourceKind::DataStoreCollection, Some(m)) => Ok(self.collection(m)),
            (ResourceKind::DeployedFunctionUnit, Some(_)) => {
                Ok(self.template(kind, client, env, member))
            }
            (ResourceKind::DataStoreCollection | ResourceKind::DeployedFunctionUnit, None) => {
                Err(ConfigError::invalid(format!(
                    "{} names need a member name",
                    kind.as_str()
                )))
            }
            _ => Ok(self.template(kind, client, env, None)),
        }
    }

    fn template(
        &self,
        kind: ResourceKind,
        client: &str,
        env: EnvironmentKey,
        member: Option<&str>,
    ) -> String {
        let (s, p, e) = (&self.solution, &self.prefix, env.as_str());
        let raw = match self.scheme {
            NamingScheme::V1 => match kind {
                ResourceKind::ResourceGroup => format!("{p}-{s}-{client}-{e}"),
                ResourceKind::StorageAccount => format!("{STORAGE_PREFIX}{s}{client}{e}"),
                ResourceKind::DataStoreAccount => format!("{s}-{client}-{e}"),
                ResourceKind::DataStoreDatabase => format!("{s}-{client}"),
                ResourceKind::DataStoreCollection => member.unwrap_or_default().to_string(),
                ResourceKind::ComputePlan => format!("plan-{s}-{client}-{e}"),
                ResourceKind::DeployedFunctionUnit => {
                    format!("func-{s}-{client}-{e}-{}", member.unwrap_or_default())
                }
            },
        };
        normalize::canonical(&raw, rule_for(kind))
    }
}
