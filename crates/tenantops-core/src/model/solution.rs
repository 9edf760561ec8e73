//! Client/environment registry document.
//!
//! These types mirror the persisted JSON document one to one (camelCase
//! keys). They are mostly plain data: validation and lookups live in
//! `crate::registry`, name derivation in `crate::naming`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::naming::NamingScheme;

/// Root of the registry document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionConfig {
    pub solution: SolutionInfo,

    #[serde(default)]
    pub clients: BTreeMap<String, ClientConfig>,

    #[serde(default)]
    pub function_mappings: BTreeMap<String, FunctionMapping>,
}

impl SolutionConfig {
    pub fn client(&self, key: &str) -> Option<&ClientConfig> {
        self.clients.get(key)
    }

    /// Registered client keys in stable order.
    pub fn client_keys(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}

/// Solution-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionInfo {
    pub name: String,

    /// Subscription (account scope) every environment deploys into.
    #[serde(default)]
    pub azure_subscription: String,

    pub default_location: String,

    #[serde(default = "SolutionInfo::default_prefix")]
    pub resource_group_prefix: String,

    /// Pins the naming templates of every resource in the document.
    #[serde(default)]
    pub naming_scheme: NamingScheme,
}

impl SolutionInfo {
    fn default_prefix() -> String {
        "rg".to_string()
    }
}

/// One tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Registry key. Filled from the map key on load; not serialized.
    #[serde(skip)]
    pub key: String,

    pub display_name: String,

    #[serde(default)]
    pub environments: BTreeMap<EnvironmentKey, EnvironmentConfig>,
}

impl ClientConfig {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            environments: BTreeMap::new(),
        }
    }

    pub fn with_environment(mut self, env: EnvironmentKey, cfg: EnvironmentConfig) -> Self {
        self.environments.insert(env, cfg);
        self
    }

    pub fn environment(&self, env: EnvironmentKey) -> Option<&EnvironmentConfig> {
        self.environments.get(&env)
    }
}

/// Deployment stage of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKey {
    Testing,
    Main,
}

impl EnvironmentKey {
    pub const ALL: [EnvironmentKey; 2] = [Self::Testing, Self::Main];

    /// Longest key, used for name-length budgeting.
    pub const LONGEST: &'static str = "testing";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Main => "main",
        }
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentKey {
    type Err = String;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "testing" => Ok(Self::Testing),
            "main" => Ok(Self::Main),
            _ => Err(format!("unknown environment {s:?} (expected testing|main)")),
        }
    }
}

/// One (client, environment) deployment target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// Filled with the derived name on load when empty.
    #[serde(default)]
    pub resource_group: String,

    /// Falls back to the solution default location on load when empty.
    #[serde(default)]
    pub location: String,

    /// Accept configured names that differ from the derived ones.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_name_override: bool,

    pub cosmos_db: DataStoreConfig,

    #[serde(default)]
    pub functions: FunctionSet,
}

impl EnvironmentConfig {
    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.cosmos_db.collections.iter().find(|c| c.name == name)
    }
}

/// Document-database settings of an environment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStoreConfig {
    #[serde(default)]
    pub account_name: String,

    #[serde(default)]
    pub database_name: String,

    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

/// A logical collection plus the baseline records it must contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    pub name: String,

    pub partition_key: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_data: Vec<BaselineRecord>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            default_data: Vec::new(),
        }
    }

    pub fn with_record(mut self, record: BaselineRecord) -> Self {
        self.default_data.push(record);
        self
    }

    /// Baseline ids in declaration order. Records without an id are skipped
    /// (they are rejected at load time).
    pub fn baseline_ids(&self) -> Vec<String> {
        self.default_data
            .iter()
            .filter_map(|r| r.id().map(str::to_string))
            .collect()
    }
}

/// A baseline row. `id` is the sole identity key; every other attribute is
/// opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineRecord(pub Map<String, Value>);

impl BaselineRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let mut m = Map::new();
        m.insert("id".to_string(), Value::String(id.into()));
        Self(m)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Functions deployed into an environment, core before plugins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionSet {
    #[serde(default)]
    pub core: Vec<String>,

    #[serde(default)]
    pub plugins: Vec<String>,
}

impl FunctionSet {
    /// Core functions then plugins, each in declaration order.
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.core.iter().chain(self.plugins.iter())
    }

    pub fn len(&self) -> usize {
        self.core.len() + self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a logical function's code lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMapping {
    pub path: String,

    #[serde(rename = "type")]
    pub kind: String,
}
