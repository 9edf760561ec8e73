//! Resource kinds, states and creation specs exchanged with the control plane.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ResourceGroup,
    StorageAccount,
    DataStoreAccount,
    DataStoreDatabase,
    DataStoreCollection,
    ComputePlan,
    DeployedFunctionUnit,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        Self::ResourceGroup,
        Self::StorageAccount,
        Self::DataStoreAccount,
        Self::DataStoreDatabase,
        Self::DataStoreCollection,
        Self::ComputePlan,
        Self::DeployedFunctionUnit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource-group",
            Self::StorageAccount => "storage-account",
            Self::DataStoreAccount => "data-store-account",
            Self::DataStoreDatabase => "data-store-database",
            Self::DataStoreCollection => "data-store-collection",
            Self::ComputePlan => "compute-plan",
            Self::DeployedFunctionUnit => "deployed-function-unit",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of an existing resource as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceState {
    /// Creation accepted but not finished.
    Provisioning,
    /// Terminal success.
    Succeeded,
    /// Terminal failure; the resource must be created again.
    Failed,
}

impl ResourceState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Identity of a resource at the control plane.
///
/// Names are unique per kind inside a resource group; a resource group is
/// scoped by its own name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub resource_group: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.resource_group, self.name)
    }
}

/// Everything the control plane needs to create one resource.
///
/// `properties` carries kind-specific settings (partition key, function
/// path, connection targets) in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl ResourceSpec {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        resource_group: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            resource_group: resource_group.into(),
            location: location.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind, &self.resource_group, &self.name)
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
