//! Provisioning plans.
//!
//! A plan is the ordered list of resources one (client, environment) pair
//! needs, with explicit dependency edges:
//!
//! ```text
//! resource-group
//! ├── storage-account ─────────────────────┐
//! ├── data-store-account                   │
//! │   └── data-store-database ─────────────┤
//! │       └── data-store-collection (×n)   │
//! └── compute-plan ────────────────────────┴── deployed-function-unit (×m)
//! ```
//!
//! Plans are built fresh per invocation and never persisted. Step order is a
//! valid topological order but independent steps are not chained: the engine
//! runs them concurrently.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::model::{EnvironmentKey, ResourceKind, ResourceSpec, SolutionConfig};
use crate::naming::NameDeriver;
use crate::registry;

/// One resource to ensure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningStep {
    pub index: usize,
    pub kind: ResourceKind,
    pub name: String,
    pub depends_on: BTreeSet<usize>,
    pub spec: ResourceSpec,
}

/// Dependency-ordered steps for one (client, environment) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningPlan {
    pub solution: String,
    pub client: String,
    pub env: EnvironmentKey,
    pub steps: Vec<ProvisioningStep>,
}

impl ProvisioningPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&ProvisioningStep> {
        self.steps.get(index)
    }

    /// Steps of one kind, in plan order.
    pub fn steps_of(&self, kind: ResourceKind) -> impl Iterator<Item = &ProvisioningStep> {
        self.steps.iter().filter(move |s| s.kind == kind)
    }

    /// Step count per resource kind.
    pub fn summary(&self) -> BTreeMap<ResourceKind, usize> {
        let mut out = BTreeMap::new();
        for s in &self.steps {
            *out.entry(s.kind).or_insert(0) += 1;
        }
        out
    }

    /// Check the structural invariants:
    /// - indices are positional and dependencies point backwards
    /// - the first step is the only resource group and has no dependencies
    /// - every other step transitively depends on the resource group
    /// - collections depend on a database; function units on a compute plan,
    ///   a storage account and a database
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(first) = self.steps.first() else {
            return Err(ConfigError::invalid("plan has no steps"));
        };
        if first.kind != ResourceKind::ResourceGroup || !first.depends_on.is_empty() {
            return Err(ConfigError::invalid(
                "plan must start with a dependency-free resource-group step",
            ));
        }

        let mut reaches_root = vec![false; self.steps.len()];
        reaches_root[0] = true;

        for (pos, step) in self.steps.iter().enumerate() {
            if step.index != pos {
                return Err(ConfigError::invalid(format!(
                    "step {} is stored at position {pos}",
                    step.index
                )));
            }
            if pos > 0 && step.kind == ResourceKind::ResourceGroup {
                return Err(ConfigError::invalid("plan has more than one resource group"));
            }
            if let Some(bad) = step.depends_on.iter().find(|d| **d >= pos) {
                return Err(ConfigError::invalid(format!(
                    "step {pos} ({}) depends on later step {bad}",
                    step.name
                )));
            }
            if pos > 0 {
                reaches_root[pos] = step.depends_on.iter().any(|d| reaches_root[*d]);
                if !reaches_root[pos] {
                    return Err(ConfigError::invalid(format!(
                        "step {pos} ({}) does not depend on the resource group",
                        step.name
                    )));
                }
            }

            let dep_kinds: BTreeSet<ResourceKind> =
                step.depends_on.iter().map(|d| self.steps[*d].kind).collect();
            let required: &[ResourceKind] = match step.kind {
                ResourceKind::DataStoreCollection => &[ResourceKind::DataStoreDatabase],
                ResourceKind::DeployedFunctionUnit => &[
                    ResourceKind::ComputePlan,
                    ResourceKind::StorageAccount,
                    ResourceKind::DataStoreDatabase,
                ],
                _ => &[],
            };
            if let Some(missing) = required.iter().find(|k| !dep_kinds.contains(*k)) {
                return Err(ConfigError::invalid(format!(
                    "{} step {} must depend on a {missing} step",
                    step.kind, step.name
                )));
            }
        }

        Ok(())
    }
}

/// Build the plan for `client` / `env`.
pub fn build(
    cfg: &SolutionConfig,
    client: &str,
    env: EnvironmentKey,
) -> Result<ProvisioningPlan, ConfigError> {
    let env_cfg = registry::lookup(cfg, client, env)?;
    let deriver = NameDeriver::for_config(cfg);

    let rg = if env_cfg.resource_group.is_empty() {
        deriver.resource_group(client, env)
    } else {
        env_cfg.resource_group.clone()
    };
    let location = if env_cfg.location.is_empty() {
        cfg.solution.default_location.clone()
    } else {
        env_cfg.location.clone()
    };
    let account = non_empty_or(&env_cfg.cosmos_db.account_name, || {
        deriver.data_store_account(client, env)
    });
    let database = non_empty_or(&env_cfg.cosmos_db.database_name, || {
        deriver.database(client, env)
    });

    let mut b = PlanBuilder::new(&rg, &location);

    let rg_step = b.push(ResourceKind::ResourceGroup, &rg, &[], |s| s);

    let storage_name = deriver.storage_account(client, env);
    let storage_step = b.push(ResourceKind::StorageAccount, &storage_name, &[rg_step], |s| s);

    let account_step = b.push(ResourceKind::DataStoreAccount, &account, &[rg_step], |s| s);

    let database_step = b.push(
        ResourceKind::DataStoreDatabase,
        &database,
        &[account_step],
        |s| s.property("account", &account),
    );

    for coll in &env_cfg.cosmos_db.collections {
        let name = deriver.collection(&coll.name);
        b.push(
            ResourceKind::DataStoreCollection,
            &name,
            &[database_step],
            |s| {
                s.property("account", &account)
                    .property("database", &database)
                    .property("partitionKey", &coll.partition_key)
            },
        );
    }

    let plan_name = deriver.compute_plan(client, env);
    let plan_step = b.push(ResourceKind::ComputePlan, &plan_name, &[rg_step], |s| s);

    for function in env_cfg.functions.all() {
        let mapping = cfg.function_mappings.get(function).ok_or_else(|| {
            ConfigError::InvalidFunctionReference {
                client: client.to_string(),
                env: env.to_string(),
                function: function.clone(),
            }
        })?;
        let name = deriver.function_unit(client, env, function);
        b.push(
            ResourceKind::DeployedFunctionUnit,
            &name,
            &[plan_step, storage_step, database_step],
            |s| {
                s.property("function", function)
                    .property("path", &mapping.path)
                    .property("type", &mapping.kind)
                    .property("computePlan", &plan_name)
                    .property("storageAccount", &storage_name)
                    .property("dataStoreAccount", &account)
                    .property("database", &database)
            },
        );
    }

    let plan = ProvisioningPlan {
        solution: cfg.solution.name.clone(),
        client: client.to_string(),
        env,
        steps: b.finish(),
    };
    plan.validate()?;

    tracing::debug!(
        client,
        env = %env,
        steps = plan.len(),
        "provisioning plan built"
    );
    Ok(plan)
}

fn non_empty_or(value: &str, derive: impl FnOnce() -> String) -> String {
    if value.is_empty() {
        derive()
    } else {
        value.to_string()
    }
}

struct PlanBuilder {
    resource_group: String,
    location: String,
    steps: Vec<ProvisioningStep>,
}

impl PlanBuilder {
    fn new(resource_group: &str, location: &str) -> Self {
        Self {
            resource_group: resource_group.to_string(),
            location: location.to_string(),
            steps: Vec::new(),
        }
    }

    fn push(
        &mut self,
        kind: ResourceKind,
        name: &str,
        deps: &[usize],
        spec: impl FnOnce(ResourceSpec) -> ResourceSpec,
    ) -> usize {
        let index = self.steps.len();
        let base = ResourceSpec::new(kind, name, &self.resource_group, &self.location);
        self.steps.push(ProvisioningStep {
            index,
            kind,
            name: name.to_string(),
            depends_on: deps.iter().copied().collect(),
            spec: spec(base),
        });
        index
    }

    fn finish(self) -> Vec<ProvisioningStep> {
        self.steps
    }
}
