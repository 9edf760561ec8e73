//! Registry document validation.
//!
//! Validation is strict and fails on the first violation. It never mutates
//! the document; defaults are filled by `registry::prepare` before this runs.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::ConfigError;
use crate::model::{ClientConfig, EnvironmentConfig, EnvironmentKey, ResourceKind, SolutionConfig};
use crate::naming::normalize::is_canonical;
use crate::naming::{rule_for, NameDeriver, COLLECTION_RULE, MAX_CLIENT_KEY_LEN};

/// Validate the whole document.
pub fn validate(cfg: &SolutionConfig) -> Result<(), ConfigError> {
    validate_solution(cfg)?;

    let deriver = NameDeriver::for_config(cfg);
    for (key, client) in &cfg.clients {
        validate_client(cfg, &deriver, key, client)?;
    }

    Ok(())
}

fn validate_solution(cfg: &SolutionConfig) -> Result<(), ConfigError> {
    let s = &cfg.solution;

    if s.name.is_empty() {
        return Err(ConfigError::invalid("solution.name must not be empty"));
    }
    if !s
        .name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(ConfigError::invalid(format!(
            "solution.name must be lowercase alphanumeric: {:?}",
            s.name
        )));
    }
    if s.resource_group_prefix.is_empty() {
        return Err(ConfigError::invalid(
            "solution.resourceGroupPrefix must not be empty",
        ));
    }
    if s.default_location.is_empty() {
        return Err(ConfigError::invalid(
            "solution.defaultLocation must not be empty",
        ));
    }

    for (name, mapping) in &cfg.function_mappings {
        if mapping.path.is_empty() {
            return Err(ConfigError::invalid(format!(
                "functionMappings.{name}.path must not be empty"
            )));
        }
    }

    Ok(())
}

/// Check a client key against `^[a-z][a-z0-9]*$` and the length bound.
pub fn validate_client_key(key: &str) -> Result<(), ConfigError> {
    let fail = |reason: String| ConfigError::InvalidClientKey {
        key: key.to_string(),
        reason,
    };

    let mut chars = key.chars();
    match chars.next() {
        None => return Err(fail("must not be empty".into())),
        Some(c) if !c.is_ascii_lowercase() => {
            return Err(fail("must match ^[a-z][a-z0-9]*$".into()))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(fail("must match ^[a-z][a-z0-9]*$".into()));
    }
    if key.len() > MAX_CLIENT_KEY_LEN {
        return Err(fail(format!(
            "must be at most {MAX_CLIENT_KEY_LEN} characters"
        )));
    }

    Ok(())
}

fn validate_client(
    cfg: &SolutionConfig,
    deriver: &NameDeriver,
    key: &str,
    client: &ClientConfig,
) -> Result<(), ConfigError> {
    validate_client_key(key)?;

    if client.display_name.trim().is_empty() {
        return Err(ConfigError::invalid(format!(
            "client {key}: displayName must not be empty"
        )));
    }
    if client.environments.is_empty() {
        return Err(ConfigError::invalid(format!(
            "client {key}: at least one environment is required"
        )));
    }

    for (env_key, env) in &client.environments {
        validate_environment(cfg, deriver, key, *env_key, env)?;
    }

    Ok(())
}

fn validate_environment(
    cfg: &SolutionConfig,
    deriver: &NameDeriver,
    client: &str,
    env_key: EnvironmentKey,
    env: &EnvironmentConfig,
) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    let mut units: BTreeMap<String, &str> = BTreeMap::new();
    for function in env.functions.all() {
        if !cfg.function_mappings.contains_key(function) {
            return Err(ConfigError::InvalidFunctionReference {
                client: client.to_string(),
                env: env_key.to_string(),
                function: function.clone(),
            });
        }
        if !seen.insert(function.as_str()) {
            return Err(ConfigError::invalid(format!(
                "client {client} environment {env_key}: function {function} listed twice"
            )));
        }
        let unit = deriver.function_unit(client, env_key, function);
        if let Some(other) = units.insert(unit.clone(), function) {
            return Err(ConfigError::InvalidName {
                kind: ResourceKind::DeployedFunctionUnit.to_string(),
                name: unit,
                reason: format!("functions {other} and {function} derive the same name"),
            });
        }
    }

    let mut collections = BTreeSet::new();
    for coll in &env.cosmos_db.collections {
        let derived = deriver.collection(&coll.name);
        if derived.len() < COLLECTION_RULE.min_len {
            return Err(ConfigError::InvalidName {
                kind: ResourceKind::DataStoreCollection.to_string(),
                name: coll.name.clone(),
                reason: format!(
                    "client {client} environment {env_key}: normalizes to fewer than {} character(s)",
                    COLLECTION_RULE.min_len
                ),
            });
        }
        if !collections.insert(derived) {
            return Err(ConfigError::invalid(format!(
                "client {client} environment {env_key}: duplicate collection {}",
                coll.name
            )));
        }
        if !coll.partition_key.starts_with('/') {
            return Err(ConfigError::invalid(format!(
                "collection {}: partitionKey must start with '/': {:?}",
                coll.name, coll.partition_key
            )));
        }

        let mut ids = BTreeSet::new();
        for (i, record) in coll.default_data.iter().enumerate() {
            let id = record.id().ok_or_else(|| {
                ConfigError::invalid(format!(
                    "collection {}: defaultData[{i}] has no string id",
                    coll.name
                ))
            })?;
            if !ids.insert(id) {
                return Err(ConfigError::invalid(format!(
                    "collection {}: duplicate record id {id}",
                    coll.name
                )));
            }
        }
    }

    let named = [
        (ResourceKind::ResourceGroup, env.resource_group.as_str()),
        (ResourceKind::DataStoreAccount, env.cosmos_db.account_name.as_str()),
        (ResourceKind::DataStoreDatabase, env.cosmos_db.database_name.as_str()),
    ];
    for (kind, configured) in named {
        check_configured_name(deriver, client, env_key, env, kind, configured)?;
    }

    Ok(())
}

/// Apply the name override policy to one configured name.
///
/// Empty means "derive". A value equal to the derived name is accepted.
/// Anything else needs `allowNameOverride` and must already be canonical.
pub fn check_configured_name(
    deriver: &NameDeriver,
    client: &str,
    env_key: EnvironmentKey,
    env: &EnvironmentConfig,
    kind: ResourceKind,
    configured: &str,
) -> Result<(), ConfigError> {
    if configured.is_empty() {
        return Ok(());
    }

    let derived = deriver.derive(kind, client, env_key, None)?;
    if configured == derived {
        return Ok(());
    }

    if !env.allow_name_override {
        return Err(ConfigError::NameMismatch {
            client: client.to_string(),
            env: env_key.to_string(),
            kind: kind.to_string(),
            configured: configured.to_string(),
            derived,
        });
    }

    let rule = rule_for(kind);
    if !is_canonical(configured, rule) {
        return Err(ConfigError::InvalidName {
            kind: kind.to_string(),
            name: configured.to_string(),
            reason: format!(
                "not in canonical form (charset or length 1..={} violated)",
                rule.max_len
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn client_key_pattern() {
        validate_client_key("elite").unwrap();
        validate_client_key("a1").unwrap();
        assert_matches!(
            validate_client_key("Bad Name!"),
            Err(ConfigError::InvalidClientKey { .. })
        );
        assert_matches!(
            validate_client_key("1abc"),
            Err(ConfigError::InvalidClientKey { .. })
        );
        assert_matches!(
            validate_client_key(""),
            Err(ConfigError::InvalidClientKey { .. })
        );
    }

    #[test]
    fn client_key_length_bound() {
        validate_client_key(&"a".repeat(MAX_CLIENT_KEY_LEN)).unwrap();
        let err = validate_client_key(&"a".repeat(MAX_CLIENT_KEY_LEN + 1)).unwrap_err();
        assert!(err.to_string().contains("at most 15"));
    }
}
