//! Client/environment registry (the config store).
//!
//! The registry document is loaded once per invocation into an explicit
//! [`SolutionConfig`] value that is passed through the pipeline. Mutation is
//! pure (`add_client` returns a new value) and persistence is an explicit
//! `save` of the whole document.
//!
//! Requirements:
//! - lookups are case-sensitive exact matches with explicit not-found errors
//! - iteration order is stable (`BTreeMap`)
//! - no global mutable state

pub mod validate;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::model::{
    ClientConfig, CollectionConfig, DataStoreConfig, EnvironmentConfig, EnvironmentKey,
    FunctionSet, SolutionConfig,
};
use crate::naming::NameDeriver;

pub use validate::{validate, validate_client_key};

/// Load, prepare and validate the document at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<SolutionConfig, ConfigError> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(ConfigError::Io {
                message: format!("{}: {e}", path.display()),
            })
        }
    };

    let cfg = from_json_str(&text)?;
    tracing::debug!(
        path = %path.display(),
        clients = cfg.clients.len(),
        "registry loaded"
    );
    Ok(cfg)
}

/// Parse, prepare and validate a document held in memory.
pub fn from_json_str(text: &str) -> Result<SolutionConfig, ConfigError> {
    let cfg: SolutionConfig = serde_json::from_str(text).map_err(|e| ConfigError::Parse {
        message: e.to_string(),
    })?;
    prepare(cfg)
}

/// Fill derived defaults (client keys, names, locations) and validate.
///
/// Configured names are vetted before any default is filled in, so a
/// mismatching override is reported rather than silently kept.
pub fn prepare(mut cfg: SolutionConfig) -> Result<SolutionConfig, ConfigError> {
    validate(&cfg)?;

    let deriver = NameDeriver::for_config(&cfg);
    let default_location = cfg.solution.default_location.clone();

    for (key, client) in cfg.clients.iter_mut() {
        client.key = key.clone();
        for (env_key, env) in client.environments.iter_mut() {
            if env.resource_group.is_empty() {
                env.resource_group = deriver.resource_group(key, *env_key);
            }
            if env.cosmos_db.account_name.is_empty() {
                env.cosmos_db.account_name = deriver.data_store_account(key, *env_key);
            }
            if env.cosmos_db.database_name.is_empty() {
                env.cosmos_db.database_name = deriver.database(key, *env_key);
            }
            if env.location.is_empty() {
                env.location = default_location.clone();
            }
        }
    }

    Ok(cfg)
}

/// Persist the whole document to `path`.
///
/// Written to a sibling temp file and renamed into place so readers never see
/// a half-written document. Concurrent writers must be serialized by the
/// caller.
pub fn save(path: impl AsRef<Path>, cfg: &SolutionConfig) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let io = |e: std::io::Error| ConfigError::Io {
        message: format!("{}: {e}", path.display()),
    };

    let mut text = serde_json::to_string_pretty(cfg).map_err(|e| ConfigError::Io {
        message: format!("serialize: {e}"),
    })?;
    text.push('\n');

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io)?;
        }
    }

    let tmp = temp_sibling(path);
    fs::write(&tmp, text.as_bytes()).map_err(io)?;
    fs::rename(&tmp, path).map_err(io)?;

    tracing::info!(path = %path.display(), clients = cfg.clients.len(), "registry saved");
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "registry.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Resolve a client by exact key.
pub fn lookup_client<'a>(
    cfg: &'a SolutionConfig,
    client: &str,
) -> Result<&'a ClientConfig, ConfigError> {
    cfg.client(client)
        .ok_or_else(|| ConfigError::ClientNotFound(client.to_string()))
}

/// Resolve the environment of a client.
pub fn lookup<'a>(
    cfg: &'a SolutionConfig,
    client: &str,
    env: EnvironmentKey,
) -> Result<&'a EnvironmentConfig, ConfigError> {
    lookup_client(cfg, client)?
        .environment(env)
        .ok_or_else(|| ConfigError::EnvironmentNotFound {
            client: client.to_string(),
            env: env.to_string(),
        })
}

/// Return a new document with `client` registered. The input is untouched.
pub fn add_client(
    cfg: &SolutionConfig,
    client: ClientConfig,
) -> Result<SolutionConfig, ConfigError> {
    validate_client_key(&client.key)?;
    if cfg.clients.contains_key(&client.key) {
        return Err(ConfigError::DuplicateClient(client.key));
    }

    let mut next = cfg.clone();
    next.clients.insert(client.key.clone(), client);
    prepare(next)
}

/// Every (client, environment) pair in stable order.
pub fn entries(cfg: &SolutionConfig) -> Vec<(String, EnvironmentKey)> {
    cfg.clients
        .iter()
        .flat_map(|(key, client)| {
            client
                .environments
                .keys()
                .map(move |env| (key.clone(), *env))
        })
        .collect()
}

/// Scaffold a new client with derived names.
///
/// Collections and functions are copied from the first registered client
/// that has the same environment; without one the environment starts empty.
pub fn new_client(
    cfg: &SolutionConfig,
    key: &str,
    display_name: &str,
    env: EnvironmentKey,
) -> Result<ClientConfig, ConfigError> {
    validate_client_key(key)?;
    if display_name.trim().is_empty() {
        return Err(ConfigError::invalid("display name must not be empty"));
    }

    let template = cfg
        .clients
        .values()
        .find_map(|c| c.environment(env))
        .map(|e| (e.cosmos_db.collections.clone(), e.functions.clone()));
    let (collections, functions): (Vec<CollectionConfig>, FunctionSet) =
        template.unwrap_or_default();

    let deriver = NameDeriver::for_config(cfg);
    let env_cfg = EnvironmentConfig {
        resource_group: deriver.resource_group(key, env),
        location: cfg.solution.default_location.clone(),
        allow_name_override: false,
        cosmos_db: DataStoreConfig {
            account_name: deriver.data_store_account(key, env),
            database_name: deriver.database(key, env),
            collections,
        },
        functions,
    };

    Ok(ClientConfig::new(key, display_name).with_environment(env, env_cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NamingScheme;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn doc() -> serde_json::Value {
        json!({
            "solution": {
                "name": "tenantops",
                "azureSubscription": "sub-123",
                "defaultLocation": "eastus",
                "resourceGroupPrefix": "rg"
            },
            "clients": {
                "elite": {
                    "displayName": "Elite",
                    "environments": {
                        "main": {
                            "cosmosDb": {
                                "collections": [
                                    {
                                        "name": "usuarios",
                                        "partitionKey": "/id",
                                        "defaultData": [{"id": "usuario1"}, {"id": "usuario2"}]
                                    }
                                ]
                            },
                            "functions": { "core": ["getUsuarios"], "plugins": [] }
                        }
                    }
                }
            },
            "functionMappings": {
                "getUsuarios": { "path": "functions/core/getUsuarios", "type": "http" }
            }
        })
    }

    fn parse(v: serde_json::Value) -> Result<SolutionConfig, ConfigError> {
        from_json_str(&v.to_string())
    }

    #[test]
    fn load_fills_derived_names() {
        let cfg = parse(doc()).unwrap();
        let env = lookup(&cfg, "elite", EnvironmentKey::Main).unwrap();
        assert_eq!(env.resource_group, "rg-tenantops-elite-main");
        assert_eq!(env.cosmos_db.account_name, "tenantops-elite-main");
        assert_eq!(env.cosmos_db.database_name, "tenantops-elite");
        assert_eq!(env.location, "eastus");
        assert_eq!(cfg.clients["elite"].key, "elite");
    }

    #[test]
    fn structural_errors_are_parse_errors() {
        let mut v = doc();
        v["solution"].as_object_mut().unwrap().remove("name");
        assert_matches!(parse(v), Err(ConfigError::Parse { .. }));
        assert_matches!(from_json_str("{"), Err(ConfigError::Parse { .. }));
    }

    #[test]
    fn lookups_are_exact() {
        let cfg = parse(doc()).unwrap();
        assert_matches!(
            lookup(&cfg, "Elite", EnvironmentKey::Main),
            Err(ConfigError::ClientNotFound(_))
        );
        assert_matches!(
            lookup(&cfg, "elite", EnvironmentKey::Testing),
            Err(ConfigError::EnvironmentNotFound { .. })
        );
    }

    #[test]
    fn bad_client_key_fails_load() {
        let mut v = doc();
        let elite = v["clients"]["elite"].clone();
        v["clients"]["Bad Name!"] = elite;
        assert_matches!(parse(v), Err(ConfigError::InvalidClientKey { .. }));
    }

    #[test]
    fn unknown_function_reference_fails_load() {
        let mut v = doc();
        v["clients"]["elite"]["environments"]["main"]["functions"]["plugins"] = json!(["nope"]);
        assert_matches!(
            parse(v),
            Err(ConfigError::InvalidFunctionReference { function, .. }) if function == "nope"
        );
    }

    #[test]
    fn functions_that_derive_the_same_unit_name_are_rejected() {
        let mut v = doc();
        v["functionMappings"]["get_users"] = json!({"path": "functions/core/a", "type": "http"});
        v["functionMappings"]["get-users"] = json!({"path": "functions/core/b", "type": "http"});
        v["clients"]["elite"]["environments"]["main"]["functions"]["core"] =
            json!(["get_users", "get-users"]);

        assert_matches!(
            parse(v),
            Err(ConfigError::InvalidName { name, reason, .. })
                if name == "func-tenantops-elite-main-get-users"
                    && reason.contains("get_users")
                    && reason.contains("get-users")
        );
    }

    #[test]
    fn collection_name_must_survive_normalization() {
        let mut v = doc();
        v["clients"]["elite"]["environments"]["main"]["cosmosDb"]["collections"][0]["name"] =
            json!("ñ");
        assert_matches!(
            parse(v),
            Err(ConfigError::InvalidName { kind, .. }) if kind == "data-store-collection"
        );
    }

    #[test]
    fn naming_scheme_is_read_from_the_document() {
        let cfg = parse(doc()).unwrap();
        assert_eq!(cfg.solution.naming_scheme, NamingScheme::V1);
        assert_eq!(NameDeriver::for_config(&cfg).scheme(), NamingScheme::V1);

        let mut v = doc();
        v["solution"]["namingScheme"] = json!("v1");
        parse(v.clone()).unwrap();

        v["solution"]["namingScheme"] = json!("v9");
        assert_matches!(parse(v), Err(ConfigError::Parse { .. }));
    }

    #[test]
    fn partition_key_must_be_a_path() {
        let mut v = doc();
        v["clients"]["elite"]["environments"]["main"]["cosmosDb"]["collections"][0]
            ["partitionKey"] = json!("id");
        assert_matches!(parse(v), Err(ConfigError::Invalid(_)));
    }

    #[test]
    fn duplicate_record_ids_rejected() {
        let mut v = doc();
        v["clients"]["elite"]["environments"]["main"]["cosmosDb"]["collections"][0]
            ["defaultData"] = json!([{"id": "a"}, {"id": "a"}]);
        assert_matches!(parse(v), Err(ConfigError::Invalid(_)));
    }

    #[test]
    fn name_override_policy() {
        let mut v = doc();
        v["clients"]["elite"]["environments"]["main"]["resourceGroup"] =
            json!("rg-tenantops-elite-main");
        parse(v.clone()).unwrap();

        v["clients"]["elite"]["environments"]["main"]["resourceGroup"] = json!("rg-legacy");
        assert_matches!(parse(v.clone()), Err(ConfigError::NameMismatch { .. }));

        v["clients"]["elite"]["environments"]["main"]["allowNameOverride"] = json!(true);
        let cfg = parse(v.clone()).unwrap();
        assert_eq!(
            lookup(&cfg, "elite", EnvironmentKey::Main).unwrap().resource_group,
            "rg-legacy"
        );

        v["clients"]["elite"]["environments"]["main"]["resourceGroup"] = json!("RG Legacy");
        assert_matches!(parse(v), Err(ConfigError::InvalidName { .. }));
    }

    #[test]
    fn add_client_is_pure_and_rejects_duplicates() {
        let cfg = parse(doc()).unwrap();
        let acme = new_client(&cfg, "acme", "Acme", EnvironmentKey::Main).unwrap();
        let next = add_client(&cfg, acme.clone()).unwrap();

        assert_eq!(cfg.clients.len(), 1);
        assert_eq!(next.clients.len(), 2);
        assert_eq!(
            entries(&next),
            vec![
                ("acme".to_string(), EnvironmentKey::Main),
                ("elite".to_string(), EnvironmentKey::Main)
            ]
        );

        let copied = lookup(&next, "acme", EnvironmentKey::Main).unwrap();
        assert_eq!(copied.cosmos_db.collections.len(), 1);
        assert_eq!(copied.functions.core, vec!["getUsuarios"]);

        assert_matches!(
            add_client(&next, acme),
            Err(ConfigError::DuplicateClient(k)) if k == "acme"
        );
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("solution.json");

        let cfg = parse(doc()).unwrap();
        save(&path, &cfg).unwrap();
        assert!(!dir.path().join("nested").join("solution.json.tmp").exists());

        let back = load(&path).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            load(dir.path().join("absent.json")),
            Err(ConfigError::NotFound { .. })
        );
    }
}
