use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;
use termcolor::StandardStream;
use tenantops_core::prelude::*;
use tenantops_core::registry;

use super::{Context, Outcome};
use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddClientOut {
    pub key: String,
    pub display_name: String,
    pub env: EnvironmentKey,
    pub resource_group: String,
    pub account_name: String,
    pub database_name: String,
    pub collections: Vec<String>,
    pub functions: Vec<String>,
    pub config: String,
}

pub fn run(ctx: &Context, key: &str, display_name: &str, env: EnvironmentKey) -> Result<Outcome> {
    let cfg = ctx.load_config()?;
    let client = registry::new_client(&cfg, key, display_name, env)?;
    let next = registry::add_client(&cfg, client)?;
    registry::save(&ctx.config_path, &next)?;

    let env_cfg = registry::lookup(&next, key, env)?;
    tracing::info!(client = key, env = %env, path = %ctx.config_path.display(), "client added");

    let out = AddClientOut {
        key: key.to_string(),
        display_name: display_name.to_string(),
        env,
        resource_group: env_cfg.resource_group.clone(),
        account_name: env_cfg.cosmos_db.account_name.clone(),
        database_name: env_cfg.cosmos_db.database_name.clone(),
        collections: env_cfg
            .cosmos_db
            .collections
            .iter()
            .map(|c| c.name.clone())
            .collect(),
        functions: env_cfg.functions.all().cloned().collect(),
        config: ctx.config_path.display().to_string(),
    };
    output::emit(&out, |w| render(w, &out))?;
    Ok(Outcome::Success)
}

fn render(out: &mut StandardStream, added: &AddClientOut) -> io::Result<()> {
    output::status_line(
        out,
        true,
        "added",
        &format!("{} ({}) {}", added.key, added.display_name, added.env),
    )?;
    writeln!(out, "  resource group  {}", added.resource_group)?;
    writeln!(out, "  account         {}", added.account_name)?;
    writeln!(out, "  database        {}", added.database_name)?;
    writeln!(out, "  collections     {}", added.collections.join(", "))?;
    writeln!(out, "  functions       {}", added.functions.join(", "))?;
    writeln!(out, "  saved to        {}", added.config)
}
