use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tenantops_core::model::EnvironmentKey;
use tenantops_store::DEFAULT_STATE_ROOT;

#[derive(Parser, Debug, Clone)]
#[command(name = "tenantops", version, about = "Multi-tenant deployment orchestrator")]
pub struct Cli {
    /// Solution config document.
    #[arg(
        long,
        global = true,
        env = "TENANTOPS_CONFIG",
        default_value = "solution.json"
    )]
    pub config: PathBuf,

    /// Local state root (default: .tenantops)
    #[arg(
        long,
        global = true,
        env = "TENANTOPS_STATE_ROOT",
        default_value = DEFAULT_STATE_ROOT
    )]
    pub state_root: PathBuf,

    /// Emit JSON output on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Maximum number of plan steps in flight.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Provision, seed and validate one client environment.
    Deploy {
        client: String,
        /// testing|main
        env: EnvironmentKey,
        /// Must match the solution's subscription.
        subscription: String,
    },

    /// Register a new client with derived names and save the config document.
    AddClient {
        key: String,
        display_name: String,
        env: EnvironmentKey,
    },

    /// Insert the baseline records of every collection.
    Seed { client: String, env: EnvironmentKey },

    /// Check that every baseline record is present.
    Validate { client: String, env: EnvironmentKey },

    /// Show the live phase of one, some or all environments.
    Status {
        client: Option<String>,
        env: Option<EnvironmentKey>,
    },

    /// Print the provisioning plan without applying it.
    Plan { client: String, env: EnvironmentKey },

    /// Delete every resource of one client environment.
    Teardown {
        client: String,
        env: EnvironmentKey,
        /// Confirm deletion.
        #[arg(long)]
        yes: bool,
    },
}
