use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tenantops_core::prelude::*;
use tenantops_core::registry;
use tenantops_store::LocalBackend;
use tokio_util::sync::CancellationToken;

use crate::args::{Cli, Command};

mod add_client;
mod deploy;
mod plan;
mod seed;
mod status;
mod teardown;
mod validate;

/// Result of a command that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Some step, record or collection failed.
    Failed,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failed
        }
    }

    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Failed => ExitCode::from(1),
        }
    }
}

/// Config and usage errors exit with 2, anything else with 1.
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    let usage = err.downcast_ref::<ConfigError>().is_some()
        || err
            .downcast_ref::<TenantOpsError>()
            .is_some_and(|e| e.is_config() || matches!(e, TenantOpsError::InvalidArgument(_)));
    if usage {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}

/// Shared invocation settings.
pub struct Context {
    pub config_path: PathBuf,
    pub state_root: PathBuf,
    pub concurrency: Option<usize>,
}

impl Context {
    pub fn load_config(&self) -> Result<SolutionConfig> {
        Ok(registry::load(&self.config_path)?)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let cfg = EngineConfig::default();
        match self.concurrency {
            Some(n) => cfg.with_max_concurrency(n),
            None => cfg,
        }
    }

    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let engine = ProvisionEngine::new(self.engine_config())?;
        let backend = Arc::new(LocalBackend::open(&self.state_root)?);
        Ok(Orchestrator::new(engine, backend.clone(), backend))
    }
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            child.cancel();
        }
    });
    token
}

pub async fn dispatch(cli: Cli) -> Result<Outcome> {
    let ctx = Context {
        config_path: cli.config,
        state_root: cli.state_root,
        concurrency: cli.concurrency,
    };

    match cli.command {
        Command::Deploy {
            client,
            env,
            subscription,
        } => deploy::run(&ctx, &client, env, &subscription).await,
        Command::AddClient {
            key,
            display_name,
            env,
        } => add_client::run(&ctx, &key, &display_name, env),
        Command::Seed { client, env } => seed::run(&ctx, &client, env).await,
        Command::Validate { client, env } => validate::run(&ctx, &client, env).await,
        Command::Status { client, env } => status::run(&ctx, client.as_deref(), env).await,
        Command::Plan { client, env } => plan::run(&ctx, &client, env),
        Command::Teardown { client, env, yes } => teardown::run(&ctx, &client, env, yes).await,
    }
}
