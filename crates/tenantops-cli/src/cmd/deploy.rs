use std::io::{self, Write};

use anyhow::Result;
use termcolor::StandardStream;
use tenantops_core::prelude::*;

use super::{cancel_on_ctrl_c, seed, validate, Context, Outcome};
use crate::output;

pub async fn run(
    ctx: &Context,
    client: &str,
    env: EnvironmentKey,
    subscription: &str,
) -> Result<Outcome> {
    let cfg = ctx.load_config()?;
    if subscription != cfg.solution.azure_subscription {
        return Err(TenantOpsError::invalid_argument(format!(
            "subscription {subscription} does not match the solution subscription {}",
            cfg.solution.azure_subscription
        ))
        .into());
    }

    let orchestrator = ctx.orchestrator()?;
    let cancel = cancel_on_ctrl_c();

    let pb = output::spinner(format!("deploying {client}/{env}"));
    let report = orchestrator
        .run_with_cancel(&cfg, client, env, &cancel)
        .await?;
    pb.finish_and_clear();

    tracing::info!(
        client,
        env = %env,
        run_id = %report.deployment.run_id,
        success = report.success,
        "deploy finished"
    );

    output::emit(&report, |out| render(out, &report))?;
    Ok(Outcome::from_success(report.success))
}

fn render(out: &mut StandardStream, report: &RunReport) -> io::Result<()> {
    render_deployment(out, &report.deployment)?;
    match (&report.seed, &report.validation) {
        (Some(s), Some(v)) => {
            seed::render(out, s)?;
            validate::render(out, v)?;
        }
        _ => writeln!(out, "seed and validation skipped")?,
    }
    output::status_line(out, report.success, output::verdict(report.success), "")
}

pub(crate) fn render_deployment(out: &mut StandardStream, report: &DeploymentReport) -> io::Result<()> {
    output::heading(
        out,
        &format!("deploy {}/{} (run {})", report.client, report.env, report.run_id),
    )?;
    writeln!(
        out,
        "  created {}, already existed {}, failed {}",
        report.created(),
        report.already_existed(),
        report.count(StepOutcome::Failed)
    )?;
    for step in report.failures() {
        let reason = step.reason.map(|r| r.as_str()).unwrap_or("failed");
        let detail = step.detail.as_deref().unwrap_or("");
        output::status_line(
            out,
            false,
            "  x",
            &format!("{} {}: {reason} {detail}", step.kind, step.name),
        )?;
    }
    Ok(())
}
