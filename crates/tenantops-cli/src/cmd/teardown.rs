use std::io::{self, Write};

use anyhow::Result;
use termcolor::StandardStream;
use tenantops_core::prelude::*;

use super::{cancel_on_ctrl_c, Context, Outcome};
use crate::output;

pub async fn run(ctx: &Context, client: &str, env: EnvironmentKey, yes: bool) -> Result<Outcome> {
    if !yes {
        return Err(TenantOpsError::invalid_argument(
            "teardown deletes every resource of the environment; pass --yes to confirm",
        )
        .into());
    }

    let cfg = ctx.load_config()?;
    let orchestrator = ctx.orchestrator()?;
    let cancel = cancel_on_ctrl_c();

    let pb = output::spinner(format!("tearing down {client}/{env}"));
    let report = orchestrator.teardown(&cfg, client, env, &cancel).await?;
    pb.finish_and_clear();

    tracing::info!(
        client,
        env = %env,
        deleted = report.count(DeleteOutcome::Deleted),
        success = report.success,
        "teardown finished"
    );

    output::emit(&report, |out| render(out, &report))?;
    Ok(Outcome::from_success(report.success))
}

fn render(out: &mut StandardStream, report: &TeardownReport) -> io::Result<()> {
    output::heading(out, &format!("teardown {}/{}", report.client, report.env))?;
    writeln!(
        out,
        "  deleted {}, absent {}, failed {}",
        report.count(DeleteOutcome::Deleted),
        report.count(DeleteOutcome::Absent),
        report.count(DeleteOutcome::Failed)
    )?;
    for step in report.steps.iter().filter(|s| s.outcome == DeleteOutcome::Failed) {
        let detail = step.detail.as_deref().unwrap_or("");
        output::status_line(out, false, "  x", &format!("{} {}: {detail}", step.kind, step.name))?;
    }
    Ok(())
}
