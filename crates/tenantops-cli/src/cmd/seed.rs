use std::io::{self, Write};

use anyhow::Result;
use termcolor::StandardStream;
use tenantops_core::prelude::*;

use super::{Context, Outcome};
use crate::output;

pub async fn run(ctx: &Context, client: &str, env: EnvironmentKey) -> Result<Outcome> {
    let cfg = ctx.load_config()?;
    let orchestrator = ctx.orchestrator()?;

    let pb = output::spinner(format!("seeding {client}/{env}"));
    let report = orchestrator.seed(&cfg, client, env).await?;
    pb.finish_and_clear();

    output::emit(&report, |out| render(out, &report))?;
    Ok(Outcome::from_success(report.success))
}

pub(crate) fn render(out: &mut StandardStream, report: &EnvironmentSeedReport) -> io::Result<()> {
    output::heading(out, &format!("seed {}/{}", report.client, report.env))?;
    writeln!(
        out,
        "  created {}, already existed {}",
        report.created(),
        report.already_existed()
    )?;
    for coll in report.collections.iter().filter(|c| !c.is_success()) {
        for id in &coll.failed_ids {
            let err = coll.errors.get(id).map(String::as_str).unwrap_or("");
            output::status_line(out, false, "  x", &format!("{}/{id}: {err}", coll.collection))?;
        }
    }
    Ok(())
}
