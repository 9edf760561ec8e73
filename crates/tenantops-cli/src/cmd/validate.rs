use std::io::{self, Write};

use anyhow::Result;
use termcolor::StandardStream;
use tenantops_core::prelude::*;

use super::{Context, Outcome};
use crate::output;

pub async fn run(ctx: &Context, client: &str, env: EnvironmentKey) -> Result<Outcome> {
    let cfg = ctx.load_config()?;
    let orchestrator = ctx.orchestrator()?;

    let report = orchestrator.validate(&cfg, client, env).await?;
    output::emit(&report, |out| render(out, &report))?;
    Ok(Outcome::from_success(report.success))
}

pub(crate) fn render(
    out: &mut StandardStream,
    report: &EnvironmentValidationReport,
) -> io::Result<()> {
    output::heading(out, &format!("validate {}/{}", report.client, report.env))?;
    for coll in &report.collections {
        let text = match &coll.error {
            Some(err) => format!("{}: {err}", coll.collection),
            None if coll.missing.is_empty() => {
                format!("{}: {} present", coll.collection, coll.present.len())
            }
            None => format!("{}: missing {}", coll.collection, coll.missing.join(", ")),
        };
        output::status_line(out, coll.is_valid(), if coll.is_valid() { "  ok" } else { "  x" }, &text)?;
    }
    if report.collections.is_empty() {
        writeln!(out, "  no collections")?;
    }
    Ok(())
}
