use std::io::{self, Write};

use anyhow::Result;
use termcolor::StandardStream;
use tenantops_core::prelude::*;
use tenantops_core::plan;

use super::{Context, Outcome};
use crate::output;

pub fn run(ctx: &Context, client: &str, env: EnvironmentKey) -> Result<Outcome> {
    let cfg = ctx.load_config()?;
    let plan = plan::build(&cfg, client, env)?;
    output::emit(&plan, |out| render(out, &plan))?;
    Ok(Outcome::Success)
}

fn render(out: &mut StandardStream, plan: &ProvisioningPlan) -> io::Result<()> {
    output::heading(
        out,
        &format!("plan {}/{} ({} steps)", plan.client, plan.env, plan.len()),
    )?;
    for step in &plan.steps {
        let deps = if step.depends_on.is_empty() {
            "-".to_string()
        } else {
            step.depends_on
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        writeln!(
            out,
            "  {:>2} {:<20} {:<32} after {deps}",
            step.index,
            step.kind.as_str(),
            step.name
        )?;
    }
    Ok(())
}
