use std::io::{self, Write};

use anyhow::Result;
use futures::future::join_all;
use termcolor::StandardStream;
use tenantops_core::prelude::*;
use tenantops_core::registry;
use tenantops_core::status::Verdict;

use super::{Context, Outcome};
use crate::output;

pub async fn run(ctx: &Context, client: Option<&str>, env: Option<EnvironmentKey>) -> Result<Outcome> {
    let cfg = ctx.load_config()?;
    let orchestrator = ctx.orchestrator()?;
    let pairs = select(&cfg, client, env);

    let pb = output::spinner("probing");
    let reports: Vec<StatusReport> = join_all(
        pairs
            .iter()
            .map(|(client, env)| orchestrator.status(&cfg, client, *env)),
    )
    .await;
    pb.finish_and_clear();

    output::emit(&reports, |out| render(out, &reports))?;
    Ok(Outcome::Success)
}

/// Pairs to probe. A named client that is not registered still yields
/// entries so it is reported as unconfigured.
fn select(
    cfg: &SolutionConfig,
    client: Option<&str>,
    env: Option<EnvironmentKey>,
) -> Vec<(String, EnvironmentKey)> {
    match (client, env) {
        (Some(c), Some(e)) => vec![(c.to_string(), e)],
        (Some(c), None) => {
            let known: Vec<_> = registry::entries(cfg)
                .into_iter()
                .filter(|(k, _)| k == c)
                .collect();
            if known.is_empty() {
                EnvironmentKey::ALL.iter().map(|e| (c.to_string(), *e)).collect()
            } else {
                known
            }
        }
        (None, Some(e)) => registry::entries(cfg)
            .into_iter()
            .filter(|(_, k)| *k == e)
            .collect(),
        (None, None) => registry::entries(cfg),
    }
}

fn render(out: &mut StandardStream, reports: &[StatusReport]) -> io::Result<()> {
    if reports.is_empty() {
        return writeln!(out, "no environments registered");
    }
    for r in reports {
        let ok = !matches!(
            r.phase,
            EnvironmentPhase::Unconfigured
                | EnvironmentPhase::Unreachable
                | EnvironmentPhase::Validated(Verdict::Fail)
        );
        output::status_line(
            out,
            ok,
            &format!("{:<24}", format!("{}/{}", r.client, r.env)),
            &r.phase.label(),
        )?;
    }
    Ok(())
}
