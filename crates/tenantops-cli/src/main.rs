use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod cmd;
mod output;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = args::Cli::parse();
    init_tracing(cli.json);
    output::init(cli.json);

    match cmd::dispatch(cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            output::error(&err);
            cmd::exit_code_for(&err)
        }
    }
}

/// Logs go to stderr so stdout only carries the result.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tenantops=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
