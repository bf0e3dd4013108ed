//! SocialFlow CLI: summarize videos, discuss them, translate and publish the results.
//!
//! Wraps the `socialflow-core` pipeline with a Gemini backend, a timed-text
//! transcript provider, and the local libSQL store.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    let json = cli.json;
    match commands::run(cli).await {
        Err(report) if json => {
            commands::print_error_payload(&report);
            std::process::exit(1);
        }
        other => other,
    }
}
