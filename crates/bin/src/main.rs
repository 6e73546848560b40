mod backend;
mod cli;
mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Log level for the library. `RUST_LOG` adds directives for other targets.
const DEFAULT_LOG_DIRECTIVE: &str = "outline=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so JSON output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(DEFAULT_LOG_DIRECTIVE.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    match &cli.command {
        Commands::Show(args) => commands::show::run(args, format).await,
        Commands::Add(args) => commands::edit::add(args, format).await,
        Commands::Move(args) => commands::edit::move_item(args, format).await,
        Commands::Nudge(args) => commands::edit::nudge(args, format).await,
        Commands::Delete(args) => commands::edit::delete(args, format).await,
    }
}
