use clap::Parser;
use mixweave_cli::commands::{Cmd, Command};

/// Mixweave CLI
///
/// Mixweave splices calls to handler procedures into compiled units at points chosen by
/// target descriptors, then merges the handler units' members into the woven unit.
#[derive(Parser)]
#[command(name = "mixweave")]
#[command(about = "Mixweave: handler weaving for compiled units")]
struct Cli {
    /// Log per-site detail.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the mixweave CLI with the provided arguments.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .init();

    cli.command.execute().await
}
