//! Tessera CLI: plan and apply resource graphs.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "tessera",
    version,
    about = "Reconcile a desired resource graph against persisted pipeline state"
)]
struct Cli {
    /// Increase diagnostic verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: tessera::cli::Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tessera::cli::logging::init(cli.verbose);
    if let Err(e) = tessera::cli::dispatch(cli.command).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
