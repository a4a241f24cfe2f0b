//! schwab-auth CLI binary entry point.

use clap::Parser;
use schwab_auth::cli::{commands, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Decode(args) => commands::handle_decode(&args.token),
        Commands::Exchange(args) => commands::handle_exchange(&args.code).await,
        Commands::Watch(args) => commands::handle_watch(&args.code).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
