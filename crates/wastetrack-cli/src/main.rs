//! WasteTrack CLI
//!
//! Runs the console engine against seeded in-memory backends

use clap::{Parser, Subcommand};
use wastetrack_core::logging_facility::{self, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "wastetrack")]
#[command(about = "WasteTrack - Multi-backend waste and supply console", long_about = None)]
struct Cli {
    #[command(flatten)]
    backends: commands::BackendArgs,

    /// Log profile: dev, prod or test
    #[arg(long, global = true, default_value = "dev")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the signed-in identity and the scope it resolves to
    Scope(commands::scope::ScopeArgs),
    /// List one page of a table under the resolved scope
    Query(commands::query::QueryArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging_facility::init(Profile::from_name(&cli.log));

    let result = match cli.command {
        Commands::Scope(args) => commands::scope::execute(&cli.backends, args).await,
        Commands::Query(args) => commands::query::execute(&cli.backends, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
