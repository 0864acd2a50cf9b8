//! Franchise portal CLI - dataset import and export.
//!
//! # Usage
//!
//! ```bash
//! # Upsert a CSV into the bookings dataset
//! fp-cli import --dataset bookings reservas.csv
//!
//! # Export the billing summary rows matching "bilbao"
//! fp-cli export --dataset billing --query bilbao --output bilbao.csv
//! ```
//!
//! # Commands
//!
//! - `import` - Validate a CSV and upsert it row by row
//! - `export` - Write a dataset (optionally filtered) as CSV
//!
//! Both sign in as `PORTAL_EMAIL` / `PORTAL_PASSWORD`, so the backend's
//! access rules apply exactly as they do in the browser.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use franchise_portal::datasets::Dataset;

mod commands;

#[derive(Parser)]
#[command(name = "fp-cli")]
#[command(author, version, about = "Franchise portal CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV file into a dataset
    Import {
        /// Target dataset (`bookings` or `billing`)
        #[arg(short, long)]
        dataset: Dataset,

        /// CSV file to import
        file: PathBuf,

        /// Only validate and preview the file, write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Export a dataset as CSV
    Export {
        /// Source dataset (`bookings` or `billing`)
        #[arg(short, long)]
        dataset: Dataset,

        /// Keep only rows where some cell contains this text
        #[arg(short, long, default_value = "")]
        query: String,

        /// Output file (defaults to `datos_YYYY-MM-DD.csv`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Import {
            dataset,
            file,
            dry_run,
        } => {
            commands::dataset::import(dataset, &file, dry_run).await?;
        }
        Commands::Export {
            dataset,
            query,
            output,
        } => {
            commands::dataset::export(dataset, &query, output).await?;
        }
    }
    Ok(())
}
