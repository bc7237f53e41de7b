//! NestDB CLI
//!
//! Command-line tools for NestDB database maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display key statistics and metadata
//! - `verify` - Check map counts, allocator state and references
//! - `dump` - List a table's items with decoded values

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// NestDB command-line database tools.
#[derive(Parser)]
#[command(name = "nestdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display key statistics and metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify map counts, allocator state and map references
    Verify {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List a table's items
    Dump {
        /// Table prefix as hex, e.g. `03` or `6163`
        #[arg(short, long)]
        table: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, Format::parse(&format)?)?;
        }
        Commands::Verify { format } => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path, Format::parse(&format)?)?;
        }
        Commands::Dump { table, format } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            let prefix = commands::parse_hex(&table)?;
            commands::dump::run(&path, &prefix, Format::parse(&format)?)?;
        }
        Commands::Version => {
            println!("NestDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("NestDB Core v{}", nestdb_core::VERSION);
        }
    }

    Ok(())
}
