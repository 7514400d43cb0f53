//! Tessera CLI
//!
//! Command-line tools for working with Tessera fixture files.
//!
//! # Commands
//!
//! - `check` - Validate a fixture's schema and objects
//! - `query` - Filter and sort the objects of one type
//! - `inspect` - Display per-type counts and backlink statistics

mod commands;
mod fixture;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tessera command-line tools.
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON fixture file
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
    /// Validate the schema and load every object
    Check {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Filter and sort the objects of one type
    Query {
        /// Object type to query
        #[arg(short = 't', long = "type")]
        object_type: String,

        /// Predicate, e.g. "priority > 2 && name BEGINSWITH 'G'"
        #[arg(short = 'w', long = "where")]
        filter: Option<String>,

        /// Value for a `$N` placeholder, in order
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// Sort key as `path` or `path:desc`; repeat for tie-breakers
        #[arg(short, long)]
        sort: Vec<String>,

        /// Maximum number of objects to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display per-type counts and activity
    Inspect {
        /// Show inbound link counts per type
        #[arg(short, long)]
        backlinks: bool,

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
        Commands::Check { format } => {
            let path = cli.path.ok_or("Fixture path required for check")?;
            commands::check::run(&path, &format)?;
        }
        Commands::Query {
            object_type,
            filter,
            args,
            sort,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Fixture path required for query")?;
            let options = commands::query::QueryOptions {
                filter: filter.as_deref(),
                args: &args,
                sort: &sort,
                limit,
            };
            commands::query::run(&path, &object_type, &options, &format)?;
        }
        Commands::Inspect { backlinks, format } => {
            let path = cli.path.ok_or("Fixture path required for inspect")?;
            commands::inspect::run(&path, backlinks, &format)?;
        }
        Commands::Version => {
            println!("Tessera CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Tessera Core v{}", tessera_core::VERSION);
        }
    }

    Ok(())
}
