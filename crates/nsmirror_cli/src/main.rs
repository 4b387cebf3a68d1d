//! nsmirror CLI
//!
//! Offline tools for inspecting compacted history.
//!
//! # Commands
//!
//! - `snapshot-dump` - Print every row of a snapshot blob
//! - `snapshot-query` - Print rows whose name matches a glob
//! - `shard` - Show where an entity's live events are stored

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// nsmirror command-line tools.
#[derive(Parser)]
#[command(name = "nsmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every row of a snapshot blob
    SnapshotDump {
        /// Snapshot blob, as stored in a history node
        file: PathBuf,

        /// Maximum number of rows to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print rows whose name matches a glob
    SnapshotQuery {
        /// Snapshot blob, as stored in a history node
        file: PathBuf,

        /// Glob over row names, e.g. 'proid.app#*'
        pattern: String,

        /// Print distinct names only
        #[arg(short, long)]
        names: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show where an entity's live events are stored
    Shard {
        /// Instance or server name
        entity: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::SnapshotDump { file, limit, format } => {
            commands::snapshot_dump::run(&file, limit, &format)?;
        }
        Commands::SnapshotQuery {
            file,
            pattern,
            names,
            format,
        } => {
            commands::snapshot_query::run(&file, &pattern, names, &format)?;
        }
        Commands::Shard { entity } => {
            commands::shard::run(&entity);
        }
        Commands::Version => {
            println!("nsmirror CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
