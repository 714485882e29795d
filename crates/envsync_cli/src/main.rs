//! envsync CLI
//!
//! Command-line tools for persisted environment settings.
//!
//! # Commands
//!
//! - `inspect` - Display the stored snapshot and what a load would apply
//! - `migrate` - Upgrade an old snapshot to the current schema
//! - `hash` - Print per-domain state hashes of the stored snapshot
//! - `simulate` - Drive a synchronizer against an in-memory scene

mod commands;
mod error;

use clap::{Parser, Subcommand, ValueEnum};
use envsync_engine::SyncPolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment settings tools.
#[derive(Parser)]
#[command(name = "envsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the settings file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Key namespace of the snapshot
    #[arg(global = true, short, long, default_value = envsync_core::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the stored snapshot
    Inspect {
        /// Also list raw store keys
        #[arg(short, long)]
        raw: bool,
    },

    /// Upgrade the stored snapshot to the current schema
    Migrate {
        /// List registered migrations and exit
        #[arg(short, long)]
        list: bool,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Print state hashes of the stored snapshot
    Hash {
        /// Only this domain
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Run frames of a synchronizer against an in-memory scene
    Simulate {
        /// Sync policy (follow, override, custom)
        #[arg(long, default_value = "follow")]
        policy: SyncPolicy,

        /// Number of frames to run
        #[arg(long, default_value = "3")]
        frames: u64,

        /// Edits to apply before the first frame, as domain.field=value
        #[arg(short, long = "set")]
        edits: Vec<String>,

        /// Start with an empty scene instead of one holding defaults
        #[arg(long)]
        empty_scene: bool,

        /// Write the resulting snapshot back to the settings file
        #[arg(long)]
        save: bool,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { raw } => {
            let path = cli.path.ok_or("Settings path required for inspect")?;
            commands::inspect::run(&path, &cli.namespace, raw, cli.format)?;
        }
        Commands::Migrate { list, dry_run } => {
            if list {
                commands::migrate::list(cli.format)?;
            } else {
                let path = cli.path.ok_or("Settings path required for migrate")?;
                commands::migrate::run(&path, &cli.namespace, dry_run, cli.format)?;
            }
        }
        Commands::Hash { domain } => {
            let path = cli.path.ok_or("Settings path required for hash")?;
            commands::hash::run(&path, &cli.namespace, domain.as_deref(), cli.format)?;
        }
        Commands::Simulate {
            policy,
            frames,
            edits,
            empty_scene,
            save,
        } => {
            let options = commands::simulate::SimulateOptions {
                policy,
                frames,
                edits,
                empty_scene,
                save,
            };
            commands::simulate::run(cli.path.as_deref(), &cli.namespace, &options, cli.format)?;
        }
        Commands::Version => {
            println!("envsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Settings schema v{}",
                envsync_core::CURRENT_SCHEMA_VERSION
            );
        }
    }

    Ok(())
}
