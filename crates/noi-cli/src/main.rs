use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// noi: Migration tool for Lino Noi dumps.
///
/// List the migration chain, inspect legacy dumps and migrate them to the
/// running schema.
#[derive(Parser)]
#[command(name = "noi", version, about, long_about = None)]
struct Cli {
    /// Log migration steps and dropped rows.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered migration steps and validate the chain.
    Chain {
        /// Path to a noi.toml configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Show a dump's version, row counts and migration path.
    Inspect {
        /// Path to the JSON dump.
        dump: String,

        /// Path to a noi.toml configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Import a dump into an in-memory store and report the result.
    Migrate {
        /// Path to the JSON dump.
        dump: String,

        /// Path to a noi.toml configuration file.
        #[arg(short, long)]
        config: Option<String>,

        /// Write every migrated entity to this JSON file.
        #[arg(short, long)]
        export: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Chain { config } => commands::chain(config.as_deref()),
        Commands::Inspect { dump, config } => commands::inspect(&dump, config.as_deref()),
        Commands::Migrate {
            dump,
            config,
            export,
        } => commands::migrate(&dump, config.as_deref(), export.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
