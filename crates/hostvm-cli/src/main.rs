//! HostVM diagnostics CLI
//!
//! Inspects native tables, identifier hashes and configuration, and
//! dry-runs script loading against the in-memory runtime.
//!
//! Log output goes to stderr and is filtered by `HOSTVM_LOG`
//! (e.g. `HOSTVM_LOG=hostvm_core=debug`).

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hostvm")]
#[command(about = "HostVM embedding diagnostics", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identifier hash of a name
    Hash {
        /// Native identifier or library name
        identifier: String,
        /// Split at the first '_' and hash class and method separately
        #[arg(short, long)]
        split: bool,
    },

    /// List registered natives
    Natives {
        /// Only list one library (e.g. dart:io)
        #[arg(short, long)]
        library: Option<String>,
    },

    /// Resolve a native the way a library's resolver would
    Resolve {
        /// Library name
        library: String,
        /// Native identifier
        identifier: String,
        /// Argument count at the call site
        argc: usize,
    },

    /// Show configuration and registered libraries
    Info {
        /// Config file (defaults to ./hostvm.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Load a script against the in-memory runtime and report import errors
    Check {
        /// Script path, relative to the working directory
        script: String,
        /// Config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also invoke the entry point
        #[arg(long)]
        run: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("HOSTVM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Hash { identifier, split } => commands::hash::execute(&identifier, split),
        Commands::Natives { library } => commands::natives::execute(library.as_deref()),
        Commands::Resolve {
            library,
            identifier,
            argc,
        } => commands::resolve::execute(&library, &identifier, argc),
        Commands::Info { config } => commands::info::execute(config),
        Commands::Check {
            script,
            config,
            run,
        } => commands::check::execute(&script, config, run),
    }
}
