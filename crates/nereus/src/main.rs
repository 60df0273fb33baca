//! Nereus CLI - code knowledge graph queries from the command line.
//!
//! Nereus indexes source files through configured extractors and answers
//! caller, callee, and impact questions over the stored graph.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use nereus::Direction;
use tracing_subscriber::EnvFilter;

mod cli;

/// Nereus: incremental code knowledge graph.
#[derive(Parser)]
#[command(name = "nereus")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Workspace root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index source files in the workspace
    Index {
        /// Clear the graph and index from scratch
        #[arg(long)]
        rebuild: bool,

        /// Index only these files instead of walking the workspace
        files: Vec<PathBuf>,
    },

    /// Search for symbols by name
    Search {
        /// Pattern (`*` and `?` wildcards, otherwise substring match)
        pattern: String,

        /// Filter by symbol kind (function, struct, macro, variable, ...)
        #[arg(short, long)]
        kind: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show transitive callers of a symbol
    Callers {
        /// Symbol name
        symbol: String,

        /// Only consider symbols defined in this file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Maximum number of hops (default from configuration)
        #[arg(short, long)]
        depth: Option<u32>,

        /// Give up after this many milliseconds and show completed levels
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Show transitive callees of a symbol
    Callees {
        /// Symbol name
        symbol: String,

        /// Only consider symbols defined in this file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Maximum number of hops (default from configuration)
        #[arg(short, long)]
        depth: Option<u32>,

        /// Give up after this many milliseconds and show completed levels
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Show files affected by a change to a file
    Impact {
        /// File path, relative to the workspace
        path: PathBuf,

        /// Only report files depending on the target directly
        #[arg(long)]
        direct: bool,
    },

    /// Detect call cycles
    Cycles,

    /// Show graph statistics
    Stats {
        /// Also check referential integrity
        #[arg(long)]
        verify: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let workspace = match cli.workspace {
        Some(w) => w,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!(
                    "{}: failed to get current directory: {e}",
                    "error".red().bold()
                );
                return ExitCode::FAILURE;
            }
        },
    };

    let result = match cli.command {
        Commands::Index { rebuild, files } => cli::index::run(&workspace, rebuild, &files),
        Commands::Search {
            pattern,
            kind,
            limit,
        } => cli::search::run(&workspace, &pattern, kind.as_deref(), limit),
        Commands::Callers {
            symbol,
            file,
            depth,
            timeout_ms,
        } => cli::callers::run(
            &workspace,
            &symbol,
            file.as_deref(),
            depth,
            timeout_ms,
            Direction::Callers,
        ),
        Commands::Callees {
            symbol,
            file,
            depth,
            timeout_ms,
        } => cli::callers::run(
            &workspace,
            &symbol,
            file.as_deref(),
            depth,
            timeout_ms,
            Direction::Callees,
        ),
        Commands::Impact { path, direct } => cli::impact::run(&workspace, &path, !direct),
        Commands::Cycles => cli::cycles::run(&workspace),
        Commands::Stats { verify } => cli::stats::run(&workspace, verify),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            // Show cause chain for nested errors
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  {}: {cause}", "caused by".dimmed());
                source = std::error::Error::source(cause);
            }
            ExitCode::FAILURE
        }
    }
}
