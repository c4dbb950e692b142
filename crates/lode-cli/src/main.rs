//! # lode
//!
//! Registry-aware dependency resolver for Python projects.
//!
//! This is the main entry point for the lode CLI. It parses the command
//! line, sets up logging and the panic hook, and dispatches to the command
//! handlers. Library errors are reported once, here.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use lode_core::types::ProjectType;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Registry-aware dependency resolver for Python projects
#[derive(Parser)]
#[command(name = "lode", version, about = "Registry-aware dependency resolver")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Resolve against a JSON registry snapshot instead of the network
    #[arg(long, global = true, value_name = "SNAPSHOT", env = "LODE_OFFLINE_INDEX")]
    pub offline_index: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create pyproject.toml in the current directory
    Init {
        /// Project name; defaults to the directory name
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type", default_value = "package", value_parser = parse_project_type)]
        project_type: ProjectType,
    },
    /// Add a dependency and re-lock
    Add {
        /// Requirement string, e.g. 'requests>=2.28'
        requirement: String,
        /// Registry alias, URL or UUID to install it from
        #[arg(long)]
        registry: Option<String>,
    },
    /// Remove a dependency and re-lock
    Remove { package: String },
    /// Resolve dependencies and write pyproject.lock
    Lock {
        /// Include an optional dependency group
        #[arg(long = "extra", value_name = "EXTRA")]
        extras: Vec<String>,
        /// Prefer the versions already in the manifest
        #[arg(long)]
        keep_locked: bool,
        /// Give up after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Only report whether the manifest is up to date
        #[arg(long)]
        check: bool,
    },
    /// Show manifest freshness and who requires what
    Status {
        /// Project directory to inspect instead of the working directory
        #[arg(long, value_name = "DIR")]
        environment: Option<PathBuf>,
        /// Explain why a package is in the manifest
        #[arg(long, value_name = "PACKAGE")]
        why: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Optional dependency group the manifest was locked with
        #[arg(long = "extra", value_name = "EXTRA")]
        extras: Vec<String>,
    },
    /// List the configured registries
    Registries,
    /// Show version information
    Version,
    #[command(external_subcommand)]
    External(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

fn parse_project_type(value: &str) -> Result<ProjectType, String> {
    value.parse().map_err(|e: lode_core::LodeError| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_format);
    setup_panic_handler();

    info!("Starting lode v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        },
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(async {
        let ctx = CommandContext::new(cli.offline_index)?;

        match cli.command {
            Some(command) => commands::dispatch_command(command, &ctx).await?,
            None => commands::show_help(&ctx),
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn report(error: &anyhow::Error) {
    let formatter = ErrorFormatter::new();
    match error.downcast_ref::<lode_core::LodeError>() {
        Some(lode_error) => {
            eprint!("{}", formatter.format_error(lode_error));
            if lode_error.is_recoverable() {
                eprintln!(
                    "{}",
                    formatter.format_warning("this failure may be transient; retrying can help")
                );
            }
        },
        None => {
            eprintln!("{}", formatter.format_simple(&error.to_string()));
            for cause in error.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
        },
    }
}

fn setup_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("lode=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lode=info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("lode encountered an unexpected error: {}", panic_info);
        eprintln!("lode crashed! This is a bug.");
        eprintln!("Please report this at: https://github.com/lode-pm/lode/issues");
        eprintln!("Error: {}", panic_info);
    }));
}
