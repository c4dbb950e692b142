//! Command implementations and dispatch logic.
//!
//! Each command is an async function that takes a `CommandContext` and
//! talks to the library crates only through their public contracts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::info;

use lode_config::registries::collect_env_overrides;
use lode_config::ConfigLoader;
use lode_core::error::{LodeError, LodeResult};
use lode_core::RegistryDirectory;
use lode_registry::{ClientConfig, MemoryRegistry, RegistryQuery, SimpleIndexClient};

pub mod add;
pub mod init;
pub mod lock;
pub mod registries;
pub mod remove;
pub mod status;

#[cfg(test)]
mod tests;

use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub output: OutputHandler,
    /// Registry snapshot used instead of HTTP
    pub offline_index: Option<PathBuf>,
    /// Collected `LODE_*` variables
    pub env: HashMap<String, String>,
    /// Lode home override; `$LODE_HOME` or `~/.lode` when unset
    pub home: Option<Utf8PathBuf>,
}

impl CommandContext {
    /// Create a context for the process working directory
    pub fn new(offline_index: Option<PathBuf>) -> LodeResult<Self> {
        let loader = ConfigLoader::from_current_dir()?;
        Ok(Self {
            cwd: loader.cwd().to_path_buf(),
            output: OutputHandler::new(),
            offline_index,
            env: collect_env_overrides(),
            home: None,
        })
    }

    /// Config loader rooted at the working directory
    pub fn loader(&self) -> ConfigLoader {
        self.loader_at(self.cwd.clone())
    }

    /// Config loader rooted at another directory
    pub fn loader_at(&self, dir: Utf8PathBuf) -> ConfigLoader {
        let loader = ConfigLoader::new(dir);
        match self.home {
            Some(ref home) => loader.with_home(home.clone()),
            None => loader,
        }
    }

    /// The registry query capability for this run
    pub fn registry_query(&self, directory: &RegistryDirectory) -> LodeResult<Arc<dyn RegistryQuery>> {
        match self.offline_index {
            Some(ref snapshot) => {
                info!("Using offline index {}", snapshot.display());
                Ok(Arc::new(MemoryRegistry::load(snapshot)?))
            },
            None => {
                let config = ClientConfig::default()
                    .with_env_tokens(directory.registries().iter().map(|registry| registry.as_ref()));
                Ok(Arc::new(SimpleIndexClient::with_config(config)?))
            },
        }
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> LodeResult<()> {
    match command {
        Commands::Init { name, project_type } => {
            info!("Initializing {} project", project_type);
            init::execute(name, project_type, ctx).await
        },
        Commands::Add {
            requirement,
            registry,
        } => {
            info!("Adding dependency: {} (registry: {:?})", requirement, registry);
            add::execute(requirement, registry, ctx).await
        },
        Commands::Remove { package } => {
            info!("Removing dependency: {}", package);
            remove::execute(package, ctx).await
        },
        Commands::Lock {
            extras,
            keep_locked,
            timeout,
            check,
        } => {
            let request = lock::LockRequest {
                extras,
                keep_locked,
                timeout: timeout.map(Duration::from_secs),
            };
            if check {
                lock::check(&request.extras, ctx).await
            } else {
                lock::execute(request, ctx).await
            }
        },
        Commands::Status {
            environment,
            why,
            json,
            extras,
        } => status::execute(environment, why, json, &extras, ctx).await,
        Commands::Registries => registries::execute(ctx).await,
        Commands::Version => {
            show_version(ctx);
            Ok(())
        },
        Commands::External(args) => unknown_command(&args, ctx),
    }
}

fn unknown_command(args: &[String], ctx: &CommandContext) -> LodeResult<()> {
    let name = args.first().map(String::as_str).unwrap_or_default();
    ctx.output.error(&format!("Unknown command '{}'", name));
    if let Some(suggestion) = suggest_similar_command(name) {
        ctx.output.info(&format!("Did you mean '{}'?", suggestion));
    }
    ctx.output.info("Run 'lode --help' to see available commands.");
    Err(LodeError::configuration(
        "command",
        format!("Unknown command: {}", name),
    ))
}

/// Show help information
pub fn show_help(ctx: &CommandContext) {
    ctx.output.line("lode - registry-aware dependency resolver");
    ctx.output.line("");
    ctx.output.line("Usage: lode [OPTIONS] <COMMAND>");
    ctx.output.line("");
    ctx.output.line("Project:");
    ctx.output.line("  init             Create pyproject.toml");
    ctx.output.line("  add <req>        Add a dependency and re-lock");
    ctx.output.line("  remove <pkg>     Remove a dependency and re-lock");
    ctx.output.line("");
    ctx.output.line("Resolution:");
    ctx.output.line("  lock             Resolve and write pyproject.lock");
    ctx.output.line("  status           Show manifest freshness and dependents");
    ctx.output.line("  registries       List configured registries");
    ctx.output.line("");
    ctx.output.line("Run 'lode <command> --help' for more information on a command.");
}

fn show_version(ctx: &CommandContext) {
    let target = format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS);

    ctx.output.line(&format!("lode v{}", env!("CARGO_PKG_VERSION")));
    ctx.output.line(&format!("Built: {}", env!("BUILD_DATE")));
    ctx.output.line(&format!("Target: {}", target));
    ctx.output.line(&format!("Rust: {}", env!("RUSTC_VERSION")));
}

/// Suggest similar commands based on edit distance
pub fn suggest_similar_command(input: &str) -> Option<String> {
    let commands = [
        "init", "add", "remove", "lock", "status", "registries", "version", "help",
    ];

    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for &command in &commands {
        let distance = edit_distance(input, command);
        if distance < best_distance && distance <= 2 {
            best_distance = distance;
            best_match = Some(command);
        }
    }

    best_match.map(|s| s.to_string())
}

/// Levenshtein distance
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        current[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            current[j] = (previous[j] + 1)
                .min(current[j - 1] + 1)
                .min(previous[j - 1] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
