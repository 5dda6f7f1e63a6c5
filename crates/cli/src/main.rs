use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scopesync_config::{BindingKind, ScopeSyncConfig};
use scopesync_reconciler::{
    BindingResource, BindingState, DeclaredScopes, DeclaredSet, Delta, ParentKey, Reconciler,
    SnapshotDirectory,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SCOPESYNC_LOG";

#[derive(Parser)]
#[command(name = "scopesync", version, about = "Reconcile declared client scope bindings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what apply would attach and detach
    Plan {
        /// Config file (default: ./.scopesync.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory snapshot to plan against
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Reconcile every binding and wait for the directory to converge
    Apply {
        /// Config file (default: ./.scopesync.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory snapshot, written back afterwards
        #[arg(long)]
        snapshot: PathBuf,
        /// Override convergence.max_attempts from the config
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Print the scopes attached to an existing binding
    Show {
        /// Binding kind (realm-default, realm-optional, client-default, client-optional)
        #[arg(long)]
        kind: BindingKind,
        #[arg(long)]
        snapshot: PathBuf,
        /// Import id: {realmId} or {realmId}/{clientId}
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ScopeSyncConfig> {
    let config = match path {
        Some(path) => ScopeSyncConfig::load(path)?,
        None => ScopeSyncConfig::load_from_dir(Path::new("."))?,
    };
    Ok(config)
}

fn load_snapshot(path: &Path) -> anyhow::Result<Arc<SnapshotDirectory>> {
    let directory = SnapshotDirectory::load(path)
        .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
    Ok(Arc::new(directory))
}

/// Cancels the returned token on Ctrl+C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

fn print_delta(name: &str, parent: &ParentKey, delta: &Delta) {
    if delta.is_empty() {
        println!("{name} ({parent}): up to date");
        return;
    }

    println!("{name} ({parent}): {delta}");
    for item in &delta.to_detach {
        println!("  - {} ({})", item.name, item.id);
    }
    for scope in &delta.to_attach {
        println!("  + {scope}");
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { config, snapshot } => {
            let config = load_config(config.as_deref())?;
            let reconciler = Reconciler::new(load_snapshot(&snapshot)?);

            if config.bindings.is_empty() {
                println!("No bindings configured.");
                return Ok(ExitCode::SUCCESS);
            }

            for binding in &config.bindings {
                let parent = ParentKey::from_binding(binding)?;
                let declared = DeclaredSet::from_list(binding.scopes.iter().cloned());
                let delta = reconciler
                    .plan(&parent, &declared)
                    .await
                    .with_context(|| format!("Failed to plan binding '{}'", binding.name))?;
                print_delta(&binding.name, &parent, &delta);
            }
        }
        Commands::Apply { config, snapshot, max_attempts } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(attempts) = max_attempts {
                config.convergence.max_attempts = attempts;
            }

            let directory = load_snapshot(&snapshot)?;
            let resource = BindingResource::new(directory.clone(), &config.convergence);
            let cancel = cancel_on_interrupt();

            let mut result = Ok(());
            for binding in &config.bindings {
                let state = BindingState {
                    parent: ParentKey::from_binding(binding)?,
                    scopes: DeclaredScopes::List(binding.scopes.clone()),
                };
                match resource.update(&state, &cancel).await {
                    Ok(applied) => {
                        if let DeclaredScopes::List(names) = &applied.scopes {
                            println!("{} ({}): {}", binding.name, applied.parent, names.join(", "));
                        }
                    }
                    Err(e) => {
                        result = Err(anyhow::Error::new(e)
                            .context(format!("Failed to apply binding '{}'", binding.name)));
                        break;
                    }
                }
            }

            // Whatever was applied before a failure stays applied
            directory
                .save(&snapshot)
                .with_context(|| format!("Failed to write snapshot {}", snapshot.display()))?;
            info!(bindings = config.bindings.len(), "apply finished");
            result?;
        }
        Commands::Show { kind, snapshot, id } => {
            let directory = load_snapshot(&snapshot)?;
            let resource = BindingResource::new(directory, &Default::default());
            let state = resource.import(kind, &id).await?;

            if let DeclaredScopes::List(names) = state.scopes {
                for name in names {
                    println!("{name}");
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
