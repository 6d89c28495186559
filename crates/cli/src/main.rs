//! kivo: publish, fetch, diff and apply Kubernetes configuration.

#![forbid(unsafe_code)]

mod commands;
mod logger;
mod manifests;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use kivo_core::Config;
use kivo_inventory::InventoryStorage;
use kivo_registry::RegistryClient;
use kivo_resmgr::{ClusterClient, ConnectOptions, ResourceManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "kivo",
    version,
    about = "A command line utility to publish, fetch, customize, validate, and apply Kubernetes configuration."
)]
struct Cli {
    /// The length of time to wait before giving up on the current operation.
    #[arg(long, global = true, default_value = "1m", value_parser = parse_duration)]
    timeout: Duration,

    /// Path to the kubeconfig file.
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// The name of the kubeconfig context to use.
    #[arg(long, global = true)]
    context: Option<String>,

    /// The inventory namespace.
    #[arg(short = 'n', long = "namespace", global = true, default_value = "default")]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile a desired set onto the cluster under an inventory.
    Apply {
        #[command(subcommand)]
        cmd: ApplyCmd,
    },
    /// Render a desired set to stdout.
    Build {
        #[command(subcommand)]
        cmd: BuildCmd,
    },
    /// Dry-run a desired set and print the drift as a YAML diff.
    Diff {
        #[command(subcommand)]
        cmd: DiffCmd,
    },
    /// Delete the objects tracked by an inventory, including its storage.
    Delete {
        #[command(subcommand)]
        cmd: DeleteCmd,
    },
    /// List inventories.
    Get {
        #[command(subcommand)]
        cmd: GetCmd,
    },
    /// Print the content of one inventory.
    Inspect {
        #[command(subcommand)]
        cmd: InspectCmd,
    },
    /// Package and push a manifest bundle as an OCI artifact.
    Push {
        #[command(subcommand)]
        cmd: PushCmd,
    },
    /// Download an OCI artifact and print its manifests.
    Pull {
        #[command(subcommand)]
        cmd: PullCmd,
    },
    /// Alias an existing OCI artifact under a new tag.
    Tag {
        #[command(subcommand)]
        cmd: TagCmd,
    },
    /// Enumerate artifact versions.
    List {
        #[command(subcommand)]
        cmd: ListCmd,
    },
    /// Manage the kivo config file.
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

#[derive(Subcommand, Debug)]
enum ApplyCmd {
    #[command(name = "inventory", alias = "inv")]
    Inventory(commands::apply::ApplyArgs),
}

#[derive(Subcommand, Debug)]
enum BuildCmd {
    #[command(name = "inventory", alias = "inv")]
    Inventory(commands::build::BuildArgs),
}

#[derive(Subcommand, Debug)]
enum DiffCmd {
    #[command(name = "inventory", alias = "inv")]
    Inventory(commands::diff::DiffArgs),
}

#[derive(Subcommand, Debug)]
enum DeleteCmd {
    #[command(name = "inventory", alias = "inv")]
    Inventory(commands::delete::DeleteArgs),
}

#[derive(Subcommand, Debug)]
enum GetCmd {
    #[command(name = "inventories", alias = "inv")]
    Inventories(commands::get::GetArgs),
}

#[derive(Subcommand, Debug)]
enum InspectCmd {
    #[command(name = "inventory", alias = "inv")]
    Inventory(commands::inspect::InspectArgs),
}

#[derive(Subcommand, Debug)]
enum PushCmd {
    #[command(name = "artifact")]
    Artifact(commands::push::PushArgs),
}

#[derive(Subcommand, Debug)]
enum PullCmd {
    #[command(name = "artifact")]
    Artifact(commands::pull::PullArgs),
}

#[derive(Subcommand, Debug)]
enum TagCmd {
    #[command(name = "artifact")]
    Artifact(commands::tag::TagArgs),
}

#[derive(Subcommand, Debug)]
enum ListCmd {
    #[command(name = "artifacts", alias = "artifact")]
    Artifacts(commands::list::ListArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Write a config file with default values at '$HOME/.kivo/config'.
    Init,
    /// Display the config values, or the in-memory defaults when no config
    /// file is found.
    View,
}

/// Shared command context: global flags plus the loaded config.
pub struct App {
    pub timeout: Duration,
    pub namespace: String,
    pub config: Config,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
}

impl App {
    pub async fn cluster_client(&self) -> Result<ClusterClient> {
        let opts = ConnectOptions {
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
        };
        ClusterClient::connect(&opts).await.context("client init failed")
    }

    pub async fn resource_manager(&self) -> Result<ResourceManager> {
        let client = self.cluster_client().await?;
        Ok(ResourceManager::new(
            client,
            self.config.owner(),
            self.config.apply_order(),
        ))
    }

    pub fn inventory_storage(&self, manager: &ResourceManager) -> InventoryStorage {
        InventoryStorage::new(
            manager.cluster_client().clone(),
            self.config.owner(),
            self.config.apply_order(),
        )
    }

    pub fn registry_client(&self) -> Result<RegistryClient> {
        RegistryClient::new(self.timeout).context("registry client init failed")
    }
}

fn init_tracing() {
    let env = std::env::var("KIVO_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KIVO_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KIVO_METRICS_ADDR; expected host:port");
        }
    }
}

/// Parses `30s`, `5m`, `1h` style durations; a bare number means seconds.
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = value.parse().map_err(|_| format!("invalid duration '{s}'"))?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        _ => return Err(format!("invalid duration unit '{unit}'")),
    };
    Ok(Duration::from_secs(secs))
}

fn load_config() -> Config {
    match Config::read(None) {
        Ok(cfg) => cfg,
        Err(e) => {
            logger::failure(format!("loading the config failed, error: {e}"));
            Config::default()
        }
    }
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Apply { cmd: ApplyCmd::Inventory(args) } => commands::apply::run(app, args).await,
        Commands::Build { cmd: BuildCmd::Inventory(args) } => commands::build::run(app, args).await,
        Commands::Diff { cmd: DiffCmd::Inventory(args) } => commands::diff::run(app, args).await,
        Commands::Delete { cmd: DeleteCmd::Inventory(args) } => {
            commands::delete::run(app, args).await
        }
        Commands::Get { cmd: GetCmd::Inventories(args) } => commands::get::run(app, args).await,
        Commands::Inspect { cmd: InspectCmd::Inventory(args) } => {
            commands::inspect::run(app, args).await
        }
        Commands::Push { cmd: PushCmd::Artifact(args) } => commands::push::run(app, args).await,
        Commands::Pull { cmd: PullCmd::Artifact(args) } => commands::pull::run(app, args).await,
        Commands::Tag { cmd: TagCmd::Artifact(args) } => commands::tag::run(app, args).await,
        Commands::List { cmd: ListCmd::Artifacts(args) } => commands::list::run(app, args).await,
        Commands::Config { cmd } => commands::config::run(app, cmd).await,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    init_metrics();

    let cli = Cli::parse();
    let app = App {
        timeout: cli.timeout,
        namespace: cli.namespace.clone(),
        config: load_config(),
        kubeconfig: cli.kubeconfig.clone(),
        context: cli.context.clone(),
    };

    // one top-level deadline per invocation
    match tokio::time::timeout(app.timeout, run(&app, cli.command)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            logger::failure(format!("{e:#}"));
            std::process::exit(1);
        }
        Err(_) => {
            logger::failure(format!(
                "operation timed out after {}s",
                app.timeout.as_secs()
            ));
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("42").unwrap(), Duration::from_secs(42));
        assert!(parse_duration("1d").is_err());
        assert!(parse_duration("abc").is_err());
    }
}
