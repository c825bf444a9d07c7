//! WolfLease - Lease-Based Leader Election
//!
//! Command-line front end: host a lease server, take part in an
//! election, or inspect a lease.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolflease::api::LeaseServer;
use wolflease::config::WolfLeaseConfig;
use wolflease::election::{Callbacks, Elector};
use wolflease::error::{Error, Result};
use wolflease::lease::{HttpLeaseStore, LeaseStore};

/// Interval between heartbeats logged by the demo workload
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// WolfLease - Lease-Based Leader Election
#[derive(Parser)]
#[command(name = "wolflease")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolflease.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host the HTTP lease server
    Serve {
        /// Address to listen on (defaults to server.bind_address)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Take part in the election with a demo workload
    Run,

    /// Show the current state of a lease
    Status {
        /// Lease server to query instead of the configured store
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Lease namespace (defaults to lease.namespace)
        #[arg(long)]
        namespace: Option<String>,

        /// Lease name (defaults to lease.name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolflease.toml")]
        output: PathBuf,

        /// Node ID (random when omitted)
        #[arg(long)]
        node_id: Option<String>,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen } => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_serve(config, listen).await
        }
        Commands::Run => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_elect(config).await
        }
        Commands::Status { endpoint, namespace, name } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "pretty");
            run_status(&cli.config, endpoint, namespace, name).await
        }
        Commands::Init { output, node_id } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_init(output, node_id)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_validate(cli.config)
        }
    }
}

/// Initialize tracing. `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load the config file and set up logging from it
fn load_config(path: &Path, log_level: Option<&str>) -> Result<WolfLeaseConfig> {
    match WolfLeaseConfig::from_file(path) {
        Ok(config) => {
            init_logging(
                log_level.unwrap_or(&config.logging.level),
                &config.logging.format,
            );
            tracing::info!("Loaded configuration for node: {}", config.node.id);
            Ok(config)
        }
        Err(e) => {
            init_logging(log_level.unwrap_or("info"), "pretty");
            tracing::error!("Failed to load configuration from {:?}: {}", path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            Err(e)
        }
    }
}

/// Cancel `token` on Ctrl+C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            token.cancel();
        }
    });
}

/// Host the lease server
async fn run_serve(config: WolfLeaseConfig, listen: Option<String>) -> Result<()> {
    let store = config.open_store()?;
    let bind_address = listen.unwrap_or_else(|| config.server.bind_address.clone());
    let server = LeaseServer::new(bind_address, store);

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    server.start(shutdown).await
}

/// Workload run by `wolflease run` while it holds the lease
struct DemoWorkload {
    identity: String,
}

#[async_trait]
impl Callbacks for DemoWorkload {
    async fn on_start_leading(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        tracing::info!("{} is now leading", self.identity);

        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut beats: u64 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    beats += 1;
                    tracing::info!("Leader heartbeat #{} from {}", beats, self.identity);
                }
            }
        }

        tracing::info!("{} finished leader work after {} heartbeats", self.identity, beats);
        Ok(())
    }

    fn on_stop_leading(&self) {
        tracing::warn!("{} lost leadership", self.identity);
    }

    fn on_new_leader(&self, identity: &str) {
        if identity == self.identity {
            tracing::info!("Elected as leader");
        } else {
            tracing::info!("New leader observed: {}", identity);
        }
    }
}

/// Take part in the election until Ctrl+C
async fn run_elect(config: WolfLeaseConfig) -> Result<()> {
    let store = config.open_store()?;
    let workload = Arc::new(DemoWorkload {
        identity: config.node.id.clone(),
    });

    let election = config
        .election_builder()
        .store(store)
        .callbacks(workload)
        .build()?;
    let elector = Arc::new(Elector::new(election));

    let runner = Arc::clone(&elector);
    let mut handle = tokio::spawn(async move { runner.run().await });

    let interrupt = CancellationToken::new();
    cancel_on_ctrl_c(interrupt.clone());

    tokio::select! {
        _ = interrupt.cancelled() => {
            elector.shutdown().await;
            if !handle.is_finished() {
                handle.abort();
            }
        }
        result = &mut handle => {
            result.map_err(|e| Error::Internal(format!("election task failed: {}", e)))?;
        }
    }

    Ok(())
}

/// Print the current state of a lease
async fn run_status(
    config_path: &Path,
    endpoint: Option<String>,
    namespace: Option<String>,
    name: Option<String>,
) -> Result<()> {
    // Only touch the config file for whatever the flags leave open
    let config = if endpoint.is_some() && namespace.is_some() && name.is_some() {
        None
    } else {
        Some(WolfLeaseConfig::from_file(config_path)?)
    };

    let store: Arc<dyn LeaseStore> = match (&endpoint, &config) {
        (Some(url), _) => Arc::new(HttpLeaseStore::new(url, Duration::from_secs(5))?),
        (None, Some(config)) => config.open_store()?,
        (None, None) => return Err(Error::Config("no lease store to query".into())),
    };

    let namespace = namespace
        .or_else(|| config.as_ref().map(|c| c.lease.namespace.clone()))
        .unwrap_or_else(|| "default".to_string());
    let name = match name.or_else(|| config.as_ref().map(|c| c.lease.name.clone())) {
        Some(name) => name,
        None => return Err(Error::Config("lease name is required".into())),
    };

    let lease = match store.get(&namespace, &name).await {
        Ok(lease) => lease,
        Err(e) if e.is_not_found() => {
            println!("Lease {}/{} does not exist", namespace, name);
            return Ok(());
        }
        Err(e) => {
            eprintln!("✗ Failed to read lease {}/{}: {}", namespace, name, e);
            return Err(e);
        }
    };

    let now = Utc::now();
    println!("Lease {}", lease.key());
    println!("  Backend:     {}", store.backend());
    println!("  Holder:      {}", lease.holder().unwrap_or("(released)"));
    println!(
        "  State:       {}",
        if lease.is_expired(now) { "expired" } else { "held" }
    );
    println!("  Duration:    {}s", lease.lease_duration_seconds);
    if let Some(acquired) = lease.acquire_time {
        println!("  Acquired:    {}", acquired.to_rfc3339());
    }
    if let Some(renewed) = lease.renew_time {
        println!("  Renewed:     {}", renewed.to_rfc3339());
    }
    if let Some(expires) = lease.expires_at() {
        println!("  Expires:     {}", expires.to_rfc3339());
    }
    println!("  Transitions: {}", lease.lease_transitions);
    if let Some(version) = lease.version {
        println!("  Version:     {}", version);
    }

    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf, node_id: Option<String>) -> Result<()> {
    let node_id = node_id.unwrap_or_else(|| {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("node-{}", &id[..8])
    });

    let config_content = format!(r#"# WolfLease Configuration
# Generated configuration file

[node]
id = "{node_id}"

[lease]
namespace = "default"
name = "controller"
lease_duration_ms = 15000
renew_deadline_ms = 10000
retry_period_ms = 2000
release_on_cancel = true

[store]
backend = "sqlite"
path = "/var/lib/wolflease/leases.db"
# backend = "http"
# endpoint = "http://lease-server:8090"
request_timeout_ms = 5000

[server]
bind_address = "0.0.0.0:8090"

[logging]
level = "info"
format = "pretty"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to point every replica at the same lease store.");
    println!("Then start with: wolflease --config {} run", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfLeaseConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Lease: {}/{}", config.lease.namespace, config.lease.name);
            println!(
                "  Timing: duration {:?}, renew deadline {:?}, retry {:?}",
                config.lease_duration(),
                config.renew_deadline(),
                config.retry_period()
            );
            println!("  Release on cancel: {}", config.lease.release_on_cancel);
            match config.store.backend {
                wolflease::config::StoreBackend::Sqlite => {
                    println!("  Store: sqlite ({})", config.store.path.display())
                }
                wolflease::config::StoreBackend::Http => println!(
                    "  Store: http ({})",
                    config.store.endpoint.as_deref().unwrap_or_default()
                ),
                wolflease::config::StoreBackend::Memory => println!("  Store: memory"),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}
