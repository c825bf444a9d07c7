//! WolfLease Configuration
//!
//! File configuration for the `wolflease` binary: who this node is,
//! which lease it competes for, and where leases are stored.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::election::{ElectionConfig, ElectionConfigBuilder};
use crate::lease::{HttpLeaseStore, LeaseStore, MemoryLeaseStore, SqliteLeaseStore};

/// Main WolfLease configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfLeaseConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Lease and election timing
    pub lease: LeaseConfig,

    /// Lease storage backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Lease server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique identity used as lease holder
    pub id: String,
}

/// Lease coordinates and election timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Lease namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Lease name
    pub name: String,

    /// Lease duration in milliseconds
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,

    /// Renew deadline in milliseconds
    #[serde(default = "default_renew_deadline_ms")]
    pub renew_deadline_ms: u64,

    /// Retry period in milliseconds
    #[serde(default = "default_retry_period_ms")]
    pub retry_period_ms: u64,

    /// Clear the holder on graceful shutdown
    #[serde(default = "default_true")]
    pub release_on_cancel: bool,
}

/// Lease storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local SQLite database file
    Sqlite,
    /// Remote lease server
    Http,
    /// Process memory (lease server only; lost on restart)
    Memory,
}

/// Lease storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend kind
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// SQLite database path (sqlite backend)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Lease server URL (http backend)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout in milliseconds (http backend)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Lease server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address
    #[serde(default = "default_server_address")]
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_namespace() -> String {
    "default".to_string()
}

fn default_lease_duration_ms() -> u64 {
    15_000
}

fn default_renew_deadline_ms() -> u64 {
    10_000
}

fn default_retry_period_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/wolflease/leases.db")
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_server_address() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            endpoint: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_server_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfLeaseConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfLeaseConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.lease.namespace.is_empty() {
            return Err(crate::Error::Config("lease.namespace cannot be empty".into()));
        }

        if self.lease.name.is_empty() {
            return Err(crate::Error::Config("lease.name cannot be empty".into()));
        }

        let lease = &self.lease;
        if !(lease.lease_duration_ms > lease.renew_deadline_ms
            && lease.renew_deadline_ms > lease.retry_period_ms
            && lease.retry_period_ms > 0)
        {
            return Err(crate::Error::Config(format!(
                "lease timing must satisfy lease_duration_ms > renew_deadline_ms > retry_period_ms > 0 \
                 (got {} > {} > {})",
                lease.lease_duration_ms, lease.renew_deadline_ms, lease.retry_period_ms
            )));
        }

        match self.store.backend {
            StoreBackend::Sqlite if self.store.path.as_os_str().is_empty() => {
                return Err(crate::Error::Config("store.path cannot be empty for the sqlite backend".into()));
            }
            StoreBackend::Http if self.store.endpoint.as_deref().unwrap_or_default().is_empty() => {
                return Err(crate::Error::Config("store.endpoint is required for the http backend".into()));
            }
            _ => {}
        }

        Ok(())
    }

    /// Get lease duration as Duration
    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease.lease_duration_ms)
    }

    /// Get renew deadline as Duration
    pub fn renew_deadline(&self) -> Duration {
        Duration::from_millis(self.lease.renew_deadline_ms)
    }

    /// Get retry period as Duration
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.lease.retry_period_ms)
    }

    /// Get store request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.store.request_timeout_ms)
    }

    /// Open the configured lease store
    pub fn open_store(&self) -> crate::Result<Arc<dyn LeaseStore>> {
        let store: Arc<dyn LeaseStore> = match self.store.backend {
            StoreBackend::Sqlite => Arc::new(SqliteLeaseStore::open(&self.store.path)?),
            StoreBackend::Http => {
                let endpoint = self.store.endpoint.as_deref().ok_or_else(|| {
                    crate::Error::Config("store.endpoint is required for the http backend".into())
                })?;
                Arc::new(HttpLeaseStore::new(endpoint, self.request_timeout())?)
            }
            StoreBackend::Memory => Arc::new(MemoryLeaseStore::new()),
        };
        Ok(store)
    }

    /// Election builder pre-filled from this file.
    ///
    /// The caller still supplies the store and callbacks.
    pub fn election_builder(&self) -> ElectionConfigBuilder {
        ElectionConfig::builder()
            .identity(self.node.id.clone())
            .lease(self.lease.namespace.clone(), self.lease.name.clone())
            .lease_duration(self.lease_duration())
            .renew_deadline(self.renew_deadline())
            .retry_period(self.retry_period())
            .release_on_cancel(self.lease.release_on_cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[node]
id = "controller-0"

[lease]
namespace = "kube-system"
name = "scheduler"
lease_duration_ms = 15000
renew_deadline_ms = 10000
retry_period_ms = 2000
release_on_cancel = false

[store]
backend = "http"
endpoint = "http://leases.internal:8090"
request_timeout_ms = 3000

[server]
bind_address = "127.0.0.1:8090"

[logging]
level = "debug"
format = "json"
"#;

    #[test]
    fn test_parse_config() {
        let config = WolfLeaseConfig::from_str(FULL).unwrap();
        assert_eq!(config.node.id, "controller-0");
        assert_eq!(config.lease.namespace, "kube-system");
        assert_eq!(config.store.backend, StoreBackend::Http);
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert!(!config.lease.release_on_cancel);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = WolfLeaseConfig::from_str(
            r#"
[node]
id = "node-1"

[lease]
name = "controller"
"#,
        )
        .unwrap();

        assert_eq!(config.lease.namespace, "default");
        assert_eq!(config.lease_duration(), Duration::from_secs(15));
        assert_eq!(config.renew_deadline(), Duration::from_secs(10));
        assert_eq!(config.retry_period(), Duration::from_secs(2));
        assert!(config.lease.release_on_cancel);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.server.bind_address, "0.0.0.0:8090");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_bad_timing() {
        let err = WolfLeaseConfig::from_str(
            r#"
[node]
id = "node-1"

[lease]
name = "controller"
lease_duration_ms = 10000
renew_deadline_ms = 15000
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("lease_duration_ms > renew_deadline_ms"));
    }

    #[test]
    fn test_http_backend_needs_endpoint() {
        let err = WolfLeaseConfig::from_str(
            r#"
[node]
id = "node-1"

[lease]
name = "controller"

[store]
backend = "http"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("store.endpoint"));
    }

    #[test]
    fn test_empty_node_id() {
        let err = WolfLeaseConfig::from_str(
            r#"
[node]
id = ""

[lease]
name = "controller"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("node.id"));
    }

    #[test]
    fn test_election_builder_carries_settings() {
        let mut config = WolfLeaseConfig::from_str(FULL).unwrap();
        config.store.backend = StoreBackend::Memory;

        struct Quiet;

        #[async_trait::async_trait]
        impl crate::election::Callbacks for Quiet {
            async fn on_start_leading(
                &self,
                cancel: tokio_util::sync::CancellationToken,
            ) -> anyhow::Result<()> {
                cancel.cancelled().await;
                Ok(())
            }
            fn on_stop_leading(&self) {}
            fn on_new_leader(&self, _identity: &str) {}
        }

        let election = config
            .election_builder()
            .store(config.open_store().unwrap())
            .callbacks(Arc::new(Quiet))
            .build()
            .unwrap();

        assert_eq!(election.identity(), "controller-0");
        assert_eq!(election.lease_key(), "kube-system/scheduler");
        assert!(!election.release_on_cancel());
        assert_eq!(election.store().backend(), "memory");
    }
}
