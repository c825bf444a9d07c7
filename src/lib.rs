//! WolfLease - Lease-Based Leader Election
//!
//! A small leader-election engine for replicated services. Every replica
//! runs an [`Elector`](election::Elector) against a shared lease record;
//! whoever holds the unexpired lease is the leader and runs the protected
//! workload, everyone else keeps retrying until the lease expires or is
//! released.
//!
//! # Architecture
//!
//! - [`lease`]: the lease record and the stores it lives in (memory,
//!   SQLite, or a remote lease server over HTTP)
//! - [`election`]: the acquire/renew state machine and its callbacks
//! - [`api`]: an HTTP lease server exposing any store over REST
//! - [`config`]: TOML configuration for the `wolflease` binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wolflease::prelude::*;
//!
//! struct Worker;
//!
//! #[async_trait::async_trait]
//! impl Callbacks for Worker {
//!     async fn on_start_leading(
//!         &self,
//!         cancel: tokio_util::sync::CancellationToken,
//!     ) -> anyhow::Result<()> {
//!         cancel.cancelled().await;
//!         Ok(())
//!     }
//!     fn on_stop_leading(&self) {}
//!     fn on_new_leader(&self, identity: &str) {
//!         println!("leader is now {}", identity);
//!     }
//! }
//!
//! # async fn demo() -> wolflease::Result<()> {
//! let config = ElectionConfig::builder()
//!     .identity("node-1")
//!     .lease("default", "controller")
//!     .store(Arc::new(MemoryLeaseStore::new()))
//!     .callbacks(Arc::new(Worker))
//!     .build()?;
//!
//! let elector = Arc::new(Elector::new(config));
//! let running = Arc::clone(&elector);
//! tokio::spawn(async move { running.run().await });
//! // ...
//! elector.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod election;
pub mod error;
pub mod lease;

pub use config::WolfLeaseConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfLeaseConfig;
    pub use crate::election::{Callbacks, ElectionConfig, Elector, ElectorPhase};
    pub use crate::error::{Error, Result};
    pub use crate::lease::{
        HttpLeaseStore, LeaseRecord, LeaseStore, MemoryLeaseStore, SqliteLeaseStore,
    };
}
