//! Election Callbacks
//!
//! Hooks through which the embedding application learns about
//! leadership changes.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Leadership hooks supplied by the application
#[async_trait]
pub trait Callbacks: Send + Sync {
    /// Run the protected workload.
    ///
    /// Called on a dedicated task when this participant becomes leader.
    /// Should run until `cancel` fires. Returning early, with `Ok` or
    /// `Err`, gives up leadership immediately.
    async fn on_start_leading(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Called once leadership is lost, after the workload was told to stop
    fn on_stop_leading(&self);

    /// Called when a different leader is observed, including this participant
    fn on_new_leader(&self, identity: &str);
}
