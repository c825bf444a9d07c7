//! Lease Store Contract
//!
//! The storage seam consumed by the elector. Implementations live in
//! sibling modules; anything that can read, create and conditionally
//! replace a record can arbitrate leadership.

use async_trait::async_trait;

use super::LeaseRecord;
use crate::error::Result;

/// Remote storage for lease records
///
/// # Concurrency
///
/// `update` must reject a write whose `version` is `Some` and differs from
/// the stored version with [`Error::Conflict`](crate::Error::Conflict). This
/// compare-and-swap is what keeps two participants that both observed an
/// expired lease from both acquiring it. A store that ignores `version`
/// still works, but then mutual exclusion holds only as far as the store
/// serializes the underlying writes.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Fetch a lease, failing with `Error::NotFound` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<LeaseRecord>;

    /// Create a lease, failing with `Error::Conflict` when it already exists
    async fn create(&self, record: &LeaseRecord) -> Result<LeaseRecord>;

    /// Replace an existing lease, checking `record.version` when present
    async fn update(&self, record: &LeaseRecord) -> Result<LeaseRecord>;

    /// Short backend description for logs and health output
    fn backend(&self) -> &'static str;
}
