//! Lease Module
//!
//! The lease record arbitrating leadership, the store contract the
//! elector consumes, and the bundled store implementations.

mod record;
mod store;
mod memory;
mod sqlite;
mod client;

pub use record::LeaseRecord;
pub use store::LeaseStore;
pub use memory::MemoryLeaseStore;
pub use sqlite::SqliteLeaseStore;
pub use client::HttpLeaseStore;
