//! Leader Election Module
//!
//! Lease-based leader election: N replicas race for a single lease
//! record and whoever holds it unexpired is the leader.

mod backoff;
mod callbacks;
mod clock;
mod config;
mod elector;

pub use backoff::{jittered, sleep_or_cancel, JITTER_FACTOR};
pub use callbacks::Callbacks;
pub use clock::{Clock, MonotonicClock, SystemClock};
pub use config::{
    ElectionConfig, ElectionConfigBuilder, DEFAULT_DRAIN_TIMEOUT, DEFAULT_LEASE_DURATION,
    DEFAULT_RENEW_DEADLINE, DEFAULT_RETRY_PERIOD,
};
pub use elector::{Elector, ElectorPhase};
