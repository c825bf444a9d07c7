//! Lease Record
//!
//! The unit of data persisted in a lease store. Whoever is recorded as
//! holder of an unexpired record is the leader.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A lease record as stored in a [`LeaseStore`](super::LeaseStore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    /// Namespace the lease lives in
    pub namespace: String,

    /// Lease name, unique within the namespace
    pub name: String,

    /// Identity of the current or last holder (empty means released)
    #[serde(default)]
    pub holder_identity: Option<String>,

    /// TTL the holder claims for itself
    #[serde(default)]
    pub lease_duration_seconds: u32,

    /// When the current holder acquired the lease
    #[serde(default)]
    pub acquire_time: Option<DateTime<Utc>>,

    /// Last successful write by the current holder
    #[serde(default)]
    pub renew_time: Option<DateTime<Utc>>,

    /// Number of holder changes
    #[serde(default)]
    pub lease_transitions: u32,

    /// Store-assigned concurrency token, checked on update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl LeaseRecord {
    /// Create an empty, unheld record for the given coordinates
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            holder_identity: None,
            lease_duration_seconds: 0,
            acquire_time: None,
            renew_time: None,
            lease_transitions: 0,
            version: None,
        }
    }

    /// Current holder, treating an empty string as no holder
    pub fn holder(&self) -> Option<&str> {
        self.holder_identity
            .as_deref()
            .filter(|holder| !holder.is_empty())
    }

    /// Whether the given identity is recorded as holder
    pub fn is_held_by(&self, identity: &str) -> bool {
        self.holder() == Some(identity)
    }

    /// Whether the lease has been released (no holder recorded)
    pub fn is_released(&self) -> bool {
        self.holder().is_none()
    }

    /// Instant after which the lease is expired, if it was ever renewed
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.renew_time
            .map(|renewed| renewed + Duration::seconds(i64::from(self.lease_duration_seconds)))
    }

    /// A lease is expired iff `now > renew_time + lease_duration_seconds`.
    /// Records without a renew time are always expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => now > expiry,
            None => true,
        }
    }

    /// `namespace/name` for log messages
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
