//! Election Configuration
//!
//! Validated, immutable settings for one election participant.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{Callbacks, Clock, SystemClock};
use crate::error::{Error, Result};
use crate::lease::LeaseStore;

/// Default lease duration
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);
/// Default renew deadline
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);
/// Default retry period
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);
/// Default bound on waiting for leader work to finish at teardown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Election configuration
///
/// Only obtainable through [`ElectionConfigBuilder::build`], so every
/// instance satisfies `lease_duration > renew_deadline > retry_period`.
#[derive(Clone)]
pub struct ElectionConfig {
    identity: String,
    namespace: String,
    name: String,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
    release_on_cancel: bool,
    drain_timeout: Duration,
    store: Arc<dyn LeaseStore>,
    callbacks: Arc<dyn Callbacks>,
    clock: Arc<dyn Clock>,
}

impl ElectionConfig {
    /// Start building a configuration
    pub fn builder() -> ElectionConfigBuilder {
        ElectionConfigBuilder::new()
    }

    /// This participant's identity
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Namespace of the lease
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the lease
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long a holder may go without renewing before others take over
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// How long the leader keeps retrying renewal before stepping down
    pub fn renew_deadline(&self) -> Duration {
        self.renew_deadline
    }

    /// Spacing between acquire/renew attempts
    pub fn retry_period(&self) -> Duration {
        self.retry_period
    }

    /// Whether to clear the holder on shutdown
    pub fn release_on_cancel(&self) -> bool {
        self.release_on_cancel
    }

    /// Bound on waiting for leader work at teardown
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Lease store
    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Leadership callbacks
    pub fn callbacks(&self) -> &Arc<dyn Callbacks> {
        &self.callbacks
    }

    /// Time source
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Lease duration as recorded in the lease, rounded up to whole seconds
    pub fn lease_duration_seconds(&self) -> u32 {
        let secs = self.lease_duration.as_millis().div_ceil(1000);
        u32::try_from(secs).unwrap_or(u32::MAX)
    }

    /// `namespace/name` for log messages
    pub fn lease_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Re-check the invariants of a built configuration
    pub fn validate(&self) -> Result<()> {
        check_non_empty("namespace", &self.namespace)?;
        check_non_empty("name", &self.name)?;
        check_non_empty("identity", &self.identity)?;
        check_timing(self.lease_duration, self.renew_deadline, self.retry_period)?;
        check_drain(self.drain_timeout)
    }
}

impl fmt::Debug for ElectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElectionConfig")
            .field("identity", &self.identity)
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("lease_duration", &self.lease_duration)
            .field("renew_deadline", &self.renew_deadline)
            .field("retry_period", &self.retry_period)
            .field("release_on_cancel", &self.release_on_cancel)
            .field("drain_timeout", &self.drain_timeout)
            .field("store", &self.store.backend())
            .finish_non_exhaustive()
    }
}

fn check_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn check_timing(lease_duration: Duration, renew_deadline: Duration, retry_period: Duration) -> Result<()> {
    if retry_period.is_zero() {
        return Err(Error::Config("retry_period must be greater than zero".into()));
    }
    if lease_duration <= renew_deadline || renew_deadline <= retry_period {
        return Err(Error::Config(format!(
            "timing must satisfy lease_duration > renew_deadline > retry_period \
             (got {:?} > {:?} > {:?})",
            lease_duration, renew_deadline, retry_period
        )));
    }
    Ok(())
}

fn check_drain(drain_timeout: Duration) -> Result<()> {
    if drain_timeout.is_zero() {
        return Err(Error::Config("drain_timeout must be greater than zero".into()));
    }
    Ok(())
}

/// Builder for [`ElectionConfig`]
#[derive(Clone)]
pub struct ElectionConfigBuilder {
    identity: Option<String>,
    namespace: Option<String>,
    name: Option<String>,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
    release_on_cancel: bool,
    drain_timeout: Duration,
    store: Option<Arc<dyn LeaseStore>>,
    callbacks: Option<Arc<dyn Callbacks>>,
    clock: Option<Arc<dyn Clock>>,
}

impl Default for ElectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ElectionConfigBuilder {
    /// Builder with default timings (15s / 10s / 2s) and release on cancel
    pub fn new() -> Self {
        Self {
            identity: None,
            namespace: None,
            name: None,
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            release_on_cancel: true,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            store: None,
            callbacks: None,
            clock: None,
        }
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Lease coordinates
    pub fn lease(mut self, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self.name = Some(name.into());
        self
    }

    pub fn lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    pub fn renew_deadline(mut self, deadline: Duration) -> Self {
        self.renew_deadline = deadline;
        self
    }

    pub fn retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    pub fn release_on_cancel(mut self, release: bool) -> Self {
        self.release_on_cancel = release;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn store(mut self, store: Arc<dyn LeaseStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn callbacks(mut self, callbacks: Arc<dyn Callbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Override the time source (defaults to the system clock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Check the configuration, naming the first missing or invalid field
    pub fn validate(&self) -> Result<()> {
        if self.store.is_none() {
            return Err(Error::Config("store is required".into()));
        }
        check_non_empty("namespace", self.namespace.as_deref().unwrap_or_default())?;
        check_non_empty("name", self.name.as_deref().unwrap_or_default())?;
        check_non_empty("identity", self.identity.as_deref().unwrap_or_default())?;
        if self.callbacks.is_none() {
            return Err(Error::Config("callbacks are required".into()));
        }
        check_timing(self.lease_duration, self.renew_deadline, self.retry_period)?;
        check_drain(self.drain_timeout)
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<ElectionConfig> {
        self.validate()?;

        let (Some(store), Some(callbacks), Some(identity), Some(namespace), Some(name)) =
            (self.store, self.callbacks, self.identity, self.namespace, self.name)
        else {
            return Err(Error::Config("incomplete election configuration".into()));
        };

        Ok(ElectionConfig {
            identity,
            namespace,
            name,
            lease_duration: self.lease_duration,
            renew_deadline: self.renew_deadline,
            retry_period: self.retry_period,
            release_on_cancel: self.release_on_cancel,
            drain_timeout: self.drain_timeout,
            store,
            callbacks,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
