use std::time::Duration;

/// Most cache and store calls a rotation makes while holding the mapping lease.
pub const CALLS_UNDER_LEASE: u32 = 7;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound for every single cache, store or verifier call.
    pub call_timeout: Duration,
    /// Lifetime of the per-mapping lease if its holder never releases it.
    /// Must cover [`CALLS_UNDER_LEASE`] calls of `call_timeout` each.
    pub lease_ttl: Duration,
    /// How long a request waits for a lease held by another request.
    pub lease_wait: Duration,
    pub lease_poll_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            lease_ttl: Duration::from_secs(15),
            lease_wait: Duration::from_secs(3),
            lease_poll_interval: Duration::from_millis(25),
        }
    }
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Shortest lease TTL under which a saga of slow calls still ends before
    /// the lease does.
    pub fn min_lease_ttl(&self) -> Duration {
        self.call_timeout.saturating_mul(CALLS_UNDER_LEASE)
    }

    pub fn with_lease_wait(mut self, wait: Duration, poll_interval: Duration) -> Self {
        self.lease_wait = wait;
        self.lease_poll_interval = poll_interval;
        self
    }
}
