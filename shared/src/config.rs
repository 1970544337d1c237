use std::{default::Default, time::Duration};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Contains Config properties used by the outbound dispatchers
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Maximum wait between sending a Call and accepting its response.
    /// `Duration::ZERO` disables timeouts.
    pub request_timeout: Duration,
    /// Per-peer bound on queued requests, 0 means unbounded
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
