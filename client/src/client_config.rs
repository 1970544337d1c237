use std::{default::Default, time::Duration};

use ocppj_shared::{DispatcherConfig, ErrorCodeDialect, IdGenerator};

/// Upper bound on how long `stop` waits for the link to report the disconnect
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Contains Config properties which will be used by the Client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Request timeout and queue capacity of the outbound dispatcher
    pub dispatcher: DispatcherConfig,
    /// Spelling used when replying with a formation violation
    pub dialect: ErrorCodeDialect,
    /// Source of ids for outbound Calls
    pub id_generator: IdGenerator,
    /// How long `stop` waits for the disconnected event before giving up
    pub stop_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            dialect: ErrorCodeDialect::default(),
            id_generator: IdGenerator::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}
