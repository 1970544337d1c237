use std::default::Default;

use ocppj_shared::{DispatcherConfig, ErrorCodeDialect, IdGenerator};

/// Contains Config properties which will be used by the Server
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Request timeout and per-client queue capacity of the dispatcher
    pub dispatcher: DispatcherConfig,
    /// Spelling used when replying with a formation violation
    pub dialect: ErrorCodeDialect,
    /// Source of ids for outbound Calls
    pub id_generator: IdGenerator,
}
