use thiserror::Error;

/// Errors reported by a link (the WebSocket layer underneath an endpoint)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The link has no open connection to write to
    #[error("Link is not connected")]
    NotConnected,

    /// The link was closed locally or by the remote side
    #[error("Link closed: {reason}")]
    Closed { reason: String },

    /// No connection exists for the given client id
    #[error("No open connection for client {client_id}")]
    UnknownClient { client_id: String },

    /// The connection or upgrade handshake could not be completed
    #[error("Failed to establish connection to {target}: {reason}")]
    ConnectFailed { target: String, reason: String },

    /// Reading or writing the underlying stream failed
    #[error("Link I/O error: {reason}")]
    Io { reason: String },
}

impl LinkError {
    pub fn io(reason: impl ToString) -> Self {
        LinkError::Io {
            reason: reason.to_string(),
        }
    }
}
