use thiserror::Error;

use ocppj_shared::{CatalogError, CodecError, ErrorCode, LinkError, OcppError, QueueError};

/// Errors returned by the central system endpoint and its dispatcher
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OcppServerError {
    /// The dispatcher is stopped, start the server first
    #[error("Dispatcher is not running. Start the server before sending requests")]
    NotStarted,

    /// The dispatcher has no link to write to
    #[error("Dispatcher is not connected to a link")]
    NotConnected,

    /// No client with this id is connected
    #[error("Unknown client {client_id}")]
    UnknownClient { client_id: String },

    /// The outbound queue of the client is at capacity
    #[error("Request queue is full (capacity {capacity}). Wait for pending requests to complete before sending more")]
    QueueFull { capacity: usize },

    /// A request or response failed validation before it reached the wire
    #[error("Invalid message: {0}")]
    Validation(OcppError),

    /// The action of a request is not part of any composed profile
    #[error("Unsupported action {action}")]
    UnsupportedAction { action: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<QueueError> for OcppServerError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::QueueFull { capacity } => OcppServerError::QueueFull { capacity },
        }
    }
}

impl OcppServerError {
    pub(crate) fn from_outbound(error: OcppError, action: &str) -> Self {
        if error.code == ErrorCode::NotSupported {
            OcppServerError::UnsupportedAction {
                action: action.to_string(),
            }
        } else {
            OcppServerError::Validation(error)
        }
    }
}
