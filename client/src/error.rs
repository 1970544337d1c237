use thiserror::Error;

use ocppj_shared::{CatalogError, CodecError, ErrorCode, LinkError, OcppError, QueueError};

/// Errors returned by the station endpoint and its dispatcher
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OcppClientError {
    /// The dispatcher is stopped, start the client first
    #[error("Dispatcher is not running. Start the client before sending requests")]
    NotStarted,

    /// The dispatcher has no link to write to
    #[error("Dispatcher is not connected to a link")]
    NotConnected,

    /// The outbound queue is at capacity
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

impl From<QueueError> for OcppClientError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::QueueFull { capacity } => OcppClientError::QueueFull { capacity },
        }
    }
}

impl OcppClientError {
    /// Maps an outbound construction failure onto the matching variant
    pub(crate) fn from_outbound(error: OcppError, action: &str) -> Self {
        if error.code == ErrorCode::NotSupported {
            OcppClientError::UnsupportedAction {
                action: action.to_string(),
            }
        } else {
            OcppClientError::Validation(error)
        }
    }
}
