use thiserror::Error;

use crate::messages::error_code::ErrorCode;

/// A protocol-level error, tied to the message id it concerns.
///
/// An empty `message_id` means the id could not be recovered from the
/// offending frame, in which case no CallError can be sent back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ocpp message ({message_id}): {code} - {description}")]
pub struct OcppError {
    pub code: ErrorCode,
    pub description: String,
    pub message_id: String,
}

impl OcppError {
    pub fn new(code: ErrorCode, description: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            message_id: message_id.into(),
        }
    }

    pub fn has_message_id(&self) -> bool {
        !self.message_id.is_empty()
    }
}

/// Errors that can occur while turning a message into its wire representation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The payload could not be converted into JSON
    #[error("Failed to marshal {kind} payload for message {message_id}: {reason}")]
    PayloadMarshalFailed {
        kind: &'static str,
        message_id: String,
        reason: String,
    },

    /// The framed array could not be written out
    #[error("Failed to encode framed message {message_id}: {reason}")]
    EncodeFailed { message_id: String, reason: String },
}

impl CodecError {
    pub fn message_id(&self) -> &str {
        match self {
            CodecError::PayloadMarshalFailed { message_id, .. }
            | CodecError::EncodeFailed { message_id, .. } => message_id,
        }
    }

    /// Marshal failures surface to the remote side as InternalError
    pub fn to_ocpp_error(&self) -> OcppError {
        OcppError::new(ErrorCode::InternalError, self.to_string(), self.message_id())
    }
}
