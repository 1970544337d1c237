use std::{fmt, sync::Arc};

use serde_json::Value;

pub mod error;
pub mod error_code;
pub mod payload;

use error::OcppError;
use error_code::ErrorCode;
use payload::{Request, Response};

/// Maximum length of a message id and of an action name
pub const MAX_ID_LENGTH: usize = 36;

/// Numeric tag in the first slot of every framed message.
/// These values are bound to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

impl MessageType {
    pub fn from_number(number: i64) -> Option<Self> {
        match number {
            2 => Some(MessageType::Call),
            3 => Some(MessageType::CallResult),
            4 => Some(MessageType::CallError),
            _ => None,
        }
    }

    pub fn as_number(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Call => f.write_str("Call"),
            MessageType::CallResult => f.write_str("CallResult"),
            MessageType::CallError => f.write_str("CallError"),
        }
    }
}

// Call

/// A request, framed as `[2, id, action, payload]`
#[derive(Debug, Clone)]
pub struct Call {
    pub unique_id: String,
    pub action: String,
    pub payload: Arc<dyn Request>,
}

impl Call {
    pub fn new(unique_id: impl Into<String>, payload: Arc<dyn Request>) -> Self {
        Self {
            unique_id: unique_id.into(),
            action: payload.feature_name().to_string(),
            payload,
        }
    }
}

// CallResult

/// A response, framed as `[3, id, payload]`
#[derive(Debug)]
pub struct CallResult {
    pub unique_id: String,
    pub payload: Box<dyn Response>,
}

// CallError

/// An error reply, framed as `[4, id, code, description, details]`
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub unique_id: String,
    pub error_code: ErrorCode,
    pub error_description: String,
    pub error_details: Value,
}

impl CallError {
    pub fn to_ocpp_error(&self) -> OcppError {
        OcppError::new(
            self.error_code.clone(),
            self.error_description.clone(),
            self.unique_id.clone(),
        )
    }
}

// Message

/// Any of the three framed message kinds
#[derive(Debug)]
pub enum Message {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Call(_) => MessageType::Call,
            Message::CallResult(_) => MessageType::CallResult,
            Message::CallError(_) => MessageType::CallError,
        }
    }

    pub fn unique_id(&self) -> &str {
        match self {
            Message::Call(call) => &call.unique_id,
            Message::CallResult(result) => &result.unique_id,
            Message::CallError(error) => &error.unique_id,
        }
    }
}

impl From<Call> for Message {
    fn from(call: Call) -> Self {
        Message::Call(call)
    }
}

impl From<CallResult> for Message {
    fn from(result: CallResult) -> Self {
        Message::CallResult(result)
    }
}

impl From<CallError> for Message {
    fn from(error: CallError) -> Self {
        Message::CallError(error)
    }
}
