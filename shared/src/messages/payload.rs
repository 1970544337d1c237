use std::{any::Any, fmt::Debug};

use serde::Serialize;
use serde_json::Value;

use crate::validation::{Validate, ValidationError, Validator};

/// Object-safe view over a typed, serializable, validatable payload.
///
/// Implemented automatically for every `Serialize + Validate` type; payload
/// definitions only implement [`Request`] or [`Response`] on top.
pub trait Payload: Debug + Send + Sync + 'static {
    fn to_json(&self) -> Result<Value, serde_json::Error>;

    /// Runs the declarative rules of the payload against the global validator
    fn validate_payload(&self) -> Result<(), ValidationError>;

    fn as_any(&self) -> &dyn Any;
}

impl<T> Payload for T
where
    T: Serialize + Validate + Debug + Send + Sync + 'static,
{
    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn validate_payload(&self) -> Result<(), ValidationError> {
        Validator::global().validate(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The payload of a Call
pub trait Request: Payload {
    /// Action name this request is sent under
    fn feature_name(&self) -> &'static str;
}

/// The payload of a CallResult
pub trait Response: Payload {
    /// Action name of the request this response answers
    fn feature_name(&self) -> &'static str;
}

impl dyn Request {
    pub fn downcast_ref<T: Request>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Request>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl dyn Response {
    pub fn downcast_ref<T: Response>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Response>(&self) -> bool {
        self.as_any().is::<T>()
    }
}
