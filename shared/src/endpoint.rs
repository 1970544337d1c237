use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use crate::{
    codec,
    messages::{
        error::{CodecError, OcppError},
        error_code::{ErrorCode, ErrorCodeDialect},
        payload::{Request, Response},
        Call, CallError, CallResult, Message, MessageType, MAX_ID_LENGTH,
    },
    protocol::{Catalog, CatalogError, Feature, Profile},
    state::ClientState,
    validation::{is_validation_enabled, ValidationContext, Validator},
};

/// Framing, parsing and message construction shared by both endpoint roles.
///
/// Holds the composed profiles and the error-code dialect. Pending-request
/// state is passed in by the caller, so the same endpoint serves a single
/// station or many service-side peers.
#[derive(Clone, Debug, Default)]
pub struct Endpoint {
    catalog: Catalog,
    dialect: ErrorCodeDialect,
}

impl Endpoint {
    pub fn new(dialect: ErrorCodeDialect) -> Self {
        Self {
            catalog: Catalog::new(),
            dialect,
        }
    }

    pub fn add_profile(&mut self, profile: Profile) -> Result<(), CatalogError> {
        self.catalog.add_profile(profile)?;
        Ok(())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn feature(&self, action: &str) -> Option<Arc<dyn Feature>> {
        self.catalog.lookup_by_action(action)
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.catalog.lookup_by_profile(name)
    }

    pub fn dialect(&self) -> ErrorCodeDialect {
        self.dialect
    }

    pub fn set_dialect(&mut self, dialect: ErrorCodeDialect) {
        self.dialect = dialect;
    }

    // Incoming

    /// Decodes a frame into its top-level JSON array
    pub fn parse_raw_message(&self, data: &[u8]) -> Result<Vec<Value>, OcppError> {
        let value: Value = serde_json::from_slice(data).map_err(|err| {
            OcppError::new(
                ErrorCode::FormationViolation,
                format!("Invalid JSON message: {}", err),
                "",
            )
        })?;
        match value {
            Value::Array(elements) => Ok(elements),
            other => Err(OcppError::new(
                ErrorCode::FormationViolation,
                format!("Invalid message. Expected array, got {}", json_kind(&other)),
                "",
            )),
        }
    }

    /// Parses a decoded frame into a [`Message`].
    ///
    /// Returns `Ok(None)` for responses and errors that match no pending
    /// request: such stale messages are dropped without a reply.
    pub fn parse_message(
        &self,
        elements: &[Value],
        state: &ClientState,
    ) -> Result<Option<Message>, OcppError> {
        if elements.len() < 3 {
            return Err(OcppError::new(
                ErrorCode::FormationViolation,
                "Invalid message. Expected array length >= 3",
                "",
            ));
        }
        let type_number = match elements[0].as_f64() {
            Some(number) => number,
            None => {
                return Err(OcppError::new(
                    ErrorCode::FormationViolation,
                    format!("Invalid element {} at 0, expected message type (int)", elements[0]),
                    "",
                ))
            }
        };
        let unique_id = match elements[1].as_str() {
            Some(id) => id.to_string(),
            None => {
                return Err(OcppError::new(
                    ErrorCode::FormationViolation,
                    format!("Invalid element {} at 1, expected unique ID (string)", elements[1]),
                    "",
                ))
            }
        };
        let message_type = if type_number.fract() == 0.0 {
            MessageType::from_number(type_number as i64)
        } else {
            None
        };

        match message_type {
            Some(MessageType::Call) => self.parse_call(elements, unique_id).map(Some),
            Some(MessageType::CallResult) => self.parse_call_result(elements, unique_id, state),
            Some(MessageType::CallError) => self.parse_call_error(elements, unique_id, state),
            None => Err(OcppError::new(
                ErrorCode::MessageTypeNotSupported,
                format!("Invalid message type ID {}", elements[0]),
                unique_id,
            )),
        }
    }

    fn parse_call(&self, elements: &[Value], unique_id: String) -> Result<Message, OcppError> {
        if elements.len() != 4 {
            return Err(OcppError::new(
                ErrorCode::FormationViolation,
                "Invalid Call message. Expected array length 4",
                unique_id,
            ));
        }
        let action = match elements[2].as_str() {
            Some(action) => action.to_string(),
            None => {
                return Err(OcppError::new(
                    ErrorCode::FormationViolation,
                    format!("Invalid element {} at 2, expected action (string)", elements[2]),
                    unique_id,
                ))
            }
        };
        // an id-less Call is rejected here and, having no id, never answered
        if unique_id.is_empty() {
            validate_header(&unique_id, &action)?;
        }
        let feature = self.feature(&action).ok_or_else(|| {
            OcppError::new(
                ErrorCode::NotSupported,
                format!("Unsupported feature {}", action),
                unique_id.clone(),
            )
        })?;
        validate_header(&unique_id, &action)?;
        let payload = feature.parse_request(&elements[3]).map_err(|err| {
            OcppError::new(ErrorCode::FormationViolation, err.to_string(), unique_id.clone())
        })?;
        if let Err(err) = payload.validate_payload() {
            return Err(err.to_ocpp_error(&unique_id, &action));
        }
        Ok(Message::Call(Call {
            unique_id,
            action,
            payload,
        }))
    }

    fn parse_call_result(
        &self,
        elements: &[Value],
        unique_id: String,
        state: &ClientState,
    ) -> Result<Option<Message>, OcppError> {
        let request = match state.get_pending_request(&unique_id) {
            Some(request) => request,
            None => {
                debug!("discarding CallResult {} matching no pending request", unique_id);
                return Ok(None);
            }
        };
        // the correlation is unambiguous from here on: whatever the outcome,
        // the pending entry is done
        let result = self.parse_response_payload(&elements[2], &unique_id, request.as_ref());
        state.delete_pending_request(&unique_id);
        let payload = result?;
        Ok(Some(Message::CallResult(CallResult { unique_id, payload })))
    }

    fn parse_response_payload(
        &self,
        raw: &Value,
        unique_id: &str,
        request: &dyn Request,
    ) -> Result<Box<dyn Response>, OcppError> {
        let action = request.feature_name();
        let feature = self.feature(action).ok_or_else(|| {
            OcppError::new(
                ErrorCode::NotSupported,
                format!("Unsupported feature {}", action),
                unique_id,
            )
        })?;
        let payload = feature.parse_response(raw).map_err(|err| {
            OcppError::new(ErrorCode::FormationViolation, err.to_string(), unique_id)
        })?;
        if let Err(err) = payload.validate_payload() {
            return Err(err.to_ocpp_error(unique_id, action));
        }
        Ok(payload)
    }

    fn parse_call_error(
        &self,
        elements: &[Value],
        unique_id: String,
        state: &ClientState,
    ) -> Result<Option<Message>, OcppError> {
        if state.delete_pending_request(&unique_id).is_none() {
            debug!("discarding CallError {} matching no pending request", unique_id);
            return Ok(None);
        }
        if elements.len() < 4 {
            return Err(OcppError::new(
                ErrorCode::FormationViolation,
                "Invalid Call Error message. Expected array length >= 4",
                unique_id,
            ));
        }
        let error_code = match elements[2].as_str() {
            Some(code) => ErrorCode::from_wire(code),
            None => {
                return Err(OcppError::new(
                    ErrorCode::FormationViolation,
                    format!("Invalid element {} at 2, expected error code (string)", elements[2]),
                    unique_id,
                ))
            }
        };
        let error_description = match elements[3].as_str() {
            Some(description) => description.to_string(),
            None => {
                return Err(OcppError::new(
                    ErrorCode::FormationViolation,
                    format!(
                        "Invalid element {} at 3, expected error description (string)",
                        elements[3]
                    ),
                    unique_id,
                ))
            }
        };
        let error_details = elements.get(4).cloned().unwrap_or(Value::Null);
        let call_error = CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        };
        validate_call_error(&call_error)?;
        Ok(Some(Message::CallError(call_error)))
    }

    // Outgoing

    /// Wraps a request into a Call under the given id, validating both
    pub fn create_call(&self, unique_id: String, request: Arc<dyn Request>) -> Result<Call, OcppError> {
        let action = request.feature_name();
        if self.feature(action).is_none() {
            return Err(OcppError::new(
                ErrorCode::NotSupported,
                format!("Unsupported feature {}", action),
                unique_id,
            ));
        }
        validate_header(&unique_id, action)?;
        if let Err(err) = request.validate_payload() {
            return Err(err.to_ocpp_error(&unique_id, action));
        }
        Ok(Call::new(unique_id, request))
    }

    pub fn create_call_result(
        &self,
        unique_id: &str,
        response: Box<dyn Response>,
    ) -> Result<CallResult, OcppError> {
        let action = response.feature_name();
        validate_header(unique_id, action)?;
        if let Err(err) = response.validate_payload() {
            return Err(err.to_ocpp_error(unique_id, action));
        }
        Ok(CallResult {
            unique_id: unique_id.to_string(),
            payload: response,
        })
    }

    pub fn create_call_error(
        &self,
        unique_id: &str,
        error_code: ErrorCode,
        error_description: &str,
        error_details: Value,
    ) -> Result<CallError, OcppError> {
        let call_error = CallError {
            unique_id: unique_id.to_string(),
            error_code,
            error_description: error_description.to_string(),
            error_details,
        };
        validate_call_error(&call_error)?;
        Ok(call_error)
    }

    pub fn serialize_call(&self, call: &Call) -> Result<Vec<u8>, CodecError> {
        codec::serialize_call(call)
    }

    pub fn serialize_call_result(&self, result: &CallResult) -> Result<Vec<u8>, CodecError> {
        codec::serialize_call_result(result)
    }

    /// Serializes an error in this endpoint's dialect
    pub fn serialize_call_error(&self, error: &CallError) -> Result<Vec<u8>, CodecError> {
        codec::serialize_call_error(error, self.dialect)
    }

    pub fn serialize(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        codec::serialize(message, self.dialect)
    }
}

fn validate_header(unique_id: &str, action: &str) -> Result<(), OcppError> {
    if !is_validation_enabled() && !unique_id.is_empty() {
        return Ok(());
    }
    let mut ctx = ValidationContext::new(Validator::global(), "Call");
    ctx.required("UniqueId", unique_id)
        .max_len("UniqueId", unique_id, MAX_ID_LENGTH)
        .required("Action", action)
        .max_len("Action", action, MAX_ID_LENGTH);
    ctx.finish()
        .map_err(|err| err.to_ocpp_error(unique_id, action))
}

fn validate_call_error(call_error: &CallError) -> Result<(), OcppError> {
    if call_error.unique_id.is_empty() {
        return Err(OcppError::new(
            ErrorCode::FormationViolation,
            "Invalid CallError: message id cannot be empty",
            "",
        ));
    }
    if call_error.error_code.as_str().is_empty() {
        warn!("CallError {} carries an empty error code", call_error.unique_id);
        return Err(OcppError::new(
            ErrorCode::FormationViolation,
            "Invalid CallError: error code cannot be empty",
            call_error.unique_id.clone(),
        ));
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
