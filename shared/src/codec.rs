use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::messages::{
    error::CodecError, error_code::ErrorCodeDialect, Call, CallError, CallResult, Message,
    MessageType,
};

static ESCAPE_HTML: AtomicBool = AtomicBool::new(false);

/// Enables `\u003c`-style escaping of `<`, `>` and `&` in outgoing frames.
///
/// Off by default, several deployed peers reject escaped strings.
pub fn set_escape_html(enabled: bool) {
    ESCAPE_HTML.store(enabled, Ordering::SeqCst);
}

pub fn is_escape_html() -> bool {
    ESCAPE_HTML.load(Ordering::SeqCst)
}

/// Serializes a message into a single text frame
pub fn serialize(message: &Message, dialect: ErrorCodeDialect) -> Result<Vec<u8>, CodecError> {
    let array = match message {
        Message::Call(call) => call_to_array(call)?,
        Message::CallResult(result) => call_result_to_array(result)?,
        Message::CallError(error) => call_error_to_array(error, dialect),
    };
    encode(&array, message.unique_id())
}

pub fn serialize_call(call: &Call) -> Result<Vec<u8>, CodecError> {
    encode(&call_to_array(call)?, &call.unique_id)
}

pub fn serialize_call_result(result: &CallResult) -> Result<Vec<u8>, CodecError> {
    encode(&call_result_to_array(result)?, &result.unique_id)
}

pub fn serialize_call_error(
    error: &CallError,
    dialect: ErrorCodeDialect,
) -> Result<Vec<u8>, CodecError> {
    encode(&call_error_to_array(error, dialect), &error.unique_id)
}

fn call_to_array(call: &Call) -> Result<Value, CodecError> {
    let payload = call
        .payload
        .to_json()
        .map_err(|err| CodecError::PayloadMarshalFailed {
            kind: "Call",
            message_id: call.unique_id.clone(),
            reason: err.to_string(),
        })?;
    Ok(Value::Array(vec![
        Value::from(MessageType::Call.as_number()),
        Value::from(call.unique_id.as_str()),
        Value::from(call.action.as_str()),
        payload,
    ]))
}

fn call_result_to_array(result: &CallResult) -> Result<Value, CodecError> {
    let payload = result
        .payload
        .to_json()
        .map_err(|err| CodecError::PayloadMarshalFailed {
            kind: "CallResult",
            message_id: result.unique_id.clone(),
            reason: err.to_string(),
        })?;
    Ok(Value::Array(vec![
        Value::from(MessageType::CallResult.as_number()),
        Value::from(result.unique_id.as_str()),
        payload,
    ]))
}

fn call_error_to_array(error: &CallError, dialect: ErrorCodeDialect) -> Value {
    // absent details still go out as an empty object
    let details = match &error.error_details {
        Value::Null => Value::Object(serde_json::Map::new()),
        details => details.clone(),
    };
    Value::Array(vec![
        Value::from(MessageType::CallError.as_number()),
        Value::from(error.unique_id.as_str()),
        Value::from(error.error_code.wire_str(dialect)),
        Value::from(error.error_description.as_str()),
        details,
    ])
}

fn encode(array: &Value, message_id: &str) -> Result<Vec<u8>, CodecError> {
    let mut text = serde_json::to_string(array).map_err(|err| CodecError::EncodeFailed {
        message_id: message_id.to_string(),
        reason: err.to_string(),
    })?;
    if is_escape_html() {
        text = escape_html(&text);
    }
    let trimmed_len = text.trim_end_matches('\n').len();
    text.truncate(trimmed_len);
    Ok(text.into_bytes())
}

/// Escapes HTML-sensitive characters inside an encoded JSON document.
///
/// Safe on a whole document since these characters can only occur inside
/// string literals.
pub fn escape_html(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    escaped
}
