//! Record codec
//!
//! The server stores and transports flat records whose values are strings
//! or scalars. Structured values travel as JSON text under a key carrying
//! [`JSON_FIELD_SUFFIX`]; this module applies and removes that convention
//! and turns raw responses into results.

use crate::error::RemoteError;
use crate::Record;
use serde_json::Value;

/// Key suffix marking a field whose string value holds encoded JSON
pub const JSON_FIELD_SUFFIX: &str = "%JSN";

/// Value a suffixed field decodes to when its text is not valid JSON
pub const PARSE_FAILED: Value = Value::Null;

/// Check if a decoded field is the parse-failure sentinel
#[inline]
#[must_use]
pub fn is_parse_failed(value: &Value) -> bool {
    *value == PARSE_FAILED
}

/// Encode structured top-level values so the record only carries flat fields
///
/// Objects and arrays are serialized and their key gets the suffix marker.
/// Scalars (including `null`) pass through unchanged.
#[must_use]
pub fn encode_request_fields(record: &Record) -> Record {
    let mut out = Record::new();
    for (key, value) in record {
        match value {
            Value::Object(_) | Value::Array(_) => {
                let text =
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                out.insert(format!("{key}{JSON_FIELD_SUFFIX}"), Value::String(text));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

/// Reverse [`encode_request_fields`] for a single record
///
/// A suffixed field whose value is not parseable JSON text becomes
/// [`PARSE_FAILED`]; this is not an error.
#[must_use]
pub fn decode_record(record: Record) -> Record {
    let mut out = Record::new();
    for (key, value) in record {
        match key.strip_suffix(JSON_FIELD_SUFFIX) {
            Some(stripped) => {
                let decoded = match &value {
                    Value::String(text) => serde_json::from_str(text).unwrap_or(PARSE_FAILED),
                    _ => PARSE_FAILED,
                };
                out.insert(stripped.to_string(), decoded);
            }
            None => {
                out.entry(key).or_insert(value);
            }
        }
    }
    out
}

/// Decode suffixed fields of a response record, or of every record in a list
#[must_use]
pub fn decode_response_fields(value: Value) -> Value {
    match value {
        Value::Object(record) => Value::Object(decode_record(record)),
        Value::Array(items) => Value::Array(items.into_iter().map(decode_response_fields).collect()),
        other => other,
    }
}

/// How a response body should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Parse JSON and decode suffixed fields
    #[default]
    Json,
    /// Hand back the bytes untouched (archives)
    Raw,
}

/// Status and body as received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Create raw response
    #[inline]
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Successful response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Raw(Vec<u8>),
}

impl ResponseBody {
    /// Take the JSON value; raw bodies are parsed on demand
    pub fn into_json(self) -> Result<Value, RemoteError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Raw(bytes) => parse_json_body(&bytes).map(decode_response_fields),
        }
    }

    /// Take the bytes; JSON bodies are re-serialized
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Raw(bytes) => bytes,
            Self::Json(value) => value.to_string().into_bytes(),
        }
    }
}

/// Branch a raw response into success or a typed remote error
///
/// Only status 200 is success. A missing record is recognised either by a
/// 404 status or by the server's "no record found" message.
pub fn interpret_response(raw: RawResponse, mode: ResponseMode) -> Result<ResponseBody, RemoteError> {
    if raw.status != 200 {
        return Err(error_from_body(raw.status, &raw.body));
    }
    match mode {
        ResponseMode::Raw => Ok(ResponseBody::Raw(raw.body)),
        ResponseMode::Json => {
            let value = parse_json_body(&raw.body)?;
            Ok(ResponseBody::Json(decode_response_fields(value)))
        }
    }
}

fn parse_json_body(body: &[u8]) -> Result<Value, RemoteError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| RemoteError::Decode(e.to_string()))
}

fn error_from_body(status: u16, body: &[u8]) -> RemoteError {
    let text = String::from_utf8_lossy(body).trim().to_string();
    let message = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map_or_else(|| text.clone(), str::to_string),
        Ok(Value::String(s)) => s,
        _ => text,
    };
    if status == 404 || message.to_lowercase().contains("no record found") {
        RemoteError::NotFound(message)
    } else {
        RemoteError::server(status, message)
    }
}
