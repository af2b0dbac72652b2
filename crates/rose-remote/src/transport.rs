//! Transport seam
//!
//! The scenario API never talks HTTP itself. It builds [`ApiRequest`]s whose
//! record payloads already went through the field codec, and hands them to a
//! [`Transport`], which is responsible for authentication, retries and turning
//! the raw response into a [`ResponseBody`] via
//! [`interpret_response`](rose_record::interpret_response).

use rose_record::{encode_request_fields, Record, RemoteError, ResponseBody, ResponseMode};
use serde_json::Value;

/// HTTP verb of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

/// Request body
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// JSON body sent as-is
    Json(Value),
    /// Binary body (archive upload)
    Bytes(Vec<u8>),
}

/// One call against the REST interface
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API root, without leading slash
    pub path: String,
    /// Query parameters, unencoded
    pub query: Vec<(String, String)>,
    pub payload: Payload,
    pub mode: ResponseMode,
}

impl ApiRequest {
    /// Create GET request
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            payload: Payload::Empty,
            mode: ResponseMode::Json,
        }
    }

    /// Create POST request carrying a record, with structured fields encoded
    #[must_use]
    pub fn post_record(path: impl Into<String>, record: &Record) -> Self {
        Self {
            method: Method::Post,
            payload: Payload::Json(Value::Object(encode_request_fields(record))),
            ..Self::get(path)
        }
    }

    /// Create PUT request carrying a record, with structured fields encoded
    #[must_use]
    pub fn put_record(path: impl Into<String>, record: &Record) -> Self {
        Self {
            method: Method::Put,
            ..Self::post_record(path, record)
        }
    }

    /// Create POST request whose JSON body bypasses the field codec
    #[must_use]
    pub fn post_json_unprocessed(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            payload: Payload::Json(body),
            ..Self::get(path)
        }
    }

    /// Create POST request with a binary body
    #[must_use]
    pub fn post_bytes(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            payload: Payload::Bytes(bytes),
            mode: ResponseMode::Raw,
            ..Self::get(path)
        }
    }

    /// Add query parameter
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Return the response body untouched
    #[must_use]
    pub fn raw_response(mut self) -> Self {
        self.mode = ResponseMode::Raw;
        self
    }

    /// Value of a query parameter
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Authenticated request/response channel to the server
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request
    async fn invoke(&self, request: ApiRequest) -> Result<ResponseBody, RemoteError>;

    /// Base URL of the server
    fn server_url(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_payloads_are_encoded() {
        let mut record = Record::new();
        record.insert("__JSON".to_string(), json!({ "configJsonObj": {} }));
        let req = ApiRequest::put_record("rest/connections/abc", &record);
        assert_eq!(req.method, Method::Put);
        match req.payload {
            Payload::Json(Value::Object(map)) => assert!(map.contains_key("__JSON%JSN")),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn unprocessed_json_keeps_structure() {
        let req = ApiRequest::post_json_unprocessed("git/createzip", json!({ "a": { "b": 1 } })).raw_response();
        assert_eq!(req.payload, Payload::Json(json!({ "a": { "b": 1 } })));
        assert_eq!(req.mode, ResponseMode::Raw);
    }

    #[test]
    fn query_lookup() {
        let req = ApiRequest::get("rest/robots").with_query("filterCondition", "{}");
        assert_eq!(req.query_value("filterCondition"), Some("{}"));
        assert_eq!(req.query_value("other"), None);
    }
}
