//! JSON-RPC 2.0 message envelope.
//!
//! A [`Message`] is one of four variants, classified on input by which keys
//! are present:
//!
//! | keys                   | variant         |
//! |------------------------|-----------------|
//! | `method` + `id`        | Request         |
//! | `method`               | Event           |
//! | `id` + `error`         | ResponseError   |
//! | `id` + `result`        | Response        |
//!
//! Payloads stay opaque [`serde_json::Value`]s until a handler asks for a
//! concrete type with [`Message::typed_contents`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::{MessageError, Result};

/// Value of the `jsonrpc` member.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Request id, opaque to the host.
///
/// Numeric ids from the peer are converted to their decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create an id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id from a JSON value.
    ///
    /// `null` is treated as absent; anything but a string or number is an error.
    fn from_json(value: Value) -> std::result::Result<Option<Self>, MessageError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(Self(s))),
            Value::Number(n) => Ok(Some(Self(n.to_string()))),
            other => Err(MessageError::InvalidField {
                field: "id",
                reason: format!("expected string or number, got {}", json_type(&other)),
            }),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Body of a ResponseError.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric error code (see [`error_codes`]).
    pub code: i32,
    /// Human readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorBody {
    /// Create an error body without data.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Kind of message, decided by which envelope keys are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Request,
    Response,
    ResponseError,
    Event,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::ResponseError => "response error",
            Self::Event => "event",
        };
        f.write_str(name)
    }
}

/// A JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Call expecting exactly one Response or ResponseError.
    Request {
        id: MessageId,
        method: String,
        params: Option<Value>,
    },
    /// Successful reply to a Request. `result` may be `null`.
    Response { id: MessageId, result: Value },
    /// Failed reply to a Request.
    ResponseError { id: MessageId, error: ErrorBody },
    /// Notification, never answered.
    Event {
        method: String,
        params: Option<Value>,
    },
}

impl Message {
    /// Create a request.
    pub fn request(method: impl Into<String>, id: impl Into<MessageId>, params: Option<Value>) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Create a successful response.
    pub fn response(id: impl Into<MessageId>, result: Value) -> Self {
        Self::Response {
            id: id.into(),
            result,
        }
    }

    /// Create an error response.
    pub fn response_error(id: impl Into<MessageId>, error: ErrorBody) -> Self {
        Self::ResponseError {
            id: id.into(),
            error,
        }
    }

    /// Create an event (notification).
    pub fn event(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Event {
            method: method.into(),
            params,
        }
    }

    /// Kind of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Request { .. } => MessageType::Request,
            Self::Response { .. } => MessageType::Response,
            Self::ResponseError { .. } => MessageType::ResponseError,
            Self::Event { .. } => MessageType::Event,
        }
    }

    /// Id, if this message carries one.
    pub fn id(&self) -> Option<&MessageId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } | Self::ResponseError { id, .. } => {
                Some(id)
            }
            Self::Event { .. } => None,
        }
    }

    /// Method name for requests and events.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Event { method, .. } => Some(method),
            Self::Response { .. } | Self::ResponseError { .. } => None,
        }
    }

    /// Render the message as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Json`](crate::error::HostError::Json) if a payload
    /// cannot be serialized.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and classify a message from JSON text.
    ///
    /// # Example
    ///
    /// ```
    /// use jsonrpc_host::protocol::{Message, MessageType};
    ///
    /// let msg = Message::deserialize(r#"{"jsonrpc":"2.0","id":"1","method":"version"}"#).unwrap();
    /// assert_eq!(msg.message_type(), MessageType::Request);
    /// assert_eq!(msg.method(), Some("version"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] describing the first envelope problem found.
    pub fn deserialize(text: &str) -> std::result::Result<Self, MessageError> {
        let value: Value = serde_json::from_str(text).map_err(MessageError::InvalidJson)?;
        Self::from_value(value)
    }

    /// Classify an already parsed JSON value.
    pub fn from_value(value: Value) -> std::result::Result<Self, MessageError> {
        let Value::Object(mut object) = value else {
            return Err(MessageError::NotAnObject);
        };

        match object.remove("jsonrpc") {
            None => return Err(MessageError::MissingVersion),
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(other) => {
                return Err(MessageError::InvalidField {
                    field: "jsonrpc",
                    reason: format!("expected \"{}\", got {}", JSONRPC_VERSION, other),
                })
            }
        }

        let id = match object.remove("id") {
            Some(value) => MessageId::from_json(value)?,
            None => None,
        };

        if let Some(method) = object.remove("method") {
            let Value::String(method) = method else {
                return Err(MessageError::InvalidField {
                    field: "method",
                    reason: format!("expected string, got {}", json_type(&method)),
                });
            };
            let params = object.remove("params");
            return Ok(match id {
                Some(id) => Self::Request { id, method, params },
                None => Self::Event { method, params },
            });
        }

        let result = object.remove("result");
        let error = object.remove("error");

        match (result, error, id) {
            (Some(_), Some(_), _) => Err(MessageError::InvalidField {
                field: "result",
                reason: "response carries both 'result' and 'error'".to_string(),
            }),
            (Some(_), None, None) | (None, Some(_), None) => Err(MessageError::MissingId),
            (Some(result), None, Some(id)) => Ok(Self::Response { id, result }),
            (None, Some(error), Some(id)) => {
                let error = serde_json::from_value(error).map_err(|e| MessageError::InvalidField {
                    field: "error",
                    reason: e.to_string(),
                })?;
                Ok(Self::ResponseError { id, error })
            }
            (None, None, Some(id)) => Err(MessageError::MissingMethod { id }),
            (None, None, None) => Err(MessageError::Unclassifiable),
        }
    }

    /// Decode the payload into `T`.
    ///
    /// The payload is `params` for requests and events (absent decodes as
    /// `null`), `result` for responses, and the error body for error responses.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::TypeMismatch`] if the payload does not match `T`.
    pub fn typed_contents<T: DeserializeOwned>(&self) -> std::result::Result<T, MessageError> {
        let value = match self {
            Self::Request { params, .. } | Self::Event { params, .. } => {
                params.clone().unwrap_or(Value::Null)
            }
            Self::Response { result, .. } => result.clone(),
            Self::ResponseError { error, .. } => {
                serde_json::to_value(error).map_err(|source| MessageError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                    source,
                })?
            }
        };

        serde_json::from_value(value).map_err(|source| MessageError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            source,
        })
    }

    /// Best-effort extraction of the id from text that failed to classify.
    ///
    /// Used to address an error reply to a malformed request.
    pub(crate) fn recover_id(text: &str) -> Option<MessageId> {
        let value: Value = serde_json::from_str(text).ok()?;
        let id = value.as_object()?.get("id")?.clone();
        MessageId::from_json(id).ok().flatten()
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        match self {
            Self::Request { id, method, params } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("method", method)?;
                if let Some(params) = params {
                    map.serialize_entry("params", params)?;
                }
            }
            Self::Response { id, result } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("result", result)?;
            }
            Self::ResponseError { id, error } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("error", error)?;
            }
            Self::Event { method, params } => {
                map.serialize_entry("method", method)?;
                if let Some(params) = params {
                    map.serialize_entry("params", params)?;
                }
            }
        }
        map.end()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(message: &Message) -> Message {
        let text = message.serialize().unwrap();
        Message::deserialize(&text).unwrap()
    }

    #[test]
    fn test_request_round_trip() {
        let msg = Message::request("query/run", "7", Some(json!({"text": "select 1"})));
        assert_eq!(round_trip(&msg), msg);
        assert_eq!(msg.message_type(), MessageType::Request);
        assert_eq!(msg.id().map(MessageId::as_str), Some("7"));
    }

    #[test]
    fn test_response_round_trip() {
        let msg = Message::response("7", json!({"rows": 1}));
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_response_error_round_trip() {
        let msg = Message::response_error(
            "7",
            ErrorBody::new(error_codes::INTERNAL_ERROR, "boom").with_data(json!({"trace": []})),
        );
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_event_round_trip() {
        let msg = Message::event("log/message", Some(json!({"level": "info"})));
        assert_eq!(round_trip(&msg), msg);
        assert!(msg.id().is_none());
    }

    #[test]
    fn test_serialize_shape() {
        let text = Message::request("version", "1", None).serialize().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": "1", "method": "version"}));

        let text = Message::response("1", Value::Null).serialize().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": "1", "result": null}));
    }

    #[test]
    fn test_null_result_is_response() {
        let msg = Message::deserialize(r#"{"jsonrpc":"2.0","id":"3","result":null}"#).unwrap();
        assert_eq!(msg, Message::response("3", Value::Null));
    }

    #[test]
    fn test_numeric_id_becomes_string() {
        let msg = Message::deserialize(r#"{"jsonrpc":"2.0","id":42,"method":"ping"}"#).unwrap();
        assert_eq!(msg.id(), Some(&MessageId::from("42")));
    }

    #[test]
    fn test_missing_version() {
        let result = Message::deserialize(r#"{"id":"1","method":"ping"}"#);
        assert!(matches!(result, Err(MessageError::MissingVersion)));
    }

    #[test]
    fn test_wrong_version() {
        let result = Message::deserialize(r#"{"jsonrpc":"1.0","id":"1","method":"ping"}"#);
        assert!(matches!(result, Err(MessageError::InvalidField { field: "jsonrpc", .. })));
    }

    #[test]
    fn test_id_without_method_result_or_error() {
        let result = Message::deserialize(r#"{"jsonrpc":"2.0","id":"9","params":{}}"#);
        match result {
            Err(MessageError::MissingMethod { id }) => assert_eq!(id.as_str(), "9"),
            other => panic!("expected missing method, got {:?}", other),
        }
    }

    #[test]
    fn test_unclassifiable() {
        let result = Message::deserialize(r#"{"jsonrpc":"2.0"}"#);
        assert!(matches!(result, Err(MessageError::Unclassifiable)));
    }

    #[test]
    fn test_response_without_id() {
        let result = Message::deserialize(r#"{"jsonrpc":"2.0","result":1}"#);
        assert!(matches!(result, Err(MessageError::MissingId)));
    }

    #[test]
    fn test_both_result_and_error() {
        let result = Message::deserialize(
            r#"{"jsonrpc":"2.0","id":"1","result":1,"error":{"code":1,"message":"x"}}"#,
        );
        assert!(matches!(result, Err(MessageError::InvalidField { field: "result", .. })));
    }

    #[test]
    fn test_non_string_method() {
        let result = Message::deserialize(r#"{"jsonrpc":"2.0","id":"1","method":5}"#);
        assert!(matches!(result, Err(MessageError::InvalidField { field: "method", .. })));
    }

    #[test]
    fn test_malformed_error_body() {
        let result = Message::deserialize(r#"{"jsonrpc":"2.0","id":"1","error":"bad"}"#);
        assert!(matches!(result, Err(MessageError::InvalidField { field: "error", .. })));
    }

    #[test]
    fn test_invalid_json_and_non_object() {
        assert!(matches!(
            Message::deserialize("{not json"),
            Err(MessageError::InvalidJson(_))
        ));
        assert!(matches!(
            Message::deserialize("[1,2]"),
            Err(MessageError::NotAnObject)
        ));
    }

    #[test]
    fn test_typed_contents() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Params {
            uri: String,
        }

        let msg = Message::request("open", "1", Some(json!({"uri": "file:///a"})));
        let params: Params = msg.typed_contents().unwrap();
        assert_eq!(params.uri, "file:///a");

        let err = msg.typed_contents::<Vec<u32>>().unwrap_err();
        assert!(matches!(err, MessageError::TypeMismatch { .. }));
    }

    #[test]
    fn test_typed_contents_of_error_response() {
        let msg = Message::response_error("1", ErrorBody::new(-32601, "nope"));
        let body: ErrorBody = msg.typed_contents().unwrap();
        assert_eq!(body.code, -32601);
    }

    #[test]
    fn test_recover_id() {
        let text = r#"{"id":"5","method":"x"}"#;
        assert_eq!(Message::recover_id(text), Some(MessageId::from("5")));
        assert_eq!(Message::recover_id("garbage"), None);
        assert_eq!(Message::recover_id(r#"{"id":null}"#), None);
    }

    #[test]
    fn test_from_value_ignores_unknown_members() {
        let value = json!({"jsonrpc": "2.0", "method": "tick", "extra": true});
        let msg = Message::from_value(value).unwrap();
        assert_eq!(msg, Message::event("tick", None));
    }
}
