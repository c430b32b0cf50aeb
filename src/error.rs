//! Error types for jsonrpc-host.
//!
//! The taxonomy follows the layers a message passes through:
//!
//! - [`FrameError`] - the byte stream could not be split into frames
//!   (always terminal for the connection)
//! - [`MessageError`] - a frame was read but is not a valid JSON-RPC envelope
//! - [`DispatchError`] - a valid message could not be handed to a handler, or
//!   the handler failed; turned into a `ResponseError` on the wire
//! - [`HostError`] - the umbrella returned by the public API

use thiserror::Error;

use crate::protocol::{error_codes, ErrorBody, MessageId};

/// Errors raised while reconstructing frames from the input stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// I/O error while reading the stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was read.
    #[error("Unexpected end of stream ({buffered} unconsumed bytes)")]
    UnexpectedEof {
        /// Bytes that were buffered but not yet part of a complete frame.
        buffered: usize,
    },

    /// The header block has no `Content-Length` header.
    #[error("Missing Content-Length header")]
    MissingContentLength,

    /// `Content-Length` is not a non-negative integer.
    #[error("Invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),

    /// A header line is not of the form `Key: Value`.
    #[error("Invalid header line: {0:?}")]
    InvalidHeader(String),

    /// Declared content exceeds the configured maximum.
    #[error("Content length {length} exceeds maximum {max}")]
    ContentTooLarge {
        /// Declared length.
        length: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Content bytes are not valid in the configured text encoding.
    #[error("Content is not valid {encoding}")]
    Decode {
        /// Name of the configured encoding.
        encoding: &'static str,
    },
}

/// Errors raised while decoding or validating a JSON-RPC envelope.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The content is not JSON at all.
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The content is JSON but not an object.
    #[error("Message is not a JSON object")]
    NotAnObject,

    /// The `jsonrpc` member is absent.
    #[error("Missing 'jsonrpc' member")]
    MissingVersion,

    /// A message with an `id` but no `result`/`error` has no `method`.
    #[error("Request {id} has no 'method' member")]
    MissingMethod {
        /// Id of the offending request.
        id: MessageId,
    },

    /// A response has no usable `id`.
    #[error("Response has no 'id' member")]
    MissingId,

    /// Neither `id` nor `method` is present.
    #[error("Message has neither 'id' nor 'method'")]
    Unclassifiable,

    /// A member has the wrong JSON type.
    #[error("Invalid '{field}' member: {reason}")]
    InvalidField {
        /// Member name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The payload does not decode into the requested type.
    #[error("Contents do not match {expected}: {source}")]
    TypeMismatch {
        /// Rust type name that was requested.
        expected: &'static str,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
}

impl MessageError {
    /// JSON-RPC error code used when this error is reported to the peer.
    pub fn error_code(&self) -> i32 {
        match self {
            Self::InvalidJson(_) | Self::NotAnObject => error_codes::PARSE_ERROR,
            Self::TypeMismatch { .. } => error_codes::INVALID_PARAMS,
            _ => error_codes::INVALID_REQUEST,
        }
    }
}

/// Errors raised between receiving a message and completing its handler.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the method.
    #[error("No handler registered for method '{0}'")]
    MethodNotFound(String),

    /// Params could not be decoded into the handler's parameter type.
    #[error("Invalid params for '{method}': {reason}")]
    InvalidParams {
        /// Method name.
        method: String,
        /// Decoder error text.
        reason: String,
    },

    /// The handler returned an error.
    #[error("Handler for '{method}' failed: {reason}")]
    HandlerFailed {
        /// Method name.
        method: String,
        /// Error text.
        reason: String,
    },

    /// The handler panicked.
    #[error("Handler for '{0}' panicked")]
    HandlerPanicked(String),

    /// The host no longer accepts requests.
    #[error("Host is shutting down, '{0}' rejected")]
    ShuttingDown(String),
}

impl DispatchError {
    /// Convert into the error body sent to the peer.
    pub fn to_error_body(&self) -> ErrorBody {
        let code = match self {
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => error_codes::INVALID_PARAMS,
            Self::ShuttingDown(_) => error_codes::INVALID_REQUEST,
            Self::HandlerFailed { .. } | Self::HandlerPanicked(_) => error_codes::INTERNAL_ERROR,
        };
        ErrorBody::new(code, self.to_string())
    }
}

/// Main error type for all host operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Framing error on the input stream.
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// Envelope error.
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Dispatch error.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// A handler is already registered and overriding was not requested.
    #[error("Handler already registered for method '{0}'")]
    HandlerExists(String),

    /// `send_result`/`send_error` was called twice for one request.
    #[error("Response already sent for request {0}")]
    AlreadyResponded(MessageId),

    /// A structured JSON-RPC error, sent to the peer as-is.
    #[error("{}", .0.message)]
    Rpc(ErrorBody),

    /// Free-form handler failure.
    #[error("{0}")]
    Handler(String),

    /// Invalid configuration or environment setup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection closed (writer task gone or host stopped).
    #[error("Connection closed")]
    ConnectionClosed,
}

impl HostError {
    /// Create a free-form handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Error body reported to the peer when a request handler fails with `self`.
    pub(crate) fn to_error_body(&self, method: &str) -> ErrorBody {
        match self {
            Self::Rpc(body) => body.clone(),
            Self::Dispatch(e) => e.to_error_body(),
            Self::Message(e) => ErrorBody::new(e.error_code(), e.to_string()),
            other => DispatchError::HandlerFailed {
                method: method.to_string(),
                reason: other.to_string(),
            }
            .to_error_body(),
        }
    }
}

/// Result type alias using HostError.
pub type Result<T> = std::result::Result<T, HostError>;
