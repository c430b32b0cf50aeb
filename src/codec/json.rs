//! JSON codec for message payloads using `serde_json`.
//!
//! Payloads travel inside the envelope as [`serde_json::Value`]. This codec
//! converts between those opaque values and the concrete parameter/result
//! types a handler works with.
//!
//! # Example
//!
//! ```
//! use jsonrpc_host::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let value = JsonCodec::encode(&msg).unwrap();
//! let decoded: Message = JsonCodec::decode(value).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DispatchError, MessageError, Result};

/// JSON codec for structured payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
        Ok(serde_json::to_value(value)?)
    }

    /// Decode a JSON value into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::TypeMismatch`] if the value does not match `T`.
    #[inline]
    pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|source| {
            MessageError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                source,
            }
            .into()
        })
    }

    /// Decode request/event params for `method`.
    ///
    /// Absent or `null` params are first decoded from `null` (which suits
    /// `()`, `Option<_>` and `Value`) and then from `{}` (which suits structs
    /// whose fields all have defaults).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidParams`] if neither form decodes.
    pub fn decode_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> Result<T> {
        let invalid = |e: serde_json::Error| DispatchError::InvalidParams {
            method: method.to_string(),
            reason: e.to_string(),
        };

        match params {
            Some(value) if !value.is_null() => Ok(serde_json::from_value(value).map_err(invalid)?),
            _ => match serde_json::from_value(Value::Null) {
                Ok(v) => Ok(v),
                Err(_) => Ok(serde_json::from_value(Value::Object(Default::default()))
                    .map_err(invalid)?),
            },
        }
    }
}
