//! Codec module - payload and content encoding.
//!
//! - [`JsonCodec`] - converts between `serde_json::Value` payloads and typed values
//! - [`TextEncoding`] - encodes/decodes frame content text to bytes
//!
//! # Design
//!
//! Codecs are marker structs/enums with plain methods rather than trait
//! objects, so the encoding is chosen once (in [`HostConfig`](crate::config::HostConfig))
//! and passed by value.

mod json;
mod text;

pub use json::JsonCodec;
pub use text::TextEncoding;
