//! Protocol module - wire format, framing, and the message envelope.
//!
//! This module implements the wire level of the host:
//! - `Content-Length` header encoding/decoding
//! - Frame reader that reassembles messages from partial reads
//! - JSON-RPC envelope model and typed method descriptors

mod descriptor;
mod frame_reader;
mod message;
mod wire_format;

pub use descriptor::{EventType, RequestType};
pub use frame_reader::{FrameReader, DEFAULT_BUFFER_SIZE};
pub use message::{error_codes, ErrorBody, Message, MessageId, MessageType, JSONRPC_VERSION};
pub use wire_format::{
    build_frame, encode_header, find_header_terminator, parse_headers, FrameHeaders,
    CONTENT_LENGTH_HEADER, DEFAULT_MAX_CONTENT_LENGTH, HEADER_TERMINATOR, LINE_SEPARATOR,
};
