//! Frame reader that reconstructs messages from an arbitrarily chunked stream.
//!
//! Implements a state machine over a single growable buffer:
//! - `Headers`: scanning for the `\r\n\r\n` terminator
//! - `Content`: header parsed, waiting for `Content-Length` bytes
//!
//! The buffer is tracked with two cursors: `read_offset` (consumed up to)
//! and `buffer_end` (filled up to). After every message the unconsumed tail
//! is moved to the front, and the backing storage is shrunk again once it is
//! far larger than what is still buffered. Memory therefore follows the
//! largest recent message rather than the total bytes read.
//!
//! # Example
//!
//! ```
//! use jsonrpc_host::protocol::FrameReader;
//!
//! # tokio_test::block_on(async {
//! let input: &[u8] = b"Content-Length: 2\r\n\r\n{}";
//! let mut reader = FrameReader::new(input);
//! assert_eq!(reader.read_message().await.unwrap(), "{}");
//! # });
//! ```

use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{
    find_header_terminator, parse_headers, DEFAULT_MAX_CONTENT_LENGTH, HEADER_TERMINATOR,
};
use crate::codec::TextEncoding;
use crate::error::FrameError;

/// Initial (and minimum) buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Storage is shrunk once it exceeds the needed size by this factor.
const SHRINK_FACTOR: usize = 4;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for the end of the header block.
    Headers,
    /// Header parsed, waiting for `length` content bytes.
    Content { length: usize },
}

/// Reads framed messages from an [`AsyncRead`].
///
/// Owned exclusively by the read loop; not shared with handlers.
pub struct FrameReader<R> {
    /// Underlying stream.
    reader: R,
    /// Backing storage; `buffer.len()` is the capacity.
    buffer: Vec<u8>,
    /// Bytes before this index are consumed.
    read_offset: usize,
    /// Bytes before this index are filled.
    buffer_end: usize,
    /// Current parsing state.
    state: State,
    /// Content text encoding.
    encoding: TextEncoding,
    /// Maximum accepted `Content-Length`.
    max_content_length: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with UTF-8 content and the default size limit.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, TextEncoding::default(), DEFAULT_MAX_CONTENT_LENGTH)
    }

    /// Create a reader with a custom encoding and content size limit.
    pub fn with_options(reader: R, encoding: TextEncoding, max_content_length: usize) -> Self {
        Self {
            reader,
            buffer: vec![0; DEFAULT_BUFFER_SIZE],
            read_offset: 0,
            buffer_end: 0,
            state: State::Headers,
            encoding,
            max_content_length,
        }
    }

    /// Read the next complete message content.
    ///
    /// Suspends until a whole frame is available. Cancel safe: if the future
    /// is dropped, bytes already read stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// - [`FrameError::UnexpectedEof`] if the stream ends (always terminal)
    /// - [`FrameError::Io`] on read failure
    /// - header errors ([`FrameError::MissingContentLength`] and friends);
    ///   the malformed header block is discarded before returning
    /// - [`FrameError::Decode`] if the content is not valid text; the frame is
    ///   consumed, so the next call starts at the following frame
    pub async fn read_message(&mut self) -> Result<String, FrameError> {
        loop {
            match self.state {
                State::Headers => {
                    if let Some(length) = self.try_parse_headers()? {
                        self.state = State::Content { length };
                        continue;
                    }
                }
                State::Content { length } => {
                    if self.buffered() >= length {
                        let start = self.read_offset;
                        let content = self.encoding.decode(&self.buffer[start..start + length]);
                        self.read_offset += length;
                        self.state = State::Headers;
                        self.compact();
                        return content;
                    }
                }
            }

            self.fill().await?;
        }
    }

    /// Try to parse a header block from the buffered bytes.
    ///
    /// Returns `Ok(None)` if the terminator has not arrived yet.
    fn try_parse_headers(&mut self) -> Result<Option<usize>, FrameError> {
        let window = &self.buffer[self.read_offset..self.buffer_end];
        let Some(position) = find_header_terminator(window) else {
            return Ok(None);
        };

        let block_start = self.read_offset;
        let block_end = block_start + position;
        let parsed = parse_headers(&self.buffer[block_start..block_end]);

        // Header block is consumed whether or not it parsed.
        self.read_offset = block_end + HEADER_TERMINATOR.len();

        match parsed {
            Ok(headers) if headers.content_length > self.max_content_length => {
                self.compact();
                Err(FrameError::ContentTooLarge {
                    length: headers.content_length,
                    max: self.max_content_length,
                })
            }
            Ok(headers) => Ok(Some(headers.content_length)),
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed header block");
                self.compact();
                Err(e)
            }
        }
    }

    /// Read more bytes from the stream, growing the buffer if needed.
    async fn fill(&mut self) -> Result<(), FrameError> {
        self.ensure_space();

        let n = self.reader.read(&mut self.buffer[self.buffer_end..]).await?;
        if n == 0 {
            return Err(FrameError::UnexpectedEof {
                buffered: self.buffered(),
            });
        }

        self.buffer_end += n;
        Ok(())
    }

    /// Double the buffer when less than a quarter of it is free.
    fn ensure_space(&mut self) {
        let capacity = self.buffer.len();
        if capacity - self.buffer_end < capacity / 4 {
            self.buffer.resize(capacity * 2, 0);
        }
    }

    /// Move unconsumed bytes to the front and shrink oversized storage.
    fn compact(&mut self) {
        let remaining = self.buffered();
        if self.read_offset > 0 {
            self.buffer
                .copy_within(self.read_offset..self.buffer_end, 0);
        }
        self.read_offset = 0;
        self.buffer_end = remaining;

        let target = remaining
            .saturating_mul(2)
            .max(DEFAULT_BUFFER_SIZE)
            .next_power_of_two();
        if self.buffer.len() > target.saturating_mul(SHRINK_FACTOR) {
            self.buffer.truncate(target);
            self.buffer.shrink_to_fit();
        }
    }

    /// Number of buffered, unconsumed bytes.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buffer_end - self.read_offset
    }

    /// Current buffer capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consume the reader, returning the underlying stream.
    ///
    /// Buffered bytes are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Headers => "Headers",
            State::Content { .. } => "Content",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;
    use tokio_test::io::Builder;

    const VERSION_REQUEST: &str = r#"{"jsonrpc":"2.0","id":"1","method":"version","params":{}}"#;

    #[tokio::test]
    async fn test_single_complete_frame() {
        let bytes = build_frame(VERSION_REQUEST.as_bytes());
        let mut reader = FrameReader::new(&bytes[..]);

        let content = reader.read_message().await.unwrap();

        assert_eq!(content, VERSION_REQUEST);
        assert_eq!(reader.buffered(), 0);
        assert_eq!(reader.state_name(), "Headers");
    }

    #[tokio::test]
    async fn test_multiple_frames_in_one_read() {
        let mut combined = build_frame(b"first");
        combined.extend(build_frame(b"second"));
        combined.extend(build_frame(b"third"));
        let mut reader = FrameReader::new(&combined[..]);

        assert_eq!(reader.read_message().await.unwrap(), "first");
        assert_eq!(reader.read_message().await.unwrap(), "second");
        assert_eq!(reader.read_message().await.unwrap(), "third");
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_split_at_every_boundary() {
        let bytes = build_frame(VERSION_REQUEST.as_bytes());

        for split in 1..bytes.len() {
            let mock = Builder::new()
                .read(&bytes[..split])
                .read(&bytes[split..])
                .build();
            let mut reader = FrameReader::new(mock);

            let content = reader.read_message().await.unwrap();
            assert_eq!(content, VERSION_REQUEST, "split at {}", split);
        }
    }

    #[tokio::test]
    async fn test_split_into_three_reads() {
        let bytes = build_frame(VERSION_REQUEST.as_bytes());
        let a = 10;
        let b = bytes.len() - 7;

        let mock = Builder::new()
            .read(&bytes[..a])
            .read(&bytes[a..b])
            .read(&bytes[b..])
            .build();
        let mut reader = FrameReader::new(mock);

        assert_eq!(reader.read_message().await.unwrap(), VERSION_REQUEST);
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let bytes = build_frame(b"{\"hi\":1}");
        let mut builder = Builder::new();
        for byte in &bytes {
            builder.read(std::slice::from_ref(byte));
        }
        let mut reader = FrameReader::new(builder.build());

        assert_eq!(reader.read_message().await.unwrap(), "{\"hi\":1}");
    }

    #[tokio::test]
    async fn test_extra_headers_ignored() {
        let input = b"Content-Length: 4\r\nContent-Type: application/json\r\n\r\ntest";
        let mut reader = FrameReader::new(&input[..]);

        assert_eq!(reader.read_message().await.unwrap(), "test");
    }

    #[tokio::test]
    async fn test_empty_content() {
        let input = b"Content-Length: 0\r\n\r\n";
        let mut reader = FrameReader::new(&input[..]);

        assert_eq!(reader.read_message().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_missing_content_length() {
        let input = b"Content-Type: application/json\r\n\r\ntest";
        let mut reader = FrameReader::new(&input[..]);

        let result = reader.read_message().await;
        assert!(matches!(result, Err(FrameError::MissingContentLength)));
    }

    #[tokio::test]
    async fn test_invalid_content_length() {
        let input = b"Content-Length: invalid\r\n\r\ntest";
        let mut reader = FrameReader::new(&input[..]);

        let result = reader.read_message().await;
        assert!(matches!(result, Err(FrameError::InvalidContentLength(_))));
    }

    #[tokio::test]
    async fn test_malformed_header_block_is_discarded() {
        let mut input = b"Content-Length: nope\r\n\r\n".to_vec();
        input.extend(build_frame(b"next"));
        let mut reader = FrameReader::new(&input[..]);

        assert!(reader.read_message().await.is_err());
        assert_eq!(reader.read_message().await.unwrap(), "next");
    }

    #[tokio::test]
    async fn test_eof_mid_content() {
        let input = b"Content-Length: 5\r\n\r\nabc";
        let mut reader = FrameReader::new(&input[..]);

        let result = reader.read_message().await;
        assert!(matches!(result, Err(FrameError::UnexpectedEof { buffered: 3 })));
        assert_eq!(reader.state_name(), "Content");
    }

    #[tokio::test]
    async fn test_eof_mid_headers() {
        let input = b"Content-Length: 10";
        let mut reader = FrameReader::new(&input[..]);

        let result = reader.read_message().await;
        assert!(matches!(result, Err(FrameError::UnexpectedEof { buffered: 18 })));
    }

    #[tokio::test]
    async fn test_eof_on_empty_stream() {
        let mut reader = FrameReader::new(&b""[..]);

        let result = reader.read_message().await;
        assert!(matches!(result, Err(FrameError::UnexpectedEof { buffered: 0 })));
    }

    #[tokio::test]
    async fn test_content_too_large() {
        let input = b"Content-Length: 1000\r\n\r\n";
        let mut reader = FrameReader::with_options(&input[..], TextEncoding::Utf8, 100);

        let result = reader.read_message().await;
        assert!(matches!(
            result,
            Err(FrameError::ContentTooLarge {
                length: 1000,
                max: 100
            })
        ));
    }

    #[tokio::test]
    async fn test_large_message_grows_buffer() {
        let payload = "x".repeat(1024 * 1024);
        let bytes = build_frame(payload.as_bytes());
        let mut reader = FrameReader::new(&bytes[..]);

        let content = reader.read_message().await.unwrap();
        assert_eq!(content.len(), 1024 * 1024);
    }

    #[tokio::test]
    async fn test_buffer_shrinks_after_large_message() {
        let mut input = build_frame("y".repeat(512 * 1024).as_bytes());
        for i in 0..50 {
            input.extend(build_frame(format!("{{\"n\":{}}}", i).as_bytes()));
        }
        let mut reader = FrameReader::new(&input[..]);

        let big = reader.read_message().await.unwrap();
        assert_eq!(big.len(), 512 * 1024);

        for i in 0..50 {
            let content = reader.read_message().await.unwrap();
            assert_eq!(content, format!("{{\"n\":{}}}", i));
        }

        assert!(
            reader.capacity() <= DEFAULT_BUFFER_SIZE * SHRINK_FACTOR,
            "capacity {} not bounded",
            reader.capacity()
        );
    }

    #[tokio::test]
    async fn test_many_small_messages_keep_default_capacity() {
        let mut input = Vec::new();
        for i in 0..1000 {
            input.extend(build_frame(format!("{{\"seq\":{}}}", i).as_bytes()));
        }
        let mut reader = FrameReader::new(&input[..]);

        for _ in 0..1000 {
            reader.read_message().await.unwrap();
        }
        assert_eq!(reader.capacity(), DEFAULT_BUFFER_SIZE);
    }

    #[tokio::test]
    async fn test_utf16_content() {
        let text = "{\"a\":\"ż\"}";
        let encoded = TextEncoding::Utf16Le.encode(text);
        let bytes = build_frame(&encoded);
        let mut reader = FrameReader::with_options(
            &bytes[..],
            TextEncoding::Utf16Le,
            DEFAULT_MAX_CONTENT_LENGTH,
        );

        assert_eq!(reader.read_message().await.unwrap(), text);
    }

    #[tokio::test]
    async fn test_invalid_utf8_consumes_frame() {
        let mut input = build_frame(&[0xff, 0xfe]);
        input.extend(build_frame(b"ok"));
        let mut reader = FrameReader::new(&input[..]);

        assert!(matches!(
            reader.read_message().await,
            Err(FrameError::Decode { .. })
        ));
        assert_eq!(reader.read_message().await.unwrap(), "ok");
    }
}
