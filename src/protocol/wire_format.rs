//! Wire format encoding and decoding.
//!
//! Every frame is an ASCII header block followed by the content:
//! ```text
//! Content-Length: 52\r\n
//! Content-Type: application/json\r\n     (optional, ignored)
//! \r\n
//! {"jsonrpc":"2.0","id":"1","method":"version"}
//! ```
//!
//! `Content-Length` is mandatory and counts encoded content bytes.

use crate::error::FrameError;

/// Terminator between the header block and the content.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Separator between header lines.
pub const LINE_SEPARATOR: &str = "\r\n";

/// Name of the mandatory length header.
pub const CONTENT_LENGTH_HEADER: &str = "Content-Length";

/// Default maximum content size (256 MiB).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 256 * 1024 * 1024;

/// Parsed header block of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeaders {
    /// Value of `Content-Length`.
    pub content_length: usize,
}

/// Find the start of the header terminator in `buf`.
///
/// Returns the index of the first `\r` of `\r\n\r\n`, or `None` if the
/// terminator is not (yet) present.
#[inline]
pub fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Parse a header block (without the terminator).
///
/// Each line must be `Key: Value`. Headers other than `Content-Length`
/// (such as `Content-Type`) are checked for syntax and then ignored.
///
/// # Example
///
/// ```
/// use jsonrpc_host::protocol::parse_headers;
///
/// let headers = parse_headers(b"Content-Length: 42\r\nContent-Type: application/json").unwrap();
/// assert_eq!(headers.content_length, 42);
/// ```
///
/// # Errors
///
/// - [`FrameError::InvalidHeader`] if a line has no `:` or is not ASCII
/// - [`FrameError::MissingContentLength`] if `Content-Length` is absent
/// - [`FrameError::InvalidContentLength`] if its value is not a non-negative integer
pub fn parse_headers(block: &[u8]) -> Result<FrameHeaders, FrameError> {
    let text = std::str::from_utf8(block)
        .ok()
        .filter(|t| t.is_ascii())
        .ok_or_else(|| FrameError::InvalidHeader(String::from_utf8_lossy(block).into_owned()))?;

    let mut content_length = None;

    for line in text.split(LINE_SEPARATOR) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::InvalidHeader(line.to_string()))?;
        let key = key.trim();
        let value = value.trim();

        if key.eq_ignore_ascii_case(CONTENT_LENGTH_HEADER) {
            let length = value
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength(value.to_string()))?;
            content_length = Some(length);
        }

    }

    let content_length = content_length.ok_or(FrameError::MissingContentLength)?;
    Ok(FrameHeaders { content_length })
}

/// Encode the header block (including terminator) for `content_length` bytes.
///
/// # Example
///
/// ```
/// use jsonrpc_host::protocol::encode_header;
///
/// assert_eq!(encode_header(5), b"Content-Length: 5\r\n\r\n".to_vec());
/// ```
pub fn encode_header(content_length: usize) -> Vec<u8> {
    format!("{}: {}\r\n\r\n", CONTENT_LENGTH_HEADER, content_length).into_bytes()
}

/// Build a complete frame (header + content bytes).
pub fn build_frame(content: &[u8]) -> Vec<u8> {
    let mut frame = encode_header(content.len());
    frame.extend_from_slice(content);
    frame
}
