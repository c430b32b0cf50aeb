//! Text encodings for frame content.
//!
//! Headers are always ASCII; the content block is text in the configured
//! encoding. `Content-Length` counts encoded bytes, not characters.
//!
//! # Example
//!
//! ```
//! use jsonrpc_host::codec::TextEncoding;
//!
//! let bytes = TextEncoding::Utf16Le.encode("hi");
//! assert_eq!(bytes, vec![b'h', 0, b'i', 0]);
//! assert_eq!(TextEncoding::Utf16Le.decode(&bytes).unwrap(), "hi");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Text encoding used for frame content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    /// UTF-8 (the default).
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    /// UTF-16, little endian, no byte order mark.
    #[serde(rename = "utf-16le", alias = "utf-16")]
    Utf16Le,
}

impl TextEncoding {
    /// Canonical encoding name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
        }
    }

    /// Encode text into content bytes.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }

    /// Decode content bytes into text.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Decode`] if the bytes are not valid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, FrameError> {
        let invalid = || FrameError::Decode {
            encoding: self.name(),
        };

        match self {
            Self::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| invalid()),
            Self::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(invalid());
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| invalid())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_round_trip() {
        let text = r#"{"method":"zażółć"}"#;
        let bytes = TextEncoding::Utf8.encode(text);
        assert_eq!(bytes.len(), text.len());
        assert_eq!(TextEncoding::Utf8.decode(&bytes).unwrap(), text);
    }

    #[test]
    fn test_utf8_multibyte_counts_bytes() {
        // 'é' is two bytes in UTF-8
        assert_eq!(TextEncoding::Utf8.encode("é").len(), 2);
    }

    #[test]
    fn test_utf8_invalid() {
        let result = TextEncoding::Utf8.decode(&[0xff, 0xfe, 0xfd]);
        assert!(matches!(result, Err(FrameError::Decode { encoding: "utf-8" })));
    }

    #[test]
    fn test_utf16_round_trip() {
        let text = "{\"id\":\"1\"} ✓";
        let bytes = TextEncoding::Utf16Le.encode(text);
        assert_eq!(TextEncoding::Utf16Le.decode(&bytes).unwrap(), text);
    }

    #[test]
    fn test_utf16_odd_length() {
        let result = TextEncoding::Utf16Le.decode(&[b'a', 0, b'b']);
        assert!(matches!(result, Err(FrameError::Decode { .. })));
    }

    #[test]
    fn test_default_is_utf8() {
        assert_eq!(TextEncoding::default(), TextEncoding::Utf8);
    }

    #[test]
    fn test_deserialize_names() {
        let enc: TextEncoding = serde_json::from_str("\"utf-16le\"").unwrap();
        assert_eq!(enc, TextEncoding::Utf16Le);
        let enc: TextEncoding = serde_json::from_str("\"utf8\"").unwrap();
        assert_eq!(enc, TextEncoding::Utf8);
    }
}
