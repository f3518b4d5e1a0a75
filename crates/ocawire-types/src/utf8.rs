//! UTF-8 helpers used by the string codec.
//!
//! OCP.1 strings carry a code-point count rather than a byte count, so the
//! decoder has to walk lead bytes to find out how many bytes to copy.

use crate::error::{Result, TypeError};

/// Decode UTF-8 bytes into an owned string.
pub fn buffer_to_utf8(buf: &[u8]) -> Result<String> {
    std::str::from_utf8(buf)
        .map(str::to_owned)
        .map_err(|_| TypeError::InvalidUtf8)
}

/// Encode a string as UTF-8 bytes.
pub fn utf8_to_buffer(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Number of bytes `text` occupies once UTF-8 encoded.
pub fn utf8_encoded_length(text: &str) -> usize {
    text.len()
}

/// Number of Unicode code points in `text`.
pub fn codepoint_count(text: &str) -> usize {
    text.chars().count()
}

/// Byte length of the first `codepoints` UTF-8 sequences in `buf`.
///
/// Only lead bytes are inspected (Unicode 4.0, table 3-6); validation of the
/// continuation bytes is left to [`buffer_to_utf8`]. Returns `None` when the
/// sequences run past the end of `buf`.
pub fn codepoint_byte_length(buf: &[u8], codepoints: usize) -> Option<usize> {
    let mut pos = 0usize;
    for _ in 0..codepoints {
        let lead = *buf.get(pos)?;
        pos += match lead {
            0x00..=0x7f => 1,
            0x80..=0xdf => 2,
            0xe0..=0xef => 3,
            _ => 4,
        };
    }
    (pos <= buf.len()).then_some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_mixed_width_sequences() {
        let text = "aé€😀";
        let bytes = text.as_bytes();
        assert_eq!(codepoint_byte_length(bytes, 0), Some(0));
        assert_eq!(codepoint_byte_length(bytes, 1), Some(1));
        assert_eq!(codepoint_byte_length(bytes, 2), Some(3));
        assert_eq!(codepoint_byte_length(bytes, 3), Some(6));
        assert_eq!(codepoint_byte_length(bytes, 4), Some(10));
    }

    #[test]
    fn sequence_running_past_end_is_none() {
        // Lead byte of a 3-byte sequence with only one continuation byte.
        assert_eq!(codepoint_byte_length(&[0x41, 0xe2, 0x82], 2), None);
        assert_eq!(codepoint_byte_length(b"ab", 3), None);
    }

    #[test]
    fn counts_code_points_not_bytes() {
        assert_eq!(codepoint_count("€uro"), 4);
        assert_eq!(utf8_encoded_length("€uro"), 6);
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(buffer_to_utf8(&[0xc3, 0x28]), Err(TypeError::InvalidUtf8));
        assert_eq!(buffer_to_utf8(&utf8_to_buffer("ok")).unwrap(), "ok");
    }
}
