//! Channel data decoders.
//!
//! `ACQ:SOUR<n>:DATA?` answers in one of two encodings, depending on
//! `ACQ:DATA:FORMAT`:
//!
//! - ASCII: `{v0,v1,...}` on a single line
//! - BIN: packed big-endian IEEE-754 `f32`, no header, length implied by size
//!   (the arbitrary-block header is removed by the transport)
//!
//! Both decoders are channel-agnostic; the caller attaches channel context to
//! any error.

use crate::error::DecodeError;

const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

/// Decode a delimited ASCII reply such as `{1.0,2.0,3.0}`.
pub fn decode_ascii(raw: &str) -> Result<Vec<f64>, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::EmptyReply);
    }
    let body = trimmed.trim_matches(|c: char| c == '{' || c == '}' || c.is_whitespace());

    let tokens: Vec<&str> = body
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(DecodeError::NoNumericData);
    }

    tokens
        .into_iter()
        .map(|token| {
            token.parse::<f64>().map_err(|_| DecodeError::Parse {
                token: token.to_string(),
            })
        })
        .collect()
}

/// Decode packed big-endian `f32` samples.
///
/// A trailing remainder of 1-3 bytes is dropped silently.
pub fn decode_binary(raw: &[u8]) -> Result<Vec<f64>, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::EmptyReply);
    }
    let remainder = raw.len() % ELEMENT_SIZE;
    if remainder != 0 {
        tracing::debug!("Dropping {} trailing bytes of binary reply", remainder);
    }

    let samples: Vec<f64> = raw
        .chunks_exact(ELEMENT_SIZE)
        .map(|chunk| f64::from(f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect();
    if samples.is_empty() {
        return Err(DecodeError::NoNumericData);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_braced_list() {
        assert_eq!(decode_ascii("{1.0,2.0,3.0}").unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn ascii_tolerates_whitespace_and_line_endings() {
        let values = decode_ascii("  {-0.5, 1e-3 ,2}\r\n").unwrap();
        assert_eq!(values, vec![-0.5, 0.001, 2.0]);
    }

    #[test]
    fn ascii_without_braces() {
        assert_eq!(decode_ascii("4,5").unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn ascii_empty_reply() {
        assert_eq!(decode_ascii(""), Err(DecodeError::EmptyReply));
        assert_eq!(decode_ascii(" \r\n"), Err(DecodeError::EmptyReply));
    }

    #[test]
    fn ascii_no_numeric_data() {
        assert_eq!(decode_ascii("{,,}"), Err(DecodeError::NoNumericData));
        assert_eq!(decode_ascii("{}"), Err(DecodeError::NoNumericData));
    }

    #[test]
    fn ascii_parse_error_names_token() {
        assert_eq!(
            decode_ascii("{1.0,ERR,3.0}"),
            Err(DecodeError::Parse {
                token: "ERR".into()
            })
        );
    }

    #[test]
    fn binary_single_element() {
        assert_eq!(decode_binary(&[0x3F, 0x80, 0x00, 0x00]).unwrap(), vec![1.0]);
    }

    #[test]
    fn binary_drops_trailing_remainder() {
        let raw = [0xC0, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03];
        assert_eq!(decode_binary(&raw).unwrap(), vec![-2.0]);
    }

    #[test]
    fn binary_multiple_elements() {
        let mut raw = Vec::new();
        for v in [0.5f32, -0.25, 100.0] {
            raw.extend_from_slice(&v.to_be_bytes());
        }
        assert_eq!(decode_binary(&raw).unwrap(), vec![0.5, -0.25, 100.0]);
    }

    #[test]
    fn binary_short_buffer() {
        assert_eq!(decode_binary(&[0x3F, 0x80, 0x00]), Err(DecodeError::NoNumericData));
        assert_eq!(decode_binary(&[]), Err(DecodeError::EmptyReply));
    }
}
