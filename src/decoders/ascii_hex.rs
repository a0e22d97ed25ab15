//! ASCIIHexDecode and hex-string decoding.
//!
//! Whitespace is ignored, `>` ends the data, and an odd trailing digit is padded with
//! an implicit '0'. The same routine decodes `<...>` hex strings, which is how
//! signature `/Contents` values are stored.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        decode_hex(input)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

/// Decode hexadecimal digits into bytes.
pub fn decode_hex(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() / 2);
    let mut high: Option<u8> = None;

    for &c in input {
        if c == b'>' {
            break;
        }
        if c.is_ascii_whitespace() || c == 0 {
            continue;
        }
        let nibble = hex_value(c)
            .ok_or_else(|| Error::Decode(format!("invalid hex digit '{}'", c as char)))?;
        match high.take() {
            Some(h) => output.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }
    if let Some(h) = high {
        output.push(h << 4);
    }

    Ok(output)
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_with_whitespace() {
        assert_eq!(decode_hex(b"30 82\n01 0a").unwrap(), vec![0x30, 0x82, 0x01, 0x0A]);
    }

    #[test]
    fn test_odd_length_padding() {
        assert_eq!(decode_hex(b"ABC").unwrap(), vec![0xAB, 0xC0]);
    }

    #[test]
    fn test_stops_at_eod_marker() {
        assert_eq!(AsciiHexDecoder.decode(b"4869>ffff").unwrap(), b"Hi");
    }

    #[test]
    fn test_invalid_digit() {
        assert!(decode_hex(b"0G").is_err());
    }
}
