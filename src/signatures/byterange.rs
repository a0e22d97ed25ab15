//! Signature `/ByteRange` handling.
//!
//! A `/ByteRange` is a flat array of `offset length` pairs selecting the signed bytes:
//! `[offset1 length1 offset2 length2 ...]`. For a regular signature the pairs are
//! `[0 a b c]`, where `a..b` holds the `/Contents` hex string and `b + c` is the end
//! of the revision that the signature closed.

use crate::error::{Error, Result};
use crate::object::Object;

/// Parsed `/ByteRange` spans as `(offset, length)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    spans: Vec<(usize, usize)>,
}

impl ByteRange {
    /// Build from explicit pairs.
    pub fn new(spans: Vec<(usize, usize)>) -> Result<Self> {
        if spans.is_empty() {
            return Err(Error::InvalidPdf("ByteRange is empty".to_string()));
        }
        let mut previous_end = 0;
        for &(offset, length) in &spans {
            if offset < previous_end {
                return Err(Error::InvalidPdf(format!(
                    "ByteRange spans overlap or are out of order at offset {}",
                    offset
                )));
            }
            previous_end = offset
                .checked_add(length)
                .ok_or_else(|| Error::InvalidPdf("ByteRange span overflows".to_string()))?;
        }
        Ok(Self { spans })
    }

    /// Parse a `/ByteRange` array.
    pub fn from_object(obj: &Object) -> Result<Self> {
        let items = obj.as_array().ok_or_else(|| Error::InvalidObjectType {
            expected: "Array".to_string(),
            found: obj.type_name().to_string(),
        })?;
        if items.len() % 2 != 0 {
            return Err(Error::InvalidPdf(format!("ByteRange has odd length {}", items.len())));
        }
        let numbers = items
            .iter()
            .map(|item| {
                item.as_integer()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| Error::InvalidPdf(format!("invalid ByteRange entry: {:?}", item)))
            })
            .collect::<Result<Vec<usize>>>()?;
        Self::new(numbers.chunks(2).map(|pair| (pair[0], pair[1])).collect())
    }

    /// The `(offset, length)` pairs.
    pub fn spans(&self) -> &[(usize, usize)] {
        &self.spans
    }

    /// First byte after the last signed span.
    pub fn covered_end(&self) -> usize {
        self.spans
            .last()
            .map(|&(offset, length)| offset + length)
            .unwrap_or(0)
    }

    /// Check that every span lies within a file of `file_len` bytes.
    pub fn validate(&self, file_len: usize) -> Result<()> {
        if self.covered_end() > file_len {
            return Err(Error::InvalidPdf(format!(
                "ByteRange ends at {} beyond file size {}",
                self.covered_end(),
                file_len
            )));
        }
        Ok(())
    }

    /// Concatenate the signed spans of `data`.
    pub fn extract_signed_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.validate(data.len())?;
        let total = self.spans.iter().map(|&(_, length)| length).sum();
        let mut signed = Vec::with_capacity(total);
        for &(offset, length) in &self.spans {
            signed.extend_from_slice(&data[offset..offset + length]);
        }
        Ok(signed)
    }

    /// Whether the range accounts for every byte of `data`.
    ///
    /// The first span must start at 0, the last must end at the file length, and each
    /// gap between spans must be exactly one hex string (the signature value).
    pub fn covers_whole(&self, data: &[u8]) -> bool {
        if self.spans[0].0 != 0 || self.covered_end() != data.len() {
            return false;
        }
        self.spans.windows(2).all(|pair| {
            let gap_start = pair[0].0 + pair[0].1;
            let gap_end = pair[1].0;
            data.get(gap_start..gap_end).map(is_hex_string).unwrap_or(false)
        })
    }
}

fn is_hex_string(bytes: &[u8]) -> bool {
    match bytes {
        [b'<', inner @ .., b'>'] => inner
            .iter()
            .all(|b| b.is_ascii_hexdigit() || crate::lexer::is_whitespace(*b)),
        _ => false,
    }
}
