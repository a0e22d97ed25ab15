//! FlateDecode (zlib/deflate) implementation.
//!
//! Uses flate2. Output is capped at the configured size so a hostile stream cannot
//! exhaust memory before the ratio check in `decode_stream` runs.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter implementation.
pub struct FlateDecoder {
    /// Maximum number of output bytes, 0 for unlimited
    limit: usize,
}

impl FlateDecoder {
    /// Decoder without an output cap.
    pub fn new() -> Self {
        Self { limit: 0 }
    }

    /// Decoder that stops after `limit` bytes (plus one, so the overflow is visible).
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }

    fn read_capped<R: Read>(&self, reader: R, output: &mut Vec<u8>) -> std::io::Result<usize> {
        if self.limit == 0 {
            let mut reader = reader;
            reader.read_to_end(output)
        } else {
            reader.take(self.limit as u64 + 1).read_to_end(output)
        }
    }
}

impl Default for FlateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let zlib_err = match self.read_capped(ZlibDecoder::new(input), &mut output) {
            Ok(_) => return Ok(output),
            Err(e) => e,
        };

        // Keep whatever was inflated before a corrupt tail
        if !output.is_empty() {
            log::warn!(
                "FlateDecode partial recovery: extracted {} bytes before corruption: {}",
                output.len(),
                zlib_err
            );
            return Ok(output);
        }

        // Some producers write raw deflate without the zlib wrapper
        log::info!("Zlib decode failed, trying raw deflate");
        output.clear();
        match self.read_capped(DeflateDecoder::new(input), &mut output) {
            Ok(_) => Ok(output),
            Err(_) if !output.is_empty() => {
                log::warn!("Raw deflate partial recovery: {} bytes", output.len());
                Ok(output)
            },
            Err(e) => Err(Error::Decode(format!("FlateDecode failed: {} ({})", zlib_err, e))),
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
