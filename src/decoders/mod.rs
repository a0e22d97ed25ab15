//! Stream decoders.
//!
//! A signed document only needs its streams decoded when objects are packed into
//! object streams, so the supported set is small:
//! - FlateDecode (zlib/deflate)
//! - ASCIIHexDecode
//!
//! Filters are applied in order and every step is bounded by the decompression limits
//! from [`ParserOptions`].

use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;

mod ascii_hex;
mod flate;

pub use ascii_hex::{decode_hex, AsciiHexDecoder};
pub use flate::FlateDecoder;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as written in the stream dictionary (e.g. "FlateDecode").
    fn name(&self) -> &str;
}

/// Look up the decoder for a filter name, accepting inline-image abbreviations.
fn decoder_for(filter: &str, options: &ParserOptions) -> Result<Box<dyn StreamDecoder>> {
    match filter {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder::with_limit(options.max_decompressed_size))),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        other => Err(Error::UnsupportedFilter(other.to_string())),
    }
}

/// Decode stream data through a filter pipeline.
///
/// # Errors
///
/// Fails on unknown filters, corrupt input, or when the output breaks the
/// decompression ratio or size limits in `options`.
pub fn decode_stream(data: &[u8], filters: &[String], options: &ParserOptions) -> Result<Vec<u8>> {
    let compressed_size = data.len().max(1);
    let mut current = data.to_vec();

    for filter in filters {
        let decoder = decoder_for(filter, options)?;
        current = decoder.decode(&current)?;
        log::debug!("{} produced {} bytes", decoder.name(), current.len());

        let max_ratio = options.max_decompression_ratio as usize;
        if max_ratio > 0 && current.len() / compressed_size > max_ratio {
            return Err(Error::Decode(format!(
                "decompression ratio {}:1 exceeds limit {}:1",
                current.len() / compressed_size,
                max_ratio
            )));
        }
        if options.max_decompressed_size > 0 && current.len() > options.max_decompressed_size {
            return Err(Error::Decode(format!(
                "decompressed size {} bytes exceeds limit {} bytes",
                current.len(),
                options.max_decompressed_size
            )));
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_no_filters_passthrough() {
        let out = decode_stream(b"raw", &[], &ParserOptions::default()).unwrap();
        assert_eq!(out, b"raw");
    }

    #[test]
    fn test_filter_chain() {
        let compressed = zlib(b"1 0 2 5 << >> [ ]");
        let hex: String = compressed.iter().map(|b| format!("{:02X}", b)).collect();
        let filters = vec!["ASCIIHexDecode".to_string(), "FlateDecode".to_string()];
        let out = decode_stream(hex.as_bytes(), &filters, &ParserOptions::default()).unwrap();
        assert_eq!(out, b"1 0 2 5 << >> [ ]");
    }

    #[test]
    fn test_unsupported_filter() {
        let result = decode_stream(b"x", &["DCTDecode".to_string()], &ParserOptions::default());
        assert!(matches!(result, Err(Error::UnsupportedFilter(f)) if f == "DCTDecode"));
    }

    #[test]
    fn test_ratio_limit() {
        let compressed = zlib(&vec![b'0'; 200_000]);
        let options = ParserOptions {
            max_decompression_ratio: 10,
            ..ParserOptions::default()
        };
        let result = decode_stream(&compressed, &["FlateDecode".to_string()], &options);
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
