//! Object stream expansion (PDF 1.5+).
//!
//! Signature dictionaries and form fields written by modern producers frequently
//! live inside `/Type /ObjStm` streams:
//!
//! ```text
//! 12 0 obj
//! << /Type /ObjStm /N 2 /First 9 /Filter /FlateDecode >>
//! stream
//! 5 0 6 18                 % pairs: object number, offset relative to /First
//! << /FT /Sig ... >>       % object 5
//! << /Type /Sig ... >>     % object 6
//! endstream
//! ```

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::{parse_object_nested, to_parse_error};
use crate::parser_config::ParserOptions;

/// Upper bound on `/N`, far beyond anything a real producer writes.
const MAX_OBJECTS_PER_STREAM: i64 = 1_000_000;

/// Decode an object stream and return its objects in stream order.
///
/// # Errors
///
/// Fails when the object is not an `/ObjStm` stream, when `/N` or `/First` are
/// missing or out of range, or when decoding fails. Individual objects that do not
/// parse are skipped with a warning.
pub fn parse_object_stream(stream_obj: &Object, options: &ParserOptions) -> Result<Vec<(u32, Object)>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };

    if let Some(type_name) = dict.get("Type").and_then(|t| t.as_name()) {
        if type_name != "ObjStm" {
            return Err(Error::InvalidPdf(format!("expected /Type /ObjStm, got /Type /{}", type_name)));
        }
    }

    let n = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::InvalidPdf("object stream missing /N entry".to_string()))?;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::InvalidPdf("object stream missing /First entry".to_string()))?;
    if !(0..=MAX_OBJECTS_PER_STREAM).contains(&n) {
        return Err(Error::InvalidPdf(format!("invalid object stream /N value: {}", n)));
    }
    if first < 0 {
        return Err(Error::InvalidPdf(format!("invalid object stream /First value: {}", first)));
    }
    let (n, first) = (n as usize, first as usize);

    let decoded = stream_obj.decode_stream_data(options)?;
    if decoded.len() < first {
        return Err(Error::InvalidPdf(format!(
            "object stream data too short: {} bytes, /First is {}",
            decoded.len(),
            first
        )));
    }

    let header = &decoded[..first];
    let body = &decoded[first..];
    let mut pairs = Vec::with_capacity(n);
    let mut cursor = header;
    for _ in 0..n {
        let (rest, id) = match token(cursor) {
            Ok((rest, Token::Integer(id))) => (rest, id),
            Ok(_) | Err(_) => break,
        };
        let (rest, offset) = match token(rest) {
            Ok((rest, Token::Integer(offset))) => (rest, offset),
            Ok(_) | Err(_) => break,
        };
        cursor = rest;
        if let (Ok(id), Ok(offset)) = (u32::try_from(id), usize::try_from(offset)) {
            pairs.push((id, offset));
        }
    }
    if pairs.len() < n {
        log::warn!("object stream declares {} objects but header lists {}", n, pairs.len());
    }

    let mut objects = Vec::with_capacity(pairs.len());
    for (id, offset) in pairs {
        let Some(slice) = body.get(offset..) else {
            log::warn!("object {} offset {} lies outside the object stream", id, offset);
            continue;
        };
        match parse_object_nested(slice, options.max_nesting) {
            Ok((_, obj)) => objects.push((id, obj)),
            Err(e) => log::warn!("skipping object {} in object stream: {}", id, to_parse_error(slice, e)),
        }
    }

    Ok(objects)
}
