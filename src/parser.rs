//! PDF object parser.
//!
//! Builds [`Object`] values from the token stream, including indirect references
//! (`N G R`), streams, and whole indirect objects (`N G obj ... endobj`).

use crate::decoders::decode_hex;
use crate::error::Error;
use crate::lexer::{self, token, Token};
use crate::object::{Object, ObjectRef};
use crate::parser_config::ParserOptions;
use nom::IResult;
use std::collections::HashMap;

fn fail<T>(input: &[u8], kind: nom::error::ErrorKind) -> IResult<&[u8], T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

/// Convert a nom failure into a crate error carrying the byte offset within `whole`.
pub fn to_parse_error(whole: &[u8], err: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::ParseError {
            offset: whole.len(),
            reason: "unexpected end of input".to_string(),
        },
        nom::Err::Error(e) | nom::Err::Failure(e) => Error::ParseError {
            offset: whole.len().saturating_sub(e.input.len()),
            reason: format!("{:?}", e.code),
        },
    }
}

/// Decode the escape sequences of a literal string body.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd`, and line continuations. An
/// unknown escape drops the backslash.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        let escaped = raw[i + 1];
        i += 2;
        match escaped {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = (escaped - b'0') as u32;
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            i += 1;
                        },
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            },
            other => out.push(other),
        }
    }

    out
}

/// Parse one direct object using the default nesting limit.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_object_nested(input, ParserOptions::default().max_nesting)
}

/// Parse one direct object, allowing at most `depth_left` levels of array/dictionary nesting.
pub fn parse_object_nested(input: &[u8], depth_left: usize) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;
    match tok {
        Token::Integer(n) => {
            if let Some((after, reference)) = reference_tail(n, rest) {
                return Ok((after, Object::Reference(reference)));
            }
            Ok((rest, Object::Integer(n)))
        },
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(bytes) => Ok((rest, Object::String(bytes))),
            Err(_) => fail(input, nom::error::ErrorKind::HexDigit),
        },
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Null => Ok((rest, Object::Null)),
        Token::ArrayStart => {
            if depth_left == 0 {
                return Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::TooLarge)));
            }
            parse_array_body(rest, depth_left - 1)
        },
        Token::DictStart => {
            if depth_left == 0 {
                return Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::TooLarge)));
            }
            let (rest, dict) = parse_dict_body(rest, depth_left - 1)?;
            match token(rest) {
                Ok((after_kw, Token::StreamStart)) => parse_stream_body(dict, after_kw),
                _ => Ok((rest, Object::Dictionary(dict))),
            }
        },
        _ => fail(input, nom::error::ErrorKind::Alt),
    }
}

/// Lookahead for `G R` after an object number.
fn reference_tail(id: i64, input: &[u8]) -> Option<(&[u8], ObjectRef)> {
    let (after_gen, gen) = match token(input) {
        Ok((rest, Token::Integer(g))) => (rest, g),
        _ => return None,
    };
    match token(after_gen) {
        Ok((after_r, Token::R)) => {
            let id = u32::try_from(id).ok()?;
            let gen = u16::try_from(gen).ok()?;
            Some((after_r, ObjectRef::new(id, gen)))
        },
        _ => None,
    }
}

fn parse_array_body(mut input: &[u8], depth_left: usize) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    loop {
        if let Ok((after, Token::ArrayEnd)) = token(input) {
            return Ok((after, Object::Array(items)));
        }
        let (rest, item) = parse_object_nested(input, depth_left)?;
        items.push(item);
        input = rest;
    }
}

fn parse_dict_body(mut input: &[u8], depth_left: usize) -> IResult<&[u8], HashMap<String, Object>> {
    let mut dict = HashMap::new();
    loop {
        let (rest, tok) = token(input)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_object_nested(rest, depth_left)?;
                dict.insert(key, value);
                input = rest;
            },
            _ => return fail(input, nom::error::ErrorKind::Tag),
        }
    }
}

/// Read stream data after the `stream` keyword.
///
/// A direct `/Length` is trusted when `endstream` follows it; an indirect or wrong
/// length falls back to searching for `endstream`.
fn parse_stream_body(dict: HashMap<String, Object>, input: &[u8]) -> IResult<&[u8], Object> {
    let data_start = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(len) = dict.get("Length").and_then(|l| l.as_integer()) {
        if let Ok(len) = usize::try_from(len) {
            if len <= data_start.len() {
                if let Ok((after, Token::StreamEnd)) = token(&data_start[len..]) {
                    let data = bytes::Bytes::copy_from_slice(&data_start[..len]);
                    return Ok((after, Object::Stream { dict, data }));
                }
            }
        }
    }

    let Some(end) = find_subslice(data_start, b"endstream") else {
        return fail(input, nom::error::ErrorKind::Eof);
    };
    let mut data = &data_start[..end];
    if let Some(trimmed) = data.strip_suffix(b"\r\n") {
        data = trimmed;
    } else if let Some(trimmed) = data.strip_suffix(b"\n").or_else(|| data.strip_suffix(b"\r")) {
        data = trimmed;
    }
    log::debug!("stream /Length unusable, recovered {} bytes by scanning for endstream", data.len());

    let after = &data_start[end + b"endstream".len()..];
    Ok((after, Object::Stream {
        dict,
        data: bytes::Bytes::copy_from_slice(data),
    }))
}

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse an indirect object definition `N G obj <object> endobj`.
pub fn parse_indirect_object<'a>(
    input: &'a [u8],
    options: &ParserOptions,
) -> IResult<&'a [u8], (ObjectRef, Object)> {
    let (rest, id) = match token(input)? {
        (rest, Token::Integer(id)) if id >= 0 && id <= u32::MAX as i64 => (rest, id as u32),
        _ => return fail(input, nom::error::ErrorKind::Digit),
    };
    let (rest, gen) = match token(rest)? {
        (rest, Token::Integer(gen)) if (0..=u16::MAX as i64).contains(&gen) => (rest, gen as u16),
        _ => return fail(input, nom::error::ErrorKind::Digit),
    };
    let rest = match token(rest)? {
        (rest, Token::ObjStart) => rest,
        _ => return fail(input, nom::error::ErrorKind::Tag),
    };

    let (rest, object) = parse_object_nested(rest, options.max_nesting)?;
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ if options.allow_missing_endobj => rest,
        _ => return fail(rest, nom::error::ErrorKind::Tag),
    };

    Ok((rest, (ObjectRef::new(id, gen), object)))
}

/// Parse a classic `trailer << ... >>` dictionary.
pub fn parse_trailer(input: &[u8]) -> IResult<&[u8], HashMap<String, Object>> {
    let (rest, _) = lexer::keyword("trailer")(input)?;
    match parse_object(rest)? {
        (rest, Object::Dictionary(dict)) => Ok((rest, dict)),
        _ => fail(input, nom::error::ErrorKind::Verify),
    }
}
