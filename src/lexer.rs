//! PDF tokenizer.
//!
//! Splits the body of a PDF into tokens: numbers, literal and hexadecimal strings,
//! names, keywords and delimiters. Whitespace (space, \t, \r, \n, \0, \f) and
//! comments (`%` to end of line) between tokens are skipped.
//!
//! Escape sequences in literal strings are left for the parser; `#XX` escapes in
//! names are decoded here.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{map, opt, recognize, value},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

/// Token types recognized by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number
    Integer(i64),
    /// Real number
    Real(f64),
    /// Raw bytes between `(` and `)`, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Raw digits between `<` and `>`
    HexString(&'a [u8]),
    /// Name without the leading `/`, `#XX` escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` in `10 0 R`
    R,
}

/// PDF whitespace (ISO 32000-1:2008, Table 1).
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}')
}

/// Skip any run of whitespace and comments. Never fails.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        let (rest, _) = take_while(is_whitespace)(remaining)?;
        remaining = rest;
        match preceded(char::<&[u8], nom::error::Error<&[u8]>>('%'), take_till(|c| c == b'\r' || c == b'\n'))(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) => return Ok((remaining, ())),
        }
    }
}

fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
    )))(input)?;

    // A number immediately followed by a regular character is not a number (e.g. "1x")
    if rest.first().is_some_and(|&c| !is_whitespace(c) && !is_delimiter(c)) {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)));
    }

    let text = std::str::from_utf8(text)
        .map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)))?;
    let token = if text.contains('.') {
        text.parse::<f64>().map(Token::Real).ok()
    } else {
        text.parse::<i64>().map(Token::Integer).ok()
    };
    token
        .map(|t| (rest, t))
        .ok_or_else(|| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)))
}

fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    delimited(
        char('<'),
        map(take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)), Token::HexString),
        char('>'),
    )(input)
}

/// Decode `#XX` escapes in a name. Malformed escapes are kept verbatim.
///
/// ```
/// # use pdf_sigcheck::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"Adobe#2EPPKLite"), "Adobe.PPKLite");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            let hex = raw.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok());
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(|c: u8| !is_whitespace(c) && !is_delimiter(c)), |raw| {
            Token::Name(decode_name_escapes(raw))
        }),
    )(input)
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, token) = alt((
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::False, tag(b"false")),
        value(Token::True, tag(b"true")),
        value(Token::Null, tag(b"null")),
        value(Token::ObjEnd, tag(b"endobj")),
        value(Token::StreamEnd, tag(b"endstream")),
        value(Token::StreamStart, tag(b"stream")),
        value(Token::ObjStart, tag(b"obj")),
        value(Token::R, tag(b"R")),
    ))(input)?;

    // Alphabetic keywords must end at a token boundary ("Rect" is not "R")
    let alphabetic = !matches!(token, Token::DictStart | Token::DictEnd | Token::ArrayStart | Token::ArrayEnd);
    if alphabetic && rest.first().is_some_and(|&c| !is_whitespace(c) && !is_delimiter(c)) {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    Ok((rest, token))
}

/// Parse one token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((parse_keyword, parse_name, parse_number, parse_literal_string, parse_hex_string))(input)
}

/// Consume a bare keyword such as `trailer` or `xref` that is not part of the token set.
pub fn keyword<'a>(word: &'static str) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], &'a [u8]> {
    move |input| {
        let (input, _) = skip_ws(input)?;
        take_while1(|c: u8| c.is_ascii_alphabetic())(input).and_then(|(rest, found)| {
            if found == word.as_bytes() {
                Ok((rest, found))
            } else {
                Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(mut input: &[u8]) -> Vec<Token<'_>> {
        let mut out = Vec::new();
        while let Ok((rest, tok)) = token(input) {
            out.push(tok);
            input = rest;
        }
        out
    }

    #[test]
    fn test_signature_dictionary_tokens() {
        let tokens = all_tokens(b"<< /Type /Sig /ByteRange [0 120 4242 77] /Contents <3082AB> >>");
        assert_eq!(
            tokens,
            vec![
                Token::DictStart,
                Token::Name("Type".into()),
                Token::Name("Sig".into()),
                Token::Name("ByteRange".into()),
                Token::ArrayStart,
                Token::Integer(0),
                Token::Integer(120),
                Token::Integer(4242),
                Token::Integer(77),
                Token::ArrayEnd,
                Token::Name("Contents".into()),
                Token::HexString(b"3082AB"),
                Token::DictEnd,
            ]
        );
    }

    #[test]
    fn test_reference_tokens() {
        assert_eq!(all_tokens(b"12 0 R"), vec![Token::Integer(12), Token::Integer(0), Token::R]);
    }

    #[test]
    fn test_keyword_boundary() {
        let (_, tok) = token(b"/Rect").unwrap();
        assert_eq!(tok, Token::Name("Rect".into()));
        assert!(parse_keyword(b"Rect").is_err());
        assert!(parse_keyword(b"objects").is_err());
        assert_eq!(parse_keyword(b"obj\n").unwrap().1, Token::ObjStart);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(token(b"-17 ").unwrap().1, Token::Integer(-17));
        assert_eq!(token(b"3.5]").unwrap().1, Token::Real(3.5));
        assert_eq!(token(b".25").unwrap().1, Token::Real(0.25));
        assert!(token(b"12abc").is_err());
    }

    #[test]
    fn test_literal_string_nesting_and_escapes() {
        let (rest, tok) = token(b"(a (nested\\) one)) tail").unwrap();
        assert_eq!(tok, Token::LiteralString(b"a (nested\\) one)"));
        assert_eq!(rest, b" tail");
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = all_tokens(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj");
        assert_eq!(tokens, vec![Token::Integer(1), Token::Integer(0), Token::ObjStart]);
    }

    #[test]
    fn test_name_escapes() {
        assert_eq!(token(b"/A#20B").unwrap().1, Token::Name("A B".into()));
        assert_eq!(decode_name_escapes(b"X#zz"), "X#zz");
    }

    #[test]
    fn test_bare_keyword() {
        let (rest, _) = keyword("trailer")(b"\ntrailer\n<<").unwrap();
        assert_eq!(rest, b"\n<<");
        assert!(keyword("trailer")(b"startxref").is_err());
    }
}
