use std::collections::HashMap;

use crate::{
    error::{RenderError, RenderResult},
    objects::{Dictionary, Object},
};

pub use operator::{Operator, OperatorParser, TextItem};

mod operator;

const FORM_FEED: u8 = b'\x0C';
const BACKSPACE: u8 = b'\x08';

/// An inline image captured between `BI` and `EI`. The dictionary uses the
/// abbreviated inline-image keys; `data` is the raw bytes between `ID` and
/// `EI`, uninterpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq)]
pub enum ContentToken {
    Object(Object),
    /// An operator tag, e.g. `re` or `W*`. Whether it names a known
    /// operator is the parser's business; unknown tags degrade to no-ops.
    Operator(String),
    InlineImage(InlineImage),
}

/// A single-pass tokenizer over PDF content-stream syntax.
///
/// Content streams never contain indirect references or nested streams, so
/// this is a strict subset of the full object grammar: numbers, names,
/// strings, arrays, dictionaries, booleans, null, operators, and the
/// inline-image sandwich.
pub struct ContentLexer<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> Iterator for ContentLexer<'a> {
    type Item = RenderResult<ContentToken>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();

        match self.peek_byte() {
            Some(b'\'' | b'"' | b'a'..=b'z' | b'A'..=b'Z') => Some(self.lex_operator()),
            Some(..) => Some(self.lex_object().map(ContentToken::Object)),
            None => None,
        }
    }
}

impl<'a> ContentLexer<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.buffer.get(self.cursor).copied()
    }

    fn peek_byte_offset(&self, offset: usize) -> Option<u8> {
        self.buffer.get(self.cursor + offset).copied()
    }

    fn next_byte(&mut self) -> Option<u8> {
        self.buffer.get(self.cursor).copied().map(|b| {
            self.cursor += 1;
            b
        })
    }

    /// Whitespace chars are NUL, HT, LF, FF, CR and space. `%` starts a
    /// comment running to the end of the line, treated as whitespace.
    fn is_whitespace(b: u8) -> bool {
        matches!(b, b'\0' | 0x9 | b'\n' | FORM_FEED | b'\r' | b' ')
    }

    fn is_delimiter(b: u8) -> bool {
        matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
    }

    fn is_regular(b: u8) -> bool {
        !Self::is_whitespace(b) && !Self::is_delimiter(b)
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek_byte() {
            if Self::is_whitespace(b) {
                self.next_byte();
            } else if b == b'%' {
                while !matches!(self.peek_byte(), Some(b'\r' | b'\n') | None) {
                    self.next_byte();
                }
            } else {
                break;
            }
        }
    }

    fn lex_operator(&mut self) -> RenderResult<ContentToken> {
        let start = self.cursor;

        while let Some(b) = self.peek_byte() {
            // terminal characters that end operators but are not alphanumeric
            if b == b'*' || b == b'\'' || b == b'"' {
                self.next_byte();
                break;
            }

            if !b.is_ascii_alphanumeric() {
                break;
            }

            self.next_byte();
        }

        let tag = std::str::from_utf8(&self.buffer[start..self.cursor])
            .map_err(|_| RenderError::MalformedStream {
                reason: "non-ascii operator",
            })?
            .to_owned();

        match tag.as_str() {
            "true" => return Ok(ContentToken::Object(Object::True)),
            "false" => return Ok(ContentToken::Object(Object::False)),
            "null" => return Ok(ContentToken::Object(Object::Null)),
            "BI" => return self.lex_inline_image(),
            _ => {}
        }

        Ok(ContentToken::Operator(tag))
    }

    fn lex_object(&mut self) -> RenderResult<Object> {
        self.skip_whitespace();

        match self.peek_byte() {
            Some(b'+' | b'-' | b'.' | b'0'..=b'9') => self.lex_number(),
            Some(b'/') => Ok(Object::Name(self.lex_name()?)),
            Some(b'(') => Ok(Object::String(self.lex_literal_string()?)),
            Some(b'<') => match self.peek_byte_offset(1) {
                Some(b'<') => Ok(Object::Dictionary(self.lex_dict()?)),
                _ => Ok(Object::String(self.lex_hex_string()?)),
            },
            Some(b'[') => self.lex_array(),
            Some(..) | None => Err(RenderError::MalformedStream {
                reason: "unexpected byte at object start",
            }),
        }
    }

    fn lex_number(&mut self) -> RenderResult<Object> {
        let start = self.cursor;

        if matches!(self.peek_byte(), Some(b'+' | b'-')) {
            self.next_byte();
        }

        let mut is_real = false;

        while let Some(b) = self.peek_byte() {
            match b {
                b'0'..=b'9' => {
                    self.next_byte();
                }
                b'.' if !is_real => {
                    is_real = true;
                    self.next_byte();
                }
                _ => break,
            }
        }

        let text = std::str::from_utf8(&self.buffer[start..self.cursor]).unwrap();

        if is_real {
            text.parse::<f32>()
                .map(Object::Real)
                .map_err(|_| RenderError::MalformedStream {
                    reason: "malformed real number",
                })
        } else {
            // integer overflow degrades to a real, as in `2147483648 0 Td`
            match text.parse::<i32>() {
                Ok(i) => Ok(Object::Integer(i)),
                Err(..) => text.parse::<f32>().map(Object::Real).map_err(|_| {
                    RenderError::MalformedStream {
                        reason: "malformed number",
                    }
                }),
            }
        }
    }

    fn lex_name(&mut self) -> RenderResult<String> {
        // leading `/`
        self.next_byte();

        let mut name = String::new();

        while let Some(b) = self.peek_byte() {
            if !Self::is_regular(b) {
                break;
            }

            self.next_byte();

            if b == b'#' {
                let hi = self.hex_digit()?;
                let lo = self.hex_digit()?;

                name.push(((hi << 4) | lo) as char);
            } else {
                name.push(b as char);
            }
        }

        Ok(name)
    }

    fn hex_digit(&mut self) -> RenderResult<u8> {
        match self.next_byte() {
            Some(c @ b'0'..=b'9') => Ok(c - b'0'),
            Some(c @ b'a'..=b'f') => Ok(c - b'a' + 10),
            Some(c @ b'A'..=b'F') => Ok(c - b'A' + 10),
            _ => Err(RenderError::MalformedStream {
                reason: "invalid hex digit",
            }),
        }
    }

    fn lex_literal_string(&mut self) -> RenderResult<Vec<u8>> {
        // leading `(`
        self.next_byte();

        let mut string = Vec::new();
        let mut num_open_parens = 0u32;

        loop {
            let b = self
                .next_byte()
                .ok_or(RenderError::MalformedStream {
                    reason: "unterminated literal string",
                })?;

            match b {
                b')' if num_open_parens == 0 => break,
                b')' => {
                    num_open_parens -= 1;
                    string.push(b')');
                }
                b'(' => {
                    num_open_parens += 1;
                    string.push(b'(');
                }
                b'\\' => match self.next_byte() {
                    Some(b'n') => string.push(b'\n'),
                    Some(b'r') => string.push(b'\r'),
                    Some(b't') => string.push(b'\t'),
                    Some(b'b') => string.push(BACKSPACE),
                    Some(b'f') => string.push(FORM_FEED),
                    Some(b'(') => string.push(b'('),
                    Some(b')') => string.push(b')'),
                    Some(b'\\') => string.push(b'\\'),
                    // line continuation: `\` before EOL elides the newline
                    Some(b'\n') => {}
                    Some(b'\r') => {
                        if self.peek_byte() == Some(b'\n') {
                            self.next_byte();
                        }
                    }
                    // octal escape of 1 to 3 digits
                    Some(c @ b'0'..=b'7') => {
                        let mut n = (c - b'0') as u16;

                        for _ in 0..2 {
                            match self.peek_byte() {
                                Some(d @ b'0'..=b'7') => {
                                    self.next_byte();
                                    n = n * 8 + (d - b'0') as u16;
                                }
                                _ => break,
                            }
                        }

                        string.push(n as u8);
                    }
                    // a backslash before anything else is dropped
                    Some(c) => string.push(c),
                    None => {
                        return Err(RenderError::MalformedStream {
                            reason: "unterminated literal string",
                        })
                    }
                },
                _ => string.push(b),
            }
        }

        Ok(string)
    }

    fn lex_hex_string(&mut self) -> RenderResult<Vec<u8>> {
        // leading `<`
        self.next_byte();

        let mut string = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            let b = self
                .next_byte()
                .ok_or(RenderError::MalformedStream {
                    reason: "unterminated hex string",
                })?;

            let digit = match b {
                b'>' => break,
                c if Self::is_whitespace(c) => continue,
                c @ b'0'..=b'9' => c - b'0',
                c @ b'a'..=b'f' => c - b'a' + 10,
                c @ b'A'..=b'F' => c - b'A' + 10,
                _ => {
                    return Err(RenderError::MalformedStream {
                        reason: "invalid byte in hex string",
                    })
                }
            };

            match pending.take() {
                Some(hi) => string.push((hi << 4) | digit),
                None => pending = Some(digit),
            }
        }

        // an odd number of nibbles behaves as if a 0 followed
        if let Some(hi) = pending {
            string.push(hi << 4);
        }

        Ok(string)
    }

    fn lex_array(&mut self) -> RenderResult<Object> {
        // leading `[`
        self.next_byte();

        let mut arr = Vec::new();

        loop {
            self.skip_whitespace();

            match self.peek_byte() {
                Some(b']') => {
                    self.next_byte();
                    break;
                }
                Some(..) => arr.push(self.lex_object()?),
                None => {
                    return Err(RenderError::MalformedStream {
                        reason: "unterminated array",
                    })
                }
            }
        }

        Ok(Object::Array(arr))
    }

    fn lex_dict(&mut self) -> RenderResult<Dictionary> {
        // leading `<<`
        self.next_byte();
        self.next_byte();

        let mut dict = HashMap::new();

        loop {
            self.skip_whitespace();

            match self.peek_byte() {
                Some(b'>') => {
                    self.next_byte();
                    if self.next_byte() != Some(b'>') {
                        return Err(RenderError::MalformedStream {
                            reason: "unterminated dictionary",
                        });
                    }
                    break;
                }
                Some(b'/') => {
                    let name = self.lex_name()?;
                    let value = self.lex_object()?;
                    dict.insert(name, value);
                }
                Some(..) => {
                    return Err(RenderError::MalformedStream {
                        reason: "dictionary key is not a name",
                    })
                }
                None => {
                    return Err(RenderError::MalformedStream {
                        reason: "unterminated dictionary",
                    })
                }
            }
        }

        Ok(Dictionary::new(dict))
    }

    /// `BI` has been consumed: read key/value pairs up to `ID`, then raw
    /// bytes up to a whitespace-delimited `EI`.
    fn lex_inline_image(&mut self) -> RenderResult<ContentToken> {
        let mut dict = HashMap::new();

        loop {
            self.skip_whitespace();

            match self.peek_byte() {
                Some(b'/') => {
                    let name = self.lex_name()?;
                    let value = self.lex_object()?;
                    dict.insert(name, value);
                }
                Some(b'I') if self.peek_byte_offset(1) == Some(b'D') => {
                    self.next_byte();
                    self.next_byte();
                    break;
                }
                _ => {
                    return Err(RenderError::MalformedStream {
                        reason: "malformed inline image dictionary",
                    })
                }
            }
        }

        // exactly one whitespace byte separates ID from the data
        if self.peek_byte().map_or(false, Self::is_whitespace) {
            self.next_byte();
        }

        let data_start = self.cursor;

        // the data is not tokenized: scan for `EI` preceded by whitespace
        // and followed by whitespace, a delimiter, or end of stream
        loop {
            match self.peek_byte() {
                Some(b'E')
                    if self.peek_byte_offset(1) == Some(b'I')
                        && (self.cursor == data_start
                            || Self::is_whitespace(self.buffer[self.cursor - 1]))
                        && self
                            .peek_byte_offset(2)
                            .map_or(true, |b| !Self::is_regular(b)) =>
                {
                    let data = self.buffer[data_start..(self.cursor.max(data_start + 1) - 1)]
                        .to_vec();
                    self.next_byte();
                    self.next_byte();

                    return Ok(ContentToken::InlineImage(InlineImage {
                        dict: Dictionary::new(dict),
                        data,
                    }));
                }
                Some(..) => {
                    self.next_byte();
                }
                None => {
                    return Err(RenderError::MalformedStream {
                        reason: "inline image missing EI",
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokens(buffer: &[u8]) -> Vec<ContentToken> {
        ContentLexer::new(buffer)
            .collect::<RenderResult<Vec<ContentToken>>>()
            .unwrap()
    }

    fn op(tag: &str) -> ContentToken {
        ContentToken::Operator(tag.to_owned())
    }

    #[test]
    fn rg_operator_is_not_parsed_as_reference() {
        assert_eq!(
            tokens(b"1 1 1 RG"),
            vec![
                ContentToken::Object(Object::Integer(1)),
                ContentToken::Object(Object::Integer(1)),
                ContentToken::Object(Object::Integer(1)),
                op("RG"),
            ]
        );
    }

    #[test]
    fn empty_line() {
        assert_eq!(tokens(b"\n\n  \n\n"), vec![]);
    }

    #[test]
    fn quote_operators() {
        assert_eq!(
            tokens(b"( )'\""),
            vec![
                ContentToken::Object(Object::String(b" ".to_vec())),
                op("'"),
                op("\""),
            ]
        );
    }

    #[test]
    fn no_space_after_star_operator() {
        assert_eq!(tokens(b"b*RG"), vec![op("b*"), op("RG")]);
    }

    #[test]
    fn hex_strings_skip_whitespace_and_pad() {
        assert_eq!(
            tokens(b"<48656C6C6F> < 48 65 6c 6C 6F > <ABC>"),
            vec![
                ContentToken::Object(Object::String(b"Hello".to_vec())),
                ContentToken::Object(Object::String(b"Hello".to_vec())),
                ContentToken::Object(Object::String(vec![0xab, 0xc0])),
            ]
        );
    }

    #[test]
    fn literal_string_escapes() {
        assert_eq!(
            tokens(br"(a\(b\)c\\d\n\101)"),
            vec![ContentToken::Object(Object::String(
                b"a(b)c\\d\nA".to_vec()
            ))]
        );
    }

    #[test]
    fn balanced_parens_do_not_need_escaping() {
        assert_eq!(
            tokens(b"(a (nested) b)"),
            vec![ContentToken::Object(Object::String(
                b"a (nested) b".to_vec()
            ))]
        );
    }

    #[test]
    fn line_continuation_elides_the_newline() {
        assert_eq!(
            tokens(b"(split\\\nline)"),
            vec![ContentToken::Object(Object::String(b"splitline".to_vec()))]
        );
    }

    #[test]
    fn short_octal_escapes() {
        assert_eq!(
            tokens(br"(\0\53)"),
            vec![ContentToken::Object(Object::String(vec![0, 0x2b]))]
        );
    }

    #[test]
    fn unterminated_string_is_malformed() {
        let result: RenderResult<Vec<ContentToken>> = ContentLexer::new(b"(never ends").collect();

        assert!(matches!(
            result,
            Err(RenderError::MalformedStream { .. })
        ));
    }

    #[test]
    fn comments_are_whitespace() {
        assert_eq!(
            tokens(b"1 % a comment\n2 l"),
            vec![
                ContentToken::Object(Object::Integer(1)),
                ContentToken::Object(Object::Integer(2)),
                op("l"),
            ]
        );
    }

    #[test]
    fn dicts_and_arrays_nest() {
        let toks = tokens(b"<< /MC0 << /K [1 2.5 /Three] >> >> BDC");

        match &toks[0] {
            ContentToken::Object(Object::Dictionary(dict)) => {
                assert!(dict.contains_key("MC0"));
            }
            other => panic!("expected dictionary, found {:?}", other),
        }
        assert_eq!(toks[1], op("BDC"));
    }

    #[test]
    fn inline_image_bytes_are_not_tokenized() {
        let toks = tokens(b"BI /W 2 /H 1 /BPC 8 /CS /G ID \x00(\xff EI Q");

        match &toks[0] {
            ContentToken::InlineImage(image) => {
                assert_eq!(image.data, [0x00, b'(', 0xff]);
                assert!(image.dict.contains_key("W"));
            }
            other => panic!("expected inline image, found {:?}", other),
        }
        assert_eq!(toks[1], op("Q"));
    }

    #[test]
    fn negative_and_fractional_numbers() {
        assert_eq!(
            tokens(b"-1.5 +2 .25 -.75 re"),
            vec![
                ContentToken::Object(Object::Real(-1.5)),
                ContentToken::Object(Object::Integer(2)),
                ContentToken::Object(Object::Real(0.25)),
                ContentToken::Object(Object::Real(-0.75)),
                op("re"),
            ]
        );
    }
}
