//! Best-effort parsing of truncated JSON fragments.
//!
//! While function-call arguments are streaming in, the accumulated buffer
//! is usually a prefix of a JSON document. [`parse_partial`] produces the
//! best prefix-consistent value for such input: unterminated strings,
//! objects, and arrays are completed speculatively, truncated
//! `true`/`false`/`null` literals are completed, a dangling key with no
//! value is dropped, and a trailing incomplete escape sequence is
//! discarded. Input that is not a prefix of any JSON document yields
//! `None`, as does a dangling number with no complete digit prefix
//! (e.g. a lone `-`); callers treat `None` as "keep the previous value".

use serde_json::{Map, Number, Value};

/// Parses a possibly-truncated JSON fragment into the best-effort value.
///
/// Never panics. Trailing input after a complete top-level value is
/// ignored; strict validation belongs to the finalization path.
pub(crate) fn parse_partial(input: &str) -> Option<Value> {
    let mut parser = Parser { input, pos: 0 };
    parser.skip_ws();
    if parser.at_end() {
        return None;
    }
    parser.parse_value()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if matches!(c, ' ' | '\t' | '\n' | '\r') {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn parse_value(&mut self) -> Option<Value> {
        match self.peek()? {
            '{' => self.parse_object(),
            '[' => self.parse_array(),
            '"' => {
                let (s, _) = self.parse_string()?;
                Some(Value::String(s))
            }
            't' => self.parse_literal("true", Value::Bool(true)),
            'f' => self.parse_literal("false", Value::Bool(false)),
            'n' => self.parse_literal("null", Value::Null),
            c if c == '-' || c.is_ascii_digit() => self.parse_number(),
            _ => None,
        }
    }

    fn parse_object(&mut self) -> Option<Value> {
        self.bump();
        let mut map = Map::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Some(Value::Object(map));
        }
        loop {
            self.skip_ws();
            let Some(c) = self.peek() else { break };
            if c != '"' {
                return None;
            }
            let (key, terminated) = self.parse_string()?;
            if !terminated {
                // A truncated key has no value yet; drop it.
                break;
            }
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(':') => {
                    self.bump();
                }
                Some(_) => return None,
            }
            self.skip_ws();
            if self.at_end() {
                break;
            }
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.bump();
                    self.skip_ws();
                    if self.at_end() {
                        break;
                    }
                }
                Some('}') => {
                    self.bump();
                    break;
                }
                Some(_) => return None,
            }
        }
        Some(Value::Object(map))
    }

    fn parse_array(&mut self) -> Option<Value> {
        self.bump();
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(']') {
            self.bump();
            return Some(Value::Array(items));
        }
        loop {
            self.skip_ws();
            if self.at_end() {
                break;
            }
            let value = self.parse_value()?;
            items.push(value);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.bump();
                    self.skip_ws();
                    if self.at_end() {
                        break;
                    }
                }
                Some(']') => {
                    self.bump();
                    break;
                }
                Some(_) => return None,
            }
        }
        Some(Value::Array(items))
    }

    /// Parses a string, returning its content and whether the closing
    /// quote was seen. Truncated input yields the content so far.
    fn parse_string(&mut self) -> Option<(String, bool)> {
        self.bump();
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Some((out, false));
            };
            match c {
                '"' => return Some((out, true)),
                '\\' => {
                    let Some(esc) = self.bump() else {
                        // Incomplete escape at the end of input.
                        return Some((out, false));
                    };
                    match esc {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{0008}'),
                        'f' => out.push('\u{000C}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => match self.parse_unicode_escape(&mut out) {
                            UnicodeEscape::Ok => {}
                            UnicodeEscape::Truncated => {
                                return Some((out, false));
                            }
                            UnicodeEscape::Invalid => return None,
                        },
                        _ => return None,
                    }
                }
                _ => out.push(c),
            }
        }
    }

    fn parse_unicode_escape(&mut self, out: &mut String) -> UnicodeEscape {
        let Some(high) = self.parse_hex4() else {
            return if self.input.len() - self.pos < 4 {
                // Fewer than four hex digits remain; cut mid-escape.
                self.pos = self.input.len();
                UnicodeEscape::Truncated
            } else {
                UnicodeEscape::Invalid
            };
        };
        if !(0xD800..=0xDBFF).contains(&high) {
            match char::from_u32(u32::from(high)) {
                Some(c) => out.push(c),
                // A lone low surrogate.
                None => out.push('\u{FFFD}'),
            }
            return UnicodeEscape::Ok;
        }

        // A high surrogate should pair with a following `\uXXXX`.
        let rest = &self.input[self.pos..];
        let truncated_pair = rest.is_empty()
            || rest == "\\"
            || (rest.starts_with("\\u") && rest.len() < 6);
        if truncated_pair {
            // The pair was cut off mid-stream.
            self.pos = self.input.len();
            return UnicodeEscape::Truncated;
        }
        if let Some(tail) = rest.strip_prefix("\\u") {
            if let Some(low) = parse_hex4_str(tail) {
                if (0xDC00..=0xDFFF).contains(&low) {
                    self.pos += 6;
                    let code = 0x10000
                        + ((u32::from(high) - 0xD800) << 10)
                        + (u32::from(low) - 0xDC00);
                    match char::from_u32(code) {
                        Some(c) => out.push(c),
                        None => out.push('\u{FFFD}'),
                    }
                    return UnicodeEscape::Ok;
                }
            }
        }
        // Unpaired high surrogate followed by other content.
        out.push('\u{FFFD}');
        UnicodeEscape::Ok
    }

    fn parse_hex4(&mut self) -> Option<u16> {
        let rest = &self.input[self.pos..];
        if rest.len() < 4 {
            return None;
        }
        let code = parse_hex4_str(rest)?;
        self.pos += 4;
        Some(code)
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Option<Value> {
        let rest = &self.input[self.pos..];
        if rest.len() >= word.len() {
            if !rest.starts_with(word) {
                return None;
            }
            self.pos += word.len();
            Some(value)
        } else if word.starts_with(rest) {
            // A truncated literal; complete it speculatively.
            self.pos = self.input.len();
            Some(value)
        } else {
            None
        }
    }

    fn parse_number(&mut self) -> Option<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit()
                || matches!(c, '-' | '+' | '.' | 'e' | 'E')
            {
                self.bump();
            } else {
                break;
            }
        }
        // Retreat to the longest prefix that is a complete number, so a
        // fragment cut inside an exponent or after a decimal point still
        // yields a value.
        let mut text = &self.input[start..self.pos];
        while !text.is_empty() {
            if let Ok(number) = serde_json::from_str::<Number>(text) {
                return Some(Value::Number(number));
            }
            text = &text[..text.len() - 1];
        }
        None
    }
}

enum UnicodeEscape {
    Ok,
    Truncated,
    Invalid,
}

fn parse_hex4_str(s: &str) -> Option<u16> {
    let hex = s.get(..4)?;
    u16::from_str_radix(hex, 16).ok()
}
