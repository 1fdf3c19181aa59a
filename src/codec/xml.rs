//! XML codec for LRSN lines.
//!
//! LRSN uses a strict subset of XML: one element per line, attributes only,
//! no text content. Both quote styles are accepted on input; output always
//! uses double quotes with a space before the closing `/>`, matching the
//! transmitter's own formatting.
//!
//! # Example
//!
//! ```
//! use lrsn_client::codec::XmlCodec;
//!
//! let msg = XmlCodec::decode(br#"<LoginAck ret="0" />"#).unwrap();
//! assert_eq!(msg.tag(), "LoginAck");
//! assert_eq!(msg.attr("ret"), Some("0"));
//!
//! let line = XmlCodec::encode_line("Login", &[("services", "NetPage;Heartbeat")]);
//! assert_eq!(&line[..], b"<Login services=\"NetPage;Heartbeat\" />\n");
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{LrsnError, Result};
use crate::protocol::Message;

/// Codec between wire lines and [`Message`]s.
pub struct XmlCodec;

impl XmlCodec {
    /// Decode one line (terminator already removed) into a message.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for anything that is not a single well-formed
    /// attribute-only element.
    pub fn decode(line: &[u8]) -> Result<Message> {
        let text = std::str::from_utf8(line)
            .map_err(|e| LrsnError::Protocol(format!("Line is not valid UTF-8: {}", e)))?;

        Parser::new(text).parse().map_err(|reason| {
            LrsnError::Protocol(format!("Malformed message {:?}: {}", text, reason))
        })
    }

    /// Encode an element without the line terminator.
    ///
    /// Attributes are written in the given order.
    pub fn encode_element(tag: &str, attrs: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(tag.len() + 8 + attrs.len() * 16);
        out.push('<');
        out.push_str(tag);
        for (name, value) in attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_into(value, &mut out);
            out.push('"');
        }
        out.push_str(" />");
        out
    }

    /// Encode an element as a complete wire line, newline included.
    pub fn encode_line(tag: &str, attrs: &[(&str, &str)]) -> Bytes {
        let mut out = Self::encode_element(tag, attrs);
        out.push('\n');
        Bytes::from(out)
    }
}

/// Escape an attribute value. Control whitespace becomes a character
/// reference so the value can never break the line.
fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
}

/// Resolve entity and character references in an attribute value.
fn unescape(raw: &str) -> std::result::Result<String, String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp + 1..];

        let semi = rest
            .find(';')
            .ok_or_else(|| "unterminated entity reference".to_string())?;
        let entity = &rest[..semi];
        rest = &rest[semi + 1..];

        let c = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| format!("unknown entity '&{};'", entity))?
            }
        };
        out.push(c);
    }
    out.push_str(rest);

    Ok(out)
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-' | '.')
}

/// Cursor over a single element.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.trim(),
            pos: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) -> bool {
        let before = self.pos;
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.pos > before
    }

    fn expect(&mut self, token: &str) -> std::result::Result<(), String> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(format!("expected '{}' at offset {}", token, self.pos))
        }
    }

    fn name(&mut self) -> std::result::Result<&'a str, String> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_name_start(c) => self.pos += c.len_utf8(),
            _ => return Err(format!("expected a name at offset {}", start)),
        }
        while let Some(c) = self.peek() {
            if !is_name_char(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        Ok(&self.input[start..self.pos])
    }

    fn quoted_value(&mut self) -> std::result::Result<String, String> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(format!("expected a quoted value at offset {}", self.pos)),
        };
        self.pos += 1;

        let len = self
            .rest()
            .find(quote)
            .ok_or_else(|| "unterminated attribute value".to_string())?;
        let raw = &self.rest()[..len];
        if raw.contains('<') {
            return Err("'<' inside attribute value".to_string());
        }
        self.pos += len + 1;

        unescape(raw)
    }

    fn parse(mut self) -> std::result::Result<Message, String> {
        if self.input.is_empty() {
            return Err("empty line".to_string());
        }

        self.expect("<")?;
        let tag = self.name()?;
        let mut attributes = BTreeMap::new();

        loop {
            let spaced = self.skip_whitespace();

            if self.rest().starts_with("/>") {
                self.pos += 2;
                break;
            }

            if self.rest().starts_with('>') {
                // Paired form with no content: <Tag ...></Tag>
                self.pos += 1;
                self.skip_whitespace();
                self.expect("</")?;
                let closing = self.name()?;
                if closing != tag {
                    return Err(format!("closing tag '{}' does not match '{}'", closing, tag));
                }
                self.skip_whitespace();
                self.expect(">")?;
                break;
            }

            if self.peek().is_none() {
                return Err("unexpected end of element".to_string());
            }
            if !spaced {
                return Err(format!("expected whitespace at offset {}", self.pos));
            }

            let name = self.name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let value = self.quoted_value()?;

            if attributes.insert(name.to_string(), value).is_some() {
                return Err(format!("duplicate attribute '{}'", name));
            }
        }

        if !self.rest().is_empty() {
            return Err(format!("trailing data after element: {:?}", self.rest()));
        }

        Ok(Message::from_parts(tag, attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_greeting() {
        let line = br#"<LRSN services="NetPage:2.0;Config:1.0;Heartbeat:1.0" device="T7470" swver="8.3.0.13" serno="20384" login="none" />"#;

        let msg = XmlCodec::decode(line).unwrap();

        assert_eq!(msg.tag(), "LRSN");
        assert_eq!(msg.attr("device"), Some("T7470"));
        assert_eq!(msg.attr("swver"), Some("8.3.0.13"));
        assert_eq!(msg.attr("login"), Some("none"));
        assert_eq!(msg.attributes().count(), 5);
    }

    #[test]
    fn test_decode_without_space_before_close() {
        let msg = XmlCodec::decode(br#"<Heartbeat interval="10"/>"#).unwrap();
        assert_eq!(msg.attr("interval"), Some("10"));
    }

    #[test]
    fn test_decode_single_quotes_and_loose_spacing() {
        let msg = XmlCodec::decode(b"  <LoginAck  ret = '3'  />  ").unwrap();
        assert_eq!(msg.attr("ret"), Some("3"));
    }

    #[test]
    fn test_decode_no_attributes() {
        let msg = XmlCodec::decode(b"<Ping />").unwrap();
        assert_eq!(msg.tag(), "Ping");
        assert_eq!(msg.attributes().count(), 0);
    }

    #[test]
    fn test_decode_paired_empty_element() {
        let msg = XmlCodec::decode(br#"<LoginAck ret="0"></LoginAck>"#).unwrap();
        assert_eq!(msg.attr("ret"), Some("0"));
    }

    #[test]
    fn test_decode_unescapes_entities() {
        let msg =
            XmlCodec::decode(br#"<PageRequestStatus message="a &amp; b &lt;c&gt; &#65;&#x42; &apos;" />"#)
                .unwrap();
        assert_eq!(msg.attr("message"), Some("a & b <c> AB '"));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases: &[&[u8]] = &[
            b"",
            b"garbage",
            b"<Heartbeat interval=\"10\"",
            b"<Heartbeat interval=10 />",
            b"<Heartbeat interval=\"10 />",
            b"<Heartbeat interval=\"1\"interval2=\"2\" />",
            b"<Heartbeat interval=\"1\" interval=\"2\" />",
            b"<A></B>",
            b"<A /> trailing",
            b"<1Tag />",
            b"<A x=\"&bogus;\" />",
            b"<A x=\"&amp\" />",
            b"<A x=\"<\" />",
            b"\xff\xfe",
        ];

        for case in cases {
            let result = XmlCodec::decode(case);
            assert!(
                matches!(result, Err(LrsnError::Protocol(_))),
                "expected protocol error for {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_encode_element_order_preserved() {
        let line = XmlCodec::encode_element("PageRequest", &[("id", "1"), ("pager", "0;5"), ("message", "hi")]);
        assert_eq!(line, r#"<PageRequest id="1" pager="0;5" message="hi" />"#);
    }

    #[test]
    fn test_encode_line_has_single_terminator() {
        let line = XmlCodec::encode_line("Login", &[("services", "NetPage;Heartbeat")]);
        assert!(line.ends_with(b" />\n"));
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_escaped_value_decodes_back() {
        let value = "Line one\nLine \"two\" & <three>\ttab";
        let line = XmlCodec::encode_element("PageRequest", &[("message", value)]);

        assert!(!line.contains('\n'));
        let msg = XmlCodec::decode(line.as_bytes()).unwrap();
        assert_eq!(msg.attr("message"), Some(value));
    }
}
