//! Header block parsing: folding, multi-valued fields, and RFC 2047 encoded-words.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::warn;

use crate::parser::transfer::hex_byte;

/// One header field: the name as first seen and every value in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    name: String,
    values: Vec<String>,
}

impl HeaderField {
    /// Field name with the casing of its first occurrence.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All values, in the order they appeared.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Parsed header block of one MIME part (or of the outer message).
///
/// Lookups are case-insensitive. A field that occurs several times keeps
/// every value instead of the last one winning. Lines without a colon that
/// are not continuations are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeader {
    fields: HashMap<String, HeaderField>,
    // lowercase keys in first-seen order
    order: Vec<String>,
}

impl PartHeader {
    /// Parse a raw header block (everything before the blank line).
    pub fn parse(raw: &[u8]) -> Self {
        let text = decode_header_bytes(raw);
        Self::from_lines(text.lines())
    }

    /// Build a header from already split lines.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut header = Self::default();
        let mut current: Option<(String, String)> = None;

        for line in lines {
            let line = line.trim_end_matches(['\r', '\n']);
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    let rest = line.trim_start_matches([' ', '\t']).trim_end();
                    if !rest.is_empty() {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(rest);
                    }
                }
            } else if let Some(colon_pos) = line.find(':') {
                if let Some((name, value)) = current.take() {
                    header.push(name, value);
                }
                let name = line[..colon_pos].trim();
                if name.is_empty() {
                    continue;
                }
                let value = line[colon_pos + 1..].trim().to_string();
                current = Some((name.to_string(), value));
            }
        }

        if let Some((name, value)) = current {
            header.push(name, value);
        }
        header
    }

    fn push(&mut self, name: String, value: String) {
        let key = name.to_ascii_lowercase();
        match self.fields.get_mut(&key) {
            Some(field) => field.values.push(value),
            None => {
                self.order.push(key.clone());
                self.fields.insert(
                    key,
                    HeaderField {
                        name,
                        values: vec![value],
                    },
                );
            }
        }
    }

    /// First value of `name`, or `""` when the field is absent.
    pub fn first_value(&self, name: &str) -> &str {
        self.fields
            .get(&name.to_ascii_lowercase())
            .and_then(|f| f.values.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Every value of `name`, empty when the field is absent.
    pub fn all_values(&self, name: &str) -> &[String] {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(|f| f.values.as_slice())
            .unwrap_or(&[])
    }

    /// Fields in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.order.iter().filter_map(|key| self.fields.get(key))
    }

    /// Number of distinct field names.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Header bytes as text: UTF-8 when valid, otherwise Windows-1252, which
/// maps every byte.
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => encoding_rs::WINDOWS_1252
            .decode_without_bom_handling(bytes)
            .0
            .into_owned(),
    }
}

/// Replace RFC 2047 encoded-words in a header value with their text.
///
/// Used for display only. Anything that does not parse as an encoded-word
/// is kept literally, and whitespace that only separates two encoded-words
/// is dropped.
///
/// ```
/// use mimesplit::parser::header::decode_encoded_words;
///
/// assert_eq!(decode_encoded_words("=?UTF-8?Q?caf=C3=A9?= au lait"), "café au lait");
/// ```
pub fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (literal, candidate) = rest.split_at(start);
        match EncodedWord::parse(candidate) {
            Some(word) => {
                if !(after_word && literal.trim().is_empty()) {
                    out.push_str(literal);
                }
                out.push_str(&decode_charset(word.charset, &word.bytes));
                rest = &candidate[word.len..];
                after_word = true;
            }
            None => {
                out.push_str(literal);
                out.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }
    out.push_str(rest);
    out
}

/// One `=?charset?B|Q?text?=` token, already transfer-decoded.
struct EncodedWord<'a> {
    charset: &'a str,
    bytes: Vec<u8>,
    /// Length of the whole token in the source.
    len: usize,
}

impl<'a> EncodedWord<'a> {
    /// Parse the encoded-word at the start of `s`.
    fn parse(s: &'a str) -> Option<Self> {
        let mut fields = s.strip_prefix("=?")?.splitn(3, '?');
        let charset = fields.next().filter(|c| !c.is_empty())?;
        let encoding = fields.next()?;
        let tail = fields.next()?;
        let text_len = tail.find("?=")?;
        let text = &tail[..text_len];

        let bytes = if encoding.eq_ignore_ascii_case("b") {
            STANDARD.decode(text.trim()).ok()?
        } else if encoding.eq_ignore_ascii_case("q") {
            decode_q(text)
        } else {
            return None;
        };

        Some(Self {
            charset,
            bytes,
            len: "=?".len() + charset.len() + 1 + encoding.len() + 1 + text_len + "?=".len(),
        })
    }
}

/// Q encoding: `_` is a space, `=XX` a byte, a stray `=` stays as is.
fn decode_q(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = match bytes[i] {
            b'=' => bytes
                .get(i + 1..i + 3)
                .and_then(|pair| hex_byte(pair[0], pair[1])),
            _ => None,
        };
        match (bytes[i], escaped) {
            (_, Some(byte)) => {
                out.push(byte);
                i += 3;
            }
            (b'_', None) => {
                out.push(b' ');
                i += 1;
            }
            (other, None) => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

/// Text of `bytes` in the charset named by `label`.
///
/// An RFC 2231 language suffix (`utf-8*en`) is ignored. Unknown labels
/// decode as lossy UTF-8.
pub(crate) fn decode_charset(label: &str, bytes: &[u8]) -> String {
    let label = label.split_once('*').map_or(label, |(charset, _)| charset).trim();
    let encoding = encoding_rs::Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
        warn!(charset = label, "Unknown charset, decoding as UTF-8");
        encoding_rs::UTF_8
    });
    encoding.decode_without_bom_handling(bytes).0.into_owned()
}
