//! `Content-Type` and `Content-Disposition` value parsing (RFC 2045, RFC 2183, RFC 2231).

use std::collections::{BTreeMap, HashMap};

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::ClassifyError;
use crate::parser::header::decode_charset;

/// Classified `Content-Type` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeInfo {
    media_type: String,
    parameters: HashMap<String, String>,
}

impl ContentTypeInfo {
    /// Lowercase `type/subtype`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Parameter value by (case-insensitive) name, unquoted and unescaped.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type.starts_with("multipart/")
    }

    /// The `boundary` parameter, if present and non-empty.
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary").filter(|b| !b.is_empty())
    }
}

/// Classified `Content-Disposition` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    disposition: String,
    parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Lowercase disposition type (`inline`, `attachment`, ...).
    pub fn disposition(&self) -> &str {
        &self.disposition
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn filename(&self) -> Option<&str> {
        self.parameter("filename")
    }
}

/// Parse a `Content-Type` value into media type and parameters.
///
/// ```
/// use mimesplit::parser::content_type::parse_content_type;
///
/// let ct = parse_content_type("Multipart/Mixed; boundary=\"a b\"").unwrap();
/// assert_eq!(ct.media_type(), "multipart/mixed");
/// assert_eq!(ct.boundary(), Some("a b"));
/// ```
pub fn parse_content_type(value: &str) -> Result<ContentTypeInfo, ClassifyError> {
    let (head, parameters) = parse_header_value(value)?;
    let (primary, sub) = head
        .split_once('/')
        .ok_or_else(|| ClassifyError::MissingSlash(head.clone()))?;
    if !is_token(primary.trim()) || !is_token(sub.trim()) {
        return Err(ClassifyError::InvalidMediaType(head));
    }
    Ok(ContentTypeInfo {
        media_type: format!("{}/{}", primary.trim(), sub.trim()),
        parameters,
    })
}

/// Parse a `Content-Disposition` value.
pub fn parse_content_disposition(value: &str) -> Result<ContentDisposition, ClassifyError> {
    let (disposition, parameters) = parse_header_value(value)?;
    if !is_token(&disposition) {
        return Err(ClassifyError::InvalidMediaType(disposition));
    }
    Ok(ContentDisposition {
        disposition,
        parameters,
    })
}

/// Split `value` into its lowercased leading token and its parameter map.
fn parse_header_value(value: &str) -> Result<(String, HashMap<String, String>), ClassifyError> {
    let segments = split_top_level(value)?;
    let mut segments = segments.into_iter();
    let head = segments
        .next()
        .map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if head.is_empty() {
        return Err(ClassifyError::Empty);
    }

    let mut plain: HashMap<String, String> = HashMap::new();
    let mut extended: Vec<(String, String)> = Vec::new();

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, raw_value) = segment
            .split_once('=')
            .ok_or_else(|| ClassifyError::InvalidParameter(segment.to_string()))?;
        let key = key.trim().to_ascii_lowercase();
        if !is_token(&key) {
            return Err(ClassifyError::InvalidParameter(segment.to_string()));
        }
        let value = parse_parameter_value(raw_value.trim())
            .ok_or_else(|| ClassifyError::InvalidParameter(segment.to_string()))?;

        if key.contains('*') {
            if extended.iter().any(|(k, _)| *k == key) {
                return Err(ClassifyError::DuplicateParameter(key));
            }
            extended.push((key, value));
        } else if plain.insert(key.clone(), value).is_some() {
            return Err(ClassifyError::DuplicateParameter(key));
        }
    }

    if !extended.is_empty() {
        merge_rfc2231(&mut plain, extended);
    }
    Ok((head, plain))
}

/// Split on `;` outside of quoted strings.
fn split_top_level(value: &str) -> Result<Vec<&str>, ClassifyError> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_quotes {
        return Err(ClassifyError::UnterminatedQuote);
    }
    segments.push(&value[start..]);
    Ok(segments)
}

/// A quoted string (with `\` escapes) or a bare value.
///
/// Bare values accept any visible byte except `"` and `;`, which is looser
/// than an RFC 2045 token: unquoted boundaries such as `----=_Part_1` are
/// common in the wild.
fn parse_parameter_value(raw: &str) -> Option<String> {
    if let Some(inner) = raw.strip_prefix('"') {
        let mut value = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => value.push(chars.next()?),
                '"' => {
                    // nothing may follow the closing quote
                    return chars.as_str().trim().is_empty().then_some(value);
                }
                c => value.push(c),
            }
        }
        return None;
    }
    let valid = !raw.is_empty()
        && raw
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && c != '"' && c != ';');
    valid.then(|| raw.to_string())
}

/// Fold RFC 2231 extended (`name*`) and continued (`name*0`, `name*1*`) parameters
/// into `params`. An extended value replaces a plain one of the same name.
fn merge_rfc2231(params: &mut HashMap<String, String>, extended: Vec<(String, String)>) {
    // name -> (section -> (is_encoded, value))
    let mut sections: HashMap<String, BTreeMap<u32, (bool, String)>> = HashMap::new();

    for (key, value) in extended {
        let (name, rest) = match key.split_once('*') {
            Some(parts) => parts,
            None => continue,
        };
        if rest.is_empty() {
            // name*=charset'lang'value
            match decode_extended_value(&value) {
                Some(decoded) => {
                    params.insert(name.to_string(), decoded);
                }
                None => debug!(parameter = name, "Undecodable RFC 2231 value, ignored"),
            }
            continue;
        }
        let (index, encoded) = match rest.strip_suffix('*') {
            Some(index) => (index, true),
            None => (rest, false),
        };
        if let Ok(index) = index.parse::<u32>() {
            sections
                .entry(name.to_string())
                .or_default()
                .insert(index, (encoded, value));
        }
    }

    for (name, pieces) in sections {
        if !pieces.contains_key(&0) {
            continue;
        }
        let mut charset: Option<String> = None;
        let mut bytes: Vec<u8> = Vec::new();
        for (expected, (index, (encoded, value))) in pieces.iter().enumerate() {
            if *index as usize != expected {
                break;
            }
            if !*encoded {
                bytes.extend_from_slice(value.as_bytes());
                continue;
            }
            let mut data = value.as_str();
            if *index == 0 {
                if let Some((cs, _lang, rest)) = split_extended(value) {
                    charset = Some(cs.to_string());
                    data = rest;
                }
            }
            bytes.extend(percent_decode_str(data));
        }
        let decoded = match charset.as_deref() {
            Some(cs) if !cs.is_empty() => decode_charset(cs, &bytes),
            _ => String::from_utf8_lossy(&bytes).into_owned(),
        };
        params.insert(name, decoded);
    }
}

fn split_extended(value: &str) -> Option<(&str, &str, &str)> {
    let (charset, rest) = value.split_once('\'')?;
    let (lang, data) = rest.split_once('\'')?;
    Some((charset, lang, data))
}

fn decode_extended_value(value: &str) -> Option<String> {
    let (charset, _lang, data) = split_extended(value)?;
    if charset.is_empty() {
        return None;
    }
    let bytes: Vec<u8> = percent_decode_str(data).collect();
    Some(decode_charset(charset, &bytes))
}

/// Checks if a character is valid in an RFC 2045 token.
#[inline]
fn is_token_char(c: u8) -> bool {
    matches!(c,
        b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' |
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'{' | b'|' | b'}' | b'~'
    )
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}
