//! Content-Transfer-Encoding decoding (RFC 2045 §6).

use std::borrow::Cow;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::DecodeError;

/// Recognized transfer encodings. Anything else is carried as `Other`
/// and passed through untouched, like the identity encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
    QuotedPrintable,
    SevenBit,
    EightBit,
    Binary,
    Other(String),
}

impl TransferEncoding {
    /// Normalize a `Content-Transfer-Encoding` header value.
    ///
    /// An absent (empty) value means `7bit`.
    pub fn from_header(value: &str) -> Self {
        let token = value.trim().to_ascii_uppercase();
        match token.as_str() {
            "BASE64" => Self::Base64,
            "QUOTED-PRINTABLE" => Self::QuotedPrintable,
            "" | "7BIT" => Self::SevenBit,
            "8BIT" => Self::EightBit,
            "BINARY" => Self::Binary,
            _ => Self::Other(token),
        }
    }

    /// Reverse the encoding. Identity encodings borrow the input.
    pub fn decode<'a>(&self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>, DecodeError> {
        match self {
            Self::Base64 => decode_base64(raw).map(Cow::Owned),
            Self::QuotedPrintable => decode_quoted_printable(raw).map(Cow::Owned),
            Self::SevenBit | Self::EightBit | Self::Binary | Self::Other(_) => {
                Ok(Cow::Borrowed(raw))
            }
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64 => f.write_str("BASE64"),
            Self::QuotedPrintable => f.write_str("QUOTED-PRINTABLE"),
            Self::SevenBit => f.write_str("7BIT"),
            Self::EightBit => f.write_str("8BIT"),
            Self::Binary => f.write_str("BINARY"),
            Self::Other(token) => f.write_str(token),
        }
    }
}

/// Decode a base64 body. Line breaks are ignored; any other byte outside the
/// standard alphabet, or bad padding, is an error.
pub fn decode_base64(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|&b| b != b'\r' && b != b'\n')
        .collect();
    Ok(STANDARD.decode(compact)?)
}

const HEX_DECODE: [i8; 256] = {
    let mut t = [-1i8; 256];
    let mut i = 0u8;
    while i < 10 {
        t[(b'0' + i) as usize] = i as i8;
        i += 1;
    }
    let mut i = 0u8;
    while i < 6 {
        t[(b'A' + i) as usize] = (10 + i) as i8;
        t[(b'a' + i) as usize] = (10 + i) as i8;
        i += 1;
    }
    t
};

/// The byte spelled by two hex digits, either case.
pub(crate) fn hex_byte(hi: u8, lo: u8) -> Option<u8> {
    let (hi, lo) = (HEX_DECODE[hi as usize], HEX_DECODE[lo as usize]);
    (hi >= 0 && lo >= 0).then(|| ((hi as u8) << 4) | lo as u8)
}

/// Decode a quoted-printable body.
///
/// Trailing spaces and tabs on each line are dropped, `=` at end of line is
/// a soft break, hard line endings are kept as they are. `=` followed by
/// anything but two hex digits is an error.
pub fn decode_quoted_printable(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut line_start = 0;

    while line_start < raw.len() {
        let (line_end, next) = match raw[line_start..].iter().position(|&b| b == b'\n') {
            Some(i) => {
                let lf = line_start + i;
                let end = if lf > line_start && raw[lf - 1] == b'\r' { lf - 1 } else { lf };
                (end, lf + 1)
            }
            None => (raw.len(), raw.len()),
        };
        let ending = &raw[line_end..next];

        let mut content_end = line_end;
        while content_end > line_start && matches!(raw[content_end - 1], b' ' | b'\t') {
            content_end -= 1;
        }
        let soft_break = content_end > line_start && raw[content_end - 1] == b'=';
        if soft_break {
            content_end -= 1;
        }

        let mut i = line_start;
        while i < content_end {
            let b = raw[i];
            if b != b'=' {
                out.push(b);
                i += 1;
                continue;
            }
            let byte = raw[i + 1..content_end]
                .get(..2)
                .and_then(|pair| hex_byte(pair[0], pair[1]))
                .ok_or(DecodeError::QuotedPrintable { offset: i })?;
            out.push(byte);
            i += 3;
        }

        if !soft_break {
            out.extend_from_slice(ending);
        }
        line_start = next;
    }
    Ok(out)
}
