//! Reading the outer header block of an RFC 5322 message.
//!
//! The header is consumed from a buffered reader up to the first blank line,
//! leaving the reader positioned at the first body byte so the body can be
//! streamed straight into the multipart splitter.

use std::io::BufRead;

use crate::parser::header::{decode_encoded_words, PartHeader};

/// Read the message header block from `reader`.
///
/// A UTF-8 BOM and a leading MBOX `From ` separator line are skipped.
pub fn read_message_header<R: BufRead>(reader: &mut R) -> std::io::Result<PartHeader> {
    let mut raw: Vec<u8> = Vec::with_capacity(8 * 1024);
    let mut line_buf: Vec<u8> = Vec::with_capacity(1024);
    let mut first_line = true;

    loop {
        line_buf.clear();
        if reader.read_until(b'\n', &mut line_buf)? == 0 {
            break; // EOF: header only, empty body
        }
        if first_line {
            first_line = false;
            let line = line_buf.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&line_buf[..]);
            if line.starts_with(b"From ") {
                continue;
            }
        }
        if line_buf == b"\n" || line_buf == b"\r\n" {
            break;
        }
        raw.extend_from_slice(&line_buf);
    }

    Ok(PartHeader::parse(&raw))
}

/// Display-ready summary of the main message headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MessageSummary {
    pub from: String,
    pub to: String,
    pub date: String,
    pub subject: String,
    pub content_type: String,
}

impl MessageSummary {
    /// Pull the main fields out of `header`, decoding RFC 2047 words.
    pub fn from_header(header: &PartHeader) -> Self {
        Self {
            from: decode_encoded_words(header.first_value("from")),
            to: decode_encoded_words(header.first_value("to")),
            date: header.first_value("date").to_string(),
            subject: decode_encoded_words(header.first_value("subject")),
            content_type: header.first_value("content-type").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_reader_left_at_body() {
        let mut input: &[u8] = b"Subject: Hi\r\nContent-Type: multipart/mixed;\r\n boundary=x\r\n\r\n--x\r\n";
        let header = read_message_header(&mut input).unwrap();
        assert_eq!(header.first_value("subject"), "Hi");
        assert_eq!(header.first_value("content-type"), "multipart/mixed; boundary=x");
        let mut rest = String::new();
        input.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "--x\r\n");
    }

    #[test]
    fn test_skips_mbox_from_line_and_bom() {
        let mut input: &[u8] =
            b"\xEF\xBB\xBFFrom user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        let header = read_message_header(&mut input).unwrap();
        assert_eq!(header.len(), 1);
        assert_eq!(header.first_value("subject"), "Test");
        assert_eq!(input, b"Body\n");
    }

    #[test]
    fn test_header_only_message() {
        let mut input: &[u8] = b"Subject: no body";
        let header = read_message_header(&mut input).unwrap();
        assert_eq!(header.first_value("subject"), "no body");
        assert!(input.is_empty());
    }

    #[test]
    fn test_summary_decodes_encoded_words() {
        let header = PartHeader::parse(
            b"From: =?UTF-8?B?Sm9zw6k=?= <jose@example.com>\nSubject: =?ISO-8859-1?Q?caf=E9?=\nDate: Thu, 04 Jan 2024 10:00:00 +0000\n",
        );
        let summary = MessageSummary::from_header(&header);
        assert_eq!(summary.from, "José <jose@example.com>");
        assert_eq!(summary.subject, "café");
        assert_eq!(summary.date, "Thu, 04 Jan 2024 10:00:00 +0000");
        assert_eq!(summary.content_type, "");
    }
}
