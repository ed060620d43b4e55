//! Raw part records produced by the boundary tokenizer.

/// One part between two boundary lines: its header block and its body.
///
/// The header block keeps its line endings; the blank line that ends it
/// belongs to neither field. The body excludes the line ending that
/// precedes the next boundary line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPart {
    pub header: Vec<u8>,
    pub body: Vec<u8>,
}

impl RawPart {
    /// Split a segment at its first blank line.
    ///
    /// A segment without a blank line is all header with an empty body.
    pub fn from_segment(segment: Vec<u8>) -> Self {
        let mut pos = 0;
        while pos < segment.len() {
            let end = match segment[pos..].iter().position(|&b| b == b'\n') {
                Some(i) => pos + i + 1,
                None => segment.len(),
            };
            let line = &segment[pos..end];
            if line == b"\n" || line == b"\r\n" {
                let mut header = segment;
                let body = header.split_off(end);
                header.truncate(pos);
                return Self { header, body };
            }
            pos = end;
        }
        Self {
            header: segment,
            body: Vec::new(),
        }
    }
}
