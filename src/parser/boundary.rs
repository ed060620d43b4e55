//! Streaming multipart splitter.
//!
//! Reads a body line by line and yields one [`RawPart`] per boundary-delimited
//! segment. Only the segment being assembled is held in memory. Tolerant of
//! mixed `\n` and `\r\n` line endings and of trailing whitespace on boundary
//! lines.

use std::io::BufRead;

use tracing::trace;

use crate::error::TokenizeError;
use crate::model::part::RawPart;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    InPart,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    Separator,
    Terminator,
    Content,
}

/// Lazy, forward-only iterator over the parts delimited by one boundary.
///
/// The preamble and epilogue are discarded. If the stream ends before the
/// `--boundary--` line, the iterator yields [`TokenizeError::Truncated`]
/// once and then stops; the incomplete trailing segment is dropped.
pub struct BoundaryTokenizer<R> {
    reader: R,
    boundary: String,
    separator: Vec<u8>,
    terminator: Vec<u8>,
    state: State,
    segment: Vec<u8>,
    line_buf: Vec<u8>,
}

impl<R: BufRead> BoundaryTokenizer<R> {
    pub fn new(reader: R, boundary: &str) -> Self {
        let separator = format!("--{boundary}").into_bytes();
        let mut terminator = separator.clone();
        terminator.extend_from_slice(b"--");
        Self {
            reader,
            boundary: boundary.to_string(),
            separator,
            terminator,
            state: State::Preamble,
            segment: Vec::with_capacity(8 * 1024),
            line_buf: Vec::with_capacity(1024),
        }
    }

    fn classify(&self, line: &[u8]) -> Line {
        let content = trim_line_ending(line);
        // transport padding after the boundary is allowed (RFC 2046 §5.1.1)
        let end = content
            .iter()
            .rposition(|&b| b != b' ' && b != b'\t')
            .map_or(0, |i| i + 1);
        let content = &content[..end];
        if content == self.separator.as_slice() {
            Line::Separator
        } else if content == self.terminator.as_slice() {
            Line::Terminator
        } else {
            Line::Content
        }
    }

    /// Hand out the current segment, minus the line ending owned by the boundary.
    fn take_part(&mut self) -> RawPart {
        let mut segment = std::mem::take(&mut self.segment);
        if segment.last() == Some(&b'\n') {
            segment.pop();
            if segment.last() == Some(&b'\r') {
                segment.pop();
            }
        }
        RawPart::from_segment(segment)
    }
}

impl<R: BufRead> Iterator for BoundaryTokenizer<R> {
    type Item = Result<RawPart, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state == State::Finished {
                return None;
            }

            self.line_buf.clear();
            let read = match self.reader.read_until(b'\n', &mut self.line_buf) {
                Ok(n) => n,
                Err(e) => {
                    self.state = State::Finished;
                    return Some(Err(TokenizeError::Io(e)));
                }
            };
            if read == 0 {
                self.state = State::Finished;
                self.segment.clear();
                return Some(Err(TokenizeError::Truncated {
                    boundary: self.boundary.clone(),
                }));
            }

            match (self.state, self.classify(&self.line_buf)) {
                (State::Preamble, Line::Separator) => {
                    trace!(boundary = %self.boundary, "first separator found");
                    self.state = State::InPart;
                }
                (State::Preamble, Line::Terminator) => {
                    self.state = State::Finished;
                    return None;
                }
                (State::Preamble, Line::Content) => {}
                (State::InPart, Line::Separator) => return Some(Ok(self.take_part())),
                (State::InPart, Line::Terminator) => {
                    self.state = State::Finished;
                    return Some(Ok(self.take_part()));
                }
                (State::InPart, Line::Content) => self.segment.extend_from_slice(&self.line_buf),
                (State::Finished, _) => return None,
            }
        }
    }
}

/// Strip a trailing `\n` or `\r\n`.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
