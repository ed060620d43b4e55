//! Recursive multipart descent.
//!
//! Walks a multipart body depth-first. Every multipart part with a usable
//! boundary is split again one level deeper; every other part is a leaf that
//! is transfer-decoded, named and handed to a [`PartSink`]. Failures stay
//! local: a bad leaf or a truncated branch is reported and the walk goes on
//! with the next sibling.

use std::io::BufRead;

use tracing::{debug, info, warn};

use crate::config::{ExtractConfig, MissingBoundary};
use crate::error::{MimeError, Result, TokenizeError};
use crate::export::namer::FileNamer;
use crate::export::sink::PartSink;
use crate::model::event::{Emission, FailureKind, Report};
use crate::model::part::RawPart;
use crate::parser::boundary::BoundaryTokenizer;
use crate::parser::content_type::{parse_content_type, ContentTypeInfo};
use crate::parser::header::PartHeader;
use crate::parser::transfer::TransferEncoding;

/// Default maximum nesting depth (to prevent stack overflow on adversarial input).
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Traversal settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Deepest level still split; the message's own parts are level 1.
    pub max_depth: usize,
    pub missing_boundary: MissingBoundary,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            missing_boundary: MissingBoundary::Leaf,
        }
    }
}

impl From<&ExtractConfig> for DecodeOptions {
    fn from(config: &ExtractConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            missing_boundary: config.missing_boundary,
        }
    }
}

/// Check the message-level `Content-Type` and return its boundary.
///
/// This is the only check whose failure aborts a run: nothing can be split
/// without a multipart type and a boundary.
pub fn top_level_boundary(content_type: &str) -> Result<String> {
    if content_type.trim().is_empty() {
        return Err(MimeError::MissingContentType);
    }
    let info = parse_content_type(content_type).map_err(|source| MimeError::Unclassifiable {
        value: content_type.to_string(),
        source,
    })?;
    if !info.is_multipart() {
        return Err(MimeError::NotMultipart(info.media_type().to_string()));
    }
    info.boundary()
        .map(str::to_string)
        .ok_or(MimeError::MissingBoundary)
}

/// Split a message body given the message's raw `Content-Type` value.
///
/// Fails before touching `body` or `sink` when the content type is missing,
/// unparsable, not multipart, or lacks a boundary.
pub fn decode_message<R: BufRead>(
    content_type: &str,
    body: R,
    sink: &mut dyn PartSink,
    options: &DecodeOptions,
) -> Result<Report> {
    let boundary = top_level_boundary(content_type)?;
    Ok(decode(body, &boundary, sink, options))
}

/// Split a multipart body on `boundary`, recursing into nested multiparts.
///
/// Never fails as a whole: per-part and per-branch problems are reported as
/// events in the returned [`Report`].
pub fn decode<R: BufRead>(
    body: R,
    boundary: &str,
    sink: &mut dyn PartSink,
    options: &DecodeOptions,
) -> Report {
    let mut descender = Descender {
        options: *options,
        namer: FileNamer::new(),
        sink,
        report: Report::default(),
    };
    descender.descend(body, boundary, 1);
    descender.report
}

struct Descender<'s> {
    options: DecodeOptions,
    namer: FileNamer,
    sink: &'s mut dyn PartSink,
    report: Report,
}

impl Descender<'_> {
    fn descend<R: BufRead>(&mut self, body: R, boundary: &str, depth: usize) {
        if depth > self.options.max_depth {
            warn!(
                depth,
                max_depth = self.options.max_depth,
                boundary,
                "Nesting too deep, branch skipped"
            );
            self.report.push(Emission::PartFailed {
                kind: FailureKind::DepthExceeded,
                reason: format!(
                    "multipart '{boundary}' at depth {depth} exceeds the limit of {}",
                    self.options.max_depth
                ),
                depth,
            });
            return;
        }

        debug!(depth, boundary, ">>> entering multipart level");

        for item in BoundaryTokenizer::new(body, boundary) {
            match item {
                Ok(part) => self.visit(part, boundary, depth),
                Err(TokenizeError::Truncated { boundary }) => {
                    warn!(depth, boundary = %boundary, "Missing terminal boundary, branch truncated");
                    self.report
                        .push(Emission::BranchTruncated { boundary, depth });
                }
                Err(TokenizeError::Io(e)) => {
                    warn!(depth, boundary, error = %e, "Read error, branch abandoned");
                    self.report.push(Emission::PartFailed {
                        kind: FailureKind::Read,
                        reason: e.to_string(),
                        depth,
                    });
                }
            }
        }

        debug!(depth, boundary, "<<< leaving multipart level");
    }

    fn visit(&mut self, part: RawPart, boundary: &str, depth: usize) {
        let header = PartHeader::parse(&part.header);
        if header.is_empty() {
            debug!(depth, "part without header fields");
        }
        for field in header.iter() {
            debug!(depth, name = field.name(), values = ?field.values(), "part header");
        }

        let content_type = match parse_content_type(header.first_value("content-type")) {
            Ok(ct) => Some(ct),
            Err(e) => {
                debug!(depth, error = %e, "Unclassifiable Content-Type, handled as leaf");
                None
            }
        };

        if let Some(ct) = content_type.as_ref().filter(|ct| ct.is_multipart()) {
            match ct.boundary() {
                Some(inner) => {
                    self.descend(part.body.as_slice(), inner, depth + 1);
                    return;
                }
                None if self.options.missing_boundary == MissingBoundary::Fail => {
                    warn!(depth, media_type = ct.media_type(), "Multipart part without boundary");
                    self.report.push(Emission::PartFailed {
                        kind: FailureKind::MissingBoundary,
                        reason: format!("{} part has no boundary parameter", ct.media_type()),
                        depth,
                    });
                    return;
                }
                None => {
                    debug!(depth, media_type = ct.media_type(), "Multipart without boundary, handled as leaf");
                }
            }
        }

        self.emit_leaf(&header, content_type.as_ref(), &part.body, boundary, depth);
    }

    fn emit_leaf(
        &mut self,
        header: &PartHeader,
        content_type: Option<&ContentTypeInfo>,
        body: &[u8],
        radix: &str,
        depth: usize,
    ) {
        let encoding = TransferEncoding::from_header(header.first_value("content-transfer-encoding"));
        let decoded = match encoding.decode(body) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(depth, encoding = %encoding, error = %e, "Failed to decode part");
                self.report.push(Emission::PartFailed {
                    kind: FailureKind::Decode,
                    reason: format!("{encoding}: {e}"),
                    depth,
                });
                return;
            }
        };

        let name = self.namer.name(header, radix);
        match self.sink.write_part(&name, &decoded) {
            Ok(name) => {
                info!(
                    name = %name,
                    bytes = decoded.len(),
                    media_type = content_type.map(ContentTypeInfo::media_type).unwrap_or("-"),
                    "Wrote part"
                );
                self.report.push(Emission::PartWritten {
                    name,
                    byte_length: decoded.len() as u64,
                    depth,
                });
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to write part");
                self.report.push(Emission::PartFailed {
                    kind: FailureKind::Write,
                    reason: e.to_string(),
                    depth,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sink::MemorySink;

    fn run(body: &str, boundary: &str) -> (Report, MemorySink) {
        let mut sink = MemorySink::new();
        let report = decode(body.as_bytes(), boundary, &mut sink, &DecodeOptions::default());
        (report, sink)
    }

    #[test]
    fn test_flat_parts_in_order() {
        let body = "--b\r\nContent-Type: text/plain\r\n\r\none\r\n--b\r\nContent-Type: text/plain\r\n\r\ntwo\r\n--b\r\n\r\nthree\r\n--b--\r\n";
        let (report, sink) = run(body, "b");
        assert_eq!(report.written_names().collect::<Vec<_>>(), ["b-1.txt", "b-2.txt", "b-3"]);
        assert_eq!(sink.parts[0].1, b"one");
        assert_eq!(sink.parts[2].1, b"three");
        assert!(report.summary.is_clean());
    }

    #[test]
    fn test_nested_wrappers_emit_nothing() {
        let body = "\
--outer
Content-Type: multipart/alternative; boundary=inner

--inner
Content-Type: text/plain

plain
--inner
Content-Type: text/html

<p>html</p>
--inner--
--outer--
";
        let (report, sink) = run(body, "outer");
        assert_eq!(report.summary.files_written, 2);
        assert_eq!(report.events.len(), 2);
        assert_eq!(sink.get("inner-1.txt"), Some(&b"plain"[..]));
        assert_eq!(sink.get("inner-2.html"), Some(&b"<p>html</p>"[..]));
        assert!(matches!(report.events[0], Emission::PartWritten { depth: 2, .. }));
    }

    #[test]
    fn test_decode_failure_is_isolated() {
        let body = "\
--b
Content-Transfer-Encoding: base64

!!!not base64!!!
--b
Content-Transfer-Encoding: base64
Content-Type: text/plain

aGk=
--b--
";
        let (report, sink) = run(body, "b");
        assert_eq!(report.summary.parts_failed, 1);
        assert_eq!(report.summary.files_written, 1);
        assert!(matches!(
            report.events[0],
            Emission::PartFailed { kind: FailureKind::Decode, depth: 1, .. }
        ));
        assert_eq!(sink.parts[0].1, b"hi");
    }

    #[test]
    fn test_truncated_inner_branch_does_not_stop_siblings() {
        let body = "\
--outer
Content-Type: multipart/mixed; boundary=inner

--inner

kept
--inner

lost
--outer

after
--outer--
";
        let (report, sink) = run(body, "outer");
        assert_eq!(
            report.events[1],
            Emission::BranchTruncated {
                boundary: "inner".into(),
                depth: 2
            }
        );
        assert_eq!(report.summary.files_written, 2);
        assert_eq!(sink.parts[0].1, b"kept");
        assert_eq!(sink.parts[1].1, b"after");
    }

    #[test]
    fn test_depth_limit_fails_closed() {
        let body = "\
--l1
Content-Type: multipart/mixed; boundary=l2

--l2
Content-Type: text/plain

deep
--l2--
--l1
Content-Type: text/plain

shallow
--l1--
";
        let mut sink = MemorySink::new();
        let options = DecodeOptions {
            max_depth: 1,
            ..DecodeOptions::default()
        };
        let report = decode(body.as_bytes(), "l1", &mut sink, &options);
        assert!(matches!(
            report.events[0],
            Emission::PartFailed { kind: FailureKind::DepthExceeded, depth: 2, .. }
        ));
        assert_eq!(sink.parts.len(), 1);
        assert_eq!(sink.parts[0].1, b"shallow");
    }

    #[test]
    fn test_multipart_without_boundary_policy() {
        let body = "--b\nContent-Type: multipart/mixed\n\nopaque\n--b--\n";
        let (report, sink) = run(body, "b");
        assert_eq!(report.summary.files_written, 1);
        assert_eq!(sink.parts[0].1, b"opaque");

        let mut sink = MemorySink::new();
        let options = DecodeOptions {
            missing_boundary: MissingBoundary::Fail,
            ..DecodeOptions::default()
        };
        let report = decode(body.as_bytes(), "b", &mut sink, &options);
        assert_eq!(report.summary.files_written, 0);
        assert!(matches!(
            report.events[0],
            Emission::PartFailed { kind: FailureKind::MissingBoundary, .. }
        ));
    }

    /// Fails the first write, stores the rest.
    struct FlakySink {
        calls: usize,
        inner: MemorySink,
    }

    impl PartSink for FlakySink {
        fn write_part(&mut self, name: &str, data: &[u8]) -> Result<String> {
            self.calls += 1;
            if self.calls == 1 {
                return Err(MimeError::io(
                    name,
                    std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                ));
            }
            self.inner.write_part(name, data)
        }
    }

    #[test]
    fn test_write_failure_is_isolated() {
        let body = "--b\nContent-Type: text/plain\n\none\n--b\nContent-Type: text/plain\n\ntwo\n--b--\n";
        let mut sink = FlakySink {
            calls: 0,
            inner: MemorySink::new(),
        };
        let report = decode(body.as_bytes(), "b", &mut sink, &DecodeOptions::default());

        assert!(matches!(
            report.events[0],
            Emission::PartFailed { kind: FailureKind::Write, depth: 1, .. }
        ));
        assert!(matches!(
            report.events[1],
            Emission::PartWritten { ref name, .. } if name == "b-2.txt"
        ));
        assert_eq!(report.summary.files_written, 1);
        assert_eq!(report.summary.parts_failed, 1);
        assert_eq!(report.written_names().collect::<Vec<_>>(), ["b-2.txt"]);
        assert_eq!(sink.inner.parts.len(), 1);
        assert_eq!(sink.inner.parts[0].1, b"two");
    }

    #[test]
    fn test_existing_output_file_is_kept() {
        use crate::export::sink::{DirectorySink, DEFAULT_FILE_MODE};

        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b-1.txt"), "user data").unwrap();
        let mut sink = DirectorySink::create(tmp.path(), DEFAULT_FILE_MODE).unwrap();
        let body = "--b\nContent-Type: text/plain\n\nnew\n--b--\n";
        let report = decode(body.as_bytes(), "b", &mut sink, &DecodeOptions::default());

        assert_eq!(report.written_names().collect::<Vec<_>>(), ["b-1-1.txt"]);
        assert_eq!(std::fs::read(tmp.path().join("b-1.txt")).unwrap(), b"user data");
        assert_eq!(std::fs::read(tmp.path().join("b-1-1.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_top_level_checks() {
        assert!(matches!(top_level_boundary(""), Err(MimeError::MissingContentType)));
        assert!(matches!(
            top_level_boundary("text/plain"),
            Err(MimeError::NotMultipart(t)) if t == "text/plain"
        ));
        assert!(matches!(top_level_boundary("multipart/mixed"), Err(MimeError::MissingBoundary)));
        assert!(matches!(
            top_level_boundary("multipart"),
            Err(MimeError::Unclassifiable { .. })
        ));
        assert_eq!(top_level_boundary("multipart/mixed; boundary=x").unwrap(), "x");
    }

    #[test]
    fn test_decode_message_refuses_before_output() {
        let mut sink = MemorySink::new();
        let result = decode_message(
            "text/plain",
            &b"--b\n\nx\n--b--\n"[..],
            &mut sink,
            &DecodeOptions::default(),
        );
        assert!(result.unwrap_err().is_fatal());
        assert!(sink.parts.is_empty());
    }
}
