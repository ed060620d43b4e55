//! Output file naming for leaf parts.
//!
//! A leaf is named after its `Content-Disposition` filename when it has one,
//! otherwise `{radix}-{index}{ext}` with the extension derived from its media
//! type. Every name handed out during a run is distinct.

use std::collections::HashSet;

use crate::parser::content_type::{parse_content_disposition, parse_content_type};
use crate::parser::header::PartHeader;

/// Extensions preferred over the first registry match for common types.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("text/plain", ".txt"),
    ("text/html", ".html"),
    ("text/calendar", ".ics"),
    ("text/csv", ".csv"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("application/pdf", ".pdf"),
    ("application/zip", ".zip"),
    ("application/octet-stream", ".bin"),
    ("message/rfc822", ".eml"),
];

/// Run-scoped name generator.
#[derive(Debug, Default)]
pub struct FileNamer {
    next_index: u64,
    issued: HashSet<String>,
}

impl FileNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose a name for a leaf part.
    ///
    /// `radix` is normally the boundary of the enclosing multipart level.
    /// The index counter advances on every call.
    pub fn name(&mut self, header: &PartHeader, radix: &str) -> String {
        self.next_index += 1;
        let index = self.next_index;

        let candidate = match disposition_filename(header) {
            Some(filename) => filename,
            None => {
                let radix = sanitize_filename_part(radix, 70);
                let extension = parse_content_type(header.first_value("content-type"))
                    .ok()
                    .and_then(|ct| extension_for(ct.media_type()));
                match extension {
                    Some(ext) => format!("{radix}-{index}{ext}"),
                    None => format!("{radix}-{index}"),
                }
            }
        };

        let name = self.make_unique(candidate);
        self.issued.insert(name.clone());
        name
    }

    /// Append `-N` before the extension until the name is unused.
    fn make_unique(&self, candidate: String) -> String {
        if !self.issued.contains(&candidate) {
            return candidate;
        }
        let mut n = 1u64;
        loop {
            let name = numbered_name(&candidate, n);
            if !self.issued.contains(&name) {
                return name;
            }
            n += 1;
        }
    }
}

/// `stem-N.ext` for `stem.ext`, or `name-N` when there is no extension.
///
/// A leading dot (`.profile`) is part of the stem.
pub fn numbered_name(name: &str, n: u64) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}-{n}{}", &name[..dot], &name[dot..]),
        _ => format!("{name}-{n}"),
    }
}

/// The disposition filename, reduced to its final path component.
fn disposition_filename(header: &PartHeader) -> Option<String> {
    let disposition = parse_content_disposition(header.first_value("content-disposition")).ok()?;
    let filename = disposition.filename()?;
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    match base {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// File extension (with leading dot) for a lowercase media type.
pub fn extension_for(media_type: &str) -> Option<String> {
    if let Some((_, ext)) = PREFERRED_EXTENSIONS.iter().find(|(mt, _)| *mt == media_type) {
        return Some((*ext).to_string());
    }
    mime_guess::get_mime_extensions_str(media_type)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{ext}"))
}

/// Sanitize a string for use in filenames.
///
/// Replaces invalid characters with `_` and truncates to `max_len`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "part".to_string()
    } else {
        sanitized
    }
}
