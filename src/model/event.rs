//! Emission events and the run summary.

use serde::Serialize;

/// Why a part (or a whole branch) produced no file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The transfer encoding could not be reversed.
    Decode,
    /// The output file could not be written.
    Write,
    /// The input stream could not be read.
    Read,
    /// Nesting went past the configured maximum depth.
    DepthExceeded,
    /// A multipart part had no boundary and the policy is to fail it.
    MissingBoundary,
}

/// One observable outcome of a run, in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Emission {
    PartWritten {
        name: String,
        byte_length: u64,
        depth: usize,
    },
    PartFailed {
        kind: FailureKind,
        reason: String,
        depth: usize,
    },
    /// The terminal marker of `boundary` was never found.
    BranchTruncated { boundary: String, depth: usize },
}

/// Counters over a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub files_written: usize,
    pub parts_failed: usize,
    pub branches_truncated: usize,
    pub bytes_written: u64,
}

impl Summary {
    /// True when every leaf was written and no branch was cut short.
    pub fn is_clean(&self) -> bool {
        self.parts_failed == 0 && self.branches_truncated == 0
    }

    fn record(&mut self, event: &Emission) {
        match event {
            Emission::PartWritten { byte_length, .. } => {
                self.files_written += 1;
                self.bytes_written += byte_length;
            }
            Emission::PartFailed { .. } => self.parts_failed += 1,
            Emission::BranchTruncated { .. } => self.branches_truncated += 1,
        }
    }
}

/// Everything a run produced: the events in order plus the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub events: Vec<Emission>,
    pub summary: Summary,
}

impl Report {
    pub fn push(&mut self, event: Emission) {
        self.summary.record(&event);
        self.events.push(event);
    }

    /// Names of the written files, in order.
    pub fn written_names(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            Emission::PartWritten { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}
