//! Centralized error types for mimesplit.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced at the level of a whole run or a single output file.
#[derive(Error, Debug)]
pub enum MimeError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified input file does not exist.
    #[error("Message file not found: {0}")]
    FileNotFound(PathBuf),

    /// The message carries no `Content-Type` header at all.
    #[error("Message has no Content-Type header")]
    MissingContentType,

    /// The message-level `Content-Type` could not be parsed.
    #[error("Unclassifiable Content-Type '{value}': {source}")]
    Unclassifiable {
        value: String,
        source: ClassifyError,
    },

    /// The message-level media type is not `multipart/*`.
    #[error("Not a multipart MIME message: {0}")]
    NotMultipart(String),

    /// The message is multipart but declares no usable boundary.
    #[error("Multipart message declares no boundary parameter")]
    MissingBoundary,
}

/// Convenience alias for `Result<T, MimeError>`.
pub type Result<T> = std::result::Result<T, MimeError>;

impl MimeError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run before any output.
    ///
    /// Only problems with the message itself are fatal. An I/O error on
    /// one output file affects that part alone.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}

impl From<std::io::Error> for MimeError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

/// Failure to classify a `Content-Type`-shaped header value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("empty value")]
    Empty,

    #[error("media type '{0}' has no '/'")]
    MissingSlash(String),

    #[error("invalid media type '{0}'")]
    InvalidMediaType(String),

    #[error("invalid parameter '{0}'")]
    InvalidParameter(String),

    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),

    #[error("unterminated quoted string")]
    UnterminatedQuote,
}

/// Failure to reverse a Content-Transfer-Encoding.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid quoted-printable escape at byte {offset}")]
    QuotedPrintable { offset: usize },
}

/// Failure while splitting a stream on a boundary.
#[derive(Error, Debug)]
pub enum TokenizeError {
    /// The stream ended before the `--boundary--` terminal marker.
    #[error("stream ended before the terminal marker of boundary '{boundary}'")]
    Truncated { boundary: String },

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}
