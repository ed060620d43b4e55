//! `mimesplit`: explode a multipart MIME message into decoded files.
//!
//! The library splits a message body on its boundary, descends into nested
//! multipart containers, reverses each leaf's transfer encoding, and writes
//! every leaf to a [`export::sink::PartSink`] under a run-unique name.
//!
//! ```
//! use mimesplit::export::sink::MemorySink;
//! use mimesplit::parser::mime::{decode_message, DecodeOptions};
//!
//! let body = b"--b\r\nContent-Type: text/plain\r\n\r\nhello\r\n--b--\r\n";
//! let mut sink = MemorySink::new();
//! let report = decode_message(
//!     "multipart/mixed; boundary=b",
//!     &body[..],
//!     &mut sink,
//!     &DecodeOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(report.summary.files_written, 1);
//! assert_eq!(sink.get("b-1.txt"), Some(&b"hello"[..]));
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
