//! Integration tests for message splitting, from fixture files to written parts.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_fs::prelude::*;
use predicates::prelude::*;

use mimesplit::error::MimeError;
use mimesplit::export::sink::{DirectorySink, MemorySink, DEFAULT_FILE_MODE};
use mimesplit::model::event::{Emission, FailureKind, Report};
use mimesplit::parser::message::{read_message_header, MessageSummary};
use mimesplit::parser::mime::{decode_message, DecodeOptions};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Run a fixture through the library into memory.
fn split_fixture(name: &str) -> mimesplit::error::Result<(Report, MemorySink)> {
    let mut reader = BufReader::new(File::open(fixture(name))?);
    let header = read_message_header(&mut reader)?;
    let mut sink = MemorySink::new();
    let report = decode_message(
        header.first_value("content-type"),
        reader,
        &mut sink,
        &DecodeOptions::default(),
    )?;
    Ok((report, sink))
}

fn mimesplit_cmd(temp: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mimesplit"));
    cmd.env("MIMESPLIT_CONFIG", temp.path().join("no-such-config.toml"))
        .env_remove("RUST_LOG");
    cmd
}

// ─── alternative.eml: plain + quoted-printable HTML, CRLF ───────────

#[test]
fn test_alternative_writes_two_distinct_files() {
    let (report, sink) = split_fixture("alternative.eml").unwrap();
    assert_eq!(report.summary.files_written, 2);
    assert!(report.summary.is_clean());

    let names: Vec<_> = report.written_names().collect();
    assert_eq!(
        names,
        [
            "bcaec520ea5d6918e204a8cea3b4-1.txt",
            "bcaec520ea5d6918e204a8cea3b4-2.html"
        ]
    );
    assert_eq!(sink.get(names[0]), Some(&b"*hi!*"[..]));
    assert_eq!(sink.get(names[1]), Some(&b"<p><b>hi!</b></p>"[..]));
}

#[test]
fn test_alternative_to_directory() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mut reader = BufReader::new(File::open(fixture("alternative.eml")).unwrap());
    let header = read_message_header(&mut reader).unwrap();
    let mut sink = DirectorySink::create(temp.path(), DEFAULT_FILE_MODE).unwrap();

    decode_message(
        header.first_value("content-type"),
        reader,
        &mut sink,
        &DecodeOptions::default(),
    )
    .unwrap();

    temp.child("bcaec520ea5d6918e204a8cea3b4-1.txt").assert("*hi!*");
    temp.child("bcaec520ea5d6918e204a8cea3b4-2.html")
        .assert("<p><b>hi!</b></p>");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let meta = std::fs::metadata(temp.child("bcaec520ea5d6918e204a8cea3b4-1.txt").path()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644);
    }
}

// ─── nested.eml: mixed > alternative, base64 attachments ────────────

#[test]
fn test_nested_only_leaves_are_written() {
    let (report, sink) = split_fixture("nested.eml").unwrap();
    assert_eq!(report.summary.files_written, 4);
    assert_eq!(report.events.len(), 4, "wrappers must not produce events");

    let names: Vec<_> = report.written_names().collect();
    assert_eq!(
        names,
        [
            "alt-boundary-1.txt",
            "alt-boundary-2.html",
            "notes.txt",
            "notes-1.txt"
        ]
    );
    assert_eq!(sink.get("alt-boundary-1.txt"), Some(&b"Plain body"[..]));
    assert_eq!(
        sink.get("alt-boundary-2.html"),
        Some(&br#"<p class="body">HTML body</p>"#[..])
    );
    assert_eq!(sink.get("notes.txt"), Some(&b"Hello, attachment!\n"[..]));
    assert_eq!(sink.get("notes-1.txt"), Some(&b"second copy\n"[..]));

    let depths: Vec<_> = report
        .events
        .iter()
        .map(|e| match e {
            Emission::PartWritten { depth, .. } => *depth,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(depths, [2, 2, 1, 1]);
}

#[test]
fn test_nested_message_header() {
    let mut reader = BufReader::new(File::open(fixture("nested.eml")).unwrap());
    let header = read_message_header(&mut reader).unwrap();
    let summary = MessageSummary::from_header(&header);
    assert_eq!(summary.from, "José <jose@example.com>");
    assert_eq!(summary.subject, "Résumé with attachments");
    assert_eq!(
        summary.content_type,
        "multipart/mixed; boundary=\"outer-boundary\""
    );
}

// ─── truncated.eml: missing terminal boundary ───────────────────────

#[test]
fn test_truncated_keeps_complete_parts() {
    let (report, sink) = split_fixture("truncated.eml").unwrap();
    assert_eq!(report.summary.files_written, 1);
    assert_eq!(report.summary.branches_truncated, 1);
    assert!(!report.summary.is_clean());
    assert_eq!(sink.get("trunc-1.txt"), Some(&b"first"[..]));
    assert_eq!(
        report.events.last(),
        Some(&Emission::BranchTruncated {
            boundary: "trunc".into(),
            depth: 1
        })
    );
}

// ─── not_multipart.eml: fatal before any output ─────────────────────

#[test]
fn test_not_multipart_is_fatal() {
    let err = split_fixture("not_multipart.eml").unwrap_err();
    assert!(matches!(err, MimeError::NotMultipart(ref t) if t == "text/plain"));
    assert!(err.is_fatal());
}

#[test]
fn test_missing_content_type_is_fatal() {
    let mut sink = MemorySink::new();
    let err = decode_message("", &b"--b\n\nx\n--b--\n"[..], &mut sink, &DecodeOptions::default())
        .unwrap_err();
    assert!(matches!(err, MimeError::MissingContentType));
    assert!(sink.parts.is_empty());
}

// ─── passthrough.eml: 8bit and absent encodings ─────────────────────

#[test]
fn test_identity_encodings_keep_raw_bytes() {
    let (report, sink) = split_fixture("passthrough.eml").unwrap();
    assert!(report.summary.is_clean());
    assert_eq!(sink.get("raw-1.txt"), Some(&b"caf\xc3\xa9 \xff 8bit"[..]));
    assert_eq!(sink.get("raw-2.bin"), Some(&b"\x00\x01binary"[..]));
}

#[test]
fn test_depth_limit_from_options() {
    let mut reader = BufReader::new(File::open(fixture("nested.eml")).unwrap());
    let header = read_message_header(&mut reader).unwrap();
    let mut sink = MemorySink::new();
    let options = DecodeOptions {
        max_depth: 1,
        ..DecodeOptions::default()
    };
    let report =
        decode_message(header.first_value("content-type"), reader, &mut sink, &options).unwrap();

    assert!(matches!(
        report.events[0],
        Emission::PartFailed {
            kind: FailureKind::DepthExceeded,
            depth: 2,
            ..
        }
    ));
    assert_eq!(report.summary.files_written, 2);
}

// ─── Command line ───────────────────────────────────────────────────

#[test]
fn test_cli_extract_clean_run() {
    let temp = assert_fs::TempDir::new().unwrap();
    let out = temp.child("out");
    let status = mimesplit_cmd(&temp)
        .arg(fixture("nested.eml"))
        .arg("--output")
        .arg(out.path())
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(0));
    out.child("alt-boundary-1.txt").assert("Plain body");
    out.child("notes.txt").assert("Hello, attachment!\n");
    out.child("notes-1.txt").assert("second copy\n");
}

#[test]
fn test_cli_partial_failure_exit_code() {
    let temp = assert_fs::TempDir::new().unwrap();
    let status = mimesplit_cmd(&temp)
        .args(["extract", "--output"])
        .arg(temp.path())
        .arg(fixture("truncated.eml"))
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    temp.child("trunc-1.txt").assert("first");
    temp.child("trunc-2.txt").assert(predicate::path::missing());
}

#[test]
fn test_cli_not_multipart_writes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let out = temp.child("out");
    let output = mimesplit_cmd(&temp)
        .arg(fixture("not_multipart.eml"))
        .arg("-o")
        .arg(out.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    out.assert(predicate::path::missing());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        predicate::str::contains("not a multipart").eval(&stderr.to_lowercase()),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_cli_missing_input_is_fatal() {
    let temp = assert_fs::TempDir::new().unwrap();
    let status = mimesplit_cmd(&temp)
        .arg(temp.path().join("absent.eml"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_cli_dry_run_json() {
    let temp = assert_fs::TempDir::new().unwrap();
    let out = temp.child("out");
    let output = mimesplit_cmd(&temp)
        .arg(fixture("alternative.eml"))
        .args(["--dry-run", "--json", "-o"])
        .arg(out.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    out.assert(predicate::path::missing());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["summary"]["files_written"], 2);
    assert_eq!(json["events"][0]["event"], "part_written");
    assert_eq!(
        json["events"][1]["name"],
        "bcaec520ea5d6918e204a8cea3b4-2.html"
    );
    assert_eq!(json["message"]["subject"], "Alternative");
}

#[test]
fn test_cli_reads_stdin() {
    let temp = assert_fs::TempDir::new().unwrap();
    let status = mimesplit_cmd(&temp)
        .args(["-", "-o"])
        .arg(temp.path())
        .stdin(File::open(fixture("passthrough.eml")).unwrap())
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(0));
    temp.child("raw-2.bin")
        .assert(predicate::path::is_file());
}
