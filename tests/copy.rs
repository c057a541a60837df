//! End-to-end COPY tests against a scripted connection.
//!
//! The scripted connection replays a canned server message sequence and
//! records every frame the copier sends, so the full exchange can be checked
//! without a live server.

use std::collections::VecDeque;
use std::io::{Read, Write};

use pgbulk::copy::{Copier, CopyConnection, CopyFormat, CopyOption, CopyOptions};
use pgbulk::error::Error;
use pgbulk::{BufferSet, TransactionStatus};

/// One server message the script will deliver.
struct Scripted {
    type_byte: u8,
    payload: Vec<u8>,
}

struct ScriptedConnection {
    script: VecDeque<Scripted>,
    sent: Vec<Vec<u8>>,
    transaction_status: TransactionStatus,
    broken: bool,
}

impl ScriptedConnection {
    fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: script.into(),
            sent: Vec::new(),
            transaction_status: TransactionStatus::InTransaction,
            broken: false,
        }
    }

    /// Frames sent by the copier, reassembled as (type byte, payload).
    fn sent_frames(&self) -> Vec<(u8, Vec<u8>)> {
        let mut frames = Vec::new();
        for packet in &self.sent {
            let mut rest = packet.as_slice();
            while !rest.is_empty() {
                let type_byte = rest[0];
                let len =
                    i32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
                frames.push((type_byte, rest[5..1 + len].to_vec()));
                rest = &rest[1 + len..];
            }
        }
        frames
    }
}

impl CopyConnection for ScriptedConnection {
    fn send_packet(&mut self, bytes: &[u8]) -> pgbulk::Result<()> {
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn read_message(&mut self, buffer_set: &mut BufferSet) -> pgbulk::Result<()> {
        let message = self.script.pop_front().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "script exhausted",
            ))
        })?;
        buffer_set.type_byte = message.type_byte;
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.extend_from_slice(&message.payload);
        Ok(())
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    fn update_transaction_status(&mut self, status: TransactionStatus) {
        self.transaction_status = status;
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    fn mark_broken(&mut self) {
        self.broken = true;
    }
}

fn msg(type_byte: u8, payload: &[u8]) -> Scripted {
    Scripted {
        type_byte,
        payload: payload.to_vec(),
    }
}

fn error_response(severity: &str, code: &str, message: &str) -> Scripted {
    let mut payload = Vec::new();
    for (tag, value) in [(b'S', severity), (b'C', code), (b'M', message)] {
        payload.push(tag);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
    }
    payload.push(0);
    msg(b'E', &payload)
}

/// A reader that fails after yielding a prefix.
struct FailingReader {
    prefix: &'static [u8],
    served: bool,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.served {
            return Err(std::io::Error::other("disk on fire"));
        }
        self.served = true;
        buf[..self.prefix.len()].copy_from_slice(self.prefix);
        Ok(self.prefix.len())
    }
}

/// A writer that rejects everything.
struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("sink full"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn upload_happy_path() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'G', &[0, 0, 0]),
        msg(b'C', b"COPY 2\0"),
        msg(b'Z', &[b'T']),
    ]);

    let mut source = &b"1\toslo\n2\tbergen\n"[..];
    let rows = Copier::table("cities")
        .columns(["id", "name"])
        .from_reader(&mut conn, &mut source)
        .unwrap();
    assert_eq!(rows, 2);
    assert!(!conn.is_broken());

    let frames = conn.sent_frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].0, b'Q');
    assert_eq!(
        frames[0].1,
        b"copy \"cities\"(\"id\", \"name\") from stdin;\0"
    );
    assert_eq!(frames[1], (b'd', b"1\toslo\n2\tbergen\n".to_vec()));
    assert_eq!(frames[2], (b'c', Vec::new()));
}

#[test]
fn upload_with_options_renders_with_clause() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'G', &[0, 0, 0]),
        msg(b'C', b"COPY 0\0"),
        msg(b'Z', &[b'T']),
    ]);

    let options = CopyOptions::build(vec![
        CopyOption::Format(CopyFormat::Csv),
        CopyOption::Header(true),
    ])
    .unwrap();

    let mut source = &b""[..];
    Copier::table("t")
        .options(options)
        .from_reader(&mut conn, &mut source)
        .unwrap();

    let frames = conn.sent_frames();
    assert_eq!(
        frames[0].1,
        b"copy \"t\" from stdin WITH (FORMAT 'csv', HEADER true);\0"
    );
}

#[test]
fn upload_source_failure_sends_copy_fail() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'G', &[0, 0, 0]),
        error_response("ERROR", "57014", "COPY from stdin failed: disk on fire"),
        msg(b'Z', &[b'T']),
    ]);

    let mut source = FailingReader {
        prefix: b"1\tx\n",
        served: false,
    };
    let err = Copier::table("t")
        .from_reader(&mut conn, &mut source)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("disk on fire"));

    // The connection stays usable: the cancel was acknowledged through
    // ReadyForQuery.
    assert!(!conn.is_broken());

    let frames = conn.sent_frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1].0, b'd');
    assert_eq!(frames[2].0, b'f');
    assert_eq!(frames[2].1, b"disk on fire\0");
}

#[test]
fn upload_rejected_command_surfaces_server_error() {
    let mut conn = ScriptedConnection::new(vec![
        error_response("ERROR", "42P01", "relation \"missing\" does not exist"),
        msg(b'Z', &[b'T']),
    ]);

    let mut source = &b"data"[..];
    let err = Copier::table("missing")
        .from_reader(&mut conn, &mut source)
        .unwrap_err();
    assert_eq!(err.sqlstate(), Some("42P01"));
    assert!(!conn.is_broken());

    // Nothing but the command went out.
    assert_eq!(conn.sent_frames().len(), 1);
}

#[test]
fn upload_requires_open_transaction() {
    let mut conn = ScriptedConnection::new(Vec::new());
    conn.transaction_status = TransactionStatus::Idle;

    let mut source = &b""[..];
    let err = Copier::table("t")
        .from_reader(&mut conn, &mut source)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidUsage(_)));

    conn.transaction_status = TransactionStatus::Failed;
    let err = Copier::table("t")
        .from_reader(&mut conn, &mut source)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidUsage(_)));

    assert!(conn.sent_frames().is_empty());
}

#[test]
fn upload_rejects_broken_connection() {
    let mut conn = ScriptedConnection::new(Vec::new());
    conn.broken = true;

    let mut source = &b""[..];
    let err = Copier::table("t")
        .from_reader(&mut conn, &mut source)
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionBroken));
}

#[test]
fn upload_from_query_is_unsupported() {
    let mut conn = ScriptedConnection::new(Vec::new());
    let mut source = &b""[..];
    let err = Copier::query("select 1")
        .from_reader(&mut conn, &mut source)
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn download_happy_path() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'H', &[0, 0, 0]),
        msg(b'd', b"1\ta\n"),
        msg(b'd', b"2\tb\n"),
        msg(b'c', &[]),
        msg(b'C', b"COPY 2\0"),
        msg(b'Z', &[b'I']),
    ]);

    let mut sink = Vec::new();
    let rows = Copier::table("t").to_writer(&mut conn, &mut sink).unwrap();
    assert_eq!(rows, 2);
    assert_eq!(sink, b"1\ta\n2\tb\n");
    assert_eq!(conn.transaction_status(), TransactionStatus::Idle);

    let frames = conn.sent_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].1, b"copy \"t\" to stdout;\0");
}

#[test]
fn download_from_query() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'H', &[0, 0, 0]),
        msg(b'd', b"xy"),
        msg(b'c', &[]),
        msg(b'C', b"COPY 1\0"),
        msg(b'Z', &[b'T']),
    ]);

    let mut sink = Vec::new();
    Copier::query("select x || y from t")
        .to_writer(&mut conn, &mut sink)
        .unwrap();
    assert_eq!(sink, b"xy");

    let frames = conn.sent_frames();
    assert_eq!(
        frames[0].1,
        b"copy (select x || y from t) to stdout;\0"
    );
}

#[test]
fn download_server_error_mid_stream() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'H', &[0, 0, 0]),
        msg(b'd', b"1\ta\n"),
        error_response("ERROR", "57014", "canceling statement due to user request"),
        msg(b'Z', &[b'T']),
    ]);

    let mut sink = Vec::new();
    let err = Copier::table("t")
        .to_writer(&mut conn, &mut sink)
        .unwrap_err();
    assert_eq!(err.sqlstate(), Some("57014"));

    // The stream was drained to ReadyForQuery; the session is reusable.
    assert!(!conn.is_broken());
    assert_eq!(sink, b"1\ta\n");
}

#[test]
fn download_sink_failure_breaks_connection() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'H', &[0, 0, 0]),
        msg(b'd', b"1\ta\n"),
        msg(b'c', &[]),
        msg(b'C', b"COPY 1\0"),
        msg(b'Z', &[b'T']),
    ]);

    let mut sink = FailingWriter;
    let err = Copier::table("t")
        .to_writer(&mut conn, &mut sink)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(conn.is_broken());
}

#[test]
fn stray_message_after_command_complete_is_protocol_error() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'H', &[0, 0, 0]),
        msg(b'c', &[]),
        msg(b'C', b"COPY 0\0"),
        msg(b'C', b"COPY 0\0"),
    ]);

    let mut sink = Vec::new();
    let err = Copier::table("t")
        .to_writer(&mut conn, &mut sink)
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(conn.is_broken());
}

#[test]
fn wrong_direction_grant_is_protocol_error() {
    // Server grants COPY OUT for an upload command.
    let mut conn = ScriptedConnection::new(vec![msg(b'H', &[0, 0, 0])]);

    let mut source = &b""[..];
    let err = Copier::table("t")
        .from_reader(&mut conn, &mut source)
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(conn.is_broken());
}

#[test]
fn notice_during_download_is_skipped() {
    let mut notice = Vec::new();
    for (tag, value) in [(b'S', "NOTICE"), (b'C', "00000"), (b'M', "just so you know")] {
        notice.push(tag);
        notice.extend_from_slice(value.as_bytes());
        notice.push(0);
    }
    notice.push(0);

    let mut conn = ScriptedConnection::new(vec![
        msg(b'H', &[0, 0, 0]),
        msg(b'N', &notice),
        msg(b'd', b"row\n"),
        msg(b'c', &[]),
        msg(b'C', b"COPY 1\0"),
        msg(b'Z', &[b'T']),
    ]);

    let mut sink = Vec::new();
    let rows = Copier::table("t").to_writer(&mut conn, &mut sink).unwrap();
    assert_eq!(rows, 1);
    assert_eq!(sink, b"row\n");
}

#[test]
fn large_upload_is_chunked() {
    let mut conn = ScriptedConnection::new(vec![
        msg(b'G', &[0, 0, 0]),
        msg(b'C', b"COPY 100000\0"),
        msg(b'Z', &[b'T']),
    ]);

    let data = vec![b'x'; 100_000];
    let mut source = data.as_slice();
    Copier::table("t").from_reader(&mut conn, &mut source).unwrap();

    let frames = conn.sent_frames();
    let data_frames: Vec<_> = frames.iter().filter(|(t, _)| *t == b'd').collect();
    assert_eq!(data_frames.len(), 2);
    assert_eq!(data_frames[0].1.len(), 64 * 1024);
    assert_eq!(data_frames[1].1.len(), 100_000 - 64 * 1024);
}
