//! High-level COPY orchestration over any driving connection.
//!
//! [`Copier`] renders the COPY command, drives the sans-I/O state machines
//! in [`crate::state`] against a [`CopyConnection`], and moves the payload
//! between the socket and a caller-supplied [`std::io::Read`] or
//! [`std::io::Write`].

pub mod options;

pub use options::{CopyFormat, CopyOption, CopyOptionKind, CopyOptions, ForceQuote};

use std::io::{Read, Write};

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::types::TransactionStatus;
use crate::state::{Action, CopyInStateMachine, CopyOutStateMachine};

/// Upload chunk size. One CopyData frame is sent per chunk.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// A possibly schema-qualified SQL identifier, quoted on render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(Vec<String>);

impl Identifier {
    /// Parse a dotted identifier, e.g. `staging.measurements`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().split('.').map(str::to_owned).collect())
    }

    /// Build from pre-split parts, for names that contain literal dots.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Render each part double-quoted with embedded quotes doubled, joined
    /// with `.`. NUL bytes are stripped; they cannot appear in the
    /// protocol's string framing.
    pub fn sanitize(&self) -> String {
        let mut out = String::new();
        for (index, part) in self.0.iter().enumerate() {
            if index > 0 {
                out.push('.');
            }
            out.push('"');
            for c in part.chars() {
                match c {
                    '\0' => {}
                    '"' => out.push_str("\"\""),
                    _ => out.push(c),
                }
            }
            out.push('"');
        }
        out
    }
}

/// Connection surface the copier drives.
///
/// Implementations own the socket, the message framing and the session
/// bookkeeping; the copier never sees raw I/O.
pub trait CopyConnection {
    /// Write one outgoing frame.
    fn send_packet(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read the next message: its type byte into `buffer_set.type_byte` and
    /// its payload into `buffer_set.read_buffer`.
    fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()>;

    /// Session transaction status from the last ReadyForQuery.
    fn transaction_status(&self) -> TransactionStatus;

    /// Record the transaction status reported by a finished exchange.
    fn update_transaction_status(&mut self, status: TransactionStatus);

    /// Whether the connection has been marked unusable.
    fn is_broken(&self) -> bool;

    /// Mark the connection unusable for further exchanges.
    fn mark_broken(&mut self);
}

#[derive(Debug, Clone)]
enum Target {
    Table {
        table: Identifier,
        columns: Vec<Identifier>,
    },
    Query(String),
}

/// Builder for one COPY operation.
#[derive(Debug, Clone)]
pub struct Copier {
    target: Target,
    options: CopyOptions,
}

impl Copier {
    /// Copy to or from a table.
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            target: Target::Table {
                table: Identifier::new(name),
                columns: Vec::new(),
            },
            options: CopyOptions::new(),
        }
    }

    /// Copy the result of a query (download only).
    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            target: Target::Query(sql.into()),
            options: CopyOptions::new(),
        }
    }

    /// Restrict a table copy to the named columns.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Target::Table { columns, .. } = &mut self.target {
            columns.extend(names.into_iter().map(Identifier::new));
        }
        self
    }

    /// Attach a validated option set.
    pub fn options(mut self, options: CopyOptions) -> Self {
        self.options = options;
        self
    }

    fn table_clause(table: &Identifier, columns: &[Identifier]) -> String {
        let mut clause = table.sanitize();
        if !columns.is_empty() {
            clause.push('(');
            for (index, column) in columns.iter().enumerate() {
                if index > 0 {
                    clause.push_str(", ");
                }
                clause.push_str(&column.sanitize());
            }
            clause.push(')');
        }
        clause
    }

    fn upload_command(&self) -> Result<String> {
        match &self.target {
            Target::Table { table, columns } => Ok(format!(
                "copy {} from stdin{};",
                Self::table_clause(table, columns),
                self.options.render()
            )),
            Target::Query(_) => Err(Error::Unsupported(
                "COPY FROM STDIN requires a table target, not a query".into(),
            )),
        }
    }

    fn download_command(&self) -> String {
        match &self.target {
            Target::Table { table, columns } => format!(
                "copy {} to stdout{};",
                Self::table_clause(table, columns),
                self.options.render()
            ),
            Target::Query(sql) => {
                format!("copy ({}) to stdout{};", sql, self.options.render())
            }
        }
    }

    /// Upload a data stream with COPY ... FROM STDIN.
    ///
    /// Reads `source` in [`COPY_CHUNK_SIZE`] chunks until EOF, then completes
    /// the exchange and returns the row count from the command tag. If
    /// `source` fails mid-stream the transfer is canceled with CopyFail, the
    /// session is resynchronized, and the source error is returned.
    pub fn from_reader<C, R>(&self, conn: &mut C, source: &mut R) -> Result<u64>
    where
        C: CopyConnection,
        R: Read + ?Sized,
    {
        check_session(conn)?;
        let command = self.upload_command()?;

        let mut machine = CopyInStateMachine::new();
        let mut buffer_set = BufferSet::new();

        start_exchange(conn, machine.start(&command)?)?;
        await_upload_grant(conn, &mut machine, &mut buffer_set)?;

        let mut chunk = vec![0_u8; COPY_CHUNK_SIZE];
        loop {
            match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    let frame = collect_frame(machine.push_chunk(&chunk[..n])?);
                    send_frame(conn, &frame)?;
                }
                Err(read_error) => {
                    cancel_upload(conn, &mut machine, &mut buffer_set, &read_error);
                    return Err(Error::Io(read_error));
                }
            }
        }

        let frame = collect_frame(machine.finish_data()?);
        send_frame(conn, &frame)?;
        finish_upload(conn, &mut machine, &mut buffer_set)?;

        conn.update_transaction_status(machine.transaction_status());
        Ok(machine.rows_affected().unwrap_or(0))
    }

    /// Download a data stream with COPY ... TO STDOUT.
    ///
    /// Writes every payload frame to `sink` in arrival order, completes the
    /// exchange and returns the row count from the command tag. A sink write
    /// failure abandons the stream mid-flight and marks the connection
    /// broken; the COPY protocol has no client-side cancel for downloads.
    pub fn to_writer<C, W>(&self, conn: &mut C, sink: &mut W) -> Result<u64>
    where
        C: CopyConnection,
        W: Write + ?Sized,
    {
        check_session(conn)?;
        let command = self.download_command();

        let mut machine = CopyOutStateMachine::new();
        let mut buffer_set = BufferSet::new();

        start_exchange(conn, machine.start(&command)?)?;

        loop {
            read_frame(conn, &mut buffer_set)?;
            let outcome = match machine.step(&mut buffer_set) {
                Ok(Action::Payload(payload)) => match sink.write_all(payload) {
                    Ok(()) => StepOutcome::Continue,
                    Err(write_error) => StepOutcome::SinkError(write_error),
                },
                Ok(Action::NeedPacket | Action::TransferGranted) => StepOutcome::Continue,
                Ok(Action::AsyncMessage(message)) => {
                    tracing::debug!(?message, "async message during copy download");
                    StepOutcome::Continue
                }
                Ok(Action::Finished) => StepOutcome::Finished,
                Ok(Action::WritePacket(_)) => StepOutcome::UnexpectedAction,
                Err(error) => StepOutcome::Error(error),
            };

            match outcome {
                StepOutcome::Continue => {}
                StepOutcome::Finished => break,
                StepOutcome::SinkError(write_error) => {
                    machine.abort();
                    conn.mark_broken();
                    return Err(Error::Io(write_error));
                }
                StepOutcome::UnexpectedAction => {
                    conn.mark_broken();
                    return Err(Error::Protocol(
                        "download state machine produced an outgoing frame".into(),
                    ));
                }
                StepOutcome::Error(error) => {
                    if machine.is_finished() {
                        conn.update_transaction_status(machine.transaction_status());
                    } else {
                        conn.mark_broken();
                    }
                    return Err(error);
                }
            }
        }

        sink.flush()?;
        conn.update_transaction_status(machine.transaction_status());
        Ok(machine.rows_affected().unwrap_or(0))
    }
}

enum StepOutcome {
    Continue,
    Finished,
    SinkError(std::io::Error),
    UnexpectedAction,
    Error(Error),
}

fn check_session<C: CopyConnection>(conn: &C) -> Result<()> {
    if conn.is_broken() {
        return Err(Error::ConnectionBroken);
    }
    match conn.transaction_status() {
        TransactionStatus::InTransaction => Ok(()),
        TransactionStatus::Idle => Err(Error::InvalidUsage(
            "COPY requires an open transaction".into(),
        )),
        TransactionStatus::Failed => Err(Error::InvalidUsage(
            "current transaction is aborted, commands ignored until end of transaction block"
                .into(),
        )),
    }
}

fn send_frame<C: CopyConnection>(conn: &mut C, bytes: &[u8]) -> Result<()> {
    if let Err(error) = conn.send_packet(bytes) {
        conn.mark_broken();
        return Err(error);
    }
    Ok(())
}

fn read_frame<C: CopyConnection>(conn: &mut C, buffer_set: &mut BufferSet) -> Result<()> {
    if let Err(error) = conn.read_message(buffer_set) {
        conn.mark_broken();
        return Err(error);
    }
    Ok(())
}

/// Copy an outgoing frame out of the machine's write buffer so the machine
/// can be stepped while the frame is in flight.
fn collect_frame(action: Action<'_>) -> Vec<u8> {
    match action {
        Action::WritePacket(bytes) => bytes.to_vec(),
        _ => Vec::new(),
    }
}

fn start_exchange<C: CopyConnection>(conn: &mut C, action: Action<'_>) -> Result<()> {
    let frame = collect_frame(action);
    send_frame(conn, &frame)
}

fn await_upload_grant<C: CopyConnection>(
    conn: &mut C,
    machine: &mut CopyInStateMachine,
    buffer_set: &mut BufferSet,
) -> Result<()> {
    loop {
        read_frame(conn, buffer_set)?;
        let outcome = match machine.step(buffer_set) {
            Ok(Action::TransferGranted) => StepOutcome::Finished,
            Ok(Action::NeedPacket) => StepOutcome::Continue,
            Ok(Action::AsyncMessage(message)) => {
                tracing::debug!(?message, "async message during copy upload");
                StepOutcome::Continue
            }
            Ok(_) => StepOutcome::UnexpectedAction,
            Err(error) => StepOutcome::Error(error),
        };
        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Finished => return Ok(()),
            StepOutcome::SinkError(_) | StepOutcome::UnexpectedAction => {
                conn.mark_broken();
                return Err(Error::Protocol(
                    "unexpected action while awaiting copy grant".into(),
                ));
            }
            StepOutcome::Error(error) => {
                if machine.is_finished() {
                    conn.update_transaction_status(machine.transaction_status());
                } else {
                    conn.mark_broken();
                }
                return Err(error);
            }
        }
    }
}

fn finish_upload<C: CopyConnection>(
    conn: &mut C,
    machine: &mut CopyInStateMachine,
    buffer_set: &mut BufferSet,
) -> Result<()> {
    loop {
        read_frame(conn, buffer_set)?;
        let outcome = match machine.step(buffer_set) {
            Ok(Action::Finished) => StepOutcome::Finished,
            Ok(Action::NeedPacket) => StepOutcome::Continue,
            Ok(Action::AsyncMessage(message)) => {
                tracing::debug!(?message, "async message during copy upload");
                StepOutcome::Continue
            }
            Ok(_) => StepOutcome::UnexpectedAction,
            Err(error) => StepOutcome::Error(error),
        };
        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Finished => return Ok(()),
            StepOutcome::SinkError(_) | StepOutcome::UnexpectedAction => {
                conn.mark_broken();
                return Err(Error::Protocol(
                    "unexpected action while completing copy upload".into(),
                ));
            }
            StepOutcome::Error(error) => {
                if machine.is_finished() {
                    conn.update_transaction_status(machine.transaction_status());
                } else {
                    conn.mark_broken();
                }
                return Err(error);
            }
        }
    }
}

/// Best-effort cancel after a source failure: send CopyFail, drain to
/// ReadyForQuery, keep the session reusable. Transport failures during the
/// drain mark the connection broken; the caller reports the source error
/// either way.
fn cancel_upload<C: CopyConnection>(
    conn: &mut C,
    machine: &mut CopyInStateMachine,
    buffer_set: &mut BufferSet,
    read_error: &std::io::Error,
) {
    let frame = match machine.fail_data(&read_error.to_string()) {
        Ok(action) => collect_frame(action),
        Err(error) => {
            tracing::debug!(error = %error, "cannot cancel copy upload");
            conn.mark_broken();
            return;
        }
    };
    if send_frame(conn, &frame).is_err() {
        return;
    }

    loop {
        if read_frame(conn, buffer_set).is_err() {
            return;
        }
        let outcome = match machine.step(buffer_set) {
            Ok(Action::NeedPacket | Action::AsyncMessage(_)) => StepOutcome::Continue,
            Ok(_) => StepOutcome::UnexpectedAction,
            Err(error) => StepOutcome::Error(error),
        };
        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Error(error) => {
                // The server acknowledged the CopyFail; the session is
                // synchronized again.
                if machine.is_finished() {
                    conn.update_transaction_status(machine.transaction_status());
                    tracing::debug!(error = %error, "server acknowledged copy cancel");
                } else {
                    conn.mark_broken();
                }
                return;
            }
            StepOutcome::Finished | StepOutcome::SinkError(_) | StepOutcome::UnexpectedAction => {
                conn.mark_broken();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_sanitize() {
        assert_eq!(Identifier::new("users").sanitize(), "\"users\"");
        assert_eq!(
            Identifier::new("we\"ird").sanitize(),
            "\"we\"\"ird\""
        );
        assert_eq!(Identifier::new("nul\0byte").sanitize(), "\"nulbyte\"");
        assert_eq!(
            Identifier::new("staging.events").sanitize(),
            "\"staging\".\"events\""
        );
        assert_eq!(
            Identifier::from_parts(["odd.schema", "t"]).sanitize(),
            "\"odd.schema\".\"t\""
        );
    }

    #[test]
    fn builders_take_owned_and_borrowed_names() {
        let copier = Copier::table(String::from("t")).columns(vec![String::from("a"), "b".into()]);
        assert_eq!(
            copier.upload_command().unwrap(),
            "copy \"t\"(\"a\", \"b\") from stdin;"
        );
        assert_eq!(Identifier::new(String::from("t")).sanitize(), "\"t\"");
    }

    #[test]
    fn upload_command_rendering() {
        let copier = Copier::table("measurements").columns(["city", "temp"]);
        assert_eq!(
            copier.upload_command().unwrap(),
            "copy \"measurements\"(\"city\", \"temp\") from stdin;"
        );

        let copier = Copier::table("t").options(
            CopyOptions::build(vec![CopyOption::Format(CopyFormat::Csv)]).unwrap(),
        );
        assert_eq!(
            copier.upload_command().unwrap(),
            "copy \"t\" from stdin WITH (FORMAT 'csv');"
        );
    }

    #[test]
    fn download_command_rendering() {
        assert_eq!(
            Copier::table("t").download_command(),
            "copy \"t\" to stdout;"
        );
        assert_eq!(
            Copier::query("select * from t where id > 10").download_command(),
            "copy (select * from t where id > 10) to stdout;"
        );
    }

    #[test]
    fn query_upload_is_unsupported() {
        let err = Copier::query("select 1").upload_command().unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
