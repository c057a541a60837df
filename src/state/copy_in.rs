//! COPY FROM STDIN (upload) state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::{
    CommandComplete, CopyInResponse, ErrorResponse, RawMessage, ReadyForQuery, msg_type,
};
use crate::protocol::frontend::{write_copy_data, write_copy_done, write_copy_fail, write_query};
use crate::protocol::types::TransactionStatus;

use super::action::Action;
use super::parse_async;

/// Copy upload state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    CommandSent,
    Transferring,
    AwaitingCompletion,
    AwaitingReady,
    Finished,
    Aborted,
}

/// State machine for uploading a COPY data stream.
///
/// Control plane: [`start`](Self::start) sends the COPY command, then `step`
/// consumes server messages until `TransferGranted`. Data plane:
/// [`push_chunk`](Self::push_chunk) frames outgoing data, and either
/// [`finish_data`](Self::finish_data) or [`fail_data`](Self::fail_data)
/// closes the stream. After closing, `step` consumes the completion and
/// ready messages.
///
/// A server error at any point is held back while remaining messages are
/// drained; it surfaces from the `step` that consumes ReadyForQuery, leaving
/// the session synchronized.
pub struct CopyInStateMachine {
    state: State,
    write_buffer: Vec<u8>,
    pending_error: Option<Error>,
    command_tag: Option<String>,
    transaction_status: TransactionStatus,
}

impl CopyInStateMachine {
    /// Create a new upload state machine.
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            write_buffer: Vec::new(),
            pending_error: None,
            command_tag: None,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Transaction status from the final ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Command tag from CommandComplete, e.g. `COPY 42`.
    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    /// Rows copied, parsed from the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        let tag = self.command_tag.as_deref()?;
        CommandComplete { tag }.rows_affected()
    }

    /// Whether the exchange reached a clean end.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Send the COPY ... FROM STDIN command.
    pub fn start(&mut self, command: &str) -> Result<Action<'_>> {
        if self.state != State::Initial {
            return Err(Error::InvalidUsage(format!(
                "copy upload already started (state {:?})",
                self.state
            )));
        }
        self.write_buffer.clear();
        write_query(&mut self.write_buffer, command);
        self.state = State::CommandSent;
        Ok(Action::WritePacket(&self.write_buffer))
    }

    /// Frame one chunk of COPY payload. Only valid while transferring.
    pub fn push_chunk(&mut self, data: &[u8]) -> Result<Action<'_>> {
        if self.state != State::Transferring {
            return Err(Error::InvalidUsage(format!(
                "cannot push copy data in state {:?}",
                self.state
            )));
        }
        self.write_buffer.clear();
        write_copy_data(&mut self.write_buffer, data);
        Ok(Action::WritePacket(&self.write_buffer))
    }

    /// Close the stream successfully with CopyDone.
    pub fn finish_data(&mut self) -> Result<Action<'_>> {
        if self.state != State::Transferring {
            return Err(Error::InvalidUsage(format!(
                "cannot finish copy data in state {:?}",
                self.state
            )));
        }
        self.write_buffer.clear();
        write_copy_done(&mut self.write_buffer);
        self.state = State::AwaitingCompletion;
        Ok(Action::WritePacket(&self.write_buffer))
    }

    /// Abort the stream with CopyFail; the server will answer with an error
    /// that surfaces once ReadyForQuery has been drained.
    pub fn fail_data(&mut self, message: &str) -> Result<Action<'_>> {
        if self.state != State::Transferring {
            return Err(Error::InvalidUsage(format!(
                "cannot fail copy data in state {:?}",
                self.state
            )));
        }
        self.write_buffer.clear();
        write_copy_fail(&mut self.write_buffer, message);
        self.state = State::AwaitingReady;
        Ok(Action::WritePacket(&self.write_buffer))
    }

    /// Abandon the exchange without further protocol traffic. The connection
    /// is left desynchronized and must not be reused.
    pub fn abort(&mut self) {
        self.state = State::Aborted;
    }

    /// Process one server message.
    pub fn step<'buf>(&'buf mut self, buffer_set: &'buf mut BufferSet) -> Result<Action<'buf>> {
        let type_byte = buffer_set.type_byte;

        if RawMessage::is_async_type(type_byte) {
            let message = parse_async(type_byte, &buffer_set.read_buffer)?;
            return Ok(Action::AsyncMessage(message));
        }

        if type_byte == msg_type::ERROR_RESPONSE {
            let error = ErrorResponse::parse(&buffer_set.read_buffer)?;
            // Hold the error until the server resynchronizes with
            // ReadyForQuery.
            if self.pending_error.is_none() {
                self.pending_error = Some(error.into_error());
            }
            self.state = State::AwaitingReady;
            return Ok(Action::NeedPacket);
        }

        match self.state {
            State::CommandSent => self.handle_command_sent(buffer_set),
            State::AwaitingCompletion => self.handle_completion(buffer_set),
            State::AwaitingReady => self.handle_ready(buffer_set),
            State::Transferring => Err(Error::Protocol(format!(
                "Unexpected message during copy upload: '{}'",
                type_byte as char
            ))),
            State::Initial | State::Finished | State::Aborted => Err(Error::InvalidUsage(
                format!("step called in state {:?}", self.state),
            )),
        }
    }

    fn handle_command_sent(&mut self, buffer_set: &BufferSet) -> Result<Action<'_>> {
        match buffer_set.type_byte {
            msg_type::COPY_IN_RESPONSE => {
                CopyInResponse::parse(&buffer_set.read_buffer)?;
                self.state = State::Transferring;
                Ok(Action::TransferGranted)
            }
            other => Err(Error::Protocol(format!(
                "Expected CopyInResponse, got '{}'",
                other as char
            ))),
        }
    }

    fn handle_completion(&mut self, buffer_set: &BufferSet) -> Result<Action<'_>> {
        match buffer_set.type_byte {
            msg_type::COMMAND_COMPLETE => {
                let complete = CommandComplete::parse(&buffer_set.read_buffer)?;
                self.command_tag = Some(complete.tag.to_owned());
                self.state = State::AwaitingReady;
                Ok(Action::NeedPacket)
            }
            other => Err(Error::Protocol(format!(
                "Expected CommandComplete, got '{}'",
                other as char
            ))),
        }
    }

    fn handle_ready(&mut self, buffer_set: &BufferSet) -> Result<Action<'_>> {
        if buffer_set.type_byte != msg_type::READY_FOR_QUERY {
            // While draining toward an error report, discard whatever the
            // server still had in flight. On the success path nothing may
            // come between CommandComplete and ReadyForQuery.
            if self.pending_error.is_some() {
                return Ok(Action::NeedPacket);
            }
            return Err(Error::Protocol(format!(
                "Expected ReadyForQuery, got '{}'",
                buffer_set.type_byte as char
            )));
        }

        let ready = ReadyForQuery::parse(&buffer_set.read_buffer)?;
        self.transaction_status = ready.transaction_status().unwrap_or_default();
        self.state = State::Finished;
        match self.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(Action::Finished),
        }
    }
}

impl Default for CopyInStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
