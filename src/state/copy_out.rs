//! COPY TO STDOUT (download) state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::{
    CommandComplete, CopyData, CopyDone, CopyOutResponse, ErrorResponse, RawMessage, ReadyForQuery,
    msg_type,
};
use crate::protocol::frontend::write_query;
use crate::protocol::types::TransactionStatus;

use super::action::Action;
use super::parse_async;

/// Copy download state machine state.
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

/// State machine for downloading a COPY data stream.
///
/// After [`start`](Self::start), each `step` yields `Payload` for every
/// incoming data frame; the borrow is only valid until the next read. The
/// stream ends with CopyDone, CommandComplete and ReadyForQuery, at which
/// point `step` returns `Finished`.
pub struct CopyOutStateMachine {
    state: State,
    write_buffer: Vec<u8>,
    pending_error: Option<Error>,
    command_tag: Option<String>,
    transaction_status: TransactionStatus,
}

impl CopyOutStateMachine {
    /// Create a new download state machine.
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

    /// Send the COPY ... TO STDOUT command.
    pub fn start(&mut self, command: &str) -> Result<Action<'_>> {
        if self.state != State::Initial {
            return Err(Error::InvalidUsage(format!(
                "copy download already started (state {:?})",
                self.state
            )));
        }
        self.write_buffer.clear();
        write_query(&mut self.write_buffer, command);
        self.state = State::CommandSent;
        Ok(Action::WritePacket(&self.write_buffer))
    }

    /// Abandon the exchange without draining the stream. The connection is
    /// left desynchronized and must not be reused.
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
            if self.pending_error.is_none() {
                self.pending_error = Some(error.into_error());
            }
            self.state = State::AwaitingReady;
            return Ok(Action::NeedPacket);
        }

        match self.state {
            State::CommandSent => match type_byte {
                msg_type::COPY_OUT_RESPONSE => {
                    CopyOutResponse::parse(&buffer_set.read_buffer)?;
                    self.state = State::Transferring;
                    Ok(Action::TransferGranted)
                }
                other => Err(Error::Protocol(format!(
                    "Expected CopyOutResponse, got '{}'",
                    other as char
                ))),
            },
            State::Transferring => match type_byte {
                msg_type::COPY_DATA => {
                    let data = CopyData::parse(&buffer_set.read_buffer)?;
                    Ok(Action::Payload(data.data))
                }
                msg_type::COPY_DONE => {
                    CopyDone::parse(&buffer_set.read_buffer)?;
                    self.state = State::AwaitingCompletion;
                    Ok(Action::NeedPacket)
                }
                other => Err(Error::Protocol(format!(
                    "Unexpected message during copy download: '{}'",
                    other as char
                ))),
            },
            State::AwaitingCompletion => match type_byte {
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
            },
            State::AwaitingReady => self.handle_ready(buffer_set),
            State::Initial | State::Finished | State::Aborted => Err(Error::InvalidUsage(
                format!("step called in state {:?}", self.state),
            )),
        }
    }

    fn handle_ready(&mut self, buffer_set: &BufferSet) -> Result<Action<'_>> {
        if buffer_set.type_byte != msg_type::READY_FOR_QUERY {
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

impl Default for CopyOutStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
