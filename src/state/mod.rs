//! Sans-I/O protocol state machines.
//!
//! Machines never touch a socket. The driver reads one framed message into a
//! [`BufferSet`](crate::buffer_set::BufferSet), calls `step`, and performs
//! the returned [`Action`]; outgoing frames come back as `WritePacket`
//! borrows of the machine's write buffer.

pub mod action;
pub mod copy_in;
pub mod copy_out;

pub use action::{Action, AsyncMessage};
pub use copy_in::CopyInStateMachine;
pub use copy_out::CopyOutStateMachine;

use crate::error::{Error, Result};
use crate::protocol::backend::{NoticeResponse, NotificationResponse, ParameterStatus, msg_type};

/// Parse an asynchronous message into its owned form.
///
/// Notice, parameter status and notification frames can arrive between any
/// two protocol messages and never advance a state machine.
pub(crate) fn parse_async(type_byte: u8, payload: &[u8]) -> Result<AsyncMessage> {
    match type_byte {
        msg_type::NOTICE_RESPONSE => {
            let notice = NoticeResponse::parse(payload)?;
            Ok(AsyncMessage::Notice(notice.fields))
        }
        msg_type::PARAMETER_STATUS => {
            let param = ParameterStatus::parse(payload)?;
            Ok(AsyncMessage::ParameterChanged {
                name: param.name.to_owned(),
                value: param.value.to_owned(),
            })
        }
        msg_type::NOTIFICATION_RESPONSE => {
            let notification = NotificationResponse::parse(payload)?;
            Ok(AsyncMessage::Notification {
                pid: notification.pid,
                channel: notification.channel.to_owned(),
                payload: notification.payload.to_owned(),
            })
        }
        _ => Err(Error::Protocol(format!(
            "Unknown async message type: '{}'",
            type_byte as char
        ))),
    }
}
