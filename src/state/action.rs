//! Actions returned by state machines to their driver.

use crate::error::ErrorFields;

/// What the driver must do next.
#[derive(Debug)]
pub enum Action<'a> {
    /// Write these bytes to the server
    WritePacket(&'a [u8]),
    /// Read the next message and call `step` again
    NeedPacket,
    /// The server granted the transfer; the data plane is now open
    TransferGranted,
    /// One chunk of incoming COPY payload, valid until the next read
    Payload(&'a [u8]),
    /// An async message arrived; surface it and read the next message
    AsyncMessage(AsyncMessage),
    /// The exchange is complete
    Finished,
}

/// Owned form of the asynchronous messages the server may interleave.
#[derive(Debug, Clone)]
pub enum AsyncMessage {
    /// NOTIFY payload from LISTEN/NOTIFY
    Notification {
        /// PID of the notifying backend
        pid: u32,
        /// Channel name
        channel: String,
        /// Notification payload
        payload: String,
    },
    /// Server notice (warnings, informational messages)
    Notice(ErrorFields),
    /// A run-time parameter changed
    ParameterChanged {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },
}
