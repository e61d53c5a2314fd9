//! Echo service: connectivity checks, usable before login.

use super::TRANS_ID;
use crate::protocol::field::{field, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::{Direction, ProtocolError, ServiceId};

/// Largest echoed payload.
pub const MAX_ECHO: usize = 64 * 1024;

/// Client to server opcodes.
pub mod cli2srv {
    /// Timing probe.
    pub const PING_REQUEST: u16 = 0;
    /// Payload to reflect.
    pub const ECHO_REQUEST: u16 = 1;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Timing probe reply.
    pub const PING_REPLY: u16 = 0;
    /// Reflected payload.
    pub const ECHO_REPLY: u16 = 1;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Echo",
    owner: TableOwner::Service(ServiceId::Echo),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::PING_REQUEST, name: "PingRequest", since: 1, fields: &[field("ping_time_ms", U32)] },
        MessageDef { opcode: cli2srv::ECHO_REQUEST, name: "EchoRequest", since: 1, fields: &[
            TRANS_ID,
            field("payload", Bytes { max: MAX_ECHO }),
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Echo2Cli",
    owner: TableOwner::Service(ServiceId::Echo),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::PING_REPLY, name: "PingReply", since: 1, fields: &[
            field("ping_time_ms", U32),
            field("server_time_ms", U64),
        ] },
        MessageDef { opcode: srv2cli::ECHO_REPLY, name: "EchoReply", since: 1, fields: &[
            TRANS_ID,
            field("payload", Bytes { max: MAX_ECHO }),
        ] },
    ],
};

/// Timing probe.
pub fn ping_request(ping_time_ms: u32) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::PING_REQUEST, vec![ping_time_ms.into()])
}

/// Payload to reflect.
pub fn echo_request(trans_id: u32, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::ECHO_REQUEST, vec![trans_id.into(), Value::Bytes(payload)])
}

/// Timing probe reply stamped with server wall-clock time.
pub fn ping_reply(ping_time_ms: u32) -> Result<Message, ProtocolError> {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    Message::new(&SRV2CLI, srv2cli::PING_REPLY, vec![ping_time_ms.into(), now.into()])
}

/// Reflected payload.
pub fn echo_reply(trans_id: u32, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::ECHO_REPLY, vec![trans_id.into(), Value::Bytes(payload)])
}
