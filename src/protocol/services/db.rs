//! Database passthrough service.
//!
//! Requests carry an opaque typed payload that the server hands to its
//! storage backend. Only operators may use it.

use super::{RESULT, TRANS_ID};
use crate::protocol::field::{field, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::{Direction, NetResult, ProtocolError, ServiceId};

/// Largest request or reply payload.
pub const MAX_DB_PAYLOAD: usize = 128 * 1024;

/// Known request types.
pub mod request_type {
    /// List stored node ids.
    pub const LIST_NODES: u32 = 1;
    /// Flush the backend to durable storage.
    pub const FLUSH: u32 = 2;
}

/// Client to server opcodes.
pub mod cli2srv {
    /// Backend request.
    pub const DB_REQUEST: u16 = 0;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Backend reply.
    pub const DB_REPLY: u16 = 0;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Db",
    owner: TableOwner::Service(ServiceId::Db),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::DB_REQUEST, name: "DbRequest", since: 1, fields: &[
            TRANS_ID,
            field("request_type", U32),
            field("payload", Bytes { max: MAX_DB_PAYLOAD }),
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Db2Cli",
    owner: TableOwner::Service(ServiceId::Db),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::DB_REPLY, name: "DbReply", since: 1, fields: &[
            TRANS_ID,
            RESULT,
            field("payload", Bytes { max: MAX_DB_PAYLOAD }),
        ] },
    ],
};

/// Backend request.
pub fn request(trans_id: u32, request_type: u32, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::DB_REQUEST, vec![
        trans_id.into(),
        request_type.into(),
        Value::Bytes(payload),
    ])
}

/// Backend reply.
pub fn reply(trans_id: u32, result: NetResult, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::DB_REPLY, vec![
        trans_id.into(),
        result.into(),
        Value::Bytes(payload),
    ])
}
