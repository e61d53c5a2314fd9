//! GateKeeper service: tells unauthenticated clients where to connect.

use super::TRANS_ID;
use crate::protocol::field::{field, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::{Direction, ProtocolError, ServiceId};

/// Client to server opcodes.
pub mod cli2srv {
    /// Keepalive.
    pub const PING_REQUEST: u16 = 0;
    /// Ask for a file server address.
    pub const FILE_SRV_IP_ADDRESS_REQUEST: u16 = 1;
    /// Ask for an auth server address.
    pub const AUTH_SRV_IP_ADDRESS_REQUEST: u16 = 2;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Keepalive reply.
    pub const PING_REPLY: u16 = 0;
    /// File server address.
    pub const FILE_SRV_IP_ADDRESS_REPLY: u16 = 1;
    /// Auth server address.
    pub const AUTH_SRV_IP_ADDRESS_REPLY: u16 = 2;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2GateKeeper",
    owner: TableOwner::Service(ServiceId::GateKeeper),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::PING_REQUEST, name: "PingRequest", since: 1, fields: &[
            TRANS_ID,
            field("ping_time_ms", U32),
            field("payload", Bytes { max: 64 * 1024 }),
        ] },
        MessageDef { opcode: cli2srv::FILE_SRV_IP_ADDRESS_REQUEST, name: "FileSrvIpAddressRequest", since: 1, fields: &[
            TRANS_ID,
            field("is_patcher", U8),
        ] },
        MessageDef { opcode: cli2srv::AUTH_SRV_IP_ADDRESS_REQUEST, name: "AuthSrvIpAddressRequest", since: 1, fields: &[
            TRANS_ID,
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "GateKeeper2Cli",
    owner: TableOwner::Service(ServiceId::GateKeeper),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::PING_REPLY, name: "PingReply", since: 1, fields: &[
            TRANS_ID,
            field("ping_time_ms", U32),
            field("payload", Bytes { max: 64 * 1024 }),
        ] },
        MessageDef { opcode: srv2cli::FILE_SRV_IP_ADDRESS_REPLY, name: "FileSrvIpAddressReply", since: 1, fields: &[
            TRANS_ID,
            field("address", Str { max: 256 }),
        ] },
        MessageDef { opcode: srv2cli::AUTH_SRV_IP_ADDRESS_REPLY, name: "AuthSrvIpAddressReply", since: 1, fields: &[
            TRANS_ID,
            field("address", Str { max: 256 }),
        ] },
    ],
};

/// Address request for a file (`FILE_SRV_IP_ADDRESS_REQUEST`) or auth server.
pub fn address_request(opcode: u16, trans_id: u32) -> Result<Message, ProtocolError> {
    let fields = match opcode {
        cli2srv::FILE_SRV_IP_ADDRESS_REQUEST => vec![trans_id.into(), false.into()],
        _ => vec![trans_id.into()],
    };
    Message::new(&CLI2SRV, opcode, fields)
}

/// Address reply.
pub fn address_reply(opcode: u16, trans_id: u32, address: &str) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, opcode, vec![trans_id.into(), address.into()])
}

/// Keepalive reply echoing the request.
pub fn ping_reply(trans_id: u32, ping_time_ms: u32, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::PING_REPLY, vec![
        trans_id.into(),
        ping_time_ms.into(),
        Value::Bytes(payload),
    ])
}
