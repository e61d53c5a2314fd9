//! Customer-service service: operator commands against a running server.

use super::{RESULT, TRANS_ID};
use crate::protocol::field::{field, FieldKind::*};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::{Direction, NetResult, ProtocolError, ServiceId};

/// Longest command line.
pub const MAX_COMMAND: usize = 1024;
/// Longest command output.
pub const MAX_OUTPUT: usize = 16 * 1024;

/// Client to server opcodes.
pub mod cli2srv {
    /// Keepalive.
    pub const PING_REQUEST: u16 = 0;
    /// Run a command.
    pub const EXECUTE_COMMAND: u16 = 1;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Keepalive reply.
    pub const PING_REPLY: u16 = 0;
    /// Command output.
    pub const COMMAND_REPLY: u16 = 1;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Csr",
    owner: TableOwner::Service(ServiceId::Csr),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::PING_REQUEST, name: "PingRequest", since: 1, fields: &[
            TRANS_ID,
            field("ping_time_ms", U32),
        ] },
        MessageDef { opcode: cli2srv::EXECUTE_COMMAND, name: "ExecuteCommand", since: 1, fields: &[
            TRANS_ID,
            field("command", Str { max: MAX_COMMAND }),
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Csr2Cli",
    owner: TableOwner::Service(ServiceId::Csr),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::PING_REPLY, name: "PingReply", since: 1, fields: &[
            TRANS_ID,
            field("ping_time_ms", U32),
        ] },
        MessageDef { opcode: srv2cli::COMMAND_REPLY, name: "CommandReply", since: 1, fields: &[
            TRANS_ID,
            RESULT,
            field("output", Str { max: MAX_OUTPUT }),
        ] },
    ],
};

/// Command request.
pub fn execute_command(trans_id: u32, command: &str) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::EXECUTE_COMMAND, vec![trans_id.into(), command.into()])
}

/// Command output, cut to the field limit on a character boundary.
pub fn command_reply(trans_id: u32, result: NetResult, output: &str) -> Result<Message, ProtocolError> {
    let mut units = 0;
    let clipped: String = output
        .chars()
        .take_while(|c| {
            units += c.len_utf16();
            units <= MAX_OUTPUT
        })
        .collect();
    Message::new(&SRV2CLI, srv2cli::COMMAND_REPLY, vec![
        trans_id.into(),
        result.into(),
        clipped.into(),
    ])
}

/// Keepalive reply.
pub fn ping_reply(trans_id: u32, ping_time_ms: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::PING_REPLY, vec![trans_id.into(), ping_time_ms.into()])
}
