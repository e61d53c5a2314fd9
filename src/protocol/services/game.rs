//! Game service: session management and the carrier for mini-game traffic.
//!
//! Mini-game messages are encoded with their own sub-tables and travel as
//! the `body` of a `GameMsg`, tagged with the session's game id.

use serde::{Deserialize, Serialize};

use super::{RESULT, TRANS_ID};
use crate::protocol::field::{field, FieldDef, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::table::ProtocolTables;
use crate::protocol::{Direction, NetResult, ProtocolError, ServiceId};

/// Largest mini-game message body.
pub const MAX_GAME_BODY: usize = 16 * 1024;

/// Mini-game kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GameType {
    /// Rock-paper-scissors elimination.
    Heek = 1,
    /// Tic-tac-toe.
    Ttt = 2,
    /// Cloth sequence reproduction.
    BlueSpiral = 3,
    /// Two-team blocker wall.
    ClimbingWall = 4,
    /// Marker quests and captures.
    Marker = 5,
    /// Shared variables.
    VarSync = 6,
}

impl GameType {
    /// Every game type.
    pub const ALL: [GameType; 6] = [
        GameType::Heek,
        GameType::Ttt,
        GameType::BlueSpiral,
        GameType::ClimbingWall,
        GameType::Marker,
        GameType::VarSync,
    ];

    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Self::ALL
            .iter()
            .copied()
            .find(|g| *g as u8 == value)
            .ok_or(ProtocolError::UnknownGameType(value))
    }
}

const GAME_ID: FieldDef = field("game_id", U32);
const GAME_TYPE: FieldDef = field("game_type", U8);
const PLAYER_ID: FieldDef = field("player_id", U32);

/// Client to server opcodes.
pub mod cli2srv {
    /// Keepalive.
    pub const PING_REQUEST: u16 = 0;
    /// Create and join a new session.
    pub const GAME_CREATE_REQUEST: u16 = 1;
    /// Join an existing session.
    pub const GAME_JOIN_REQUEST: u16 = 2;
    /// Leave a session.
    pub const GAME_LEAVE_REQUEST: u16 = 3;
    /// Mini-game input.
    pub const GAME_MSG: u16 = 4;
    /// Join the shared session for a table, creating it if needed.
    pub const GAME_JOIN_COMMON_REQUEST: u16 = 5;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Keepalive reply.
    pub const PING_REPLY: u16 = 0;
    /// Creation result.
    pub const GAME_CREATE_REPLY: u16 = 1;
    /// Join result.
    pub const GAME_JOIN_REPLY: u16 = 2;
    /// Leave result.
    pub const GAME_LEAVE_REPLY: u16 = 3;
    /// Mini-game output.
    pub const GAME_MSG: u16 = 4;
    /// A player took a seat.
    pub const PLAYER_JOINED: u16 = 5;
    /// A player gave up a seat.
    pub const PLAYER_LEFT: u16 = 6;
    /// Session ownership moved.
    pub const OWNER_CHANGED: u16 = 7;
    /// Session lifecycle phase changed.
    pub const PHASE_CHANGED: u16 = 8;
    /// Common table join result.
    pub const GAME_JOIN_COMMON_REPLY: u16 = 9;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Game",
    owner: TableOwner::Service(ServiceId::Game),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::PING_REQUEST, name: "PingRequest", since: 1, fields: &[field("ping_time_ms", U32)] },
        MessageDef { opcode: cli2srv::GAME_CREATE_REQUEST, name: "GameCreateRequest", since: 1, fields: &[
            TRANS_ID,
            GAME_TYPE,
            field("param0", U32),
            field("param1", U32),
            field("name", Str { max: 64 }),
        ] },
        MessageDef { opcode: cli2srv::GAME_JOIN_REQUEST, name: "GameJoinRequest", since: 1, fields: &[TRANS_ID, GAME_ID] },
        MessageDef { opcode: cli2srv::GAME_LEAVE_REQUEST, name: "GameLeaveRequest", since: 1, fields: &[TRANS_ID, GAME_ID] },
        MessageDef { opcode: cli2srv::GAME_MSG, name: "GameMsg", since: 1, fields: &[
            GAME_ID,
            field("msg_id", U16),
            field("body", Bytes { max: MAX_GAME_BODY }),
        ] },
        MessageDef { opcode: cli2srv::GAME_JOIN_COMMON_REQUEST, name: "GameJoinCommonRequest", since: 2, fields: &[
            TRANS_ID,
            GAME_TYPE,
            field("table_id", U32),
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Game2Cli",
    owner: TableOwner::Service(ServiceId::Game),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::PING_REPLY, name: "PingReply", since: 1, fields: &[field("ping_time_ms", U32)] },
        MessageDef { opcode: srv2cli::GAME_CREATE_REPLY, name: "GameCreateReply", since: 1, fields: &[
            TRANS_ID, RESULT, GAME_ID, GAME_TYPE,
        ] },
        MessageDef { opcode: srv2cli::GAME_JOIN_REPLY, name: "GameJoinReply", since: 1, fields: &[
            TRANS_ID, RESULT, GAME_ID, GAME_TYPE,
        ] },
        MessageDef { opcode: srv2cli::GAME_LEAVE_REPLY, name: "GameLeaveReply", since: 1, fields: &[TRANS_ID, RESULT] },
        MessageDef { opcode: srv2cli::GAME_MSG, name: "GameMsg", since: 1, fields: &[
            GAME_ID,
            field("msg_id", U16),
            field("body", Bytes { max: MAX_GAME_BODY }),
        ] },
        MessageDef { opcode: srv2cli::PLAYER_JOINED, name: "PlayerJoined", since: 1, fields: &[GAME_ID, PLAYER_ID] },
        MessageDef { opcode: srv2cli::PLAYER_LEFT, name: "PlayerLeft", since: 1, fields: &[GAME_ID, PLAYER_ID] },
        MessageDef { opcode: srv2cli::OWNER_CHANGED, name: "OwnerChanged", since: 1, fields: &[
            GAME_ID,
            field("owner_id", U32),
        ] },
        MessageDef { opcode: srv2cli::PHASE_CHANGED, name: "PhaseChanged", since: 1, fields: &[
            GAME_ID,
            field("phase", U8),
        ] },
        MessageDef { opcode: srv2cli::GAME_JOIN_COMMON_REPLY, name: "GameJoinCommonReply", since: 2, fields: &[
            TRANS_ID, RESULT, GAME_ID, GAME_TYPE,
        ] },
    ],
};

// ============================================================================
// Mini-game carrier
// ============================================================================

/// Wrap a mini-game message for `game_id`.
pub fn wrap(game_id: u32, inner: &Message) -> Result<Message, ProtocolError> {
    let (table, opcode) = match inner.table().direction {
        Direction::ClientToServer => (&CLI2SRV, cli2srv::GAME_MSG),
        Direction::ServerToClient => (&SRV2CLI, srv2cli::GAME_MSG),
    };
    Message::new(table, opcode, vec![
        game_id.into(),
        inner.opcode().into(),
        Value::Bytes(inner.encode_body()?),
    ])
}

/// Decode the mini-game message inside a `GameMsg`.
pub fn unwrap(
    tables: &ProtocolTables,
    game: GameType,
    carrier: &Message,
) -> Result<Message, ProtocolError> {
    let direction = carrier.table().direction;
    tables
        .game(game, direction)
        .decode(carrier.u16("msg_id")?, carrier.bytes("body")?)
}

// ============================================================================
// Constructors
// ============================================================================

/// Create request.
pub fn create_request(
    trans_id: u32,
    game: GameType,
    param0: u32,
    param1: u32,
    name: &str,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::GAME_CREATE_REQUEST, vec![
        trans_id.into(),
        (game as u8).into(),
        param0.into(),
        param1.into(),
        name.into(),
    ])
}

/// Join or leave request.
pub fn session_request(opcode: u16, trans_id: u32, game_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, opcode, vec![trans_id.into(), game_id.into()])
}

/// Common table join request.
pub fn join_common_request(
    trans_id: u32,
    game: GameType,
    table_id: u32,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::GAME_JOIN_COMMON_REQUEST, vec![
        trans_id.into(),
        (game as u8).into(),
        table_id.into(),
    ])
}

/// Create, join or join-common result.
pub fn session_reply(
    opcode: u16,
    trans_id: u32,
    result: NetResult,
    game_id: u32,
    game: Option<GameType>,
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, opcode, vec![
        trans_id.into(),
        result.into(),
        game_id.into(),
        game.map(|g| g as u8).unwrap_or(0).into(),
    ])
}

/// Leave result.
pub fn leave_reply(trans_id: u32, result: NetResult) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_LEAVE_REPLY, vec![trans_id.into(), result.into()])
}

/// Seat notice: joined, left or owner change.
pub fn seat_notice(opcode: u16, game_id: u32, player_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, opcode, vec![game_id.into(), player_id.into()])
}

/// Lifecycle notice.
pub fn phase_changed(game_id: u32, phase: u8) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::PHASE_CHANGED, vec![game_id.into(), phase.into()])
}

/// Keepalive reply.
pub fn ping_reply(ping_time_ms: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::PING_REPLY, vec![ping_time_ms.into()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::minigames::ttt;
    use crate::protocol::PROTOCOL_VERSION;

    #[test]
    fn test_game_type_bytes() {
        for game in GameType::ALL {
            assert_eq!(GameType::from_u8(game as u8).unwrap(), game);
        }
        assert_eq!(GameType::from_u8(0), Err(ProtocolError::UnknownGameType(0)));
    }

    #[test]
    fn test_wrap_unwrap_minigame_message() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let inner = ttt::make_move(1, 2).unwrap();
        let carrier = wrap(42, &inner).unwrap();
        assert_eq!(carrier.table().name, "Cli2Game");
        assert_eq!(carrier.u32("game_id").unwrap(), 42);
        assert_eq!(unwrap(&tables, GameType::Ttt, &carrier).unwrap(), inner);
    }
}
