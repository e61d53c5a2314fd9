//! Tic-tac-toe sub-protocol.

use crate::protocol::field::{field, FieldKind::*};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::services::game::GameType;
use crate::protocol::{Direction, ProtocolError};

/// Terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TttResult {
    /// `winner` completed a line.
    WinnerDecided = 0,
    /// Board full with no line.
    Tied = 1,
    /// The other player left; `winner` is the one who stayed.
    OpponentLeft = 2,
    /// The server could not continue the game.
    ServerError = 3,
}

impl TttResult {
    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TttResult::WinnerDecided),
            1 => Some(TttResult::Tied),
            2 => Some(TttResult::OpponentLeft),
            3 => Some(TttResult::ServerError),
            _ => None,
        }
    }
}

/// Client to server opcodes.
pub mod cli2srv {
    /// Claim a cell.
    pub const MAKE_MOVE: u16 = 0;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Both seats filled; X moves first.
    pub const GAME_STARTED: u16 = 0;
    /// A cell was claimed.
    pub const MOVE_MADE: u16 = 1;
    /// The game ended.
    pub const GAME_OVER: u16 = 2;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Ttt",
    owner: TableOwner::Game(GameType::Ttt),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::MAKE_MOVE, name: "MakeMove", since: 1, fields: &[
            field("row", U8),
            field("col", U8),
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Ttt2Cli",
    owner: TableOwner::Game(GameType::Ttt),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::GAME_STARTED, name: "GameStarted", since: 1, fields: &[
            field("x_player", U32),
            field("o_player", U32),
        ] },
        MessageDef { opcode: srv2cli::MOVE_MADE, name: "MoveMade", since: 1, fields: &[
            field("player_id", U32),
            field("row", U8),
            field("col", U8),
        ] },
        MessageDef { opcode: srv2cli::GAME_OVER, name: "GameOver", since: 1, fields: &[
            field("result", U8),
            field("winner", U32),
        ] },
    ],
};

/// Claim request.
pub fn make_move(row: u8, col: u8) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::MAKE_MOVE, vec![row.into(), col.into()])
}

/// Start notice.
pub fn game_started(x_player: u32, o_player: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_STARTED, vec![x_player.into(), o_player.into()])
}

/// Claim notice.
pub fn move_made(player_id: u32, row: u8, col: u8) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::MOVE_MADE, vec![player_id.into(), row.into(), col.into()])
}

/// End notice; `winner` is 0 when there is none.
pub fn game_over(result: TttResult, winner: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_OVER, vec![(result as u8).into(), winner.into()])
}
