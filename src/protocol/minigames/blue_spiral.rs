//! BlueSpiral: reproduce a cloth sequence before the door closes.

use crate::protocol::field::{field, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::services::game::GameType;
use crate::protocol::{Direction, ProtocolError};

/// Distinct cloths.
pub const CLOTHS: u8 = 7;
/// Upper bound on a configured sequence length.
pub const MAX_SEQUENCE: usize = 32;

/// Client to server opcodes.
pub mod cli2srv {
    /// Open the door and start the clock.
    pub const START_GAME: u16 = 0;
    /// Touch a cloth.
    pub const HIT_CLOTH: u16 = 1;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// The sequence for the next round.
    pub const CLOTH_ORDER: u16 = 0;
    /// Round started.
    pub const GAME_STARTED: u16 = 1;
    /// Correct cloth.
    pub const SUCCESSFUL_HIT: u16 = 2;
    /// Whole sequence reproduced.
    pub const GAME_WON: u16 = 3;
    /// Wrong cloth or time ran out.
    pub const GAME_OVER: u16 = 4;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2BlueSpiral",
    owner: TableOwner::Game(GameType::BlueSpiral),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::START_GAME, name: "StartGame", since: 1, fields: &[] },
        MessageDef { opcode: cli2srv::HIT_CLOTH, name: "HitCloth", since: 1, fields: &[field("cloth", U8)] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "BlueSpiral2Cli",
    owner: TableOwner::Game(GameType::BlueSpiral),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::CLOTH_ORDER, name: "ClothOrder", since: 1, fields: &[
            field("order", Bytes { max: MAX_SEQUENCE }),
        ] },
        MessageDef { opcode: srv2cli::GAME_STARTED, name: "GameStarted", since: 1, fields: &[
            field("start_spin", U8),
            field("time_limit_ms", U32),
        ] },
        MessageDef { opcode: srv2cli::SUCCESSFUL_HIT, name: "SuccessfulHit", since: 1, fields: &[field("hits", U8)] },
        MessageDef { opcode: srv2cli::GAME_WON, name: "GameWon", since: 1, fields: &[] },
        MessageDef { opcode: srv2cli::GAME_OVER, name: "GameOver", since: 1, fields: &[field("timed_out", U8)] },
    ],
};

/// Start request.
pub fn start_game() -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::START_GAME, Vec::new())
}

/// Touch.
pub fn hit_cloth(cloth: u8) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::HIT_CLOTH, vec![cloth.into()])
}

/// Sequence notice.
pub fn cloth_order(order: &[u8]) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::CLOTH_ORDER, vec![Value::Bytes(order.to_vec())])
}

/// Round start notice.
pub fn game_started(start_spin: bool, time_limit_ms: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_STARTED, vec![start_spin.into(), time_limit_ms.into()])
}

/// Hit notice.
pub fn successful_hit(hits: u8) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::SUCCESSFUL_HIT, vec![hits.into()])
}

/// Win notice.
pub fn game_won() -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_WON, Vec::new())
}

/// Loss notice.
pub fn game_over(timed_out: bool) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_OVER, vec![timed_out.into()])
}
