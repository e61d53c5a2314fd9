//! Heek: rock-paper-scissors elimination at a five-seat table.

use serde::{Deserialize, Serialize};

use crate::protocol::field::{field, FieldKind::*};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::services::game::GameType;
use crate::protocol::{Direction, ProtocolError};

/// Seats at a table.
pub const SEATS: u8 = 5;

/// A throw. `a` beats `b` iff `(a - b) mod 3 == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Choice {
    /// Rock.
    Rock = 0,
    /// Paper.
    Paper = 1,
    /// Scissors.
    Scissors = 2,
}

impl Choice {
    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Choice::Rock),
            1 => Some(Choice::Paper),
            2 => Some(Choice::Scissors),
            _ => None,
        }
    }

    /// Whether `self` beats `other`.
    pub fn beats(self, other: Choice) -> bool {
        (self as u8 + 3 - other as u8) % 3 == 1
    }
}

/// Seat light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LightState {
    /// Seated and still in the game.
    On = 0,
    /// Empty or eliminated.
    Off = 1,
    /// Won the last round.
    Flashing = 2,
}

/// Table countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CountdownState {
    /// Countdown started by the first choice of a round.
    Start = 0,
    /// Choices are closed.
    Stop = 1,
    /// No round running.
    Idle = 2,
}

/// Client to server opcodes.
pub mod cli2srv {
    /// Sit at a seat.
    pub const PLAY_GAME: u16 = 0;
    /// Stand up.
    pub const LEAVE_GAME: u16 = 1;
    /// Throw.
    pub const CHOOSE: u16 = 2;
    /// Client finished playing a reveal animation.
    pub const SEQUENCE_FINISHED: u16 = 3;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Reply to a sit request.
    pub const PLAY_GAME: u16 = 0;
    /// Reply to a stand request.
    pub const GOODBYE: u16 = 1;
    /// Someone sat down.
    pub const WELCOME: u16 = 2;
    /// A seat emptied.
    pub const DROP: u16 = 3;
    /// Seat light change.
    pub const LIGHT_STATE: u16 = 4;
    /// Enable or disable the throw buttons.
    pub const INTERFACE_STATE: u16 = 5;
    /// Countdown change.
    pub const COUNTDOWN_STATE: u16 = 6;
    /// Round outcome for one player.
    pub const WIN_LOSE: u16 = 7;
    /// Game outcome.
    pub const GAME_WIN: u16 = 8;
    /// Point total change.
    pub const POINT_UPDATE: u16 = 9;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Heek",
    owner: TableOwner::Game(GameType::Heek),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::PLAY_GAME, name: "PlayGame", since: 1, fields: &[
            field("position", U8),
            field("points", U32),
            field("name", Str { max: 40 }),
        ] },
        MessageDef { opcode: cli2srv::LEAVE_GAME, name: "LeaveGame", since: 1, fields: &[] },
        MessageDef { opcode: cli2srv::CHOOSE, name: "Choose", since: 1, fields: &[field("choice", U8)] },
        MessageDef { opcode: cli2srv::SEQUENCE_FINISHED, name: "SequenceFinished", since: 1, fields: &[
            field("sequence", U8),
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Heek2Cli",
    owner: TableOwner::Game(GameType::Heek),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::PLAY_GAME, name: "PlayGame", since: 1, fields: &[
            field("is_playing", U8),
            field("is_single_player", U8),
            field("enable_buttons", U8),
        ] },
        MessageDef { opcode: srv2cli::GOODBYE, name: "Goodbye", since: 1, fields: &[] },
        MessageDef { opcode: srv2cli::WELCOME, name: "Welcome", since: 1, fields: &[
            field("position", U8),
            field("points", U32),
            field("rank", U32),
            field("name", Str { max: 40 }),
        ] },
        MessageDef { opcode: srv2cli::DROP, name: "Drop", since: 1, fields: &[field("position", U8)] },
        MessageDef { opcode: srv2cli::LIGHT_STATE, name: "LightState", since: 1, fields: &[
            field("light_num", U8),
            field("state", U8),
        ] },
        MessageDef { opcode: srv2cli::INTERFACE_STATE, name: "InterfaceState", since: 1, fields: &[
            field("buttons_enabled", U8),
        ] },
        MessageDef { opcode: srv2cli::COUNTDOWN_STATE, name: "CountdownState", since: 1, fields: &[field("state", U8)] },
        MessageDef { opcode: srv2cli::WIN_LOSE, name: "WinLose", since: 1, fields: &[
            field("win", U8),
            field("choice", U8),
        ] },
        MessageDef { opcode: srv2cli::GAME_WIN, name: "GameWin", since: 1, fields: &[
            field("position", U8),
            field("choice", U8),
        ] },
        MessageDef { opcode: srv2cli::POINT_UPDATE, name: "PointUpdate", since: 2, fields: &[
            field("display_update", U8),
            field("points", U32),
            field("rank", U32),
        ] },
    ],
};

/// Sit request.
pub fn play_game(position: u8, points: u32, name: &str) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::PLAY_GAME, vec![position.into(), points.into(), name.into()])
}

/// Stand request.
pub fn leave_game() -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::LEAVE_GAME, Vec::new())
}

/// Throw.
pub fn choose(choice: Choice) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::CHOOSE, vec![(choice as u8).into()])
}

/// Animation done.
pub fn sequence_finished(sequence: u8) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::SEQUENCE_FINISHED, vec![sequence.into()])
}

/// Sit reply.
pub fn play_game_reply(
    is_playing: bool,
    is_single_player: bool,
    enable_buttons: bool,
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::PLAY_GAME, vec![
        is_playing.into(),
        is_single_player.into(),
        enable_buttons.into(),
    ])
}

/// Stand reply.
pub fn goodbye() -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GOODBYE, Vec::new())
}

/// New arrival notice.
pub fn welcome(position: u8, points: u32, rank: u32, name: &str) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::WELCOME, vec![
        position.into(),
        points.into(),
        rank.into(),
        name.into(),
    ])
}

/// Seat emptied notice.
pub fn drop(position: u8) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::DROP, vec![position.into()])
}

/// Light change.
pub fn light_state(light_num: u8, state: LightState) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::LIGHT_STATE, vec![light_num.into(), (state as u8).into()])
}

/// Button state.
pub fn interface_state(buttons_enabled: bool) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::INTERFACE_STATE, vec![buttons_enabled.into()])
}

/// Countdown change.
pub fn countdown_state(state: CountdownState) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::COUNTDOWN_STATE, vec![(state as u8).into()])
}

/// Round outcome. `choice` is the throw that decided it.
pub fn win_lose(win: bool, choice: Choice) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::WIN_LOSE, vec![win.into(), (choice as u8).into()])
}

/// Game outcome.
pub fn game_win(position: u8, choice: Choice) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_WIN, vec![position.into(), (choice as u8).into()])
}

/// Point total.
pub fn point_update(display: bool, points: u32, rank: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::POINT_UPDATE, vec![display.into(), points.into(), rank.into()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_rule() {
        use Choice::*;
        assert!(Rock.beats(Scissors));
        assert!(Scissors.beats(Paper));
        assert!(Paper.beats(Rock));
        for c in [Rock, Paper, Scissors] {
            assert!(!c.beats(c));
        }
        assert!(!Scissors.beats(Rock));
    }
}
