//! Marker games: quests and team captures over placed markers.

use serde::{Deserialize, Serialize};

use crate::protocol::field::{field, FieldDef, FieldKind::*};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::services::game::GameType;
use crate::protocol::{Direction, ProtocolError};

/// Longest marker or game name.
pub const MAX_NAME: usize = 128;

/// Win-condition variant, chosen at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MarkerVariant {
    /// Find every marker, no clock.
    Quest = 0,
    /// Find every marker before the clock runs out.
    TimedQuest = 1,
    /// Teams claim markers once; most markers at the end wins.
    Capture = 2,
    /// Teams may steal markers; most held at the end wins.
    CaptureAndHold = 3,
}

impl MarkerVariant {
    /// Parse a wire value.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(MarkerVariant::Quest),
            1 => Some(MarkerVariant::TimedQuest),
            2 => Some(MarkerVariant::Capture),
            3 => Some(MarkerVariant::CaptureAndHold),
            _ => None,
        }
    }

    /// Whether players are split into teams.
    pub fn has_teams(self) -> bool {
        matches!(self, MarkerVariant::Capture | MarkerVariant::CaptureAndHold)
    }
}

const MARKER_ID: FieldDef = field("marker_id", U32);
const NAME: FieldDef = field("name", Str { max: MAX_NAME });
const TIME_LIMIT: FieldDef = field("time_limit_ms", U32);

/// Client to server opcodes.
pub mod cli2srv {
    /// Start the game.
    pub const START_GAME: u16 = 0;
    /// Pause the clock.
    pub const PAUSE_GAME: u16 = 1;
    /// Clear captures and stop.
    pub const RESET_GAME: u16 = 2;
    /// Rename the game.
    pub const CHANGE_GAME_NAME: u16 = 3;
    /// Change the clock.
    pub const CHANGE_TIME_LIMIT: u16 = 4;
    /// Tear the game down.
    pub const DELETE_GAME: u16 = 5;
    /// Place a marker.
    pub const ADD_MARKER: u16 = 6;
    /// Remove a marker.
    pub const DELETE_MARKER: u16 = 7;
    /// Rename a marker.
    pub const CHANGE_MARKER_NAME: u16 = 8;
    /// Claim a marker.
    pub const CAPTURE_MARKER: u16 = 9;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Team of the receiving player.
    pub const TEAM_ASSIGNED: u16 = 0;
    /// Variant of the joined game.
    pub const GAME_TYPE: u16 = 1;
    /// Game started.
    pub const GAME_STARTED: u16 = 2;
    /// Game paused.
    pub const GAME_PAUSED: u16 = 3;
    /// Game reset.
    pub const GAME_RESET: u16 = 4;
    /// Game ended.
    pub const GAME_OVER: u16 = 5;
    /// Name changed.
    pub const GAME_NAME_CHANGED: u16 = 6;
    /// Clock changed.
    pub const TIME_LIMIT_CHANGED: u16 = 7;
    /// Game deleted.
    pub const GAME_DELETED: u16 = 8;
    /// Marker placed.
    pub const MARKER_ADDED: u16 = 9;
    /// Marker removed.
    pub const MARKER_DELETED: u16 = 10;
    /// Marker renamed.
    pub const MARKER_NAME_CHANGED: u16 = 11;
    /// Marker claimed.
    pub const MARKER_CAPTURED: u16 = 12;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Marker",
    owner: TableOwner::Game(GameType::Marker),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::START_GAME, name: "StartGame", since: 1, fields: &[] },
        MessageDef { opcode: cli2srv::PAUSE_GAME, name: "PauseGame", since: 1, fields: &[] },
        MessageDef { opcode: cli2srv::RESET_GAME, name: "ResetGame", since: 1, fields: &[] },
        MessageDef { opcode: cli2srv::CHANGE_GAME_NAME, name: "ChangeGameName", since: 1, fields: &[NAME] },
        MessageDef { opcode: cli2srv::CHANGE_TIME_LIMIT, name: "ChangeTimeLimit", since: 1, fields: &[TIME_LIMIT] },
        MessageDef { opcode: cli2srv::DELETE_GAME, name: "DeleteGame", since: 1, fields: &[] },
        MessageDef { opcode: cli2srv::ADD_MARKER, name: "AddMarker", since: 1, fields: &[
            field("x", F64),
            field("y", F64),
            field("z", F64),
            NAME,
            field("age", Str { max: 64 }),
        ] },
        MessageDef { opcode: cli2srv::DELETE_MARKER, name: "DeleteMarker", since: 1, fields: &[MARKER_ID] },
        MessageDef { opcode: cli2srv::CHANGE_MARKER_NAME, name: "ChangeMarkerName", since: 1, fields: &[MARKER_ID, NAME] },
        MessageDef { opcode: cli2srv::CAPTURE_MARKER, name: "CaptureMarker", since: 1, fields: &[MARKER_ID] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Marker2Cli",
    owner: TableOwner::Game(GameType::Marker),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::TEAM_ASSIGNED, name: "TeamAssigned", since: 1, fields: &[field("team", U8)] },
        MessageDef { opcode: srv2cli::GAME_TYPE, name: "GameType", since: 1, fields: &[field("variant", U8)] },
        MessageDef { opcode: srv2cli::GAME_STARTED, name: "GameStarted", since: 1, fields: &[] },
        MessageDef { opcode: srv2cli::GAME_PAUSED, name: "GamePaused", since: 1, fields: &[field("time_left_ms", U32)] },
        MessageDef { opcode: srv2cli::GAME_RESET, name: "GameReset", since: 1, fields: &[] },
        MessageDef { opcode: srv2cli::GAME_OVER, name: "GameOver", since: 1, fields: &[field("winning_team", U8)] },
        MessageDef { opcode: srv2cli::GAME_NAME_CHANGED, name: "GameNameChanged", since: 1, fields: &[NAME] },
        MessageDef { opcode: srv2cli::TIME_LIMIT_CHANGED, name: "TimeLimitChanged", since: 1, fields: &[TIME_LIMIT] },
        MessageDef { opcode: srv2cli::GAME_DELETED, name: "GameDeleted", since: 1, fields: &[field("failed", U8)] },
        MessageDef { opcode: srv2cli::MARKER_ADDED, name: "MarkerAdded", since: 1, fields: &[
            field("x", F64),
            field("y", F64),
            field("z", F64),
            MARKER_ID,
            NAME,
            field("age", Str { max: 64 }),
        ] },
        MessageDef { opcode: srv2cli::MARKER_DELETED, name: "MarkerDeleted", since: 1, fields: &[MARKER_ID] },
        MessageDef { opcode: srv2cli::MARKER_NAME_CHANGED, name: "MarkerNameChanged", since: 1, fields: &[MARKER_ID, NAME] },
        MessageDef { opcode: srv2cli::MARKER_CAPTURED, name: "MarkerCaptured", since: 1, fields: &[
            MARKER_ID,
            field("team", U8),
        ] },
    ],
};

/// A placed marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerInfo {
    /// Id within the game.
    pub id: u32,
    /// Position.
    pub position: [f64; 3],
    /// Display name.
    pub name: String,
    /// Age the marker was placed in.
    pub age: String,
}

/// Request without fields, selected by `opcode`.
pub fn command(opcode: u16) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, opcode, Vec::new())
}

/// Game rename request.
pub fn change_game_name(name: &str) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::CHANGE_GAME_NAME, vec![name.into()])
}

/// Clock change request.
pub fn change_time_limit(time_limit_ms: u32) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::CHANGE_TIME_LIMIT, vec![time_limit_ms.into()])
}

/// Placement request.
pub fn add_marker(position: [f64; 3], name: &str, age: &str) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::ADD_MARKER, vec![
        position[0].into(),
        position[1].into(),
        position[2].into(),
        name.into(),
        age.into(),
    ])
}

/// Marker request without a payload: delete or capture.
pub fn marker_command(opcode: u16, marker_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, opcode, vec![marker_id.into()])
}

/// Marker rename request.
pub fn change_marker_name(marker_id: u32, name: &str) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::CHANGE_MARKER_NAME, vec![marker_id.into(), name.into()])
}

/// Notice without fields, selected by `opcode`.
pub fn notice(opcode: u16) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, opcode, Vec::new())
}

/// Team notice.
pub fn team_assigned(team: u8) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::TEAM_ASSIGNED, vec![team.into()])
}

/// Variant notice.
pub fn game_type(variant: MarkerVariant) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_TYPE, vec![(variant as u8).into()])
}

/// Pause notice.
pub fn game_paused(time_left_ms: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_PAUSED, vec![time_left_ms.into()])
}

/// End notice; team 0 means no winning team.
pub fn game_over(winning_team: u8) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_OVER, vec![winning_team.into()])
}

/// Rename notice.
pub fn game_name_changed(name: &str) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_NAME_CHANGED, vec![name.into()])
}

/// Clock notice.
pub fn time_limit_changed(time_limit_ms: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::TIME_LIMIT_CHANGED, vec![time_limit_ms.into()])
}

/// Deletion notice.
pub fn game_deleted(failed: bool) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_DELETED, vec![failed.into()])
}

/// Placement notice.
pub fn marker_added(marker: &MarkerInfo) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::MARKER_ADDED, vec![
        marker.position[0].into(),
        marker.position[1].into(),
        marker.position[2].into(),
        marker.id.into(),
        marker.name.as_str().into(),
        marker.age.as_str().into(),
    ])
}

/// Removal notice.
pub fn marker_deleted(marker_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::MARKER_DELETED, vec![marker_id.into()])
}

/// Marker rename notice.
pub fn marker_name_changed(marker_id: u32, name: &str) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::MARKER_NAME_CHANGED, vec![marker_id.into(), name.into()])
}

/// Capture notice; team 0 in quests.
pub fn marker_captured(marker_id: u32, team: u8) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::MARKER_CAPTURED, vec![marker_id.into(), team.into()])
}
