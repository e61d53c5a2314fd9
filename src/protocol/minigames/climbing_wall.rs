//! Climbing wall: two teams place blockers on a shared slot grid, then race.

use crate::protocol::field::{field, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::services::game::GameType;
use crate::protocol::{Direction, ProtocolError};

/// Teams per wall.
pub const TEAMS: usize = 2;
/// Blocker slots per team.
pub const SLOTS: usize = 20;
/// Snapshot bytes: one little-endian `u32` occupant per slot, 0 when empty.
pub const SNAPSHOT_BYTES: usize = SLOTS * 4;

/// What a team declares itself ready with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyType {
    /// Agreed on the blocker count.
    NumBlockers = 0,
    /// Finished placing blockers.
    Blockers = 1,
}

impl ReadyType {
    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReadyType::NumBlockers),
            1 => Some(ReadyType::Blockers),
            _ => None,
        }
    }
}

/// How much of the slot grid a ready report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyDetail {
    /// Occupied count only.
    Count = 0,
    /// Full occupancy snapshot of the team's slots.
    Snapshot = 1,
}

impl ReadyDetail {
    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReadyDetail::Count),
            1 => Some(ReadyDetail::Snapshot),
            _ => None,
        }
    }
}

/// Client to server opcodes.
pub mod cli2srv {
    /// Propose a blocker count.
    pub const CHANGE_NUM_BLOCKERS: u16 = 0;
    /// Claim or release a slot.
    pub const CHANGE_BLOCKER: u16 = 1;
    /// Declare a team ready.
    pub const READY: u16 = 2;
    /// A climber entered the wall.
    pub const PLAYER_ENTERED: u16 = 3;
    /// A climber reached the top.
    pub const FINISHED_GAME: u16 = 4;
    /// Abort and reset the wall.
    pub const PANIC: u16 = 5;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Blocker count changed.
    pub const NUM_BLOCKERS_CHANGED: u16 = 0;
    /// A slot was claimed or released.
    pub const BLOCKERS_CHANGED: u16 = 1;
    /// A slot claim lost.
    pub const BLOCKER_REJECTED: u16 = 2;
    /// Readiness and occupancy.
    pub const READY_REPORT: u16 = 3;
    /// A climber entered the wall.
    pub const PLAYER_ENTERED: u16 = 4;
    /// A team won.
    pub const GAME_OVER: u16 = 5;
    /// The wall was reset.
    pub const GAME_RESET: u16 = 6;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2ClimbingWall",
    owner: TableOwner::Game(GameType::ClimbingWall),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::CHANGE_NUM_BLOCKERS, name: "ChangeNumBlockers", since: 1, fields: &[
            field("amount", U8),
        ] },
        MessageDef { opcode: cli2srv::CHANGE_BLOCKER, name: "ChangeBlocker", since: 1, fields: &[
            field("team", U8),
            field("slot", U8),
            field("added", U8),
        ] },
        MessageDef { opcode: cli2srv::READY, name: "Ready", since: 1, fields: &[
            field("ready_type", U8),
            field("team", U8),
            field("detail", U8),
        ] },
        MessageDef { opcode: cli2srv::PLAYER_ENTERED, name: "PlayerEntered", since: 1, fields: &[field("team", U8)] },
        MessageDef { opcode: cli2srv::FINISHED_GAME, name: "FinishedGame", since: 1, fields: &[field("team", U8)] },
        MessageDef { opcode: cli2srv::PANIC, name: "Panic", since: 1, fields: &[field("team", U8)] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "ClimbingWall2Cli",
    owner: TableOwner::Game(GameType::ClimbingWall),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::NUM_BLOCKERS_CHANGED, name: "NumBlockersChanged", since: 1, fields: &[
            field("amount", U8),
            field("changed_by", U32),
        ] },
        MessageDef { opcode: srv2cli::BLOCKERS_CHANGED, name: "BlockersChanged", since: 1, fields: &[
            field("team", U8),
            field("slot", U8),
            field("added", U8),
            field("changed_by", U32),
        ] },
        MessageDef { opcode: srv2cli::BLOCKER_REJECTED, name: "BlockerRejected", since: 1, fields: &[
            field("team", U8),
            field("slot", U8),
            field("requester", U32),
            field("occupant", U32),
        ] },
        MessageDef { opcode: srv2cli::READY_REPORT, name: "ReadyReport", since: 1, fields: &[
            field("ready_type", U8),
            field("team", U8),
            field("team_one_ready", U8),
            field("team_two_ready", U8),
            field("detail", U8),
            field("occupied", U8),
            field("snapshot", Bytes { max: SNAPSHOT_BYTES }),
        ] },
        MessageDef { opcode: srv2cli::PLAYER_ENTERED, name: "PlayerEntered", since: 1, fields: &[
            field("team", U8),
            field("player_id", U32),
        ] },
        MessageDef { opcode: srv2cli::GAME_OVER, name: "GameOver", since: 1, fields: &[
            field("winning_team", U8),
            field("player_id", U32),
        ] },
        MessageDef { opcode: srv2cli::GAME_RESET, name: "GameReset", since: 1, fields: &[field("by_panic", U8)] },
    ],
};

/// Pack team occupancy: one `u32` per slot, 0 for empty.
pub fn encode_snapshot(slots: &[Option<u32>]) -> Vec<u8> {
    slots
        .iter()
        .flat_map(|s| s.unwrap_or(0).to_le_bytes())
        .collect()
}

/// Unpack a snapshot.
pub fn decode_snapshot(bytes: &[u8]) -> Vec<Option<u32>> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .map(|id| (id != 0).then_some(id))
        .collect()
}

/// Blocker count proposal.
pub fn change_num_blockers(amount: u8) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::CHANGE_NUM_BLOCKERS, vec![amount.into()])
}

/// Slot claim (`added`) or release.
pub fn change_blocker(team: u8, slot: u8, added: bool) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::CHANGE_BLOCKER, vec![team.into(), slot.into(), added.into()])
}

/// Readiness declaration.
pub fn ready(ready_type: ReadyType, team: u8, detail: ReadyDetail) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::READY, vec![
        (ready_type as u8).into(),
        team.into(),
        (detail as u8).into(),
    ])
}

/// Climber start, finish or panic, selected by `opcode`.
pub fn team_event(opcode: u16, team: u8) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, opcode, vec![team.into()])
}

/// Blocker count notice.
pub fn num_blockers_changed(amount: u8, changed_by: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::NUM_BLOCKERS_CHANGED, vec![amount.into(), changed_by.into()])
}

/// Slot notice.
pub fn blockers_changed(team: u8, slot: u8, added: bool, changed_by: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::BLOCKERS_CHANGED, vec![
        team.into(),
        slot.into(),
        added.into(),
        changed_by.into(),
    ])
}

/// Lost claim notice.
pub fn blocker_rejected(team: u8, slot: u8, requester: u32, occupant: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::BLOCKER_REJECTED, vec![
        team.into(),
        slot.into(),
        requester.into(),
        occupant.into(),
    ])
}

/// Readiness report.
#[allow(clippy::too_many_arguments)]
pub fn ready_report(
    ready_type: ReadyType,
    team: u8,
    team_one_ready: bool,
    team_two_ready: bool,
    detail: ReadyDetail,
    occupied: u8,
    snapshot: Vec<u8>,
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::READY_REPORT, vec![
        (ready_type as u8).into(),
        team.into(),
        team_one_ready.into(),
        team_two_ready.into(),
        (detail as u8).into(),
        occupied.into(),
        Value::Bytes(snapshot),
    ])
}

/// Climber notice.
pub fn player_entered(team: u8, player_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::PLAYER_ENTERED, vec![team.into(), player_id.into()])
}

/// Win notice.
pub fn game_over(winning_team: u8, player_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_OVER, vec![winning_team.into(), player_id.into()])
}

/// Reset notice.
pub fn game_reset(by_panic: bool) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::GAME_RESET, vec![by_panic.into()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_layout() {
        let mut slots = vec![None; SLOTS];
        slots[3] = Some(7);
        let bytes = encode_snapshot(&slots);
        assert_eq!(bytes.len(), SNAPSHOT_BYTES);
        assert_eq!(&bytes[12..16], &[7, 0, 0, 0]);
        assert_eq!(decode_snapshot(&bytes), slots);
    }
}
