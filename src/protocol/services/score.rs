//! Score service: named per-owner counters.

use serde::{Deserialize, Serialize};

use super::{RESULT, TRANS_ID};
use crate::protocol::field::{field, FieldDef, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::{Direction, NetResult, ProtocolError, ServiceId};

/// Longest score name.
pub const MAX_GAME_NAME: usize = 64;

const OWNER_ID: FieldDef = field("owner_id", U32);
const GAME_NAME: FieldDef = field("game_name", Str { max: MAX_GAME_NAME });
const SCORE_ID: FieldDef = field("score_id", U32);
const POINTS: FieldDef = field("points", I32);

/// Client to server opcodes.
pub mod cli2srv {
    /// Create a score.
    pub const SCORE_CREATE: u16 = 0;
    /// Delete a score.
    pub const SCORE_DELETE: u16 = 1;
    /// List an owner's scores by name.
    pub const SCORE_GET_SCORES: u16 = 2;
    /// Add to a score.
    pub const SCORE_ADD_POINTS: u16 = 3;
    /// Overwrite a score.
    pub const SCORE_SET_POINTS: u16 = 4;
    /// Move points between scores.
    pub const SCORE_TRANSFER_POINTS: u16 = 5;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Creation result.
    pub const SCORE_CREATE_REPLY: u16 = 0;
    /// Deletion result.
    pub const SCORE_DELETE_REPLY: u16 = 1;
    /// Listing result.
    pub const SCORE_GET_SCORES_REPLY: u16 = 2;
    /// Add result.
    pub const SCORE_ADD_POINTS_REPLY: u16 = 3;
    /// Set result.
    pub const SCORE_SET_POINTS_REPLY: u16 = 4;
    /// Transfer result.
    pub const SCORE_TRANSFER_POINTS_REPLY: u16 = 5;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Score",
    owner: TableOwner::Service(ServiceId::Score),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::SCORE_CREATE, name: "ScoreCreate", since: 1, fields: &[
            TRANS_ID,
            OWNER_ID,
            GAME_NAME,
            field("game_type", U32),
            field("value", I32),
        ] },
        MessageDef { opcode: cli2srv::SCORE_DELETE, name: "ScoreDelete", since: 1, fields: &[TRANS_ID, SCORE_ID] },
        MessageDef { opcode: cli2srv::SCORE_GET_SCORES, name: "ScoreGetScores", since: 1, fields: &[
            TRANS_ID, OWNER_ID, GAME_NAME,
        ] },
        MessageDef { opcode: cli2srv::SCORE_ADD_POINTS, name: "ScoreAddPoints", since: 1, fields: &[
            TRANS_ID, SCORE_ID, POINTS,
        ] },
        MessageDef { opcode: cli2srv::SCORE_SET_POINTS, name: "ScoreSetPoints", since: 1, fields: &[
            TRANS_ID, SCORE_ID, POINTS,
        ] },
        MessageDef { opcode: cli2srv::SCORE_TRANSFER_POINTS, name: "ScoreTransferPoints", since: 2, fields: &[
            TRANS_ID,
            field("src_score_id", U32),
            field("dst_score_id", U32),
            POINTS,
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Score2Cli",
    owner: TableOwner::Service(ServiceId::Score),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::SCORE_CREATE_REPLY, name: "ScoreCreateReply", since: 1, fields: &[
            TRANS_ID,
            RESULT,
            SCORE_ID,
            field("created_at", U64),
        ] },
        MessageDef { opcode: srv2cli::SCORE_DELETE_REPLY, name: "ScoreDeleteReply", since: 1, fields: &[TRANS_ID, RESULT] },
        MessageDef { opcode: srv2cli::SCORE_GET_SCORES_REPLY, name: "ScoreGetScoresReply", since: 1, fields: &[
            TRANS_ID,
            RESULT,
            field("score_count", U32),
            field("records", Bytes { max: 64 * 1024 }),
        ] },
        MessageDef { opcode: srv2cli::SCORE_ADD_POINTS_REPLY, name: "ScoreAddPointsReply", since: 1, fields: &[
            TRANS_ID, RESULT,
        ] },
        MessageDef { opcode: srv2cli::SCORE_SET_POINTS_REPLY, name: "ScoreSetPointsReply", since: 1, fields: &[
            TRANS_ID, RESULT,
        ] },
        MessageDef { opcode: srv2cli::SCORE_TRANSFER_POINTS_REPLY, name: "ScoreTransferPointsReply", since: 2, fields: &[
            TRANS_ID, RESULT,
        ] },
    ],
};

/// One score as carried in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Score id.
    pub score_id: u32,
    /// Owning player or vault node.
    pub owner_id: u32,
    /// Unix seconds at creation.
    pub created_at: u64,
    /// Score kind chosen by the client.
    pub game_type: u32,
    /// Current value.
    pub value: i32,
    /// Score name.
    pub game_name: String,
}

/// Pack records for a listing reply.
pub fn encode_records(records: &[ScoreRecord]) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(records).map_err(|e| ProtocolError::Encoding {
        field: "records",
        reason: e.to_string(),
    })
}

/// Unpack the records of a listing reply.
pub fn decode_records(message: &Message) -> Result<Vec<ScoreRecord>, ProtocolError> {
    let records: Vec<ScoreRecord> = bincode::deserialize(message.bytes("records")?)
        .map_err(|e| ProtocolError::Encoding {
            field: "records",
            reason: e.to_string(),
        })?;
    let count = message.u32("score_count")? as usize;
    if records.len() != count {
        return Err(ProtocolError::FieldCount {
            message: message.name(),
            expected: count,
            got: records.len(),
        });
    }
    Ok(records)
}

/// Creation request.
pub fn create_request(
    trans_id: u32,
    owner_id: u32,
    game_name: &str,
    game_type: u32,
    value: i32,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::SCORE_CREATE, vec![
        trans_id.into(),
        owner_id.into(),
        game_name.into(),
        game_type.into(),
        value.into(),
    ])
}

/// Listing request.
pub fn get_scores_request(
    trans_id: u32,
    owner_id: u32,
    game_name: &str,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::SCORE_GET_SCORES, vec![
        trans_id.into(),
        owner_id.into(),
        game_name.into(),
    ])
}

/// Add or set request.
pub fn points_request(
    opcode: u16,
    trans_id: u32,
    score_id: u32,
    points: i32,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, opcode, vec![trans_id.into(), score_id.into(), points.into()])
}

/// Transfer request.
pub fn transfer_request(
    trans_id: u32,
    src_score_id: u32,
    dst_score_id: u32,
    points: i32,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::SCORE_TRANSFER_POINTS, vec![
        trans_id.into(),
        src_score_id.into(),
        dst_score_id.into(),
        points.into(),
    ])
}

/// Delete request.
pub fn delete_request(trans_id: u32, score_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::SCORE_DELETE, vec![trans_id.into(), score_id.into()])
}

/// Creation result.
pub fn create_reply(
    trans_id: u32,
    result: NetResult,
    score_id: u32,
    created_at: u64,
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::SCORE_CREATE_REPLY, vec![
        trans_id.into(),
        result.into(),
        score_id.into(),
        created_at.into(),
    ])
}

/// Listing result.
pub fn get_scores_reply(
    trans_id: u32,
    result: NetResult,
    records: &[ScoreRecord],
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::SCORE_GET_SCORES_REPLY, vec![
        trans_id.into(),
        result.into(),
        (records.len() as u32).into(),
        Value::Bytes(encode_records(records)?),
    ])
}

/// Reply carrying only a result.
pub fn result_reply(opcode: u16, trans_id: u32, result: NetResult) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, opcode, vec![trans_id.into(), result.into()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_carries_records() {
        let records = vec![
            ScoreRecord {
                score_id: 1,
                owner_id: 9,
                created_at: 1_700_000_000,
                game_type: 0,
                value: 15,
                game_name: "PelletDrop".into(),
            },
            ScoreRecord {
                score_id: 2,
                owner_id: 9,
                created_at: 1_700_000_100,
                game_type: 1,
                value: -3,
                game_name: "PelletDrop".into(),
            },
        ];
        let reply = get_scores_reply(4, NetResult::Success, &records).unwrap();
        assert_eq!(decode_records(&reply).unwrap(), records);
    }

    #[test]
    fn test_listing_count_mismatch() {
        let reply = Message::new(&SRV2CLI, srv2cli::SCORE_GET_SCORES_REPLY, vec![
            1u32.into(),
            NetResult::Success.into(),
            3u32.into(),
            Value::Bytes(encode_records(&[]).unwrap()),
        ])
        .unwrap();
        assert!(matches!(
            decode_records(&reply),
            Err(ProtocolError::FieldCount { expected: 3, got: 0, .. })
        ));
    }
}
