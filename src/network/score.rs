//! Score Keeping
//!
//! Named integer scores owned by a player or vault node. Transfers move
//! points between two scores atomically under the store lock.

use std::collections::BTreeMap;

use crate::core::idpool::IdPool;
use crate::protocol::services::score::{self, cli2srv, srv2cli, ScoreRecord, MAX_GAME_NAME};
use crate::protocol::{Message, NetResult, ProtocolError};

/// Score errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    /// No score with that id.
    #[error("score {0} not found")]
    NotFound(u32),

    /// Source score cannot cover the transfer.
    #[error("score has {have} points, transfer needs {need}")]
    InsufficientPoints {
        /// Points available.
        have: i32,
        /// Points requested.
        need: i32,
    },

    /// Transfer of a non-positive amount, or onto itself.
    #[error("invalid transfer")]
    InvalidTransfer,

    /// Name empty or too long.
    #[error("invalid score name")]
    InvalidName,

    /// Score id space exhausted.
    #[error("score ids exhausted")]
    Exhausted,
}

impl ScoreError {
    /// Result code reported to the client.
    pub fn net_result(&self) -> NetResult {
        match self {
            ScoreError::NotFound(_) => NetResult::ScoreNotFound,
            ScoreError::InsufficientPoints { .. } => NetResult::InsufficientPoints,
            ScoreError::InvalidTransfer | ScoreError::InvalidName => NetResult::InvalidParameter,
            ScoreError::Exhausted => NetResult::ServerBusy,
        }
    }
}

/// All scores on this server.
#[derive(Debug)]
pub struct ScoreStore {
    scores: BTreeMap<u32, ScoreRecord>,
    ids: IdPool,
}

impl Default for ScoreStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            scores: BTreeMap::new(),
            ids: IdPool::new(1),
        }
    }

    /// Number of scores.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Create a score.
    pub fn create(
        &mut self,
        owner_id: u32,
        game_name: &str,
        game_type: u32,
        value: i32,
    ) -> Result<ScoreRecord, ScoreError> {
        if game_name.is_empty() || game_name.encode_utf16().count() > MAX_GAME_NAME {
            return Err(ScoreError::InvalidName);
        }
        let score_id = self.ids.allocate().ok_or(ScoreError::Exhausted)?;
        let record = ScoreRecord {
            score_id,
            owner_id,
            created_at: chrono::Utc::now().timestamp().max(0) as u64,
            game_type,
            value,
            game_name: game_name.to_string(),
        };
        self.scores.insert(score_id, record.clone());
        Ok(record)
    }

    /// Remove a score and release its id.
    pub fn delete(&mut self, score_id: u32) -> Result<(), ScoreError> {
        self.scores
            .remove(&score_id)
            .ok_or(ScoreError::NotFound(score_id))?;
        self.ids.release(score_id);
        Ok(())
    }

    /// Scores of `owner_id`, filtered by name unless `game_name` is empty.
    pub fn get_scores(&self, owner_id: u32, game_name: &str) -> Vec<ScoreRecord> {
        self.scores
            .values()
            .filter(|s| s.owner_id == owner_id && (game_name.is_empty() || s.game_name == game_name))
            .cloned()
            .collect()
    }

    /// Score by id.
    pub fn get(&self, score_id: u32) -> Option<&ScoreRecord> {
        self.scores.get(&score_id)
    }

    /// Add `points`, saturating.
    pub fn add_points(&mut self, score_id: u32, points: i32) -> Result<i32, ScoreError> {
        let score = self.scores.get_mut(&score_id).ok_or(ScoreError::NotFound(score_id))?;
        score.value = score.value.saturating_add(points);
        Ok(score.value)
    }

    /// Overwrite the value.
    pub fn set_points(&mut self, score_id: u32, points: i32) -> Result<(), ScoreError> {
        let score = self.scores.get_mut(&score_id).ok_or(ScoreError::NotFound(score_id))?;
        score.value = points;
        Ok(())
    }

    /// Move `points` from `src` to `dst`. Either both change or neither.
    pub fn transfer(&mut self, src: u32, dst: u32, points: i32) -> Result<(), ScoreError> {
        if points <= 0 || src == dst {
            return Err(ScoreError::InvalidTransfer);
        }
        let have = self.scores.get(&src).ok_or(ScoreError::NotFound(src))?.value;
        if !self.scores.contains_key(&dst) {
            return Err(ScoreError::NotFound(dst));
        }
        if have < points {
            return Err(ScoreError::InsufficientPoints { have, need: points });
        }
        if let Some(source) = self.scores.get_mut(&src) {
            source.value -= points;
        }
        if let Some(target) = self.scores.get_mut(&dst) {
            target.value = target.value.saturating_add(points);
        }
        Ok(())
    }
}

fn code<T>(result: Result<T, ScoreError>) -> NetResult {
    result.err().map(|e| e.net_result()).unwrap_or(NetResult::Success)
}

/// Handle one Score service request.
pub fn handle(message: &Message, store: &mut ScoreStore) -> Result<Vec<Message>, ProtocolError> {
    let trans_id = message.u32("trans_id")?;
    let reply = match message.opcode() {
        cli2srv::SCORE_CREATE => match store.create(
            message.u32("owner_id")?,
            message.str("game_name")?,
            message.u32("game_type")?,
            message.i32("value")?,
        ) {
            Ok(record) => {
                score::create_reply(trans_id, NetResult::Success, record.score_id, record.created_at)?
            }
            Err(e) => score::create_reply(trans_id, e.net_result(), 0, 0)?,
        },
        cli2srv::SCORE_DELETE => {
            let result = code(store.delete(message.u32("score_id")?));
            score::result_reply(srv2cli::SCORE_DELETE_REPLY, trans_id, result)?
        }
        cli2srv::SCORE_GET_SCORES => {
            let records = store.get_scores(message.u32("owner_id")?, message.str("game_name")?);
            let result = if records.is_empty() {
                NetResult::ScoreNotFound
            } else {
                NetResult::Success
            };
            score::get_scores_reply(trans_id, result, &records)?
        }
        cli2srv::SCORE_ADD_POINTS => {
            let result = code(store.add_points(message.u32("score_id")?, message.i32("points")?));
            score::result_reply(srv2cli::SCORE_ADD_POINTS_REPLY, trans_id, result)?
        }
        cli2srv::SCORE_SET_POINTS => {
            let result = code(store.set_points(message.u32("score_id")?, message.i32("points")?));
            score::result_reply(srv2cli::SCORE_SET_POINTS_REPLY, trans_id, result)?
        }
        cli2srv::SCORE_TRANSFER_POINTS => {
            let result = code(store.transfer(
                message.u32("src_score_id")?,
                message.u32("dst_score_id")?,
                message.i32("points")?,
            ));
            score::result_reply(srv2cli::SCORE_TRANSFER_POINTS_REPLY, trans_id, result)?
        }
        other => {
            return Err(ProtocolError::UnknownOpcode {
                table: message.table().name,
                opcode: other,
            })
        }
    };
    Ok(vec![reply])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_is_all_or_nothing() {
        let mut store = ScoreStore::new();
        let a = store.create(7, "marbles", 0, 10).unwrap().score_id;
        let b = store.create(8, "marbles", 0, 0).unwrap().score_id;

        store.transfer(a, b, 4).unwrap();
        assert_eq!(store.get(a).unwrap().value, 6);
        assert_eq!(store.get(b).unwrap().value, 4);

        assert_eq!(
            store.transfer(a, b, 7),
            Err(ScoreError::InsufficientPoints { have: 6, need: 7 })
        );
        assert_eq!(store.transfer(a, a, 1), Err(ScoreError::InvalidTransfer));
        assert_eq!(store.transfer(a, b, 0), Err(ScoreError::InvalidTransfer));
        assert_eq!(store.transfer(a, 99, 1), Err(ScoreError::NotFound(99)));
        assert_eq!(store.get(a).unwrap().value, 6);
        assert_eq!(store.get(b).unwrap().value, 4);
    }

    #[test]
    fn test_listing_filters_by_owner_and_name() {
        let mut store = ScoreStore::new();
        store.create(1, "heek", 0, 1).unwrap();
        store.create(1, "marker", 0, 2).unwrap();
        store.create(2, "heek", 0, 3).unwrap();

        assert_eq!(store.get_scores(1, "").len(), 2);
        let heek = store.get_scores(1, "heek");
        assert_eq!(heek.len(), 1);
        assert_eq!(heek[0].value, 1);
        assert!(store.get_scores(3, "").is_empty());
        assert_eq!(store.create(1, "", 0, 0), Err(ScoreError::InvalidName));
    }

    #[test]
    fn test_deleted_ids_are_reused() {
        let mut store = ScoreStore::new();
        let a = store.create(1, "x", 0, 0).unwrap().score_id;
        store.delete(a).unwrap();
        assert_eq!(store.delete(a), Err(ScoreError::NotFound(a)));
        assert_eq!(store.create(1, "y", 0, 0).unwrap().score_id, a);
    }

    #[test]
    fn test_handler_round_trip() {
        let mut store = ScoreStore::new();
        let create = score::create_request(1, 5, "climbing", 2, 100).unwrap();
        let out = handle(&create, &mut store).unwrap();
        assert_eq!(out[0].u32("result").unwrap(), NetResult::Success.code());
        let id = out[0].u32("score_id").unwrap();

        let add = score::points_request(cli2srv::SCORE_ADD_POINTS, 2, id, -30).unwrap();
        handle(&add, &mut store).unwrap();

        let list = score::get_scores_request(3, 5, "climbing").unwrap();
        let out = handle(&list, &mut store).unwrap();
        let records = score::decode_records(&out[0]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 70);

        let missing = score::transfer_request(4, id, 77, 1).unwrap();
        let out = handle(&missing, &mut store).unwrap();
        assert_eq!(out[0].u32("result").unwrap(), NetResult::ScoreNotFound.code());
    }
}
