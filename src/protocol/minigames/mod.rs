//! Mini-game sub-protocols.
//!
//! Each mini-game has its own pair of append-only tables. Their messages
//! never travel as frames: they are encoded with [`Message::encode_body`]
//! and carried as the body of a game service `GameMsg` addressed to one
//! session.
//!
//! [`Message::encode_body`]: crate::protocol::Message::encode_body

pub mod blue_spiral;
pub mod climbing_wall;
pub mod heek;
pub mod marker;
pub mod ttt;
pub mod var_sync;

use super::message::MessageTable;
use super::services::game::GameType;
use super::Direction;

/// Static table for a mini-game and direction.
pub fn table(game: GameType, direction: Direction) -> &'static MessageTable {
    use Direction::*;
    match (game, direction) {
        (GameType::Heek, ClientToServer) => &heek::CLI2SRV,
        (GameType::Heek, ServerToClient) => &heek::SRV2CLI,
        (GameType::Ttt, ClientToServer) => &ttt::CLI2SRV,
        (GameType::Ttt, ServerToClient) => &ttt::SRV2CLI,
        (GameType::BlueSpiral, ClientToServer) => &blue_spiral::CLI2SRV,
        (GameType::BlueSpiral, ServerToClient) => &blue_spiral::SRV2CLI,
        (GameType::ClimbingWall, ClientToServer) => &climbing_wall::CLI2SRV,
        (GameType::ClimbingWall, ServerToClient) => &climbing_wall::SRV2CLI,
        (GameType::Marker, ClientToServer) => &marker::CLI2SRV,
        (GameType::Marker, ServerToClient) => &marker::SRV2CLI,
        (GameType::VarSync, ClientToServer) => &var_sync::CLI2SRV,
        (GameType::VarSync, ServerToClient) => &var_sync::SRV2CLI,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::TableOwner;

    #[test]
    fn test_tables_are_owned_by_their_game() {
        for game in GameType::ALL {
            for direction in [Direction::ClientToServer, Direction::ServerToClient] {
                let t = table(game, direction);
                assert_eq!(t.owner, TableOwner::Game(game));
                assert_eq!(t.direction, direction);
                assert!(!t.messages.is_empty());
            }
        }
    }
}
