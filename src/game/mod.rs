//! Mini-Game Framework
//!
//! Every mini-game is a state machine over the shared [`GamePhase`]
//! lifecycle, refined with its own sub-states and input alphabet.
//!
//! ## Module Structure
//!
//! - `lifecycle`: Generic phases and legal transitions
//! - `context`: Clock, seats, RNG and outbox handed to each call
//! - `heek`: Rock-paper-scissors elimination
//! - `ttt`: Tic-tac-toe
//! - `blue_spiral`: Sequence reproduction
//! - `climbing_wall`: Two-team slot claiming
//! - `marker`: Marker quests and captures
//! - `var_sync`: Shared variables
//!
//! Games receive decoded sub-protocol messages and emit sub-protocol
//! messages through [`GameContext`]. They never see connections, other
//! sessions or the wall clock; time arrives as `GameContext::now`.

pub mod blue_spiral;
pub mod climbing_wall;
pub mod context;
pub mod heek;
pub mod lifecycle;
pub mod marker;
pub mod ttt;
pub mod var_sync;

pub use context::{GameContext, Outgoing, Recipient};
pub use lifecycle::{GamePhase, InitResult, Lifecycle};

use crate::protocol::services::game::GameType;
use crate::protocol::{Direction, Message, ProtocolError, TableOwner};

/// Player identifier as issued by the auth service.
pub type PlayerId = u32;

/// Game logic errors.
///
/// These are expected conditions resolved by game rules. The session logs
/// them and keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Slot or cell already claimed.
    #[error("slot {slot} is held by player {occupant}")]
    SlotTaken {
        /// Slot index within its grid or team.
        slot: u32,
        /// Current holder.
        occupant: PlayerId,
    },

    /// Countdown stopped before the player threw.
    #[error("player {0} submitted no choice")]
    NoChoiceSubmitted(PlayerId),

    /// Move out of turn.
    #[error("not player {0}'s turn")]
    NotYourTurn(PlayerId),

    /// Owner-only operation.
    #[error("player {0} does not own this game")]
    NotOwner(PlayerId),

    /// Input from a player without a seat.
    #[error("player {0} has no seat")]
    NotSeated(PlayerId),

    /// No free seat.
    #[error("game is full")]
    GameFull,

    /// Input makes no sense in the current state.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Input not accepted in this phase.
    #[error("not allowed in phase {0:?}")]
    WrongPhase(GamePhase),

    /// Illegal lifecycle step.
    #[error("illegal phase change {from:?} -> {to:?}")]
    InvalidTransition {
        /// Phase before.
        from: GamePhase,
        /// Requested phase.
        to: GamePhase,
    },

    /// Outgoing message failed to build.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Creation parameters from `GameCreateRequest`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameParams {
    /// Game-specific.
    pub param0: u32,
    /// Game-specific.
    pub param1: u32,
    /// Display name.
    pub name: String,
}

/// Capability set every mini-game implements.
pub trait MiniGame {
    /// Which sub-protocol this game speaks.
    fn game_type(&self) -> GameType;

    /// Seat limit enforced by the session.
    fn max_players(&self) -> usize;

    /// Leave `Uninitialized` and report the outcome.
    fn init(&mut self, ctx: &mut GameContext<'_>) -> InitResult;

    /// A seat was filled.
    fn player_joined(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError>;

    /// A seat was vacated or its player went idle.
    fn player_left(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError>;

    /// Decoded client message from a seated player.
    fn handle_input(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        input: &Message,
    ) -> Result<(), GameError>;

    /// Timer hook, driven by the session's tick loop.
    fn tick(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError>;

    /// Current lifecycle phase.
    fn phase(&self) -> GamePhase;

    /// Move to `Aborted`.
    fn abort(&mut self) -> Result<(), GameError>;

    /// Whether the game has reached an absorbing phase.
    fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }
}

/// One running mini-game.
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Game {
    /// Rock-paper-scissors elimination.
    Heek(heek::HeekGame),
    /// Tic-tac-toe.
    Ttt(ttt::TttGame),
    /// Sequence reproduction.
    BlueSpiral(blue_spiral::BlueSpiralGame),
    /// Team slot claiming.
    ClimbingWall(climbing_wall::ClimbingWallGame),
    /// Marker quests and captures.
    Marker(marker::MarkerGame),
    /// Shared variables.
    VarSync(var_sync::VarSyncGame),
}

macro_rules! dispatch {
    ($self:expr, $game:ident => $body:expr) => {
        match $self {
            Game::Heek($game) => $body,
            Game::Ttt($game) => $body,
            Game::BlueSpiral($game) => $body,
            Game::ClimbingWall($game) => $body,
            Game::Marker($game) => $body,
            Game::VarSync($game) => $body,
        }
    };
}

impl Game {
    /// Build an uninitialized game of `game_type`.
    pub fn new(game_type: GameType, params: &GameParams) -> Self {
        match game_type {
            GameType::Heek => Game::Heek(heek::HeekGame::new(params)),
            GameType::Ttt => Game::Ttt(ttt::TttGame::new()),
            GameType::BlueSpiral => Game::BlueSpiral(blue_spiral::BlueSpiralGame::new(params)),
            GameType::ClimbingWall => Game::ClimbingWall(climbing_wall::ClimbingWallGame::new()),
            GameType::Marker => Game::Marker(marker::MarkerGame::new(params)),
            GameType::VarSync => Game::VarSync(var_sync::VarSyncGame::new()),
        }
    }
}

impl MiniGame for Game {
    fn game_type(&self) -> GameType {
        dispatch!(self, g => g.game_type())
    }

    fn max_players(&self) -> usize {
        dispatch!(self, g => g.max_players())
    }

    fn init(&mut self, ctx: &mut GameContext<'_>) -> InitResult {
        dispatch!(self, g => g.init(ctx))
    }

    fn player_joined(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        dispatch!(self, g => g.player_joined(ctx, player))
    }

    fn player_left(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        dispatch!(self, g => g.player_left(ctx, player))
    }

    fn handle_input(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        input: &Message,
    ) -> Result<(), GameError> {
        let table = input.table();
        if table.owner != TableOwner::Game(self.game_type())
            || table.direction != Direction::ClientToServer
        {
            return Err(GameError::InvalidInput("message belongs to another table"));
        }
        if self.is_terminal() {
            return Err(GameError::WrongPhase(self.phase()));
        }
        dispatch!(self, g => g.handle_input(ctx, player, input))
    }

    fn tick(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        if self.is_terminal() {
            return Ok(());
        }
        dispatch!(self, g => g.tick(ctx))
    }

    fn phase(&self) -> GamePhase {
        dispatch!(self, g => g.phase())
    }

    fn abort(&mut self) -> Result<(), GameError> {
        dispatch!(self, g => g.abort())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Harness;
    use super::*;
    use crate::protocol::minigames::{heek, ttt};

    #[test]
    fn test_every_game_initializes_to_waiting() {
        for game_type in GameType::ALL {
            let mut game = Game::new(game_type, &GameParams::default());
            assert_eq!(game.phase(), GamePhase::Uninitialized);
            let mut harness = Harness::new(&[]);
            assert_eq!(harness.init(&mut game), InitResult::Success, "{:?}", game_type);
            assert_eq!(game.game_type(), game_type);
            assert!(!game.is_terminal());
        }
    }

    #[test]
    fn test_rejects_other_game_messages() {
        let mut game = Game::new(GameType::Ttt, &GameParams::default());
        let mut harness = Harness::new(&[1, 2]);
        harness.init(&mut game);
        let (result, _) = harness.input(&mut game, 1, heek::choose(heek::Choice::Rock).unwrap());
        assert!(matches!(result, Err(GameError::InvalidInput(_))));
        let (result, _) = harness.input(&mut game, 1, ttt::make_move(0, 0).unwrap());
        assert!(result.is_ok());
    }

    #[test]
    fn test_abort_is_terminal_and_stops_input() {
        let mut game = Game::new(GameType::VarSync, &GameParams::default());
        let mut harness = Harness::new(&[1]);
        harness.init(&mut game);
        game.abort().unwrap();
        assert!(game.is_terminal());
        let message = crate::protocol::minigames::var_sync::request_all_vars().unwrap();
        let (result, _) = harness.input(&mut game, 1, message);
        assert_eq!(result, Err(GameError::WrongPhase(GamePhase::Aborted)));
    }
}
