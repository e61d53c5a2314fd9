//! Tic-Tac-Toe
//!
//! Two seats; the first to join plays X and moves first. A completed line
//! is checked before a full board, so a winning last move is a win and not
//! a tie. A player leaving mid-game hands the other an `OpponentLeft`.

use super::{GameContext, GameError, GamePhase, InitResult, Lifecycle, MiniGame, PlayerId};
use crate::protocol::minigames::ttt::{self as proto, cli2srv, TttResult};
use crate::protocol::services::game::GameType;
use crate::protocol::Message;

/// Board side.
pub const SIZE: usize = 3;

const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// Claimed cells, `None` until claimed.
pub type Board = [[Option<PlayerId>; SIZE]; SIZE];

/// Line owner, if any line is complete.
pub fn winner(board: &Board) -> Option<PlayerId> {
    LINES.iter().find_map(|line| {
        let [a, b, c] = line.map(|(row, col)| board[row][col]);
        match (a, b, c) {
            (Some(a), Some(b), Some(c)) if a == b && b == c => Some(a),
            _ => None,
        }
    })
}

fn is_full(board: &Board) -> bool {
    board.iter().flatten().all(|c| c.is_some())
}

/// Tic-tac-toe state.
#[derive(Debug, Default)]
pub struct TttGame {
    lifecycle: Lifecycle,
    /// X then O.
    players: [Option<PlayerId>; 2],
    board: Board,
    /// Index into `players`.
    turn: usize,
    outcome: Option<(TttResult, PlayerId)>,
}

impl TttGame {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell contents.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Terminal outcome and winner (0 if none).
    pub fn outcome(&self) -> Option<(TttResult, PlayerId)> {
        self.outcome
    }

    /// Whose move it is.
    pub fn current_player(&self) -> Option<PlayerId> {
        self.players[self.turn]
    }

    fn make_move(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        row: u8,
        col: u8,
    ) -> Result<(), GameError> {
        self.lifecycle.require(GamePhase::InProgress)?;
        if !self.players.contains(&Some(player)) {
            return Err(GameError::NotSeated(player));
        }
        if self.current_player() != Some(player) {
            return Err(GameError::NotYourTurn(player));
        }
        let (r, c) = (row as usize, col as usize);
        if r >= SIZE || c >= SIZE {
            return Err(GameError::InvalidInput("cell off the board"));
        }
        if let Some(occupant) = self.board[r][c] {
            return Err(GameError::SlotTaken {
                slot: (r * SIZE + c) as u32,
                occupant,
            });
        }

        self.board[r][c] = Some(player);
        ctx.broadcast(proto::move_made(player, row, col)?);

        if let Some(winner) = winner(&self.board) {
            self.finish(ctx, TttResult::WinnerDecided, winner)
        } else if is_full(&self.board) {
            self.finish(ctx, TttResult::Tied, 0)
        } else {
            self.turn = 1 - self.turn;
            Ok(())
        }
    }

    fn finish(
        &mut self,
        ctx: &mut GameContext<'_>,
        result: TttResult,
        winner: PlayerId,
    ) -> Result<(), GameError> {
        self.lifecycle.advance(GamePhase::Resolving)?;
        self.outcome = Some((result, winner));
        ctx.broadcast(proto::game_over(result, winner)?);
        self.lifecycle.advance(GamePhase::Finished)?;
        Ok(())
    }
}

impl MiniGame for TttGame {
    fn game_type(&self) -> GameType {
        GameType::Ttt
    }

    fn max_players(&self) -> usize {
        2
    }

    fn init(&mut self, _ctx: &mut GameContext<'_>) -> InitResult {
        self.lifecycle
            .initialize(InitResult::Success)
            .unwrap_or(InitResult::Error)
    }

    fn player_joined(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        if self.players.contains(&Some(player)) {
            return Ok(());
        }
        let slot = self
            .players
            .iter_mut()
            .find(|p| p.is_none())
            .ok_or(GameError::GameFull)?;
        *slot = Some(player);

        if let [Some(x), Some(o)] = self.players {
            if self.lifecycle.phase() == GamePhase::WaitingForPlayers {
                self.lifecycle.advance(GamePhase::InProgress)?;
                self.turn = 0;
                ctx.broadcast(proto::game_started(x, o)?);
            }
        }
        Ok(())
    }

    fn player_left(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        let Some(index) = self.players.iter().position(|p| *p == Some(player)) else {
            return Ok(());
        };
        match self.lifecycle.phase() {
            GamePhase::InProgress => {
                let stayed = self.players[1 - index].unwrap_or(0);
                self.finish(ctx, TttResult::OpponentLeft, stayed)
            }
            GamePhase::WaitingForPlayers => {
                self.players[index] = None;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn handle_input(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        input: &Message,
    ) -> Result<(), GameError> {
        match input.opcode() {
            cli2srv::MAKE_MOVE => self.make_move(ctx, player, input.u8("row")?, input.u8("col")?),
            _ => Err(GameError::InvalidInput("unexpected message")),
        }
    }

    fn tick(&mut self, _ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        Ok(())
    }

    fn phase(&self) -> GamePhase {
        self.lifecycle.phase()
    }

    fn abort(&mut self) -> Result<(), GameError> {
        self.lifecycle.advance(GamePhase::Aborted).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::testing::{find, Harness};

    const X: PlayerId = 7;
    const O: PlayerId = 9;

    fn started() -> (TttGame, Harness) {
        let mut h = Harness::new(&[X, O]);
        let mut game = TttGame::new();
        h.init(&mut game);
        (game, h)
    }

    fn play(game: &mut TttGame, h: &mut Harness, player: PlayerId, row: u8, col: u8) -> Result<(), GameError> {
        h.input(game, player, proto::make_move(row, col).unwrap()).0
    }

    #[test]
    fn test_starts_with_two_players() {
        let mut h = Harness::new(&[]);
        let mut game = TttGame::new();
        h.init(&mut game);
        let (_, out) = h.run(|ctx| game.player_joined(ctx, X));
        assert!(out.is_empty());
        assert_eq!(game.phase(), GamePhase::WaitingForPlayers);
        let (_, out) = h.run(|ctx| game.player_joined(ctx, O));
        let started = find(&out, "GameStarted").unwrap();
        assert_eq!(started.message.u32("x_player").unwrap(), X);
        assert_eq!(game.phase(), GamePhase::InProgress);
        let (r, _) = h.run(|ctx| game.player_joined(ctx, 11));
        assert_eq!(r, Err(GameError::GameFull));
    }

    #[test]
    fn test_top_row_wins_before_board_fills() {
        let (mut game, mut h) = started();
        play(&mut game, &mut h, X, 0, 0).unwrap();
        play(&mut game, &mut h, O, 1, 0).unwrap();
        play(&mut game, &mut h, X, 0, 1).unwrap();
        play(&mut game, &mut h, O, 1, 1).unwrap();
        let (r, out) = h.input(&mut game, X, proto::make_move(0, 2).unwrap());
        r.unwrap();
        assert_eq!(game.outcome(), Some((TttResult::WinnerDecided, X)));
        let over = find(&out, "GameOver").unwrap();
        assert_eq!(over.message.u8("result").unwrap(), TttResult::WinnerDecided as u8);
        assert_eq!(game.phase(), GamePhase::Finished);
    }

    #[test]
    fn test_full_board_without_line_ties() {
        let (mut game, mut h) = started();
        // X O X / X O O / O X X
        for (player, r, c) in [
            (X, 0, 0), (O, 0, 1), (X, 0, 2),
            (O, 1, 1), (X, 1, 0), (O, 1, 2),
            (X, 2, 1), (O, 2, 0), (X, 2, 2),
        ] {
            play(&mut game, &mut h, player, r, c).unwrap();
        }
        assert_eq!(game.outcome(), Some((TttResult::Tied, 0)));
    }

    #[test]
    fn test_turn_and_cell_rules() {
        let (mut game, mut h) = started();
        assert_eq!(play(&mut game, &mut h, O, 0, 0), Err(GameError::NotYourTurn(O)));
        play(&mut game, &mut h, X, 1, 1).unwrap();
        assert_eq!(
            play(&mut game, &mut h, O, 1, 1),
            Err(GameError::SlotTaken { slot: 4, occupant: X })
        );
        assert!(matches!(play(&mut game, &mut h, O, 3, 0), Err(GameError::InvalidInput(_))));
        assert_eq!(game.current_player(), Some(O));
    }

    #[test]
    fn test_opponent_leaving_is_its_own_outcome() {
        let (mut game, mut h) = started();
        play(&mut game, &mut h, X, 0, 0).unwrap();
        let (r, out) = h.run(|ctx| game.player_left(ctx, X));
        r.unwrap();
        assert_eq!(game.outcome(), Some((TttResult::OpponentLeft, O)));
        assert!(find(&out, "GameOver").is_some());
        assert!(game.is_terminal());
    }
}
