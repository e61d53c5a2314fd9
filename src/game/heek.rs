//! Heek: Rock-Paper-Scissors Elimination
//!
//! Up to five players sit at numbered positions. Each round everyone still
//! in the game throws; the first throw starts a countdown and the round is
//! revealed when the countdown stops or every player has thrown.
//!
//! - One distinct throw, or all three: a tie. Throwers replay; anyone who
//!   stayed silent is out.
//! - Two distinct throws: the throw that beats the other wins the round and
//!   everyone else is out, silent players included.
//!
//! The last player standing wins the game, collects a point per opponent
//! and the table resets after the win animation.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{GameContext, GameError, GameParams, GamePhase, InitResult, Lifecycle, MiniGame, PlayerId};
use crate::protocol::minigames::heek::{
    self as proto, cli2srv, Choice, CountdownState, LightState, SEATS,
};
use crate::protocol::services::game::GameType;
use crate::protocol::Message;

/// Countdown when the creator does not pick one.
pub const DEFAULT_COUNTDOWN: Duration = Duration::from_secs(10);

/// How long the win animation may run before the table resets on its own.
pub const WIN_ANIMATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Seat {
    player: PlayerId,
    points: u32,
    name: String,
    playing: bool,
    choice: Option<Choice>,
}

impl Seat {
    fn throw(&self) -> Result<Choice, GameError> {
        self.choice.ok_or(GameError::NoChoiceSubmitted(self.player))
    }
}

/// Round sub-state refining `InProgress` and `Resolving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// No round running.
    Idle,
    /// Waiting for the first throw.
    ChoiceCollecting,
    /// First throw is in; round closes at `deadline`.
    CountdownRunning {
        /// When the countdown stops.
        deadline: Instant,
    },
    /// Throws are being scored.
    ChoiceRevealed,
    /// A game winner is being celebrated.
    WinnerAnimating {
        /// Winning position.
        position: u8,
        /// When the table resets without a `SequenceFinished`.
        deadline: Instant,
    },
}

/// Result of scoring one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Nobody threw; the round is replayed with everyone.
    NoChoices,
    /// Throwers replay; `dropped` stayed silent and are out.
    Tie {
        /// Silent positions.
        dropped: Vec<u8>,
    },
    /// `winning` beat the other throw.
    Decided {
        /// Winning throw.
        winning: Choice,
        /// Positions that lost, silent ones included.
        losers: Vec<u8>,
    },
}

/// Score a round from `(position, throw)` pairs.
pub fn resolve_round(throws: &[(u8, Option<Choice>)]) -> RoundOutcome {
    let distinct: BTreeSet<Choice> = throws.iter().filter_map(|(_, c)| *c).collect();
    let silent = || {
        throws
            .iter()
            .filter(|(_, c)| c.is_none())
            .map(|(p, _)| *p)
            .collect::<Vec<_>>()
    };
    let values: Vec<Choice> = distinct.into_iter().collect();
    match values.as_slice() {
        [] => RoundOutcome::NoChoices,
        [a, b] => {
            let winning = if a.beats(*b) { *a } else { *b };
            let losers = throws
                .iter()
                .filter(|(_, c)| *c != Some(winning))
                .map(|(p, _)| *p)
                .collect();
            RoundOutcome::Decided { winning, losers }
        }
        _ => RoundOutcome::Tie { dropped: silent() },
    }
}

/// Heek table state.
#[derive(Debug)]
pub struct HeekGame {
    lifecycle: Lifecycle,
    seats: [Option<Seat>; SEATS as usize],
    round: RoundState,
    countdown: Duration,
    /// Players at the start of the current game.
    starters: u32,
}

impl HeekGame {
    /// `param0` is the countdown in seconds; 0 picks the default.
    pub fn new(params: &GameParams) -> Self {
        let countdown = match params.param0 {
            0 => DEFAULT_COUNTDOWN,
            secs => Duration::from_secs(secs as u64),
        };
        Self {
            lifecycle: Lifecycle::new(),
            seats: Default::default(),
            round: RoundState::Idle,
            countdown,
            starters: 0,
        }
    }

    /// Round sub-state.
    pub fn round(&self) -> RoundState {
        self.round
    }

    /// Position held by `player`.
    pub fn position_of(&self, player: PlayerId) -> Option<u8> {
        self.seats
            .iter()
            .position(|s| s.as_ref().map(|s| s.player) == Some(player))
            .map(|p| p as u8)
    }

    /// Points of the player at `position`.
    pub fn points(&self, position: u8) -> Option<u32> {
        self.seat(position).map(|s| s.points)
    }

    /// Whether the player at `position` is still in the current game.
    pub fn is_playing(&self, position: u8) -> bool {
        self.seat(position).map(|s| s.playing).unwrap_or(false)
    }

    fn seat(&self, position: u8) -> Option<&Seat> {
        self.seats.get(position as usize).and_then(|s| s.as_ref())
    }

    fn seated(&self) -> usize {
        self.seats.iter().flatten().count()
    }

    fn playing(&self) -> impl Iterator<Item = (u8, &Seat)> {
        self.seats
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i as u8, s)))
            .filter(|(_, s)| s.playing)
    }

    /// 1 for the leader.
    fn rank(&self, points: u32) -> u32 {
        1 + self.seats.iter().flatten().filter(|s| s.points > points).count() as u32
    }

    fn round_open(&self) -> bool {
        matches!(
            self.round,
            RoundState::ChoiceCollecting | RoundState::CountdownRunning { .. }
        )
    }

    fn sit(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        position: u8,
        points: u32,
        name: &str,
    ) -> Result<(), GameError> {
        if position >= SEATS {
            return Err(GameError::InvalidInput("no such position"));
        }
        if self.position_of(player).is_some() {
            return Err(GameError::InvalidInput("already seated"));
        }
        if let Some(seat) = self.seat(position) {
            return Err(GameError::SlotTaken {
                slot: position as u32,
                occupant: seat.player,
            });
        }

        let idle = self.round == RoundState::Idle;
        self.seats[position as usize] = Some(Seat {
            player,
            points,
            name: name.to_string(),
            playing: false,
            choice: None,
        });
        let rank = self.rank(points);
        ctx.send_to(player, proto::play_game_reply(true, self.seated() == 1, false)?);
        ctx.broadcast(proto::welcome(position, points, rank, name)?);
        ctx.broadcast(proto::light_state(position, LightState::On)?);

        if idle && self.seated() >= 2 {
            self.start_game(ctx)?;
        }
        Ok(())
    }

    fn stand(&mut self, ctx: &mut GameContext<'_>, position: u8) -> Result<(), GameError> {
        self.seats[position as usize] = None;
        ctx.broadcast(proto::drop(position)?);
        ctx.broadcast(proto::light_state(position, LightState::Off)?);

        match self.round {
            RoundState::WinnerAnimating { position: winner, .. } if winner == position => {
                self.reset_table(ctx)
            }
            _ if self.round_open() => {
                let remaining: Vec<u8> = self.playing().map(|(p, _)| p).collect();
                match remaining.as_slice() {
                    [] => self.reset_table(ctx),
                    [last] => {
                        ctx.broadcast(proto::countdown_state(CountdownState::Stop)?);
                        self.lifecycle.advance(GamePhase::Resolving)?;
                        self.declare_winner(ctx, *last)
                    }
                    _ if self.playing().all(|(_, s)| s.choice.is_some()) => self.resolve(ctx),
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn start_game(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        for seat in self.seats.iter_mut().flatten() {
            seat.playing = true;
        }
        self.starters = self.seated() as u32;
        debug!(players = self.starters, "heek game starting");
        self.start_round(ctx)
    }

    fn start_round(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        self.lifecycle.advance(GamePhase::InProgress)?;
        self.round = RoundState::ChoiceCollecting;
        for seat in self.seats.iter_mut().flatten() {
            seat.choice = None;
        }
        let players: Vec<PlayerId> = self.playing().map(|(_, s)| s.player).collect();
        for player in players {
            ctx.send_to(player, proto::interface_state(true)?);
        }
        Ok(())
    }

    fn choose(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        choice: Choice,
    ) -> Result<(), GameError> {
        let position = self.position_of(player).ok_or(GameError::NotSeated(player))?;
        if !self.round_open() {
            return Err(GameError::WrongPhase(self.lifecycle.phase()));
        }
        let Some(seat) = self.seats[position as usize].as_mut() else {
            return Err(GameError::NotSeated(player));
        };
        if !seat.playing {
            return Err(GameError::InvalidInput("not in this game"));
        }
        if seat.choice.is_some() {
            return Err(GameError::InvalidInput("already chose this round"));
        }
        seat.choice = Some(choice);
        ctx.send_to(player, proto::interface_state(false)?);

        if self.round == RoundState::ChoiceCollecting {
            self.round = RoundState::CountdownRunning {
                deadline: ctx.now() + self.countdown,
            };
            ctx.broadcast(proto::countdown_state(CountdownState::Start)?);
        }
        if self.playing().all(|(_, s)| s.choice.is_some()) {
            self.resolve(ctx)?;
        }
        Ok(())
    }

    fn resolve(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        ctx.broadcast(proto::countdown_state(CountdownState::Stop)?);
        self.lifecycle.advance(GamePhase::Resolving)?;
        self.round = RoundState::ChoiceRevealed;

        let throws: Vec<(u8, Option<Choice>)> = self
            .playing()
            .map(|(position, seat)| match seat.throw() {
                Ok(choice) => (position, Some(choice)),
                Err(e) => {
                    debug!(position, "{}", e);
                    (position, None)
                }
            })
            .collect();

        match resolve_round(&throws) {
            RoundOutcome::NoChoices => {}
            RoundOutcome::Tie { dropped } => {
                for position in dropped {
                    self.eliminate(ctx, position)?;
                }
            }
            RoundOutcome::Decided { winning, losers } => {
                for (position, choice) in &throws {
                    if let (Some(choice), Some(seat)) = (choice, self.seat(*position)) {
                        ctx.send_to(seat.player, proto::win_lose(*choice == winning, winning)?);
                    }
                }
                for position in losers {
                    self.eliminate(ctx, position)?;
                }
                let winners: Vec<u8> = self.playing().map(|(p, _)| p).collect();
                for position in winners {
                    ctx.broadcast(proto::light_state(position, LightState::Flashing)?);
                }
            }
        }

        let remaining: Vec<u8> = self.playing().map(|(p, _)| p).collect();
        match remaining.as_slice() {
            [] => self.reset_table(ctx),
            [winner] => self.declare_winner(ctx, *winner),
            _ => self.start_round(ctx),
        }
    }

    fn eliminate(&mut self, ctx: &mut GameContext<'_>, position: u8) -> Result<(), GameError> {
        if let Some(seat) = self.seats[position as usize].as_mut() {
            seat.playing = false;
        }
        ctx.broadcast(proto::light_state(position, LightState::Off)?);
        Ok(())
    }

    fn declare_winner(&mut self, ctx: &mut GameContext<'_>, position: u8) -> Result<(), GameError> {
        let stake = self.starters.saturating_sub(1);
        if self.seat(position).is_none() {
            return self.reset_table(ctx);
        }
        let Some(seat) = self.seats[position as usize].as_mut() else {
            return Ok(());
        };
        seat.points = seat.points.saturating_add(stake);
        let (player, points, choice) = (seat.player, seat.points, seat.choice);

        if let Some(choice) = choice {
            ctx.broadcast(proto::game_win(position, choice)?);
        }
        let rank = self.rank(points);
        ctx.send_to(player, proto::point_update(true, points, rank)?);
        self.round = RoundState::WinnerAnimating {
            position,
            deadline: ctx.now() + WIN_ANIMATION,
        };
        debug!(position, points, "heek game won");
        Ok(())
    }

    fn reset_table(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        self.round = RoundState::Idle;
        let positions: Vec<u8> = self
            .seats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| i as u8)
            .collect();
        for seat in self.seats.iter_mut().flatten() {
            seat.playing = false;
            seat.choice = None;
        }
        for position in positions {
            ctx.broadcast(proto::light_state(position, LightState::On)?);
        }
        ctx.broadcast(proto::countdown_state(CountdownState::Idle)?);
        self.lifecycle.advance(GamePhase::WaitingForPlayers)?;
        if self.seated() >= 2 {
            self.start_game(ctx)?;
        }
        Ok(())
    }
}

impl MiniGame for HeekGame {
    fn game_type(&self) -> GameType {
        GameType::Heek
    }

    fn max_players(&self) -> usize {
        // Spectators may watch from the room; seats are limited separately.
        SEATS as usize * 4
    }

    fn init(&mut self, _ctx: &mut GameContext<'_>) -> InitResult {
        self.lifecycle
            .initialize(InitResult::Success)
            .unwrap_or(InitResult::Error)
    }

    fn player_joined(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        for (position, seat) in self.seats.iter().enumerate() {
            if let Some(seat) = seat {
                let position = position as u8;
                let rank = self.rank(seat.points);
                ctx.send_to(player, proto::welcome(position, seat.points, rank, &seat.name)?);
                let light = if seat.playing || self.round == RoundState::Idle {
                    LightState::On
                } else {
                    LightState::Off
                };
                ctx.send_to(player, proto::light_state(position, light)?);
            }
        }
        Ok(())
    }

    fn player_left(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        match self.position_of(player) {
            Some(position) => self.stand(ctx, position),
            None => Ok(()),
        }
    }

    fn handle_input(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        input: &Message,
    ) -> Result<(), GameError> {
        match input.opcode() {
            cli2srv::PLAY_GAME => self.sit(
                ctx,
                player,
                input.u8("position")?,
                input.u32("points")?,
                input.str("name")?,
            ),
            cli2srv::LEAVE_GAME => {
                let position = self.position_of(player).ok_or(GameError::NotSeated(player))?;
                ctx.send_to(player, proto::goodbye()?);
                self.stand(ctx, position)
            }
            cli2srv::CHOOSE => {
                let choice = Choice::from_u8(input.u8("choice")?)
                    .ok_or(GameError::InvalidInput("unknown choice"))?;
                self.choose(ctx, player, choice)
            }
            cli2srv::SEQUENCE_FINISHED => match self.round {
                RoundState::WinnerAnimating { position, .. }
                    if self.position_of(player) == Some(position) =>
                {
                    self.reset_table(ctx)
                }
                _ => Ok(()),
            },
            _ => Err(GameError::InvalidInput("unexpected message")),
        }
    }

    fn tick(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        match self.round {
            RoundState::CountdownRunning { deadline } if ctx.now() >= deadline => self.resolve(ctx),
            RoundState::WinnerAnimating { deadline, .. } if ctx.now() >= deadline => {
                self.reset_table(ctx)
            }
            _ => Ok(()),
        }
    }

    fn phase(&self) -> GamePhase {
        self.lifecycle.phase()
    }

    fn abort(&mut self) -> Result<(), GameError> {
        self.round = RoundState::Idle;
        self.lifecycle.advance(GamePhase::Aborted).map(|_| ())
    }
}
