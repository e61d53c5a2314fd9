//! Blue Spiral: reproduce a cloth sequence before the door closes.
//!
//! The server deals a sequence over seven cloths and sends it to everyone
//! in the room. `StartGame` opens the door and starts the clock; hits are
//! matched position by position and one wrong cloth ends the attempt.

use std::time::{Duration, Instant};

use super::{GameContext, GameError, GameParams, GamePhase, InitResult, Lifecycle, MiniGame, PlayerId};
use crate::core::rng::GameRng;
use crate::protocol::minigames::blue_spiral::{self as proto, cli2srv, CLOTHS, MAX_SEQUENCE};
use crate::protocol::services::game::GameType;
use crate::protocol::Message;

/// Sequence length when the creator does not pick one.
pub const DEFAULT_SEQUENCE: usize = CLOTHS as usize;

/// Time limit when the creator does not pick one.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(60);

/// Blue spiral state.
#[derive(Debug)]
pub struct BlueSpiralGame {
    lifecycle: Lifecycle,
    length: usize,
    time_limit: Duration,
    order: Vec<u8>,
    hits: usize,
    deadline: Option<Instant>,
}

/// Deal `length` cloths in shuffled runs of all seven.
pub fn deal(rng: &mut GameRng, length: usize) -> Vec<u8> {
    let mut order = Vec::with_capacity(length);
    while order.len() < length {
        let mut run: Vec<u8> = (0..CLOTHS).collect();
        rng.shuffle(&mut run);
        order.extend(run.into_iter().take(length - order.len()));
    }
    order
}

impl BlueSpiralGame {
    /// `param0` is the sequence length, `param1` the time limit in seconds.
    pub fn new(params: &GameParams) -> Self {
        let length = match params.param0 as usize {
            0 => DEFAULT_SEQUENCE,
            n => n.min(MAX_SEQUENCE),
        };
        let time_limit = match params.param1 {
            0 => DEFAULT_TIME_LIMIT,
            secs => Duration::from_secs(secs as u64),
        };
        Self {
            lifecycle: Lifecycle::new(),
            length,
            time_limit,
            order: Vec::new(),
            hits: 0,
            deadline: None,
        }
    }

    /// Current sequence.
    pub fn order(&self) -> &[u8] {
        &self.order
    }

    /// Correct hits this attempt.
    pub fn hits(&self) -> usize {
        self.hits
    }

    fn start(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        self.lifecycle.require(GamePhase::WaitingForPlayers)?;
        self.lifecycle.advance(GamePhase::InProgress)?;
        self.hits = 0;
        self.deadline = Some(ctx.now() + self.time_limit);
        let limit_ms = self.time_limit.as_millis().min(u32::MAX as u128) as u32;
        ctx.broadcast(proto::game_started(true, limit_ms)?);
        Ok(())
    }

    fn hit(&mut self, ctx: &mut GameContext<'_>, cloth: u8) -> Result<(), GameError> {
        self.lifecycle.require(GamePhase::InProgress)?;
        if cloth >= CLOTHS {
            return Err(GameError::InvalidInput("no such cloth"));
        }
        if self.order.get(self.hits) != Some(&cloth) {
            ctx.broadcast(proto::game_over(false)?);
            return self.end_attempt(ctx);
        }
        self.hits += 1;
        ctx.broadcast(proto::successful_hit(self.hits as u8)?);
        if self.hits == self.order.len() {
            ctx.broadcast(proto::game_won()?);
            self.end_attempt(ctx)?;
        }
        Ok(())
    }

    fn end_attempt(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        self.lifecycle.advance(GamePhase::Resolving)?;
        self.deadline = None;
        self.hits = 0;
        self.order = deal(ctx.rng(), self.length);
        ctx.broadcast(proto::cloth_order(&self.order)?);
        self.lifecycle.advance(GamePhase::WaitingForPlayers)?;
        Ok(())
    }
}

impl MiniGame for BlueSpiralGame {
    fn game_type(&self) -> GameType {
        GameType::BlueSpiral
    }

    fn max_players(&self) -> usize {
        10
    }

    fn init(&mut self, ctx: &mut GameContext<'_>) -> InitResult {
        self.order = deal(ctx.rng(), self.length);
        self.lifecycle
            .initialize(InitResult::Success)
            .unwrap_or(InitResult::Error)
    }

    fn player_joined(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        ctx.send_to(player, proto::cloth_order(&self.order)?);
        Ok(())
    }

    fn player_left(&mut self, _ctx: &mut GameContext<'_>, _player: PlayerId) -> Result<(), GameError> {
        Ok(())
    }

    fn handle_input(
        &mut self,
        ctx: &mut GameContext<'_>,
        _player: PlayerId,
        input: &Message,
    ) -> Result<(), GameError> {
        match input.opcode() {
            cli2srv::START_GAME => self.start(ctx),
            cli2srv::HIT_CLOTH => self.hit(ctx, input.u8("cloth")?),
            _ => Err(GameError::InvalidInput("unexpected message")),
        }
    }

    fn tick(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        match self.deadline {
            Some(deadline) if ctx.now() >= deadline => {
                ctx.broadcast(proto::game_over(true)?);
                self.end_attempt(ctx)
            }
            _ => Ok(()),
        }
    }

    fn phase(&self) -> GamePhase {
        self.lifecycle.phase()
    }

    fn abort(&mut self) -> Result<(), GameError> {
        self.deadline = None;
        self.lifecycle.advance(GamePhase::Aborted).map(|_| ())
    }
}
