//! Marker Games
//!
//! The owner places markers and runs the game; everyone else hunts them.
//! The variant only changes how the game ends:
//!
//! | Variant          | Teams | Ends when                         | Recapture |
//! |------------------|-------|-----------------------------------|-----------|
//! | Quest            | no    | every marker found                | no        |
//! | TimedQuest       | no    | every marker found, or time up    | no        |
//! | Capture          | yes   | every marker taken, or time up    | no        |
//! | CaptureAndHold   | yes   | time up                           | yes       |

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::{GameContext, GameError, GameParams, GamePhase, InitResult, Lifecycle, MiniGame, PlayerId};
use crate::core::idpool::IdPool;
use crate::protocol::minigames::marker::{self as proto, cli2srv, srv2cli, MarkerInfo, MarkerVariant};
use crate::protocol::services::game::GameType;
use crate::protocol::Message;

/// Team value for quests and for "no winner".
pub const NO_TEAM: u8 = 0;

#[derive(Debug, Clone)]
struct Marker {
    info: MarkerInfo,
    /// Team holding it; `Some(NO_TEAM)` once found in a quest.
    holder: Option<u8>,
}

/// Marker game state.
#[derive(Debug)]
pub struct MarkerGame {
    lifecycle: Lifecycle,
    variant: Option<MarkerVariant>,
    name: String,
    /// 0 means no limit.
    time_limit: Duration,
    /// Clock left when not running.
    remaining: Duration,
    deadline: Option<Instant>,
    markers: BTreeMap<u32, Marker>,
    ids: IdPool,
    teams: BTreeMap<PlayerId, u8>,
}

impl MarkerGame {
    /// `param0` selects the variant, `param1` is the time limit in seconds.
    pub fn new(params: &GameParams) -> Self {
        let time_limit = Duration::from_secs(params.param1 as u64);
        Self {
            lifecycle: Lifecycle::new(),
            variant: MarkerVariant::from_u32(params.param0),
            name: params.name.clone(),
            time_limit,
            remaining: time_limit,
            deadline: None,
            markers: BTreeMap::new(),
            ids: IdPool::new(1),
            teams: BTreeMap::new(),
        }
    }

    /// Win-condition variant.
    pub fn variant(&self) -> Option<MarkerVariant> {
        self.variant
    }

    /// Team of a player; [`NO_TEAM`] in quests.
    pub fn team_of(&self, player: PlayerId) -> u8 {
        self.teams.get(&player).copied().unwrap_or(NO_TEAM)
    }

    /// Placed markers.
    pub fn markers(&self) -> impl Iterator<Item = &MarkerInfo> {
        self.markers.values().map(|m| &m.info)
    }

    /// Holder of a marker.
    pub fn holder(&self, marker_id: u32) -> Option<u8> {
        self.markers.get(&marker_id).and_then(|m| m.holder)
    }

    fn variant_or_err(&self) -> Result<MarkerVariant, GameError> {
        self.variant.ok_or(GameError::InvalidInput("unknown marker variant"))
    }

    fn require_owner(ctx: &GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        if ctx.owner() == player {
            Ok(())
        } else {
            Err(GameError::NotOwner(player))
        }
    }

    fn require_stopped(&self) -> Result<(), GameError> {
        match self.lifecycle.phase() {
            GamePhase::InProgress => Err(GameError::WrongPhase(GamePhase::InProgress)),
            _ => Ok(()),
        }
    }

    fn marker_mut(&mut self, marker_id: u32) -> Result<&mut Marker, GameError> {
        self.markers
            .get_mut(&marker_id)
            .ok_or(GameError::InvalidInput("no such marker"))
    }

    fn time_left_ms(&self, now: Instant) -> u32 {
        let left = match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(now),
            None => self.remaining,
        };
        left.as_millis().min(u32::MAX as u128) as u32
    }

    fn start(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        self.lifecycle.require(GamePhase::WaitingForPlayers)?;
        if self.markers.is_empty() {
            return Err(GameError::InvalidInput("no markers placed"));
        }
        if self.markers.values().all(|m| m.holder.is_some()) {
            self.clear_captures();
        }
        self.lifecycle.advance(GamePhase::InProgress)?;
        let timed = self.variant_or_err()? != MarkerVariant::Quest;
        if timed && !self.time_limit.is_zero() {
            if self.remaining.is_zero() {
                self.remaining = self.time_limit;
            }
            self.deadline = Some(ctx.now() + self.remaining);
        }
        ctx.broadcast(proto::notice(srv2cli::GAME_STARTED)?);
        Ok(())
    }

    fn pause(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        self.lifecycle.require(GamePhase::InProgress)?;
        let left_ms = self.time_left_ms(ctx.now());
        if let Some(deadline) = self.deadline.take() {
            self.remaining = deadline.saturating_duration_since(ctx.now());
        }
        self.lifecycle.advance(GamePhase::WaitingForPlayers)?;
        ctx.broadcast(proto::game_paused(left_ms)?);
        Ok(())
    }

    fn clear_captures(&mut self) {
        for marker in self.markers.values_mut() {
            marker.holder = None;
        }
    }

    fn reset(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        self.clear_captures();
        self.deadline = None;
        self.remaining = self.time_limit;
        self.lifecycle.advance(GamePhase::WaitingForPlayers)?;
        ctx.broadcast(proto::notice(srv2cli::GAME_RESET)?);
        Ok(())
    }

    fn capture(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        marker_id: u32,
    ) -> Result<(), GameError> {
        self.lifecycle.require(GamePhase::InProgress)?;
        let variant = self.variant_or_err()?;
        let team = self.team_of(player);
        let marker = self.marker_mut(marker_id)?;
        match marker.holder {
            None => {}
            Some(holder) if variant == MarkerVariant::CaptureAndHold && holder != team => {}
            Some(_) => return Ok(()),
        }
        marker.holder = Some(team);
        ctx.broadcast(proto::marker_captured(marker_id, team)?);

        let all_taken = self.markers.values().all(|m| m.holder.is_some());
        match variant {
            MarkerVariant::Quest | MarkerVariant::TimedQuest | MarkerVariant::Capture if all_taken => {
                self.finish(ctx)
            }
            _ => Ok(()),
        }
    }

    /// Team with the most markers, or [`NO_TEAM`] on a tie.
    pub fn leading_team(&self) -> u8 {
        let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
        for holder in self.markers.values().filter_map(|m| m.holder) {
            *counts.entry(holder).or_default() += 1;
        }
        let best = counts.values().copied().max().unwrap_or(0);
        let mut leaders = counts.iter().filter(|(_, c)| **c == best).map(|(t, _)| *t);
        match (leaders.next(), leaders.next()) {
            (Some(team), None) => team,
            _ => NO_TEAM,
        }
    }

    fn finish(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        self.lifecycle.advance(GamePhase::Resolving)?;
        let winner = match self.variant_or_err()? {
            MarkerVariant::Quest | MarkerVariant::TimedQuest => NO_TEAM,
            MarkerVariant::Capture | MarkerVariant::CaptureAndHold => self.leading_team(),
        };
        self.deadline = None;
        self.remaining = self.time_limit;
        ctx.broadcast(proto::game_over(winner)?);
        self.lifecycle.advance(GamePhase::WaitingForPlayers)?;
        Ok(())
    }

    fn assign_team(&mut self, player: PlayerId) -> u8 {
        let on_one = self.teams.values().filter(|t| **t == 1).count();
        let on_two = self.teams.values().filter(|t| **t == 2).count();
        let team = if on_one <= on_two { 1 } else { 2 };
        self.teams.insert(player, team);
        team
    }
}

impl MiniGame for MarkerGame {
    fn game_type(&self) -> GameType {
        GameType::Marker
    }

    fn max_players(&self) -> usize {
        32
    }

    fn init(&mut self, _ctx: &mut GameContext<'_>) -> InitResult {
        let outcome = match self.variant {
            Some(_) => InitResult::Success,
            None => InitResult::Error,
        };
        self.lifecycle.initialize(outcome).unwrap_or(InitResult::Error)
    }

    fn player_joined(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        let variant = self.variant_or_err()?;
        let team = if variant.has_teams() {
            self.assign_team(player)
        } else {
            NO_TEAM
        };
        ctx.send_to(player, proto::game_type(variant)?);
        ctx.send_to(player, proto::team_assigned(team)?);
        ctx.send_to(player, proto::game_name_changed(&self.name)?);
        let limit_ms = self.time_limit.as_millis().min(u32::MAX as u128) as u32;
        ctx.send_to(player, proto::time_limit_changed(limit_ms)?);
        for marker in self.markers.values() {
            ctx.send_to(player, proto::marker_added(&marker.info)?);
            if let Some(holder) = marker.holder {
                ctx.send_to(player, proto::marker_captured(marker.info.id, holder)?);
            }
        }
        Ok(())
    }

    fn player_left(&mut self, _ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        self.teams.remove(&player);
        Ok(())
    }

    fn handle_input(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        input: &Message,
    ) -> Result<(), GameError> {
        let opcode = input.opcode();
        if opcode != cli2srv::CAPTURE_MARKER {
            Self::require_owner(ctx, player)?;
        }
        match opcode {
            cli2srv::START_GAME => self.start(ctx),
            cli2srv::PAUSE_GAME => self.pause(ctx),
            cli2srv::RESET_GAME => self.reset(ctx),
            cli2srv::CHANGE_GAME_NAME => {
                self.name = input.str("name")?.to_string();
                ctx.broadcast(proto::game_name_changed(&self.name)?);
                Ok(())
            }
            cli2srv::CHANGE_TIME_LIMIT => {
                self.require_stopped()?;
                let limit_ms = input.u32("time_limit_ms")?;
                self.time_limit = Duration::from_millis(limit_ms as u64);
                self.remaining = self.time_limit;
                ctx.broadcast(proto::time_limit_changed(limit_ms)?);
                Ok(())
            }
            cli2srv::DELETE_GAME => {
                self.deadline = None;
                self.lifecycle.advance(GamePhase::Aborted)?;
                ctx.broadcast(proto::game_deleted(false)?);
                Ok(())
            }
            cli2srv::ADD_MARKER => {
                self.require_stopped()?;
                let id = self
                    .ids
                    .allocate()
                    .ok_or(GameError::InvalidInput("marker ids exhausted"))?;
                let info = MarkerInfo {
                    id,
                    position: [input.f64("x")?, input.f64("y")?, input.f64("z")?],
                    name: input.str("name")?.to_string(),
                    age: input.str("age")?.to_string(),
                };
                ctx.broadcast(proto::marker_added(&info)?);
                self.markers.insert(id, Marker { info, holder: None });
                Ok(())
            }
            cli2srv::DELETE_MARKER => {
                self.require_stopped()?;
                let id = input.u32("marker_id")?;
                self.markers
                    .remove(&id)
                    .ok_or(GameError::InvalidInput("no such marker"))?;
                self.ids.release(id);
                ctx.broadcast(proto::marker_deleted(id)?);
                Ok(())
            }
            cli2srv::CHANGE_MARKER_NAME => {
                let id = input.u32("marker_id")?;
                let name = input.str("name")?.to_string();
                self.marker_mut(id)?.info.name = name.clone();
                ctx.broadcast(proto::marker_name_changed(id, &name)?);
                Ok(())
            }
            cli2srv::CAPTURE_MARKER => self.capture(ctx, player, input.u32("marker_id")?),
            _ => Err(GameError::InvalidInput("unexpected message")),
        }
    }

    fn tick(&mut self, ctx: &mut GameContext<'_>) -> Result<(), GameError> {
        match self.deadline {
            Some(deadline) if ctx.now() >= deadline => self.finish(ctx),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::testing::{find, Harness};

    const OWNER: PlayerId = 100;

    fn game_with(variant: MarkerVariant, limit_secs: u32, markers: usize) -> (MarkerGame, Harness) {
        let mut h = Harness::new(&[OWNER, 200, 300]);
        let mut game = MarkerGame::new(&GameParams {
            param0: variant as u32,
            param1: limit_secs,
            name: "Relto hunt".into(),
        });
        assert_eq!(h.init(&mut game), InitResult::Success);
        for i in 0..markers {
            h.input(&mut game, OWNER, proto::add_marker([i as f64, 0.0, 1.5], "m", "Teledahn").unwrap())
                .0
                .unwrap();
        }
        (game, h)
    }

    fn capture(game: &mut MarkerGame, h: &mut Harness, player: PlayerId, id: u32) -> Vec<crate::game::Outgoing> {
        let (r, out) = h.input(game, player, proto::marker_command(cli2srv::CAPTURE_MARKER, id).unwrap());
        r.unwrap();
        out
    }

    #[test]
    fn test_unknown_variant_fails_init() {
        let mut h = Harness::new(&[]);
        let mut game = MarkerGame::new(&GameParams { param0: 9, ..Default::default() });
        assert_eq!(h.init(&mut game), InitResult::Error);
        assert_eq!(game.phase(), GamePhase::Aborted);
    }

    #[test]
    fn test_edits_are_owner_only() {
        let (mut game, mut h) = game_with(MarkerVariant::Quest, 0, 1);
        let (r, _) = h.input(&mut game, 200, proto::command(cli2srv::START_GAME).unwrap());
        assert_eq!(r, Err(GameError::NotOwner(200)));
        let (r, _) = h.input(&mut game, 200, proto::change_game_name("mine").unwrap());
        assert_eq!(r, Err(GameError::NotOwner(200)));
    }

    #[test]
    fn test_quest_ends_when_all_found() {
        let (mut game, mut h) = game_with(MarkerVariant::Quest, 0, 2);
        h.input(&mut game, OWNER, proto::command(cli2srv::START_GAME).unwrap()).0.unwrap();
        capture(&mut game, &mut h, 200, 1);
        assert_eq!(game.phase(), GamePhase::InProgress);
        let out = capture(&mut game, &mut h, 300, 2);
        assert_eq!(find(&out, "GameOver").unwrap().message.u8("winning_team").unwrap(), NO_TEAM);
        assert_eq!(game.phase(), GamePhase::WaitingForPlayers);
    }

    #[test]
    fn test_teams_alternate() {
        let (game, _) = game_with(MarkerVariant::Capture, 60, 0);
        assert_eq!(game.team_of(OWNER), 1);
        assert_eq!(game.team_of(200), 2);
        assert_eq!(game.team_of(300), 1);
    }

    #[test]
    fn test_capture_and_hold_allows_steal_and_ends_on_time() {
        let (mut game, mut h) = game_with(MarkerVariant::CaptureAndHold, 30, 2);
        h.input(&mut game, OWNER, proto::command(cli2srv::START_GAME).unwrap()).0.unwrap();
        capture(&mut game, &mut h, 200, 1);
        capture(&mut game, &mut h, 200, 2);
        assert_eq!(game.phase(), GamePhase::InProgress);
        capture(&mut game, &mut h, 300, 1);
        assert_eq!(game.holder(1), Some(1));
        assert_eq!(game.leading_team(), NO_TEAM);
        capture(&mut game, &mut h, OWNER, 2);
        assert_eq!(game.leading_team(), 1);

        h.advance(Duration::from_secs(31));
        let (r, out) = h.run(|ctx| game.tick(ctx));
        r.unwrap();
        assert_eq!(find(&out, "GameOver").unwrap().message.u8("winning_team").unwrap(), 1);
    }

    #[test]
    fn test_capture_holds_first_team() {
        let (mut game, mut h) = game_with(MarkerVariant::Capture, 30, 2);
        h.input(&mut game, OWNER, proto::command(cli2srv::START_GAME).unwrap()).0.unwrap();
        capture(&mut game, &mut h, 200, 1);
        let out = capture(&mut game, &mut h, 300, 1);
        assert!(out.is_empty());
        assert_eq!(game.holder(1), Some(2));
    }

    #[test]
    fn test_capture_ends_when_every_marker_taken() {
        let (mut game, mut h) = game_with(MarkerVariant::Capture, 60, 2);
        h.input(&mut game, OWNER, proto::command(cli2srv::START_GAME).unwrap()).0.unwrap();
        capture(&mut game, &mut h, 200, 1);
        assert_eq!(game.phase(), GamePhase::InProgress);

        // Well inside the time limit.
        h.advance(Duration::from_secs(5));
        let out = capture(&mut game, &mut h, 200, 2);
        assert_eq!(find(&out, "GameOver").unwrap().message.u8("winning_team").unwrap(), 2);
        assert_eq!(game.phase(), GamePhase::WaitingForPlayers);
    }

    #[test]
    fn test_timed_quest_ends_when_time_runs_out() {
        let (mut game, mut h) = game_with(MarkerVariant::TimedQuest, 10, 2);
        h.input(&mut game, OWNER, proto::command(cli2srv::START_GAME).unwrap()).0.unwrap();
        capture(&mut game, &mut h, 200, 1);

        h.advance(Duration::from_secs(9));
        let (r, out) = h.run(|ctx| game.tick(ctx));
        r.unwrap();
        assert!(out.is_empty());
        assert_eq!(game.phase(), GamePhase::InProgress);

        h.advance(Duration::from_secs(2));
        let (r, out) = h.run(|ctx| game.tick(ctx));
        r.unwrap();
        assert_eq!(find(&out, "GameOver").unwrap().message.u8("winning_team").unwrap(), NO_TEAM);
        assert_eq!(game.phase(), GamePhase::WaitingForPlayers);
        assert_eq!(game.holder(2), None);
    }

    #[test]
    fn test_pause_keeps_remaining_time() {
        let (mut game, mut h) = game_with(MarkerVariant::TimedQuest, 10, 1);
        h.input(&mut game, OWNER, proto::command(cli2srv::START_GAME).unwrap()).0.unwrap();
        h.advance(Duration::from_secs(4));
        let (r, out) = h.input(&mut game, OWNER, proto::command(cli2srv::PAUSE_GAME).unwrap());
        r.unwrap();
        assert_eq!(find(&out, "GamePaused").unwrap().message.u32("time_left_ms").unwrap(), 6000);
        let (r, _) = h.input(&mut game, OWNER, proto::add_marker([0.0; 3], "late", "Gahreesen").unwrap());
        assert!(r.is_ok());
    }

    #[test]
    fn test_delete_game_aborts() {
        let (mut game, mut h) = game_with(MarkerVariant::Quest, 0, 0);
        let (r, out) = h.input(&mut game, OWNER, proto::command(cli2srv::DELETE_GAME).unwrap());
        r.unwrap();
        assert!(find(&out, "GameDeleted").is_some());
        assert!(game.is_terminal());
    }
}
