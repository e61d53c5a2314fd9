//! Climbing Wall
//!
//! Two teams agree on a blocker count, place that many blockers on their
//! own side of the wall, then send a climber up. Slots are claimed first
//! come first served; the session serializes input so the first claim
//! processed wins and later claims for the same slot get `SlotTaken`.

use tracing::debug;

use super::{GameContext, GameError, GamePhase, InitResult, Lifecycle, MiniGame, PlayerId};
use crate::protocol::minigames::climbing_wall::{
    self as proto, cli2srv, encode_snapshot, ReadyDetail, ReadyType, SLOTS, TEAMS,
};
use crate::protocol::services::game::GameType;
use crate::protocol::Message;

/// Blocker count before anyone changes it.
pub const DEFAULT_BLOCKERS: u8 = 5;

/// Where the teams are in a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Agreeing on the blocker count.
    ChoosingCount,
    /// Placing blockers.
    PlacingBlockers,
    /// Climbers on the wall.
    Climbing,
}

/// Climbing wall state.
#[derive(Debug)]
pub struct ClimbingWallGame {
    lifecycle: Lifecycle,
    stage: Stage,
    num_blockers: u8,
    slots: [[Option<PlayerId>; SLOTS]; TEAMS],
    ready: [bool; TEAMS],
    climbers: [Option<PlayerId>; TEAMS],
}

impl Default for ClimbingWallGame {
    fn default() -> Self {
        Self::new()
    }
}

impl ClimbingWallGame {
    /// Empty wall.
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            stage: Stage::ChoosingCount,
            num_blockers: DEFAULT_BLOCKERS,
            slots: [[None; SLOTS]; TEAMS],
            ready: [false; TEAMS],
            climbers: [None; TEAMS],
        }
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Occupant of a slot.
    pub fn occupant(&self, team: usize, slot: usize) -> Option<PlayerId> {
        self.slots.get(team)?.get(slot).copied().flatten()
    }

    /// Claimed slots on a team's side.
    pub fn occupied(&self, team: usize) -> usize {
        self.slots[team].iter().flatten().count()
    }

    fn team(raw: u8) -> Result<usize, GameError> {
        let team = raw as usize;
        if team < TEAMS {
            Ok(team)
        } else {
            Err(GameError::InvalidInput("no such team"))
        }
    }

    fn require_stage(&self, stage: Stage) -> Result<(), GameError> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(GameError::WrongPhase(self.lifecycle.phase()))
        }
    }

    fn change_num_blockers(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        amount: u8,
    ) -> Result<(), GameError> {
        self.require_stage(Stage::ChoosingCount)?;
        if amount as usize > SLOTS {
            return Err(GameError::InvalidInput("more blockers than slots"));
        }
        self.num_blockers = amount;
        self.ready = [false; TEAMS];
        ctx.broadcast(proto::num_blockers_changed(amount, player)?);
        Ok(())
    }

    fn change_blocker(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        team: usize,
        slot: u8,
        added: bool,
    ) -> Result<(), GameError> {
        self.require_stage(Stage::PlacingBlockers)?;
        let index = slot as usize;
        if index >= SLOTS {
            return Err(GameError::InvalidInput("no such slot"));
        }

        if added {
            if let Some(occupant) = self.slots[team][index] {
                ctx.send_to(player, proto::blocker_rejected(team as u8, slot, player, occupant)?);
                return Err(GameError::SlotTaken {
                    slot: slot as u32,
                    occupant,
                });
            }
            if self.occupied(team) >= self.num_blockers as usize {
                ctx.send_to(player, proto::blocker_rejected(team as u8, slot, player, 0)?);
                return Err(GameError::InvalidInput("team has placed every blocker"));
            }
            self.slots[team][index] = Some(player);
        } else if self.slots[team][index].take().is_none() {
            return Err(GameError::InvalidInput("slot is already empty"));
        }

        self.ready[team] = false;
        ctx.broadcast(proto::blockers_changed(team as u8, slot, added, player)?);
        Ok(())
    }

    fn mark_ready(
        &mut self,
        ctx: &mut GameContext<'_>,
        ready_type: ReadyType,
        team: usize,
        detail: ReadyDetail,
    ) -> Result<(), GameError> {
        let stage = match ready_type {
            ReadyType::NumBlockers => Stage::ChoosingCount,
            ReadyType::Blockers => Stage::PlacingBlockers,
        };
        self.require_stage(stage)?;
        self.ready[team] = true;

        let snapshot = match detail {
            ReadyDetail::Count => Vec::new(),
            ReadyDetail::Snapshot => encode_snapshot(&self.slots[team]),
        };
        ctx.broadcast(proto::ready_report(
            ready_type,
            team as u8,
            self.ready[0],
            self.ready[1],
            detail,
            self.occupied(team) as u8,
            snapshot,
        )?);

        if self.ready.iter().all(|r| *r) {
            self.ready = [false; TEAMS];
            match self.stage {
                Stage::ChoosingCount => {
                    self.lifecycle.advance(GamePhase::InProgress)?;
                    self.stage = Stage::PlacingBlockers;
                }
                Stage::PlacingBlockers => self.stage = Stage::Climbing,
                Stage::Climbing => {}
            }
            debug!(stage = ?self.stage, "climbing wall advanced");
        }
        Ok(())
    }

    fn reset(&mut self, ctx: &mut GameContext<'_>, by_panic: bool) -> Result<(), GameError> {
        self.stage = Stage::ChoosingCount;
        self.slots = [[None; SLOTS]; TEAMS];
        self.ready = [false; TEAMS];
        self.climbers = [None; TEAMS];
        ctx.broadcast(proto::game_reset(by_panic)?);
        self.lifecycle.advance(GamePhase::WaitingForPlayers)?;
        Ok(())
    }
}

impl MiniGame for ClimbingWallGame {
    fn game_type(&self) -> GameType {
        GameType::ClimbingWall
    }

    fn max_players(&self) -> usize {
        16
    }

    fn init(&mut self, _ctx: &mut GameContext<'_>) -> InitResult {
        self.lifecycle
            .initialize(InitResult::Success)
            .unwrap_or(InitResult::Error)
    }

    fn player_joined(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        ctx.send_to(player, proto::num_blockers_changed(self.num_blockers, 0)?);
        for (team, side) in self.slots.iter().enumerate() {
            for (slot, occupant) in side.iter().enumerate() {
                if let Some(occupant) = occupant {
                    ctx.send_to(
                        player,
                        proto::blockers_changed(team as u8, slot as u8, true, *occupant)?,
                    );
                }
            }
        }
        Ok(())
    }

    fn player_left(&mut self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        for team in 0..TEAMS {
            for slot in 0..SLOTS {
                if self.slots[team][slot] == Some(player) {
                    self.slots[team][slot] = None;
                    self.ready[team] = false;
                    ctx.broadcast(proto::blockers_changed(team as u8, slot as u8, false, player)?);
                }
            }
            if self.climbers[team] == Some(player) {
                self.climbers[team] = None;
            }
        }
        Ok(())
    }

    fn handle_input(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        input: &Message,
    ) -> Result<(), GameError> {
        match input.opcode() {
            cli2srv::CHANGE_NUM_BLOCKERS => self.change_num_blockers(ctx, player, input.u8("amount")?),
            cli2srv::CHANGE_BLOCKER => {
                let team = Self::team(input.u8("team")?)?;
                self.change_blocker(ctx, player, team, input.u8("slot")?, input.flag("added")?)
            }
            cli2srv::READY => {
                let ready_type = ReadyType::from_u8(input.u8("ready_type")?)
                    .ok_or(GameError::InvalidInput("unknown ready type"))?;
                let detail = ReadyDetail::from_u8(input.u8("detail")?)
                    .ok_or(GameError::InvalidInput("unknown detail level"))?;
                let team = Self::team(input.u8("team")?)?;
                self.mark_ready(ctx, ready_type, team, detail)
            }
            cli2srv::PLAYER_ENTERED => {
                self.require_stage(Stage::Climbing)?;
                let team = Self::team(input.u8("team")?)?;
                self.climbers[team] = Some(player);
                ctx.broadcast(proto::player_entered(team as u8, player)?);
                Ok(())
            }
            cli2srv::FINISHED_GAME => {
                self.require_stage(Stage::Climbing)?;
                let team = Self::team(input.u8("team")?)?;
                if self.climbers[team] != Some(player) {
                    return Err(GameError::InvalidInput("only the climber can finish"));
                }
                self.lifecycle.advance(GamePhase::Resolving)?;
                ctx.broadcast(proto::game_over(team as u8, player)?);
                self.reset(ctx, false)
            }
            cli2srv::PANIC => {
                Self::team(input.u8("team")?)?;
                self.reset(ctx, true)
            }
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
    use crate::game::testing::{find, names, Harness};
    use crate::protocol::minigames::climbing_wall::decode_snapshot;

    fn placing() -> (ClimbingWallGame, Harness) {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut game = ClimbingWallGame::new();
        h.init(&mut game);
        for team in 0..2 {
            h.input(
                &mut game,
                1,
                proto::ready(ReadyType::NumBlockers, team, ReadyDetail::Count).unwrap(),
            )
            .0
            .unwrap();
        }
        assert_eq!(game.stage(), Stage::PlacingBlockers);
        assert_eq!(game.phase(), GamePhase::InProgress);
        (game, h)
    }

    #[test]
    fn test_first_claim_wins_slot() {
        let (mut game, mut h) = placing();
        let (first, out) = h.input(&mut game, 2, proto::change_blocker(0, 3, true).unwrap());
        first.unwrap();
        assert!(names(&out).contains(&"BlockersChanged"));

        let (second, out) = h.input(&mut game, 3, proto::change_blocker(0, 3, true).unwrap());
        assert_eq!(second, Err(GameError::SlotTaken { slot: 3, occupant: 2 }));
        let rejected = find(&out, "BlockerRejected").unwrap();
        assert_eq!(rejected.to, crate::game::Recipient::Player(3));
        assert_eq!(game.occupant(0, 3), Some(2));
    }

    #[test]
    fn test_blocker_limit_per_team() {
        let (mut game, mut h) = placing();
        for slot in 0..DEFAULT_BLOCKERS {
            h.input(&mut game, 2, proto::change_blocker(1, slot, true).unwrap()).0.unwrap();
        }
        let (r, _) = h.input(&mut game, 2, proto::change_blocker(1, 10, true).unwrap());
        assert!(matches!(r, Err(GameError::InvalidInput(_))));
        assert_eq!(game.occupied(1), DEFAULT_BLOCKERS as usize);
    }

    #[test]
    fn test_ready_report_detail_levels() {
        let (mut game, mut h) = placing();
        h.input(&mut game, 2, proto::change_blocker(0, 4, true).unwrap()).0.unwrap();

        let (_, out) = h.input(
            &mut game,
            2,
            proto::ready(ReadyType::Blockers, 0, ReadyDetail::Count).unwrap(),
        );
        let report = &find(&out, "ReadyReport").unwrap().message;
        assert_eq!(report.u8("occupied").unwrap(), 1);
        assert!(report.bytes("snapshot").unwrap().is_empty());

        let (_, out) = h.input(
            &mut game,
            2,
            proto::ready(ReadyType::Blockers, 0, ReadyDetail::Snapshot).unwrap(),
        );
        let report = &find(&out, "ReadyReport").unwrap().message;
        let slots = decode_snapshot(report.bytes("snapshot").unwrap());
        assert_eq!(slots.len(), SLOTS);
        assert_eq!(slots[4], Some(2));
        assert_eq!(slots.iter().flatten().count(), 1);
    }

    #[test]
    fn test_climb_and_reset() {
        let (mut game, mut h) = placing();
        for team in 0..2 {
            h.input(&mut game, 1, proto::ready(ReadyType::Blockers, team, ReadyDetail::Count).unwrap())
                .0
                .unwrap();
        }
        assert_eq!(game.stage(), Stage::Climbing);
        h.input(&mut game, 3, proto::team_event(cli2srv::PLAYER_ENTERED, 1).unwrap()).0.unwrap();
        let (r, out) = h.input(&mut game, 3, proto::team_event(cli2srv::FINISHED_GAME, 1).unwrap());
        r.unwrap();
        assert_eq!(find(&out, "GameOver").unwrap().message.u8("winning_team").unwrap(), 1);
        assert!(names(&out).contains(&"GameReset"));
        assert_eq!(game.stage(), Stage::ChoosingCount);
        assert_eq!(game.phase(), GamePhase::WaitingForPlayers);
    }

    #[test]
    fn test_departure_frees_slots() {
        let (mut game, mut h) = placing();
        h.input(&mut game, 2, proto::change_blocker(0, 1, true).unwrap()).0.unwrap();
        let (_, out) = h.run(|ctx| game.player_left(ctx, 2));
        assert_eq!(game.occupant(0, 1), None);
        assert!(!find(&out, "BlockersChanged").unwrap().message.flag("added").unwrap());
    }
}
