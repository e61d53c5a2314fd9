//! Variable Sync
//!
//! A shared table of named variables. Anyone seated can create or set one
//! and every seat hears about it. There is no win condition; the game sits
//! in progress until it is aborted.

use std::collections::BTreeMap;

use super::{GameContext, GameError, GamePhase, InitResult, Lifecycle, MiniGame, PlayerId};
use crate::core::idpool::IdPool;
use crate::protocol::minigames::var_sync::{self as proto, cli2srv, VarValue};
use crate::protocol::services::game::GameType;
use crate::protocol::Message;

/// Most variables one game will hold.
pub const MAX_VARS: u32 = 256;

/// Variable sync state.
#[derive(Debug)]
pub struct VarSyncGame {
    lifecycle: Lifecycle,
    vars: BTreeMap<u32, (String, VarValue)>,
    ids: IdPool,
}

impl Default for VarSyncGame {
    fn default() -> Self {
        Self::new()
    }
}

impl VarSyncGame {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            vars: BTreeMap::new(),
            ids: IdPool::bounded(1, MAX_VARS),
        }
    }

    /// Value of a variable.
    pub fn get(&self, var_id: u32) -> Option<&VarValue> {
        self.vars.get(&var_id).map(|(_, value)| value)
    }

    /// Id of a variable by name.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.vars
            .iter()
            .find(|(_, (n, _))| n == name)
            .map(|(id, _)| *id)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variable exists.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn create(&mut self, ctx: &mut GameContext<'_>, name: &str, value: VarValue) -> Result<(), GameError> {
        if name.is_empty() {
            return Err(GameError::InvalidInput("empty variable name"));
        }
        // First definition wins; a second create with the same name is ignored.
        if self.id_of(name).is_some() {
            return Ok(());
        }
        let id = self
            .ids
            .allocate()
            .ok_or(GameError::InvalidInput("too many variables"))?;
        ctx.broadcast(proto::var_created(name, id, &value)?);
        self.vars.insert(id, (name.to_string(), value));
        Ok(())
    }

    fn set(&mut self, ctx: &mut GameContext<'_>, var_id: u32, value: VarValue) -> Result<(), GameError> {
        let (_, current) = self
            .vars
            .get_mut(&var_id)
            .ok_or(GameError::InvalidInput("no such variable"))?;
        if std::mem::discriminant(current) != std::mem::discriminant(&value) {
            return Err(GameError::InvalidInput("variable type mismatch"));
        }
        ctx.broadcast(proto::var_changed(var_id, &value)?);
        *current = value;
        Ok(())
    }

    fn send_all(&self, ctx: &mut GameContext<'_>, player: PlayerId) -> Result<(), GameError> {
        for (id, (name, value)) in &self.vars {
            ctx.send_to(player, proto::var_created(name, *id, value)?);
        }
        ctx.send_to(player, proto::all_vars_sent()?);
        Ok(())
    }
}

impl MiniGame for VarSyncGame {
    fn game_type(&self) -> GameType {
        GameType::VarSync
    }

    fn max_players(&self) -> usize {
        64
    }

    fn init(&mut self, _ctx: &mut GameContext<'_>) -> InitResult {
        self.lifecycle
            .initialize(InitResult::Success)
            .unwrap_or(InitResult::Error)
    }

    fn player_joined(&mut self, _ctx: &mut GameContext<'_>, _player: PlayerId) -> Result<(), GameError> {
        if self.lifecycle.phase() == GamePhase::WaitingForPlayers {
            self.lifecycle.advance(GamePhase::InProgress)?;
        }
        Ok(())
    }

    fn player_left(&mut self, _ctx: &mut GameContext<'_>, _player: PlayerId) -> Result<(), GameError> {
        Ok(())
    }

    fn handle_input(
        &mut self,
        ctx: &mut GameContext<'_>,
        player: PlayerId,
        input: &Message,
    ) -> Result<(), GameError> {
        match input.opcode() {
            cli2srv::CREATE_STRING_VAR => {
                let value = VarValue::String(input.str("value")?.to_string());
                self.create(ctx, input.str("name")?, value)
            }
            cli2srv::CREATE_NUMERIC_VAR => {
                let value = VarValue::Numeric(input.f64("value")?);
                self.create(ctx, input.str("name")?, value)
            }
            cli2srv::SET_STRING_VAR => {
                let value = VarValue::String(input.str("value")?.to_string());
                self.set(ctx, input.u32("var_id")?, value)
            }
            cli2srv::SET_NUMERIC_VAR => {
                let value = VarValue::Numeric(input.f64("value")?);
                self.set(ctx, input.u32("var_id")?, value)
            }
            cli2srv::REQUEST_ALL_VARS => self.send_all(ctx, player),
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
