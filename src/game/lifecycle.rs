//! Session Lifecycle
//!
//! ```text
//! Uninitialized → Initializing → WaitingForPlayers ⇄ InProgress ⇄ Resolving → Finished
//!                       │                 ↑                          │
//!                       │                 └──────────────────────────┘
//!                       └──────── any non-terminal ────────→ Aborted
//! ```
//!
//! Games loop between `WaitingForPlayers`, `InProgress` and `Resolving` as
//! rounds start and end. `Finished` and `Aborted` are absorbing.

use serde::{Deserialize, Serialize};

use super::GameError;

/// Generic phase shared by every mini-game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum GamePhase {
    /// Created, not yet set up.
    #[default]
    Uninitialized = 0,
    /// Setting up from creation parameters.
    Initializing = 1,
    /// Open for players; no round running.
    WaitingForPlayers = 2,
    /// A round is running.
    InProgress = 3,
    /// A round is being scored.
    Resolving = 4,
    /// Game over for good.
    Finished = 5,
    /// Torn down by the server or the owner.
    Aborted = 6,
}

impl GamePhase {
    /// Absorbing phases.
    pub fn is_terminal(self) -> bool {
        matches!(self, GamePhase::Finished | GamePhase::Aborted)
    }

    /// Whether `self → to` is a legal step.
    pub fn can_transition(self, to: GamePhase) -> bool {
        use GamePhase::*;
        if self.is_terminal() {
            return false;
        }
        if to == Aborted {
            return true;
        }
        matches!(
            (self, to),
            (Uninitialized, Initializing)
                | (Initializing, WaitingForPlayers)
                | (WaitingForPlayers, InProgress)
                | (InProgress, Resolving)
                | (InProgress, WaitingForPlayers)
                | (Resolving, InProgress)
                | (Resolving, WaitingForPlayers)
                | (Resolving, Finished)
        )
    }
}

/// Outcome of [`GamePhase::Initializing`] reported to the creator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitResult {
    /// Game is open for players.
    Success,
    /// Creation parameters were unusable; the game is aborted.
    Error,
}

/// Phase holder that only allows legal steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lifecycle {
    phase: GamePhase,
}

impl Lifecycle {
    /// Start at [`GamePhase::Uninitialized`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Step to `to`. Returns false when already there.
    pub fn advance(&mut self, to: GamePhase) -> Result<bool, GameError> {
        if self.phase == to {
            return Ok(false);
        }
        if !self.phase.can_transition(to) {
            return Err(GameError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(true)
    }

    /// Run the two initialization steps and settle on the outcome.
    pub fn initialize(&mut self, result: InitResult) -> Result<InitResult, GameError> {
        self.advance(GamePhase::Initializing)?;
        match result {
            InitResult::Success => self.advance(GamePhase::WaitingForPlayers)?,
            InitResult::Error => self.advance(GamePhase::Aborted)?,
        };
        Ok(result)
    }

    /// Fail unless the current phase is `expected`.
    pub fn require(&self, expected: GamePhase) -> Result<(), GameError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(GameError::WrongPhase(self.phase))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut life = Lifecycle::new();
        assert_eq!(life.initialize(InitResult::Success).unwrap(), InitResult::Success);
        assert_eq!(life.phase(), GamePhase::WaitingForPlayers);
        assert!(life.advance(GamePhase::InProgress).unwrap());
        assert!(life.advance(GamePhase::Resolving).unwrap());
        assert!(life.advance(GamePhase::Finished).unwrap());
        assert!(life.phase().is_terminal());
    }

    #[test]
    fn test_init_error_aborts() {
        let mut life = Lifecycle::new();
        assert_eq!(life.initialize(InitResult::Error).unwrap(), InitResult::Error);
        assert_eq!(life.phase(), GamePhase::Aborted);
    }

    #[test]
    fn test_illegal_steps_rejected() {
        let mut life = Lifecycle::new();
        assert!(matches!(
            life.advance(GamePhase::InProgress),
            Err(GameError::InvalidTransition { .. })
        ));
        life.initialize(InitResult::Success).unwrap();
        assert!(life.advance(GamePhase::Finished).is_err());
        assert!(!life.advance(GamePhase::WaitingForPlayers).unwrap());
    }

    #[test]
    fn test_terminal_is_absorbing() {
        for start in [GamePhase::Finished, GamePhase::Aborted] {
            for to in [
                GamePhase::Uninitialized,
                GamePhase::WaitingForPlayers,
                GamePhase::InProgress,
                GamePhase::Aborted,
            ] {
                if to != start {
                    assert!(!start.can_transition(to));
                }
            }
        }
        assert!(GamePhase::InProgress.can_transition(GamePhase::Aborted));
        assert!(GamePhase::Uninitialized.can_transition(GamePhase::Aborted));
    }
}
