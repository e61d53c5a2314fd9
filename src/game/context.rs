//! Per-call game context: clock, seats, randomness and the outbox.

use std::time::Instant;

use super::PlayerId;
use crate::core::rng::GameRng;
use crate::protocol::Message;

/// Who a game message goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected seat.
    All,
    /// One seat.
    Player(PlayerId),
    /// Every connected seat but one.
    AllExcept(PlayerId),
}

impl Recipient {
    /// Whether `player` receives the message.
    pub fn includes(self, player: PlayerId) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Player(p) => p == player,
            Recipient::AllExcept(p) => p != player,
        }
    }
}

/// A mini-game message waiting to be wrapped and delivered.
#[derive(Clone, Debug)]
pub struct Outgoing {
    /// Audience.
    pub to: Recipient,
    /// Unwrapped mini-game message.
    pub message: Message,
}

/// What a game sees of its session during one call.
///
/// Games never touch connections; they queue messages here and the
/// session delivers them after the call returns.
pub struct GameContext<'a> {
    now: Instant,
    owner: PlayerId,
    seats: &'a [PlayerId],
    rng: &'a mut GameRng,
    outbox: Vec<Outgoing>,
}

impl<'a> GameContext<'a> {
    /// Context for one call.
    pub fn new(now: Instant, owner: PlayerId, seats: &'a [PlayerId], rng: &'a mut GameRng) -> Self {
        Self {
            now,
            owner,
            seats,
            rng,
            outbox: Vec::new(),
        }
    }

    /// Current time as seen by the session.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Session owner.
    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Connected seats, in join order.
    pub fn seats(&self) -> &[PlayerId] {
        self.seats
    }

    /// Session randomness.
    pub fn rng(&mut self) -> &mut GameRng {
        self.rng
    }

    /// Queue for every seat.
    pub fn broadcast(&mut self, message: Message) {
        self.push(Recipient::All, message);
    }

    /// Queue for one seat.
    pub fn send_to(&mut self, player: PlayerId, message: Message) {
        self.push(Recipient::Player(player), message);
    }

    /// Queue for everyone but `player`.
    pub fn send_except(&mut self, player: PlayerId, message: Message) {
        self.push(Recipient::AllExcept(player), message);
    }

    fn push(&mut self, to: Recipient, message: Message) {
        self.outbox.push(Outgoing { to, message });
    }

    /// Queued messages, in order.
    pub fn outbox(&self) -> &[Outgoing] {
        &self.outbox
    }

    /// Take the queued messages.
    pub fn into_outbox(self) -> Vec<Outgoing> {
        self.outbox
    }
}
