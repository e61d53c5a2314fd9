//! Log/Notification Handler Registry
//!
//! A fixed table of [`MAX_HANDLERS`] handlers behind one lock. Registration
//! and dispatch both take the lock, and dispatch calls every registered
//! handler for every event.
//!
//! A handler is a closure; whatever context it needs is captured by it.
//! Handlers run with the lock held and must not register or unregister
//! handlers themselves.

use std::fmt;
use std::net::SocketAddr;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::crypt::CipherAlgorithm;
use crate::core::idpool::IdPool;
use crate::game::{GamePhase, PlayerId};
use crate::protocol::services::game::GameType;
use crate::protocol::ServiceId;

/// Handler slots.
pub const MAX_HANDLERS: usize = 8;

/// Connection identifier, unique among live connections.
pub type ConnId = u32;

/// Slot returned by [`LogRegistry::register`].
pub type HandlerId = u32;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Every slot is taken.
    #[error("handler table full ({0} slots)")]
    HandlerTableFull(usize),
}

/// Something worth telling operators about.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    /// Socket accepted.
    ConnectionOpened {
        /// Connection.
        conn: ConnId,
        /// Peer address.
        addr: SocketAddr,
    },
    /// Socket closed.
    ConnectionClosed {
        /// Connection.
        conn: ConnId,
        /// Why.
        reason: String,
    },
    /// Session keys are in place.
    HandshakeCompleted {
        /// Connection.
        conn: ConnId,
        /// Cipher in use.
        cipher: CipherAlgorithm,
    },
    /// The handshake failed and the socket was dropped.
    HandshakeFailed {
        /// Connection.
        conn: ConnId,
        /// Failure.
        reason: String,
    },
    /// A frame could not be decoded.
    ProtocolError {
        /// Connection.
        conn: ConnId,
        /// Failure.
        error: String,
    },
    /// A frame with an opcode this build does not know was dropped.
    UnknownOpcodeSkipped {
        /// Connection.
        conn: ConnId,
        /// Service the frame was addressed to.
        service: ServiceId,
        /// Unknown opcode.
        opcode: u16,
    },
    /// A game session was created.
    SessionCreated {
        /// Session.
        game_id: u32,
        /// Mini-game.
        game_type: GameType,
    },
    /// A game session was reaped.
    SessionDestroyed {
        /// Session.
        game_id: u32,
        /// Phase at removal.
        phase: GamePhase,
    },
    /// A seat lost its player.
    SeatDisconnected {
        /// Session.
        game_id: u32,
        /// Player.
        player: PlayerId,
    },
}

impl fmt::Display for NetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetEvent::ConnectionOpened { conn, addr } => write!(f, "conn {} opened from {}", conn, addr),
            NetEvent::ConnectionClosed { conn, reason } => write!(f, "conn {} closed: {}", conn, reason),
            NetEvent::HandshakeCompleted { conn, cipher } => {
                write!(f, "conn {} handshake complete ({:?})", conn, cipher)
            }
            NetEvent::HandshakeFailed { conn, reason } => {
                write!(f, "conn {} handshake failed: {}", conn, reason)
            }
            NetEvent::ProtocolError { conn, error } => write!(f, "conn {} protocol error: {}", conn, error),
            NetEvent::UnknownOpcodeSkipped { conn, service, opcode } => {
                write!(f, "conn {} skipped unknown {:?} opcode {}", conn, service, opcode)
            }
            NetEvent::SessionCreated { game_id, game_type } => {
                write!(f, "session {} created ({:?})", game_id, game_type)
            }
            NetEvent::SessionDestroyed { game_id, phase } => {
                write!(f, "session {} destroyed in {:?}", game_id, phase)
            }
            NetEvent::SeatDisconnected { game_id, player } => {
                write!(f, "session {} seat of player {} disconnected", game_id, player)
            }
        }
    }
}

type Handler = Box<dyn Fn(&NetEvent) + Send + Sync>;

struct Slots {
    handlers: [Option<Handler>; MAX_HANDLERS],
    ids: IdPool,
}

/// Fixed-capacity handler table, owned by whoever runs the server.
pub struct LogRegistry {
    slots: Mutex<Slots>,
}

impl Default for LogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                handlers: Default::default(),
                ids: IdPool::bounded(0, MAX_HANDLERS as u32),
            }),
        }
    }

    /// Add a handler. Fails once all slots are taken; earlier handlers are
    /// never displaced.
    pub fn register<F>(&self, handler: F) -> Result<HandlerId, RegistryError>
    where
        F: Fn(&NetEvent) + Send + Sync + 'static,
    {
        let mut slots = self.slots.lock();
        let id = slots
            .ids
            .allocate()
            .ok_or(RegistryError::HandlerTableFull(MAX_HANDLERS))?;
        slots.handlers[id as usize] = Some(Box::new(handler));
        Ok(id)
    }

    /// Remove a handler. Returns false for a free slot.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut slots = self.slots.lock();
        if !slots.ids.release(id) {
            return false;
        }
        slots.handlers[id as usize] = None;
        true
    }

    /// Registered handler count.
    pub fn len(&self) -> usize {
        self.slots.lock().ids.in_use()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every handler.
    pub fn dispatch(&self, event: &NetEvent) {
        let slots = self.slots.lock();
        for handler in slots.handlers.iter().flatten() {
            handler(event);
        }
    }
}

impl fmt::Debug for LogRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRegistry").field("handlers", &self.len()).finish()
    }
}

/// Handler that forwards events into `tracing`.
pub fn forward_to_tracing(event: &NetEvent) {
    match event {
        NetEvent::HandshakeFailed { .. } | NetEvent::ProtocolError { .. } => warn!("{}", event),
        NetEvent::UnknownOpcodeSkipped { .. } | NetEvent::SeatDisconnected { .. } => debug!("{}", event),
        _ => info!("{}", event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn closed(conn: ConnId) -> NetEvent {
        NetEvent::ConnectionClosed {
            conn,
            reason: "test".into(),
        }
    }

    #[test]
    fn test_dispatch_reaches_every_handler() {
        let registry = LogRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            registry
                .register(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        registry.dispatch(&closed(1));
        registry.dispatch(&closed(2));
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_ninth_registration_fails_without_displacing() {
        let registry = LogRegistry::new();
        let first_hits = Arc::new(AtomicUsize::new(0));
        {
            let first_hits = first_hits.clone();
            registry
                .register(move |_| {
                    first_hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        for _ in 1..MAX_HANDLERS {
            registry.register(|_| {}).unwrap();
        }
        assert_eq!(
            registry.register(|_| {}),
            Err(RegistryError::HandlerTableFull(MAX_HANDLERS))
        );
        assert_eq!(registry.len(), MAX_HANDLERS);

        registry.dispatch(&closed(1));
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_frees_slot() {
        let registry = LogRegistry::new();
        let ids: Vec<_> = (0..MAX_HANDLERS).map(|_| registry.register(|_| {}).unwrap()).collect();
        assert!(registry.unregister(ids[3]));
        assert!(!registry.unregister(ids[3]));
        assert_eq!(registry.register(|_| {}), Ok(ids[3]));
    }

    #[test]
    fn test_event_display() {
        let event = NetEvent::UnknownOpcodeSkipped {
            conn: 4,
            service: ServiceId::Game,
            opcode: 77,
        };
        assert_eq!(event.to_string(), "conn 4 skipped unknown Game opcode 77");
    }
}
