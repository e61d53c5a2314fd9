//! # Plasma Net
//!
//! Encrypted client-server protocol stack and mini-game session server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PLASMA NET                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── bignum.rs   - Arbitrary-precision unsigned integers     │
//! │  ├── dh.rs       - Diffie-Hellman key agreement              │
//! │  ├── crypt.rs    - Session ciphers (RC4, ChaCha20)           │
//! │  ├── hash.rs     - MD5 / SHA digests, challenge hashes       │
//! │  ├── idpool.rs   - Recycling id allocator                    │
//! │  └── rng.rs      - Seeded RNG for games                      │
//! │                                                              │
//! │  protocol/       - Wire format                               │
//! │  ├── frame.rs    - Frame header and limits                   │
//! │  ├── table.rs    - Append-only opcode tables per version     │
//! │  ├── services/   - Auth, Vault, Game, Score, Csr, ...        │
//! │  └── minigames/  - Sub-protocols carried in GameMsg          │
//! │                                                              │
//! │  game/           - Mini-game state machines                  │
//! │                                                              │
//! │  network/        - Sockets and sessions                      │
//! │  ├── handshake.rs- Key exchange                              │
//! │  ├── connection.rs- Encrypted framing, connection states     │
//! │  ├── server.rs   - Accept loop and service dispatch          │
//! │  ├── session.rs  - Game sessions and seats                   │
//! │  ├── log.rs      - Event handler registry                    │
//! │  └── client.rs   - Protocol client                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Compatibility
//!
//! Opcode numbering is append-only. A server speaking protocol version N
//! builds the tables for N and skips or rejects frames whose opcode is
//! past the end of a table, per service.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod protocol;

// Re-export commonly used types
pub use core::bignum::BigNum;
pub use core::dh::{DhKeyPair, DhParams};
pub use core::rng::GameRng;
pub use game::{Game, GameError, GameParams, GamePhase, MiniGame, PlayerId};
pub use network::{Client, ClientConfig, GameServer, LogRegistry, NetEvent, ServerConfig};
pub use protocol::{Message, ProtocolTables, PROTOCOL_VERSION};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
