//! Network Layer
//!
//! TCP server and client for the encrypted service protocol.
//! Game rules live in `game/`; this layer owns sockets, keys and sessions.

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod csr;
pub mod gatekeeper;
pub mod handshake;
pub mod log;
pub mod score;
pub mod server;
pub mod session;
pub mod vault;

pub use auth::{validate_token, AccountStore, AuthConfig, AuthError, Login, TokenClaims};
pub use client::{Client, ClientConfig, ClientError, LoginInfo};
pub use config::{ConfigError, ServerConfig};
pub use connection::{ConnState, ConnectionError, Outbound};
pub use handshake::{CryptoWorker, Established, HandshakeError, HandshakeSettings};
pub use log::{forward_to_tracing, ConnId, LogRegistry, NetEvent, RegistryError};
pub use server::{GameServer, GameServerError};
pub use session::{GameId, GameSession, SessionError, SessionManager};
pub use vault::{VaultBackend, VaultError};
