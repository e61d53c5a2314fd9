//! Wire protocol.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ frame      service u8 | opcode u16 | length u32 | payload   │
//! │ table      (service, direction) → ordered opcode schemas    │
//! │ message    schema + decoded field values                    │
//! │ minigames  sub-tables carried inside Game::GameMsg bodies   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Opcodes are append-only per service and direction. Deployed builds of
//! different ages share one numbering, so entries are only ever added at
//! the end of a table, tagged with the protocol version that introduced
//! them.

pub mod error;
pub mod field;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod minigames;
pub mod services;
pub mod table;

use serde::{Deserialize, Serialize};

pub use error::ProtocolError;
pub use field::{FieldDef, FieldKind, Value};
pub use frame::{FrameHeader, Limits, FRAME_HEADER_LEN};
pub use message::{Message, MessageDef, MessageTable, TableOwner};
pub use table::{OpcodeTable, ProtocolTables};

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: u32 = 2;

/// Oldest protocol version whose tables this build can still construct.
pub const MIN_PROTOCOL_VERSION: u32 = 1;

/// Network services, each an independent opcode namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ServiceId {
    /// Accounts, login, players.
    Auth = 1,
    /// Vault node persistence.
    Vault = 2,
    /// Game sessions.
    Game = 3,
    /// Score keeping.
    Score = 4,
    /// Admin console.
    Csr = 5,
    /// Server discovery.
    GateKeeper = 6,
    /// Raw backend pass-through.
    Db = 7,
    /// Diagnostics.
    Echo = 8,
}

impl ServiceId {
    /// All services in wire order.
    pub const ALL: [ServiceId; 8] = [
        ServiceId::Auth,
        ServiceId::Vault,
        ServiceId::Game,
        ServiceId::Score,
        ServiceId::Csr,
        ServiceId::GateKeeper,
        ServiceId::Db,
        ServiceId::Echo,
    ];

    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| *s as u8 == value)
            .ok_or(ProtocolError::UnknownService(value))
    }

    /// What a receiver does with an opcode it does not know.
    pub fn unknown_opcode_policy(self) -> UnknownOpcodePolicy {
        match self {
            ServiceId::Auth | ServiceId::Vault | ServiceId::Csr | ServiceId::Db => {
                UnknownOpcodePolicy::Disconnect
            }
            ServiceId::Game | ServiceId::Score | ServiceId::GateKeeper | ServiceId::Echo => {
                UnknownOpcodePolicy::Skip
            }
        }
    }

    /// Whether the service may be used before login.
    pub fn allowed_before_login(self) -> bool {
        matches!(
            self,
            ServiceId::Auth | ServiceId::GateKeeper | ServiceId::Echo
        )
    }
}

/// Handling of opcodes unknown to this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownOpcodePolicy {
    /// Drop the frame and keep the connection.
    Skip,
    /// Treat as fatal for the connection.
    Disconnect,
}

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Client to server.
    ClientToServer,
    /// Server to client.
    ServerToClient,
}

/// Result codes carried in reply messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum NetResult {
    /// Operation succeeded.
    Success = 0,
    /// Unexpected server failure.
    InternalError = 1,
    /// Request carried a bad argument.
    InvalidParameter = 2,
    /// Login required.
    NotAuthenticated = 3,
    /// No such account.
    AccountNotFound = 4,
    /// Wrong credentials.
    AuthenticationFailed = 5,
    /// Account name taken.
    AccountAlreadyExists = 6,
    /// No such player.
    PlayerNotFound = 7,
    /// No such vault node.
    VaultNodeNotFound = 8,
    /// No such game.
    GameNotFound = 9,
    /// Game has no free seat.
    GameFull = 10,
    /// Unknown mini-game type.
    InvalidGameType = 11,
    /// Operation not supported.
    NotSupported = 12,
    /// Server is at capacity.
    ServerBusy = 13,
    /// Protocol versions differ.
    VersionMismatch = 14,
    /// Cipher or key width differ.
    AlgorithmMismatch = 15,
    /// Caller lacks permission.
    NotPermitted = 16,
    /// No such score.
    ScoreNotFound = 17,
    /// Not enough points for the transfer.
    InsufficientPoints = 18,
}

impl NetResult {
    /// Wire value.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Parse a wire value. Unknown codes map to `InternalError`.
    pub fn from_code(code: u32) -> Self {
        use NetResult::*;
        const ALL: [NetResult; 19] = [
            Success,
            InternalError,
            InvalidParameter,
            NotAuthenticated,
            AccountNotFound,
            AuthenticationFailed,
            AccountAlreadyExists,
            PlayerNotFound,
            VaultNodeNotFound,
            GameNotFound,
            GameFull,
            InvalidGameType,
            NotSupported,
            ServerBusy,
            VersionMismatch,
            AlgorithmMismatch,
            NotPermitted,
            ScoreNotFound,
            InsufficientPoints,
        ];
        ALL.iter()
            .copied()
            .find(|r| r.code() == code)
            .unwrap_or(InternalError)
    }
}

impl From<NetResult> for Value {
    fn from(result: NetResult) -> Self {
        Value::U32(result.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_ids_round_trip() {
        for service in ServiceId::ALL {
            assert_eq!(ServiceId::from_u8(service as u8).unwrap(), service);
        }
        assert_eq!(ServiceId::from_u8(0), Err(ProtocolError::UnknownService(0)));
        assert_eq!(ServiceId::from_u8(200), Err(ProtocolError::UnknownService(200)));
    }

    #[test]
    fn test_net_result_codes() {
        assert_eq!(NetResult::from_code(0), NetResult::Success);
        assert_eq!(NetResult::from_code(10), NetResult::GameFull);
        assert_eq!(NetResult::from_code(9999), NetResult::InternalError);
    }
}
