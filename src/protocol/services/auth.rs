//! Authentication service: accounts, login and players.

use uuid::Uuid;

use super::{RESULT, TRANS_ID};
use crate::core::hash::Digest256;
use crate::protocol::field::{field, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::{Direction, NetResult, ProtocolError, ServiceId};

/// Longest account name.
pub const MAX_ACCOUNT_NAME: usize = 64;
/// Longest player name.
pub const MAX_PLAYER_NAME: usize = 40;

/// Client to server opcodes.
pub mod cli2srv {
    /// Keepalive.
    pub const PING_REQUEST: u16 = 0;
    /// Announce build, receive server challenge.
    pub const CLIENT_REGISTER_REQUEST: u16 = 1;
    /// Log in.
    pub const ACCT_LOGIN_REQUEST: u16 = 2;
    /// Create account.
    pub const ACCT_CREATE_REQUEST: u16 = 3;
    /// Create player.
    pub const PLAYER_CREATE_REQUEST: u16 = 4;
    /// Choose active player.
    pub const ACCT_SET_PLAYER_REQUEST: u16 = 5;
    /// Change password.
    pub const ACCT_CHANGE_PASSWORD_REQUEST: u16 = 6;
    /// Delete player.
    pub const PLAYER_DELETE_REQUEST: u16 = 7;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Keepalive reply.
    pub const PING_REPLY: u16 = 0;
    /// Server challenge.
    pub const CLIENT_REGISTER_REPLY: u16 = 1;
    /// Login result.
    pub const ACCT_LOGIN_REPLY: u16 = 2;
    /// One of the account's players, sent before the login reply.
    pub const ACCT_PLAYER_INFO: u16 = 3;
    /// Account creation result.
    pub const ACCT_CREATE_REPLY: u16 = 4;
    /// Player creation result.
    pub const PLAYER_CREATE_REPLY: u16 = 5;
    /// Active player result.
    pub const ACCT_SET_PLAYER_REPLY: u16 = 6;
    /// Server dropped the connection.
    pub const KICKED_OFF: u16 = 7;
    /// Password change result.
    pub const ACCT_CHANGE_PASSWORD_REPLY: u16 = 8;
    /// Player deletion result.
    pub const PLAYER_DELETE_REPLY: u16 = 9;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Auth",
    owner: TableOwner::Service(ServiceId::Auth),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::PING_REQUEST, name: "PingRequest", since: 1, fields: &[
            TRANS_ID,
            field("ping_time_ms", U32),
            field("payload", Bytes { max: 64 * 1024 }),
        ] },
        MessageDef { opcode: cli2srv::CLIENT_REGISTER_REQUEST, name: "ClientRegisterRequest", since: 1, fields: &[
            field("build_id", U32),
        ] },
        MessageDef { opcode: cli2srv::ACCT_LOGIN_REQUEST, name: "AcctLoginRequest", since: 1, fields: &[
            TRANS_ID,
            field("client_challenge", U32),
            field("account_name", Str { max: MAX_ACCOUNT_NAME }),
            field("challenge_hash", Fixed(32)),
            field("auth_token", Str { max: 2048 }),
            field("os", Str { max: 8 }),
        ] },
        MessageDef { opcode: cli2srv::ACCT_CREATE_REQUEST, name: "AcctCreateRequest", since: 1, fields: &[
            TRANS_ID,
            field("account_name", Str { max: MAX_ACCOUNT_NAME }),
            field("name_pass_hash", Fixed(32)),
            field("account_flags", U32),
        ] },
        MessageDef { opcode: cli2srv::PLAYER_CREATE_REQUEST, name: "PlayerCreateRequest", since: 1, fields: &[
            TRANS_ID,
            field("player_name", Str { max: MAX_PLAYER_NAME }),
            field("avatar_shape", Str { max: 64 }),
        ] },
        MessageDef { opcode: cli2srv::ACCT_SET_PLAYER_REQUEST, name: "AcctSetPlayerRequest", since: 1, fields: &[
            TRANS_ID,
            field("player_id", U32),
        ] },
        MessageDef { opcode: cli2srv::ACCT_CHANGE_PASSWORD_REQUEST, name: "AcctChangePasswordRequest", since: 2, fields: &[
            TRANS_ID,
            field("account_name", Str { max: MAX_ACCOUNT_NAME }),
            field("name_pass_hash", Fixed(32)),
        ] },
        MessageDef { opcode: cli2srv::PLAYER_DELETE_REQUEST, name: "PlayerDeleteRequest", since: 2, fields: &[
            TRANS_ID,
            field("player_id", U32),
        ] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Auth2Cli",
    owner: TableOwner::Service(ServiceId::Auth),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::PING_REPLY, name: "PingReply", since: 1, fields: &[
            TRANS_ID,
            field("ping_time_ms", U32),
            field("payload", Bytes { max: 64 * 1024 }),
        ] },
        MessageDef { opcode: srv2cli::CLIENT_REGISTER_REPLY, name: "ClientRegisterReply", since: 1, fields: &[
            field("server_challenge", U32),
        ] },
        MessageDef { opcode: srv2cli::ACCT_LOGIN_REPLY, name: "AcctLoginReply", since: 1, fields: &[
            TRANS_ID,
            RESULT,
            field("account_id", Fixed(16)),
            field("account_flags", U32),
        ] },
        MessageDef { opcode: srv2cli::ACCT_PLAYER_INFO, name: "AcctPlayerInfo", since: 1, fields: &[
            TRANS_ID,
            field("player_id", U32),
            field("player_name", Str { max: MAX_PLAYER_NAME }),
            field("avatar_shape", Str { max: 64 }),
        ] },
        MessageDef { opcode: srv2cli::ACCT_CREATE_REPLY, name: "AcctCreateReply", since: 1, fields: &[
            TRANS_ID,
            RESULT,
            field("account_id", Fixed(16)),
        ] },
        MessageDef { opcode: srv2cli::PLAYER_CREATE_REPLY, name: "PlayerCreateReply", since: 1, fields: &[
            TRANS_ID,
            RESULT,
            field("player_id", U32),
            field("player_name", Str { max: MAX_PLAYER_NAME }),
        ] },
        MessageDef { opcode: srv2cli::ACCT_SET_PLAYER_REPLY, name: "AcctSetPlayerReply", since: 1, fields: &[
            TRANS_ID,
            RESULT,
        ] },
        MessageDef { opcode: srv2cli::KICKED_OFF, name: "KickedOff", since: 1, fields: &[
            field("reason", U32),
        ] },
        MessageDef { opcode: srv2cli::ACCT_CHANGE_PASSWORD_REPLY, name: "AcctChangePasswordReply", since: 2, fields: &[
            TRANS_ID,
            RESULT,
        ] },
        MessageDef { opcode: srv2cli::PLAYER_DELETE_REPLY, name: "PlayerDeleteReply", since: 2, fields: &[
            TRANS_ID,
            RESULT,
        ] },
    ],
};

// ============================================================================
// Constructors
// ============================================================================

/// Client build announcement.
pub fn client_register_request(build_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::CLIENT_REGISTER_REQUEST, vec![build_id.into()])
}

/// Login with a challenge hash, or with an auth token and an empty hash.
pub fn login_request(
    trans_id: u32,
    client_challenge: u32,
    account_name: &str,
    challenge_hash: &Digest256,
    auth_token: &str,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::ACCT_LOGIN_REQUEST, vec![
        trans_id.into(),
        client_challenge.into(),
        account_name.into(),
        Value::Fixed(challenge_hash.to_vec()),
        auth_token.into(),
        std::env::consts::OS.chars().take(8).collect::<String>().into(),
    ])
}

/// Account creation.
pub fn create_account_request(
    trans_id: u32,
    account_name: &str,
    name_pass_hash: &Digest256,
    flags: u32,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::ACCT_CREATE_REQUEST, vec![
        trans_id.into(),
        account_name.into(),
        Value::Fixed(name_pass_hash.to_vec()),
        flags.into(),
    ])
}

/// Player creation.
pub fn player_create_request(
    trans_id: u32,
    player_name: &str,
    avatar_shape: &str,
) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::PLAYER_CREATE_REQUEST, vec![
        trans_id.into(),
        player_name.into(),
        avatar_shape.into(),
    ])
}

/// Active player selection.
pub fn set_player_request(trans_id: u32, player_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::ACCT_SET_PLAYER_REQUEST, vec![
        trans_id.into(),
        player_id.into(),
    ])
}

/// Keepalive reply echoing the request.
pub fn ping_reply(trans_id: u32, ping_time_ms: u32, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::PING_REPLY, vec![
        trans_id.into(),
        ping_time_ms.into(),
        Value::Bytes(payload),
    ])
}

/// Server challenge.
pub fn client_register_reply(server_challenge: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::CLIENT_REGISTER_REPLY, vec![server_challenge.into()])
}

/// Login result.
pub fn login_reply(
    trans_id: u32,
    result: NetResult,
    account_id: Uuid,
    flags: u32,
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::ACCT_LOGIN_REPLY, vec![
        trans_id.into(),
        result.into(),
        Value::Fixed(account_id.as_bytes().to_vec()),
        flags.into(),
    ])
}

/// Player listing entry.
pub fn player_info(
    trans_id: u32,
    player_id: u32,
    player_name: &str,
    avatar_shape: &str,
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::ACCT_PLAYER_INFO, vec![
        trans_id.into(),
        player_id.into(),
        player_name.into(),
        avatar_shape.into(),
    ])
}

/// Account creation result.
pub fn create_account_reply(
    trans_id: u32,
    result: NetResult,
    account_id: Uuid,
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::ACCT_CREATE_REPLY, vec![
        trans_id.into(),
        result.into(),
        Value::Fixed(account_id.as_bytes().to_vec()),
    ])
}

/// Player creation result.
pub fn player_create_reply(
    trans_id: u32,
    result: NetResult,
    player_id: u32,
    player_name: &str,
) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::PLAYER_CREATE_REPLY, vec![
        trans_id.into(),
        result.into(),
        player_id.into(),
        player_name.into(),
    ])
}

/// Reply carrying only a transaction id and result, for the given opcode.
pub fn result_reply(opcode: u16, trans_id: u32, result: NetResult) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, opcode, vec![trans_id.into(), result.into()])
}

/// Kick notice.
pub fn kicked_off(reason: NetResult) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::KICKED_OFF, vec![reason.into()])
}
