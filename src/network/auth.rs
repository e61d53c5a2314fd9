//! Accounts and Authentication
//!
//! Two login paths share one account table:
//! - challenge-response: `SHA-256(clientChallenge || serverChallenge ||
//!   namePassHash)` against the stored name/password hash
//! - bearer token: a JWT from an external provider (RS256 or HS256), whose
//!   subject names the account
//!
//! The server never issues tokens, it only validates them.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::hash::{challenge_hash, digest128, Digest256};
use crate::core::idpool::IdPool;
use crate::protocol::services::auth::{self, cli2srv, srv2cli, MAX_ACCOUNT_NAME, MAX_PLAYER_NAME};
use crate::protocol::{Message, NetResult, ProtocolError};

/// Account flag bits.
pub mod account_flags {
    /// May run console commands. Granted by configuration only.
    pub const ADMIN: u32 = 1 << 0;
    /// Created from a bearer token; has no usable password hash.
    pub const TOKEN_ONLY: u32 = 1 << 1;
}

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format (preferred for external providers).
    pub public_key_pem: Option<String>,
    /// HS256 secret (fallback for simple setups).
    pub secret: Option<String>,
    /// Whether to skip expiry validation (for testing only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Check if token authentication is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Standard JWT claims we expect from auth providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, used as the account name.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer (auth provider).
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

/// Authentication and account errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token validation configured on server.
    #[error("token authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
    /// No account by that name.
    #[error("account not found")]
    AccountNotFound,
    /// Account name already taken.
    #[error("account already exists")]
    AccountExists,
    /// Proof did not match.
    #[error("bad credentials")]
    BadCredentials,
    /// Login attempted without a fresh server challenge.
    #[error("no server challenge issued")]
    NoChallenge,
    /// Operation needs a logged-in connection.
    #[error("not logged in")]
    NotLoggedIn,
    /// Caller may not act on this account.
    #[error("not permitted")]
    NotPermitted,
    /// Account name empty or too long.
    #[error("invalid account name")]
    InvalidAccountName,
    /// Player name empty or too long.
    #[error("invalid player name")]
    InvalidPlayerName,
    /// Player name already taken.
    #[error("player name taken")]
    PlayerExists,
    /// No such player on this account.
    #[error("player not found")]
    PlayerNotFound,
    /// Player id space exhausted.
    #[error("player ids exhausted")]
    Exhausted,
}

impl AuthError {
    /// Result code reported to the client.
    pub fn net_result(&self) -> NetResult {
        match self {
            AuthError::NotConfigured => NetResult::NotSupported,
            AuthError::InvalidFormat
            | AuthError::InvalidSignature
            | AuthError::Expired
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::MissingClaim(_)
            | AuthError::DecodeError(_)
            | AuthError::BadCredentials => NetResult::AuthenticationFailed,
            AuthError::AccountNotFound => NetResult::AccountNotFound,
            AuthError::AccountExists => NetResult::AccountAlreadyExists,
            AuthError::NoChallenge
            | AuthError::InvalidAccountName
            | AuthError::InvalidPlayerName
            | AuthError::PlayerExists => NetResult::InvalidParameter,
            AuthError::NotLoggedIn => NetResult::NotAuthenticated,
            AuthError::NotPermitted => NetResult::NotPermitted,
            AuthError::PlayerNotFound => NetResult::PlayerNotFound,
            AuthError::Exhausted => NetResult::ServerBusy,
        }
    }
}

/// Validate a JWT token and extract claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else {
        Algorithm::HS256
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // The library allows some leeway; hold tokens to the exact second.
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// ACCOUNTS
// =============================================================================

/// A player (avatar) owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Server-wide player id.
    pub id: u32,
    /// Display name, unique case-insensitively.
    pub name: String,
    /// Avatar shape chosen at creation.
    pub avatar_shape: String,
}

/// A login account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable id derived from the lowercased name.
    pub id: Uuid,
    /// Name as first registered.
    pub name: String,
    /// Stored name/password hash.
    pub name_pass_hash: Digest256,
    /// [`account_flags`] bits.
    pub flags: u32,
    /// Players by id.
    pub players: BTreeMap<u32, PlayerRecord>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the admin flag is set.
    pub fn is_admin(&self) -> bool {
        self.flags & account_flags::ADMIN != 0
    }
}

/// Account id for a name.
pub fn account_id(name: &str) -> Uuid {
    Uuid::from_bytes(digest128(name.to_lowercase().as_bytes()))
}

/// All accounts known to this server.
#[derive(Debug)]
pub struct AccountStore {
    accounts: BTreeMap<String, Account>,
    player_names: BTreeSet<String>,
    player_ids: IdPool,
    admins: BTreeSet<String>,
}

impl AccountStore {
    /// Empty store. Accounts named in `admins` get the admin flag.
    pub fn new(admins: &[String]) -> Self {
        Self {
            accounts: BTreeMap::new(),
            player_names: BTreeSet::new(),
            player_ids: IdPool::new(1),
            admins: admins.iter().map(|a| a.to_lowercase()).collect(),
        }
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Look up an account by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Account> {
        self.accounts.get(&name.to_lowercase())
    }

    fn insert(&mut self, name: &str, name_pass_hash: Digest256, flags: u32) -> Result<&Account, AuthError> {
        if name.is_empty() || name.encode_utf16().count() > MAX_ACCOUNT_NAME {
            return Err(AuthError::InvalidAccountName);
        }
        let key = name.to_lowercase();
        if self.accounts.contains_key(&key) {
            return Err(AuthError::AccountExists);
        }
        // Clients may not grant themselves admin.
        let mut flags = flags & !account_flags::ADMIN;
        if self.admins.contains(&key) {
            flags |= account_flags::ADMIN;
        }
        let account = Account {
            id: account_id(name),
            name: name.to_string(),
            name_pass_hash,
            flags,
            players: BTreeMap::new(),
            created_at: Utc::now(),
        };
        info!(account = %account.name, admin = account.is_admin(), "Account created");
        Ok(self.accounts.entry(key).or_insert(account))
    }

    /// Register a new account.
    pub fn create(
        &mut self,
        name: &str,
        name_pass_hash: Digest256,
        flags: u32,
    ) -> Result<&Account, AuthError> {
        self.insert(name, name_pass_hash, flags & !account_flags::TOKEN_ONLY)
    }

    /// Check a login proof against the stored hash.
    pub fn verify_challenge(
        &self,
        name: &str,
        client_challenge: u32,
        server_challenge: u32,
        proof: &Digest256,
    ) -> Result<&Account, AuthError> {
        let account = self.get(name).ok_or(AuthError::AccountNotFound)?;
        if account.flags & account_flags::TOKEN_ONLY != 0 {
            return Err(AuthError::BadCredentials);
        }
        let expected = challenge_hash(client_challenge, server_challenge, &account.name_pass_hash);
        if &expected != proof {
            return Err(AuthError::BadCredentials);
        }
        Ok(account)
    }

    /// Account for a validated token subject, created on first use.
    pub fn login_with_token(&mut self, claims: &TokenClaims) -> Result<&Account, AuthError> {
        let key = claims.sub.to_lowercase();
        if !self.accounts.contains_key(&key) {
            self.insert(&claims.sub, [0u8; 32], account_flags::TOKEN_ONLY)?;
        }
        self.accounts.get(&key).ok_or(AuthError::AccountNotFound)
    }

    /// Replace the stored hash. Clears the token-only flag.
    pub fn change_password(&mut self, name: &str, name_pass_hash: Digest256) -> Result<(), AuthError> {
        let account = self
            .accounts
            .get_mut(&name.to_lowercase())
            .ok_or(AuthError::AccountNotFound)?;
        account.name_pass_hash = name_pass_hash;
        account.flags &= !account_flags::TOKEN_ONLY;
        Ok(())
    }

    /// Create a player on `account`.
    pub fn create_player(
        &mut self,
        account: &str,
        player_name: &str,
        avatar_shape: &str,
    ) -> Result<PlayerRecord, AuthError> {
        if player_name.trim().is_empty() || player_name.encode_utf16().count() > MAX_PLAYER_NAME {
            return Err(AuthError::InvalidPlayerName);
        }
        let name_key = player_name.to_lowercase();
        if self.player_names.contains(&name_key) {
            return Err(AuthError::PlayerExists);
        }
        let account = self
            .accounts
            .get_mut(&account.to_lowercase())
            .ok_or(AuthError::AccountNotFound)?;
        let id = self.player_ids.allocate().ok_or(AuthError::Exhausted)?;
        let record = PlayerRecord {
            id,
            name: player_name.to_string(),
            avatar_shape: avatar_shape.to_string(),
        };
        account.players.insert(id, record.clone());
        self.player_names.insert(name_key);
        Ok(record)
    }

    /// Delete a player owned by `account`.
    pub fn delete_player(&mut self, account: &str, player_id: u32) -> Result<(), AuthError> {
        let account = self
            .accounts
            .get_mut(&account.to_lowercase())
            .ok_or(AuthError::AccountNotFound)?;
        let record = account
            .players
            .remove(&player_id)
            .ok_or(AuthError::PlayerNotFound)?;
        self.player_names.remove(&record.name.to_lowercase());
        self.player_ids.release(player_id);
        Ok(())
    }

    /// Whether `account` owns `player_id`.
    pub fn owns_player(&self, account: &str, player_id: u32) -> bool {
        self.get(account)
            .map(|a| a.players.contains_key(&player_id))
            .unwrap_or(false)
    }
}

// =============================================================================
// SERVICE HANDLER
// =============================================================================

/// An authenticated connection's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Login {
    /// Account id.
    pub account_id: Uuid,
    /// Account name.
    pub account_name: String,
    /// Admin flag at login time.
    pub admin: bool,
    /// Active player, once selected.
    pub player: Option<u32>,
}

/// Per-connection authentication state.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    /// Challenge issued by the last register request. Consumed by a login
    /// attempt.
    pub server_challenge: Option<u32>,
    /// Set after a successful login.
    pub login: Option<Login>,
}

impl AuthState {
    fn require_login(&self) -> Result<&Login, AuthError> {
        self.login.as_ref().ok_or(AuthError::NotLoggedIn)
    }
}

/// Handle one Auth service request.
pub fn handle(
    message: &Message,
    state: &mut AuthState,
    accounts: &mut AccountStore,
    config: &AuthConfig,
) -> Result<Vec<Message>, ProtocolError> {
    match message.opcode() {
        cli2srv::PING_REQUEST => Ok(vec![auth::ping_reply(
            message.u32("trans_id")?,
            message.u32("ping_time_ms")?,
            message.bytes("payload")?.to_vec(),
        )?]),
        cli2srv::CLIENT_REGISTER_REQUEST => {
            let challenge = rand::random::<u32>();
            state.server_challenge = Some(challenge);
            debug!(build = message.u32("build_id")?, "Client registered");
            Ok(vec![auth::client_register_reply(challenge)?])
        }
        cli2srv::ACCT_LOGIN_REQUEST => login(message, state, accounts, config),
        cli2srv::ACCT_CREATE_REQUEST => {
            let trans_id = message.u32("trans_id")?;
            let reply = match accounts.create(
                message.str("account_name")?,
                message.array::<32>("name_pass_hash")?,
                message.u32("account_flags")?,
            ) {
                Ok(account) => auth::create_account_reply(trans_id, NetResult::Success, account.id)?,
                Err(e) => auth::create_account_reply(trans_id, e.net_result(), Uuid::nil())?,
            };
            Ok(vec![reply])
        }
        cli2srv::PLAYER_CREATE_REQUEST => {
            let trans_id = message.u32("trans_id")?;
            let player_name = message.str("player_name")?;
            let avatar_shape = message.str("avatar_shape")?;
            let result = state.require_login().and_then(|login| {
                accounts.create_player(
                    &login.account_name,
                    player_name,
                    avatar_shape,
                )
            });
            let reply = match result {
                Ok(player) => {
                    auth::player_create_reply(trans_id, NetResult::Success, player.id, &player.name)?
                }
                Err(e) => auth::player_create_reply(trans_id, e.net_result(), 0, "")?,
            };
            Ok(vec![reply])
        }
        cli2srv::ACCT_SET_PLAYER_REQUEST => {
            let trans_id = message.u32("trans_id")?;
            let player_id = message.u32("player_id")?;
            let result = match state.login.as_mut() {
                None => NetResult::NotAuthenticated,
                Some(login) if player_id == 0 => {
                    login.player = None;
                    NetResult::Success
                }
                Some(login) if accounts.owns_player(&login.account_name, player_id) => {
                    login.player = Some(player_id);
                    NetResult::Success
                }
                Some(_) => NetResult::PlayerNotFound,
            };
            Ok(vec![auth::result_reply(srv2cli::ACCT_SET_PLAYER_REPLY, trans_id, result)?])
        }
        cli2srv::ACCT_CHANGE_PASSWORD_REQUEST => {
            let trans_id = message.u32("trans_id")?;
            let target = message.str("account_name")?;
            let hash = message.array::<32>("name_pass_hash")?;
            let result = state
                .require_login()
                .and_then(|login| {
                    if login.admin || login.account_name.eq_ignore_ascii_case(target) {
                        Ok(())
                    } else {
                        Err(AuthError::NotPermitted)
                    }
                })
                .and_then(|_| accounts.change_password(target, hash));
            let code = result.err().map(|e| e.net_result()).unwrap_or(NetResult::Success);
            Ok(vec![auth::result_reply(srv2cli::ACCT_CHANGE_PASSWORD_REPLY, trans_id, code)?])
        }
        cli2srv::PLAYER_DELETE_REQUEST => {
            let trans_id = message.u32("trans_id")?;
            let player_id = message.u32("player_id")?;
            let result = match state.login.as_mut() {
                None => Err(AuthError::NotLoggedIn),
                Some(login) => accounts.delete_player(&login.account_name, player_id).map(|_| {
                    if login.player == Some(player_id) {
                        login.player = None;
                    }
                }),
            };
            let code = result.err().map(|e| e.net_result()).unwrap_or(NetResult::Success);
            Ok(vec![auth::result_reply(srv2cli::PLAYER_DELETE_REPLY, trans_id, code)?])
        }
        other => Err(ProtocolError::UnknownOpcode {
            table: message.table().name,
            opcode: other,
        }),
    }
}

fn login(
    message: &Message,
    state: &mut AuthState,
    accounts: &mut AccountStore,
    config: &AuthConfig,
) -> Result<Vec<Message>, ProtocolError> {
    let trans_id = message.u32("trans_id")?;
    let name = message.str("account_name")?;
    let token = message.str("auth_token")?;
    // One attempt per challenge.
    let server_challenge = state.server_challenge.take();

    let result = if token.is_empty() {
        match server_challenge {
            None => Err(AuthError::NoChallenge),
            Some(sc) => accounts.verify_challenge(
                name,
                message.u32("client_challenge")?,
                sc,
                &message.array::<32>("challenge_hash")?,
            ),
        }
    } else {
        match validate_token(token, config) {
            Err(e) => Err(e),
            Ok(claims) if !name.is_empty() && !name.eq_ignore_ascii_case(&claims.sub) => {
                Err(AuthError::BadCredentials)
            }
            Ok(claims) => accounts.login_with_token(&claims),
        }
    };

    match result {
        Ok(account) => {
            let mut out = Vec::with_capacity(account.players.len() + 1);
            for player in account.players.values() {
                out.push(auth::player_info(trans_id, player.id, &player.name, &player.avatar_shape)?);
            }
            out.push(auth::login_reply(trans_id, NetResult::Success, account.id, account.flags)?);
            info!(account = %account.name, "Login succeeded");
            state.login = Some(Login {
                account_id: account.id,
                account_name: account.name.clone(),
                admin: account.is_admin(),
                player: None,
            });
            Ok(out)
        }
        Err(e) => {
            debug!(account = %name, error = %e, "Login failed");
            Ok(vec![auth::login_reply(trans_id, e.net_result(), Uuid::nil(), 0)?])
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::name_pass_hash;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key-256-bits-long!!";

    fn create_test_token(claims: &TokenClaims, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, claims, &key).unwrap()
    }

    fn test_claims() -> TokenClaims {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        TokenClaims {
            sub: "user123".into(),
            exp: now + 3600,
            iat: now,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("test-audience")),
        }
    }

    fn secret_config() -> AuthConfig {
        AuthConfig {
            secret: Some(SECRET.into()),
            ..Default::default()
        }
    }

    fn reply_result(message: &Message) -> NetResult {
        NetResult::from_code(message.u32("result").unwrap())
    }

    /// Register, then log in with a challenge proof built from `password`.
    fn challenge_login(
        state: &mut AuthState,
        accounts: &mut AccountStore,
        name: &str,
        password: &str,
    ) -> Vec<Message> {
        let register = auth::client_register_request(1).unwrap();
        let reply = handle(&register, state, accounts, &AuthConfig::default()).unwrap();
        let server_challenge = reply[0].u32("server_challenge").unwrap();
        let proof = challenge_hash(77, server_challenge, &name_pass_hash(name, password));
        let request = auth::login_request(9, 77, name, &proof, "").unwrap();
        handle(&request, state, accounts, &AuthConfig::default()).unwrap()
    }

    #[test]
    fn test_valid_token_validation() {
        let token = create_test_token(&test_claims(), SECRET);
        let result = validate_token(&token, &secret_config());
        assert_eq!(result.unwrap().sub, "user123");
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = test_claims();
        claims.exp = 1;
        let token = create_test_token(&claims, SECRET);
        assert!(matches!(validate_token(&token, &secret_config()), Err(AuthError::Expired)));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let token = create_test_token(&test_claims(), "correct-secret-key-here!!!!!");
        let config = AuthConfig {
            secret: Some("wrong-secret-key-here!!!!!!".into()),
            ..Default::default()
        };
        assert!(matches!(validate_token(&token, &config), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_missing_sub_rejected() {
        let mut claims = test_claims();
        claims.sub = String::new();
        let token = create_test_token(&claims, SECRET);
        assert!(matches!(
            validate_token(&token, &secret_config()),
            Err(AuthError::MissingClaim(_))
        ));
    }

    #[test]
    fn test_issuer_validation() {
        let token = create_test_token(&test_claims(), SECRET);
        let config = AuthConfig {
            issuer: Some("wrong-issuer".into()),
            ..secret_config()
        };
        assert!(matches!(validate_token(&token, &config), Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn test_not_configured_error() {
        let result = validate_token("some.jwt.token", &AuthConfig::default());
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_skip_expiry_for_testing() {
        let mut claims = test_claims();
        claims.exp = 1;
        let token = create_test_token(&claims, SECRET);
        let config = AuthConfig {
            skip_expiry: true,
            ..secret_config()
        };
        assert!(validate_token(&token, &config).is_ok());
    }

    #[test]
    fn test_account_id_ignores_case() {
        assert_eq!(account_id("Atrus"), account_id("atrus"));
        assert_ne!(account_id("atrus"), account_id("gehn"));
    }

    #[test]
    fn test_challenge_login_round_trip() {
        let mut accounts = AccountStore::new(&[]);
        accounts.create("Atrus", name_pass_hash("Atrus", "book"), 0).unwrap();
        accounts.create_player("atrus", "Catherine", "female").unwrap();

        let mut state = AuthState::default();
        let out = challenge_login(&mut state, &mut accounts, "atrus", "book");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].opcode(), srv2cli::ACCT_PLAYER_INFO);
        assert_eq!(out[0].str("player_name").unwrap(), "Catherine");
        assert_eq!(out[1].opcode(), srv2cli::ACCT_LOGIN_REPLY);
        assert_eq!(reply_result(&out[1]), NetResult::Success);
        assert_eq!(out[1].uuid("account_id").unwrap(), account_id("atrus"));

        let login = state.login.unwrap();
        assert_eq!(login.account_name, "Atrus");
        assert!(!login.admin);
        assert!(state.server_challenge.is_none());
    }

    #[test]
    fn test_wrong_password_and_unknown_account() {
        let mut accounts = AccountStore::new(&[]);
        accounts.create("atrus", name_pass_hash("atrus", "book"), 0).unwrap();

        let mut state = AuthState::default();
        let out = challenge_login(&mut state, &mut accounts, "atrus", "linking");
        assert_eq!(reply_result(&out[0]), NetResult::AuthenticationFailed);
        assert!(state.login.is_none());

        let out = challenge_login(&mut state, &mut accounts, "gehn", "book");
        assert_eq!(reply_result(&out[0]), NetResult::AccountNotFound);
    }

    #[test]
    fn test_challenge_is_single_use() {
        let mut accounts = AccountStore::new(&[]);
        accounts.create("atrus", name_pass_hash("atrus", "book"), 0).unwrap();
        let mut state = AuthState::default();

        let register = auth::client_register_request(1).unwrap();
        let reply = handle(&register, &mut state, &mut accounts, &AuthConfig::default()).unwrap();
        let sc = reply[0].u32("server_challenge").unwrap();
        let proof = challenge_hash(1, sc, &name_pass_hash("atrus", "book"));
        let request = auth::login_request(1, 1, "atrus", &proof, "").unwrap();

        let first = handle(&request, &mut state, &mut accounts, &AuthConfig::default()).unwrap();
        assert_eq!(reply_result(first.last().unwrap()), NetResult::Success);
        let replay = handle(&request, &mut state, &mut accounts, &AuthConfig::default()).unwrap();
        assert_eq!(reply_result(&replay[0]), NetResult::InvalidParameter);
    }

    #[test]
    fn test_token_login_creates_account() {
        let mut accounts = AccountStore::new(&[]);
        let mut state = AuthState::default();
        let token = create_test_token(&test_claims(), SECRET);
        let request = auth::login_request(4, 0, "", &[0; 32], &token).unwrap();

        let out = handle(&request, &mut state, &mut accounts, &secret_config()).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::Success);
        assert_eq!(state.login.as_ref().unwrap().account_name, "user123");
        let account = accounts.get("USER123").unwrap();
        assert_ne!(account.flags & account_flags::TOKEN_ONLY, 0);

        // A token-only account cannot be entered with a password proof.
        let mut other = AuthState::default();
        let out = challenge_login(&mut other, &mut accounts, "user123", "");
        assert_eq!(reply_result(&out[0]), NetResult::AuthenticationFailed);
    }

    #[test]
    fn test_token_must_match_named_account() {
        let mut accounts = AccountStore::new(&[]);
        let mut state = AuthState::default();
        let token = create_test_token(&test_claims(), SECRET);
        let request = auth::login_request(4, 0, "someone-else", &[0; 32], &token).unwrap();
        let out = handle(&request, &mut state, &mut accounts, &secret_config()).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::AuthenticationFailed);
        assert!(accounts.is_empty());
    }

    #[test]
    fn test_admin_flag_comes_from_config_only() {
        let mut accounts = AccountStore::new(&["Yeesha".to_string()]);
        let admin = accounts.create("yeesha", [1; 32], 0).unwrap();
        assert!(admin.is_admin());
        let sneaky = accounts.create("gehn", [2; 32], account_flags::ADMIN).unwrap();
        assert!(!sneaky.is_admin());
        assert!(matches!(accounts.create("GEHN", [3; 32], 0), Err(AuthError::AccountExists)));
        assert!(matches!(accounts.create("", [3; 32], 0), Err(AuthError::InvalidAccountName)));
    }

    #[test]
    fn test_players_require_login_and_ownership() {
        let mut accounts = AccountStore::new(&[]);
        accounts.create("atrus", name_pass_hash("atrus", "book"), 0).unwrap();
        accounts.create("gehn", name_pass_hash("gehn", "riven"), 0).unwrap();
        let gehns = accounts.create_player("gehn", "Gehn", "male").unwrap();
        let config = AuthConfig::default();

        let mut state = AuthState::default();
        let create = auth::player_create_request(2, "Sirrus", "male").unwrap();
        let out = handle(&create, &mut state, &mut accounts, &config).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::NotAuthenticated);

        challenge_login(&mut state, &mut accounts, "atrus", "book");
        let out = handle(&create, &mut state, &mut accounts, &config).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::Success);
        let sirrus = out[0].u32("player_id").unwrap();

        let duplicate = auth::player_create_request(3, "SIRRUS", "male").unwrap();
        let out = handle(&duplicate, &mut state, &mut accounts, &config).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::InvalidParameter);

        let steal = auth::set_player_request(4, gehns.id).unwrap();
        let out = handle(&steal, &mut state, &mut accounts, &config).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::PlayerNotFound);

        let select = auth::set_player_request(5, sirrus).unwrap();
        handle(&select, &mut state, &mut accounts, &config).unwrap();
        assert_eq!(state.login.as_ref().unwrap().player, Some(sirrus));

        let delete = Message::new(
            &auth::CLI2SRV,
            cli2srv::PLAYER_DELETE_REQUEST,
            vec![6u32.into(), sirrus.into()],
        )
        .unwrap();
        let out = handle(&delete, &mut state, &mut accounts, &config).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::Success);
        assert_eq!(state.login.as_ref().unwrap().player, None);
        assert!(!accounts.owns_player("atrus", sirrus));
    }

    #[test]
    fn test_change_password_only_for_self() {
        let mut accounts = AccountStore::new(&[]);
        accounts.create("atrus", name_pass_hash("atrus", "book"), 0).unwrap();
        accounts.create("gehn", name_pass_hash("gehn", "riven"), 0).unwrap();
        let config = AuthConfig::default();
        let mut state = AuthState::default();
        challenge_login(&mut state, &mut accounts, "atrus", "book");

        let change = |name: &str, pw: &str| {
            Message::new(
                &auth::CLI2SRV,
                cli2srv::ACCT_CHANGE_PASSWORD_REQUEST,
                vec![
                    1u32.into(),
                    name.into(),
                    crate::protocol::Value::Fixed(name_pass_hash(name, pw).to_vec()),
                ],
            )
            .unwrap()
        };
        let out = handle(&change("gehn", "mine"), &mut state, &mut accounts, &config).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::NotPermitted);

        let out = handle(&change("atrus", "age"), &mut state, &mut accounts, &config).unwrap();
        assert_eq!(reply_result(&out[0]), NetResult::Success);

        let mut fresh = AuthState::default();
        let out = challenge_login(&mut fresh, &mut accounts, "atrus", "age");
        assert_eq!(reply_result(out.last().unwrap()), NetResult::Success);
    }
}
