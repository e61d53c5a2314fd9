//! Protocol Client
//!
//! Connects to a server, runs the key exchange and then exchanges typed
//! messages over the encrypted stream. Used by outer applications and by
//! the integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

use super::config::{ConfigError, ServerConfig};
use super::connection::{ConnectionError, FrameReader, FrameWriter};
use super::handshake::{self, CryptoWorker, HandshakeError, HandshakeSettings};
use crate::core::hash::{challenge_hash, name_pass_hash};
use crate::core::idpool::IdPool;
use crate::protocol::services::auth;
use crate::protocol::{Direction, Limits, Message, NetResult, ProtocolError, ProtocolTables};

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Key exchange failed.
    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),

    /// Stream failed or was closed.
    #[error("connection: {0}")]
    Connection(#[from] ConnectionError),

    /// A message could not be built or read.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket error before the handshake.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// No reply in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The server answered with something else.
    #[error("expected {expected}, got {got}")]
    Unexpected {
        /// Wanted message.
        expected: &'static str,
        /// Received message.
        got: &'static str,
    },

    /// The server refused the request.
    #[error("request refused: {0:?}")]
    Refused(NetResult),

    /// Too many requests in flight.
    #[error("transaction ids exhausted")]
    TransIdsExhausted,
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Key exchange parameters; must match the server's.
    pub handshake: HandshakeSettings,
    /// Frame limits for incoming traffic.
    pub limits: Limits,
    /// How long to wait for a reply.
    pub reply_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeSettings::default(),
            limits: Limits::default(),
            reply_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Settings that match a server running `config`.
    pub fn for_server(config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            handshake: config.handshake_settings()?,
            limits: config.limits,
            ..Default::default()
        })
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInfo {
    /// Account id.
    pub account_id: Uuid,
    /// Account flag bits.
    pub flags: u32,
    /// Players on the account as (id, name).
    pub players: Vec<(u32, String)>,
}

/// An encrypted connection to a server.
pub struct Client {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    tables: ProtocolTables,
    trans_ids: IdPool,
    reply_timeout: Duration,
}

impl Client {
    /// Connect and run the key exchange.
    pub async fn connect(addr: SocketAddr, config: &ClientConfig) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let worker = CryptoWorker::new(1);
        let established = handshake::connect(&mut stream, &config.handshake, &worker).await?;
        debug!(%addr, version = established.version, "connected");

        let keys = established.keys;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read_half, Some(keys.inbound), config.limits),
            writer: FrameWriter::new(write_half, Some(keys.outbound)).with_version(established.version),
            tables: ProtocolTables::new(established.version)?,
            trans_ids: IdPool::new(1),
            reply_timeout: config.reply_timeout,
        })
    }

    /// Tables for the negotiated version.
    pub fn tables(&self) -> &ProtocolTables {
        &self.tables
    }

    /// Reserve a transaction id. Released when its final reply arrives.
    pub fn next_trans_id(&mut self) -> Result<u32, ClientError> {
        self.trans_ids.allocate().ok_or(ClientError::TransIdsExhausted)
    }

    /// Transactions still waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.trans_ids.in_use()
    }

    /// Send one message.
    pub async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        self.writer.write_message(message).await?;
        Ok(())
    }

    /// Receive the next message, waiting at most the reply timeout.
    pub async fn recv(&mut self) -> Result<Message, ClientError> {
        let message = tokio::time::timeout(self.reply_timeout, self.read_known())
            .await
            .map_err(|_| ClientError::Timeout("any message"))??;

        // A reply carrying a result closes its transaction.
        let fields = message.def().fields;
        let is_final = fields.iter().any(|f| f.name == "trans_id") && fields.iter().any(|f| f.name == "result");
        if is_final {
            self.trans_ids.release(message.u32("trans_id")?);
        }
        Ok(message)
    }

    /// Newer servers may send opcodes this build has no schema for.
    async fn read_known(&mut self) -> Result<Message, ConnectionError> {
        loop {
            match self
                .reader
                .read_message(&self.tables, Direction::ServerToClient)
                .await
            {
                Err(ConnectionError::UnknownOpcode { service, opcode }) => {
                    debug!(?service, opcode, "skipping unknown opcode");
                }
                other => return other,
            }
        }
    }

    /// Receive the next message and require it to be `name`.
    pub async fn expect(&mut self, name: &'static str) -> Result<Message, ClientError> {
        let message = self.recv().await?;
        if message.name() != name {
            return Err(ClientError::Unexpected {
                expected: name,
                got: message.name(),
            });
        }
        Ok(message)
    }

    /// Receive until a message named `name` arrives, dropping others.
    pub async fn recv_until(&mut self, name: &'static str) -> Result<Message, ClientError> {
        loop {
            let message = self.recv().await.map_err(|e| match e {
                ClientError::Timeout(_) => ClientError::Timeout(name),
                other => other,
            })?;
            if message.name() == name {
                return Ok(message);
            }
            debug!(skipped = message.name(), waiting_for = name, "dropping message");
        }
    }

    /// Announce the build and get a login challenge.
    pub async fn register(&mut self, build_id: u32) -> Result<u32, ClientError> {
        self.send(&auth::client_register_request(build_id)?).await?;
        Ok(self.expect("ClientRegisterReply").await?.u32("server_challenge")?)
    }

    /// Create an account.
    pub async fn create_account(&mut self, name: &str, password: &str) -> Result<Uuid, ClientError> {
        let trans_id = self.next_trans_id()?;
        let hash = name_pass_hash(name, password);
        self.send(&auth::create_account_request(trans_id, name, &hash, 0)?)
            .await?;
        let reply = self.expect("AcctCreateReply").await?;
        check(&reply)?;
        Ok(reply.uuid("account_id")?)
    }

    /// Register, then log in by challenge hash.
    pub async fn login(&mut self, name: &str, password: &str) -> Result<LoginInfo, ClientError> {
        let server_challenge = self.register(0).await?;
        let client_challenge = rand::random::<u32>();
        let proof = challenge_hash(client_challenge, server_challenge, &name_pass_hash(name, password));
        let trans_id = self.next_trans_id()?;
        self.send(&auth::login_request(trans_id, client_challenge, name, &proof, "")?)
            .await?;

        let mut players = Vec::new();
        loop {
            let message = self.recv().await?;
            match message.name() {
                "AcctPlayerInfo" => players.push((
                    message.u32("player_id")?,
                    message.str("player_name")?.to_string(),
                )),
                "AcctLoginReply" => {
                    check(&message)?;
                    return Ok(LoginInfo {
                        account_id: message.uuid("account_id")?,
                        flags: message.u32("account_flags")?,
                        players,
                    });
                }
                other => {
                    return Err(ClientError::Unexpected {
                        expected: "AcctLoginReply",
                        got: other,
                    })
                }
            }
        }
    }

    /// Create a player on the logged-in account.
    pub async fn create_player(&mut self, name: &str, avatar_shape: &str) -> Result<u32, ClientError> {
        let trans_id = self.next_trans_id()?;
        self.send(&auth::player_create_request(trans_id, name, avatar_shape)?)
            .await?;
        let reply = self.expect("PlayerCreateReply").await?;
        check(&reply)?;
        Ok(reply.u32("player_id")?)
    }

    /// Make `player_id` the active player.
    pub async fn set_player(&mut self, player_id: u32) -> Result<(), ClientError> {
        let trans_id = self.next_trans_id()?;
        self.send(&auth::set_player_request(trans_id, player_id)?).await?;
        check(&self.expect("AcctSetPlayerReply").await?)
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

fn check(reply: &Message) -> Result<(), ClientError> {
    match NetResult::from_code(reply.u32("result")?) {
        NetResult::Success => Ok(()),
        other => Err(ClientError::Refused(other)),
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("version", &self.tables.version())
            .field("in_flight", &self.trans_ids.in_use())
            .finish_non_exhaustive()
    }
}
