//! Plasma Game Server
//!
//! Async TCP server: key exchange, encrypted framing and per-service
//! dispatch for every connected client.
//!
//! ```text
//! accept ─► handshake ─► Ready ─┬─ reader loop ─► dispatch ─► replies ─┐
//!                               │                                     ▼
//!                               └───────────── writer task ◄── Outbound queue
//! ```
//!
//! Each connection owns its keys, its auth state and its send queue. Game
//! sessions only hold a clone of the queue's sender, keyed by player.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use super::auth::{self, AccountStore, AuthState, Login};
use super::config::{ConfigError, ServerConfig};
use super::connection::{ConnState, ConnectionError, FrameReader, FrameWriter, Outbound};
use super::csr;
use super::gatekeeper::{self, AddressBook};
use super::handshake::{self, CryptoWorker, HandshakeSettings};
use super::log::{ConnId, LogRegistry, NetEvent};
use super::score::{self, ScoreStore};
use super::session::{self, SessionManager};
use super::vault::{self, VaultBackend, VaultError};
use crate::core::idpool::IdPool;
use crate::protocol::services::auth as auth_proto;
use crate::protocol::services::echo;
use crate::protocol::{
    Direction, Message, NetResult, ProtocolError, ProtocolTables, ServiceId, UnknownOpcodePolicy,
};

/// How long a closing connection may take to flush its queue.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Configuration rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Protocol tables could not be built.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Vault backend could not be opened.
    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A connection that finished its handshake.
#[derive(Debug)]
pub struct ClientInfo {
    /// Peer address.
    pub addr: SocketAddr,
    /// Identity, once logged in.
    pub login: Option<Login>,
    /// Connection time.
    pub connected_at: DateTime<Utc>,
    /// Last frame received.
    pub last_activity: Instant,
    /// Queue to the connection's writer.
    pub sender: mpsc::Sender<Outbound>,
    /// Wakes the connection task to drop the peer.
    pub kick: Arc<Notify>,
}

/// Live connections by id.
pub type ClientTable = RwLock<BTreeMap<ConnId, ClientInfo>>;

/// Everything the connection tasks share.
pub struct ServerState {
    config: ServerConfig,
    tables: Arc<ProtocolTables>,
    handshake: HandshakeSettings,
    worker: CryptoWorker,
    log: Arc<LogRegistry>,
    clients: ClientTable,
    conn_ids: parking_lot::Mutex<IdPool>,
    sessions: SessionManager,
    accounts: parking_lot::Mutex<AccountStore>,
    vault: parking_lot::Mutex<Box<dyn VaultBackend>>,
    scores: parking_lot::Mutex<ScoreStore>,
    addresses: AddressBook,
}

/// What the reader loop does after a message.
enum Flow {
    Continue,
    Close(&'static str),
}

/// The game server.
pub struct GameServer {
    state: Arc<ServerState>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Result<Self, GameServerError> {
        config.validate()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        let tables = Arc::new(ProtocolTables::new(config.protocol_version)?);
        let log = Arc::new(LogRegistry::new());
        let handshake = config.handshake_settings()?;
        let vault = vault::open_backend(config.vault_path.as_deref())?;
        let max_connections = u32::try_from(config.max_connections).unwrap_or(u32::MAX);
        let addresses = AddressBook::new(
            config.auth_servers.clone(),
            config.file_servers.clone(),
            config.bind_addr.to_string(),
        );

        let state = ServerState {
            tables: tables.clone(),
            handshake,
            worker: CryptoWorker::new(config.crypto_workers),
            sessions: SessionManager::new(tables, log.clone(), max_connections),
            log,
            clients: RwLock::new(BTreeMap::new()),
            conn_ids: parking_lot::Mutex::new(IdPool::bounded(1, max_connections)),
            accounts: parking_lot::Mutex::new(AccountStore::new(&config.admin_accounts)),
            vault: parking_lot::Mutex::new(vault),
            scores: parking_lot::Mutex::new(ScoreStore::new()),
            addresses,
            config,
        };

        Ok(Self {
            state: Arc::new(state),
            shutdown_tx,
        })
    }

    /// Notification handlers. Register before calling [`GameServer::run`].
    pub fn log(&self) -> &LogRegistry {
        &self.state.log
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.run_with_listener(listener).await
    }

    /// Run on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "Game server listening on {} (protocol v{}, {:?})",
            listener.local_addr()?,
            self.state.config.protocol_version,
            self.state.config.crypto.cipher
        );

        let tick_handle = tokio::spawn(Self::run_tick_loop(self.state.clone()));
        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(self.state.clone()));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Some(conn) = self.state.conn_ids.lock().allocate() else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            };
                            debug!("New connection {} from {}", conn, addr);
                            self.handle_connection(conn, stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        tick_handle.abort();
        cleanup_handle.abort();
        if let Err(e) = self.state.vault.lock().flush() {
            warn!("Vault flush on shutdown failed: {}", e);
        }

        Ok(())
    }

    fn handle_connection(&self, conn: ConnId, stream: TcpStream, addr: SocketAddr) {
        let state = self.state.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            state.log.dispatch(&NetEvent::ConnectionOpened { conn, addr });
            let reason = Self::serve(&state, conn, stream, addr, shutdown_rx).await;
            state.conn_ids.lock().release(conn);
            state.log.dispatch(&NetEvent::ConnectionClosed {
                conn,
                reason: reason.to_string(),
            });
            debug!("Client {} cleaned up", addr);
        });
    }

    /// Drive one connection from handshake to close. Returns why it closed.
    async fn serve(
        state: &Arc<ServerState>,
        conn: ConnId,
        mut stream: TcpStream,
        addr: SocketAddr,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> &'static str {
        let mut conn_state = ConnState::Connecting;
        step(conn, &mut conn_state, ConnState::Handshaking);

        let established = match handshake::accept(&mut stream, &state.handshake, &state.worker).await {
            Ok(established) => established,
            Err(e) => {
                step(conn, &mut conn_state, ConnState::Error);
                state.log.dispatch(&NetEvent::HandshakeFailed {
                    conn,
                    reason: e.to_string(),
                });
                return "handshake failed";
            }
        };
        step(conn, &mut conn_state, ConnState::Ready);
        state.log.dispatch(&NetEvent::HandshakeCompleted {
            conn,
            cipher: state.handshake.cipher,
        });
        debug!(conn, build = established.build_id, "handshake complete");

        let version = established.version;
        let keys = established.keys;
        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, Some(keys.inbound), state.config.limits);
        let mut writer = FrameWriter::new(write_half, Some(keys.outbound)).with_version(version);
        let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.send_queue);
        let kick = Arc::new(Notify::new());

        state.clients.write().await.insert(
            conn,
            ClientInfo {
                addr,
                login: None,
                connected_at: Utc::now(),
                last_activity: Instant::now(),
                sender: tx.clone(),
                kick: kick.clone(),
            },
        );

        let mut writer_task = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    Outbound::Message(message) => match writer.write_message(&message).await {
                        Ok(()) => {}
                        // Nothing was written, so the stream is still usable.
                        Err(ConnectionError::Protocol(e @ ProtocolError::NotInVersion { .. })) => {
                            warn!(conn, "dropping outbound message: {}", e);
                        }
                        Err(e) => {
                            debug!(conn, "write failed: {}", e);
                            break;
                        }
                    },
                    Outbound::Close => break,
                }
            }
            let _ = writer.shutdown().await;
        });

        let mut auth_state = AuthState::default();
        let reason = loop {
            tokio::select! {
                result = reader.read_message(&state.tables, Direction::ClientToServer) => {
                    let message = match result {
                        Ok(message) => message,
                        Err(ConnectionError::Closed) => break "peer closed",
                        Err(ConnectionError::UnknownOpcode { service, opcode }) => {
                            match service.unknown_opcode_policy() {
                                UnknownOpcodePolicy::Skip => {
                                    state.log.dispatch(&NetEvent::UnknownOpcodeSkipped { conn, service, opcode });
                                    continue;
                                }
                                UnknownOpcodePolicy::Disconnect => {
                                    state.log.dispatch(&NetEvent::ProtocolError {
                                        conn,
                                        error: format!("unknown opcode {} for {:?}", opcode, service),
                                    });
                                    break "unknown opcode";
                                }
                            }
                        }
                        Err(ConnectionError::Io(e)) => {
                            debug!(conn, "read failed: {}", e);
                            break "io error";
                        }
                        Err(e) => {
                            state.log.dispatch(&NetEvent::ProtocolError { conn, error: e.to_string() });
                            break "protocol error";
                        }
                    };

                    if let Some(client) = state.clients.write().await.get_mut(&conn) {
                        client.last_activity = Instant::now();
                    }

                    match Self::dispatch(state, conn, &message, &mut auth_state, &tx).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Close(reason)) => break reason,
                        Err(e) => {
                            state.log.dispatch(&NetEvent::ProtocolError { conn, error: e.to_string() });
                            break "protocol error";
                        }
                    }
                }
                _ = kick.notified() => {
                    break "kicked";
                }
                _ = shutdown_rx.recv() => {
                    if let Ok(notice) = auth_proto::kicked_off(NetResult::ServerBusy) {
                        if let Err(e) = tx.send(Outbound::Message(notice)).await {
                            debug!(conn, "shutdown notice not queued: {}", e);
                        }
                    }
                    break "server shutdown";
                }
            }
        };

        step(conn, &mut conn_state, ConnState::Closing);
        let login = state
            .clients
            .write()
            .await
            .remove(&conn)
            .and_then(|client| client.login)
            .or(auth_state.login);
        if let Some(player) = login.and_then(|l| l.player) {
            state.sessions.player_disconnected(player).await;
        }

        if let Err(e) = tx.send(Outbound::Close).await {
            debug!(conn, "close not queued: {}", e);
        }
        drop(tx);
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut writer_task).await.is_err() {
            debug!(conn, "send queue did not drain");
            writer_task.abort();
        }
        step(conn, &mut conn_state, ConnState::Closed);
        reason
    }

    /// Route one message to its service.
    async fn dispatch(
        state: &ServerState,
        conn: ConnId,
        message: &Message,
        auth_state: &mut AuthState,
        tx: &mpsc::Sender<Outbound>,
    ) -> Result<Flow, ProtocolError> {
        let service = message.service();
        if auth_state.login.is_none() && !service.allowed_before_login() {
            debug!(conn, ?service, "request before login");
            let notice = auth_proto::kicked_off(NetResult::NotAuthenticated)?;
            if let Err(e) = tx.send(Outbound::Message(notice)).await {
                debug!(conn, "kick notice not queued: {}", e);
            }
            return Ok(Flow::Close("not authenticated"));
        }

        let admin = auth_state.login.as_ref().is_some_and(|l| l.admin);
        let replies = match service {
            ServiceId::Auth => {
                let replies = {
                    let mut accounts = state.accounts.lock();
                    auth::handle(message, auth_state, &mut accounts, &state.config.auth)?
                };
                if let Some(client) = state.clients.write().await.get_mut(&conn) {
                    if client.login != auth_state.login {
                        client.login = auth_state.login.clone();
                    }
                }
                replies
            }
            ServiceId::Vault => {
                let mut backend = state.vault.lock();
                vault::handle(message, backend.as_mut())?
            }
            ServiceId::Db => {
                let mut backend = state.vault.lock();
                vault::handle_db(message, backend.as_mut(), admin)?
            }
            ServiceId::Score => {
                let mut scores = state.scores.lock();
                score::handle(message, &mut scores)?
            }
            ServiceId::Game => {
                let player = auth_state.login.as_ref().and_then(|l| l.player);
                session::handle(message, player, tx, &state.sessions).await?
            }
            ServiceId::Csr => {
                csr::handle(message, auth_state.login.as_ref(), &state.clients, &state.sessions).await?
            }
            ServiceId::GateKeeper => gatekeeper::handle(message, &state.addresses)?,
            ServiceId::Echo => echo_reply(message)?,
        };

        for reply in replies {
            if tx.send(Outbound::Message(reply)).await.is_err() {
                return Ok(Flow::Close("send queue closed"));
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_tick_loop(state: Arc<ServerState>) {
        let mut ticker = interval(Duration::from_millis(state.config.tick_interval_ms));
        loop {
            ticker.tick().await;
            state.sessions.tick_all(Instant::now()).await;
        }
    }

    async fn run_cleanup_loop(state: Arc<ServerState>) {
        let mut ticker = interval(Duration::from_secs(state.config.cleanup_interval_secs));

        loop {
            ticker.tick().await;
            let now = Instant::now();

            state.sessions.check_idle(now, state.config.seat_idle()).await;

            let idle = state.config.connection_idle();
            {
                let clients = state.clients.read().await;
                for (conn, client) in clients.iter() {
                    if now.saturating_duration_since(client.last_activity) > idle {
                        info!("Dropping idle client {} ({})", conn, client.addr);
                        client.kick.notify_one();
                    }
                }
            }

            let reaped = state.sessions.reap().await;
            if reaped > 0 {
                debug!("Reaped {} game sessions", reaped);
            }

            if let Err(e) = state.vault.lock().flush() {
                warn!("Vault flush failed: {}", e);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.state.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.state.sessions.session_count().await
    }
}

fn step(conn: ConnId, current: &mut ConnState, to: ConnState) {
    match current.transition(to) {
        Ok(next) => *current = next,
        Err(e) => debug!(conn, "{}", e),
    }
}

fn echo_reply(message: &Message) -> Result<Vec<Message>, ProtocolError> {
    let reply = match message.opcode() {
        echo::cli2srv::PING_REQUEST => echo::ping_reply(message.u32("ping_time_ms")?)?,
        echo::cli2srv::ECHO_REQUEST => {
            echo::echo_reply(message.u32("trans_id")?, message.bytes("payload")?.to_vec())?
        }
        _ => return Ok(Vec::new()),
    };
    Ok(vec![reply])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(local_config()).unwrap();
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
        assert!(server.log().is_empty());
    }

    #[tokio::test]
    async fn test_server_rejects_bad_config() {
        let config = ServerConfig {
            max_connections: 0,
            ..local_config()
        };
        assert!(matches!(GameServer::new(config), Err(GameServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = Arc::new(GameServer::new(local_config()).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let running = server.clone();
        let handle = tokio::spawn(async move { running.run_with_listener(listener).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[test]
    fn test_echo_replies() {
        let ping = echo::ping_request(5).unwrap();
        let replies = echo_reply(&ping).unwrap();
        assert_eq!(replies[0].u32("ping_time_ms").unwrap(), 5);

        let req = echo::echo_request(9, b"abc".to_vec()).unwrap();
        let replies = echo_reply(&req).unwrap();
        assert_eq!(replies[0].u32("trans_id").unwrap(), 9);
        assert_eq!(replies[0].bytes("payload").unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_dispatch_survives_closed_send_queue() {
        use crate::protocol::services::vault as vault_proto;

        let server = GameServer::new(local_config()).unwrap();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let mut auth_state = AuthState::default();

        // The kick notice cannot be queued, but the connection still closes.
        let blobs: vault_proto::NodeBlobs = [Some(b"x".to_vec()), None, None, None];
        let request = vault_proto::node_create(1, &blobs).unwrap();
        let flow = GameServer::dispatch(&server.state, 1, &request, &mut auth_state, &tx).await;
        assert!(matches!(flow, Ok(Flow::Close("not authenticated"))));

        let ping = echo::ping_request(3).unwrap();
        let flow = GameServer::dispatch(&server.state, 1, &ping, &mut auth_state, &tx).await;
        assert!(matches!(flow, Ok(Flow::Close("send queue closed"))));
    }

    #[test]
    fn test_step_ignores_illegal_transition() {
        let mut state = ConnState::Connecting;
        step(1, &mut state, ConnState::Ready);
        assert_eq!(state, ConnState::Connecting);
        step(1, &mut state, ConnState::Handshaking);
        assert_eq!(state, ConnState::Handshaking);
    }
}
