//! Game Session Registry
//!
//! Owns every running mini-game and the seats of the players in it.
//!
//! ```text
//! SessionManager
//!   registry: RwLock ── id → Arc<Mutex<GameSession>>     (lookup/insert/remove only)
//!                       (game type, table) → id          (common tables)
//!   GameSession: Mutex ── one state transition at a time per session
//! ```
//!
//! The registry lock is released before a session is locked, so traffic for
//! different sessions runs in parallel. Sessions reach connections only
//! through the `Outbound` sender each seat holds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::connection::Outbound;
use super::log::{LogRegistry, NetEvent};
use crate::core::idpool::IdPool;
use crate::core::rng::GameRng;
use crate::game::{
    Game, GameContext, GameError, GameParams, GamePhase, InitResult, MiniGame, Outgoing, PlayerId,
    Recipient,
};
use crate::protocol::services::game::{self as proto, cli2srv, srv2cli, GameType};
use crate::protocol::{Message, NetResult, ProtocolError, ProtocolTables, PROTOCOL_VERSION};

/// Game session identifier, reused after the session is reaped.
pub type GameId = u32;

// =============================================================================
// ERRORS
// =============================================================================

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No such game.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// Every seat is taken.
    #[error("game {0} is full")]
    Full(GameId),

    /// Player holds no connected seat.
    #[error("player {player} is not seated in game {game_id}")]
    NotSeated {
        /// Game.
        game_id: GameId,
        /// Player.
        player: PlayerId,
    },

    /// Creation parameters were refused by the game.
    #[error("game failed to initialize")]
    InitFailed,

    /// No session ids left.
    #[error("session ids exhausted")]
    Exhausted,

    /// The game refused the input. An expected outcome, not a fault.
    #[error("rejected: {0}")]
    Rejected(GameError),

    /// A message could not be built or decoded.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Result code for replies.
    pub fn net_result(&self) -> NetResult {
        match self {
            SessionError::NotFound(_) => NetResult::GameNotFound,
            SessionError::Full(_) => NetResult::GameFull,
            SessionError::NotSeated { .. } => NetResult::PlayerNotFound,
            SessionError::Exhausted => NetResult::ServerBusy,
            SessionError::InitFailed
            | SessionError::Rejected(_)
            | SessionError::Protocol(_) => NetResult::InvalidParameter,
        }
    }
}

// =============================================================================
// GAME SESSION
// =============================================================================

/// A player's place in a session.
#[derive(Debug)]
pub struct Seat {
    /// Occupant.
    pub player: PlayerId,
    /// Whether the occupant is still reachable.
    pub connected: bool,
    /// Last input or join.
    pub last_input: Instant,
    sender: mpsc::Sender<Outbound>,
}

/// One running mini-game and its seats.
#[derive(Debug)]
pub struct GameSession {
    id: GameId,
    game_type: GameType,
    owner: PlayerId,
    seats: Vec<Seat>,
    game: Game,
    rng: GameRng,
    table_id: Option<u32>,
    created_at: DateTime<Utc>,
    announced: GamePhase,
    /// Mini-game messages newer than this are not delivered.
    version: u32,
}

/// Seat as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct SeatSummary {
    /// Occupant.
    pub player: PlayerId,
    /// Reachable.
    pub connected: bool,
}

/// Session as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Game.
    pub id: GameId,
    /// Mini-game.
    pub game_type: GameType,
    /// Owner.
    pub owner: PlayerId,
    /// Lifecycle phase.
    pub phase: GamePhase,
    /// Seats in join order.
    pub seats: Vec<SeatSummary>,
    /// Common table, if any.
    pub table_id: Option<u32>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    /// Build and initialize a session owned by `owner`. Nobody is seated yet.
    pub fn new(
        id: GameId,
        game_type: GameType,
        params: &GameParams,
        owner: PlayerId,
        table_id: Option<u32>,
        rng: GameRng,
        now: Instant,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            id,
            game_type,
            owner,
            seats: Vec::new(),
            game: Game::new(game_type, params),
            rng,
            table_id,
            created_at: Utc::now(),
            announced: GamePhase::Uninitialized,
            version: PROTOCOL_VERSION,
        };
        let (result, outbox) = session.call(now, |game, ctx| game.init(ctx));
        session.publish(outbox);
        if result == InitResult::Error {
            return Err(SessionError::InitFailed);
        }
        Ok(session)
    }

    /// Limit game output to what protocol `version` carries.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Session id.
    pub fn id(&self) -> GameId {
        self.id
    }

    /// Mini-game.
    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    /// Current owner.
    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.game.phase()
    }

    /// Common table id, if this session is one.
    pub fn table_id(&self) -> Option<u32> {
        self.table_id
    }

    /// Seats in join order.
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    /// Connected players in seat order.
    pub fn connected_players(&self) -> Vec<PlayerId> {
        self.seats
            .iter()
            .filter(|s| s.connected)
            .map(|s| s.player)
            .collect()
    }

    /// Terminal, or nobody left to play.
    pub fn is_finished(&self) -> bool {
        self.game.is_terminal() || self.seats.iter().all(|s| !s.connected)
    }

    /// Seat `player`, or reconnect their existing seat.
    ///
    /// `ack` reaches the joiner ahead of every notice the join causes.
    pub fn join(
        &mut self,
        player: PlayerId,
        sender: mpsc::Sender<Outbound>,
        ack: Message,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.game.is_terminal() {
            return Err(SessionError::NotFound(self.id));
        }

        let existing = self.seats.iter().position(|s| s.player == player);
        if existing.is_none() && self.connected_players().len() >= self.game.max_players() {
            return Err(SessionError::Full(self.id));
        }

        // Built up front so a failure cannot leave the join half applied.
        let roster = self
            .connected_players()
            .into_iter()
            .filter(|other| *other != player)
            .map(|other| proto::seat_notice(srv2cli::PLAYER_JOINED, self.id, other))
            .collect::<Result<Vec<_>, _>>()?;
        let announce = proto::seat_notice(srv2cli::PLAYER_JOINED, self.id, player)?;

        let seat = Seat {
            player,
            connected: true,
            last_input: now,
            sender,
        };
        let previous = match existing {
            Some(index) => Some(std::mem::replace(&mut self.seats[index], seat)),
            None => {
                self.seats.push(seat);
                None
            }
        };

        let (joined, outbox) = self.call(now, |game, ctx| game.player_joined(ctx, player));
        if let Err(e) = joined {
            match (existing, previous) {
                (Some(index), Some(previous)) => self.seats[index] = previous,
                _ => {
                    self.seats.pop();
                }
            }
            return Err(match e {
                GameError::GameFull => SessionError::Full(self.id),
                other => SessionError::Rejected(other),
            });
        }

        self.deliver_to(player, ack);
        for notice in roster {
            self.deliver_to(player, notice);
        }
        self.notify(Recipient::AllExcept(player), announce);
        self.publish(outbox);
        debug!(game_id = self.id, player, "player seated");
        Ok(())
    }

    /// Give up a seat for good.
    pub fn leave(&mut self, player: PlayerId, now: Instant) -> Result<(), SessionError> {
        let index = self
            .seats
            .iter()
            .position(|s| s.player == player)
            .ok_or(SessionError::NotSeated { game_id: self.id, player })?;
        let seat = self.seats.remove(index);
        if seat.connected {
            self.vacate(player, now)?;
        }
        Ok(())
    }

    /// Mark the seat disconnected. The seat is kept for a later rejoin.
    ///
    /// Returns whether a connected seat was found.
    pub fn disconnect(&mut self, player: PlayerId, now: Instant) -> Result<bool, SessionError> {
        let Some(seat) = self.seats.iter_mut().find(|s| s.player == player && s.connected) else {
            return Ok(false);
        };
        seat.connected = false;
        self.vacate(player, now)?;
        Ok(true)
    }

    /// Route a decoded mini-game message from `player`.
    pub fn input(&mut self, player: PlayerId, input: &Message, now: Instant) -> Result<(), SessionError> {
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.player == player && s.connected)
            .ok_or(SessionError::NotSeated { game_id: self.id, player })?;
        seat.last_input = now;
        self.drive(now, |game, ctx| game.handle_input(ctx, player, input))
    }

    /// Run the game's timers.
    pub fn tick(&mut self, now: Instant) -> Result<(), SessionError> {
        self.drive(now, |game, ctx| game.tick(ctx))
    }

    /// Disconnect every seat silent for longer than `idle`.
    pub fn disconnect_idle(&mut self, now: Instant, idle: Duration) -> Vec<PlayerId> {
        let stale: Vec<PlayerId> = self
            .seats
            .iter()
            .filter(|s| s.connected && now.saturating_duration_since(s.last_input) > idle)
            .map(|s| s.player)
            .collect();
        for player in &stale {
            if let Err(e) = self.disconnect(*player, now) {
                warn!(game_id = self.id, player, "idle disconnect failed: {}", e);
            }
        }
        stale
    }

    /// Tear the game down.
    pub fn abort(&mut self) {
        if !self.game.is_terminal() {
            if let Err(e) = self.game.abort() {
                warn!(game_id = self.id, "abort failed: {}", e);
            }
        }
    }

    /// Operator view.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            game_type: self.game_type,
            owner: self.owner,
            phase: self.game.phase(),
            seats: self
                .seats
                .iter()
                .map(|s| SeatSummary {
                    player: s.player,
                    connected: s.connected,
                })
                .collect(),
            table_id: self.table_id,
            created_at: self.created_at,
        }
    }

    /// Tell the rest and the game that `player` is gone; hand ownership on.
    fn vacate(&mut self, player: PlayerId, now: Instant) -> Result<(), SessionError> {
        self.notify(
            Recipient::AllExcept(player),
            proto::seat_notice(srv2cli::PLAYER_LEFT, self.id, player)?,
        );
        if let Err(e) = self.drive(now, |game, ctx| game.player_left(ctx, player)) {
            debug!(game_id = self.id, player, "player_left: {}", e);
        }
        if self.owner == player {
            if let Some(next) = self.connected_players().first().copied() {
                self.owner = next;
                self.notify(
                    Recipient::All,
                    proto::seat_notice(srv2cli::OWNER_CHANGED, self.id, next)?,
                );
                debug!(game_id = self.id, owner = next, "ownership passed on");
            }
        }
        Ok(())
    }

    /// Call into the game and deliver what it queued, even on error.
    fn drive<T>(
        &mut self,
        now: Instant,
        f: impl FnOnce(&mut Game, &mut GameContext<'_>) -> Result<T, GameError>,
    ) -> Result<T, SessionError> {
        let (result, outbox) = self.call(now, f);
        self.publish(outbox);
        result.map_err(SessionError::Rejected)
    }

    /// Call into the game with a fresh context over the connected seats.
    fn call<T>(
        &mut self,
        now: Instant,
        f: impl FnOnce(&mut Game, &mut GameContext<'_>) -> T,
    ) -> (T, Vec<Outgoing>) {
        let seated = self.connected_players();
        let mut ctx = GameContext::new(now, self.owner, &seated, &mut self.rng);
        let result = f(&mut self.game, &mut ctx);
        (result, ctx.into_outbox())
    }

    /// Wrap and send game output, then announce a phase change if any.
    fn publish(&mut self, outbox: Vec<Outgoing>) {
        for out in outbox {
            self.deliver_game(out);
        }
        let phase = self.game.phase();
        if phase != self.announced {
            self.announced = phase;
            match proto::phase_changed(self.id, phase as u8) {
                Ok(notice) => self.notify(Recipient::All, notice),
                Err(e) => warn!(game_id = self.id, "phase notice: {}", e),
            }
        }
    }

    fn deliver_game(&self, out: Outgoing) {
        let wrapped = out
            .message
            .check_version(self.version)
            .and_then(|()| proto::wrap(self.id, &out.message));
        match wrapped {
            Ok(wrapped) => self.notify(out.to, wrapped),
            Err(e) => warn!(game_id = self.id, "dropping {}: {}", out.message.name(), e),
        }
    }

    fn deliver_to(&self, player: PlayerId, message: Message) {
        self.notify(Recipient::Player(player), message);
    }

    fn notify(&self, to: Recipient, message: Message) {
        for seat in self.seats.iter().filter(|s| s.connected && to.includes(s.player)) {
            if let Err(e) = seat.sender.try_send(Outbound::Message(message.clone())) {
                warn!(game_id = self.id, player = seat.player, "send queue: {}", e);
            }
        }
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

#[derive(Default)]
struct Registry {
    sessions: BTreeMap<GameId, Arc<Mutex<GameSession>>>,
    common: BTreeMap<(GameType, u32), GameId>,
}

/// Owns every game session. Created at server start, dropped at shutdown.
pub struct SessionManager {
    registry: RwLock<Registry>,
    ids: parking_lot::Mutex<IdPool>,
    tables: Arc<ProtocolTables>,
    log: Arc<LogRegistry>,
}

impl SessionManager {
    /// Manager allowing up to `max_sessions` live sessions.
    pub fn new(tables: Arc<ProtocolTables>, log: Arc<LogRegistry>, max_sessions: u32) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            ids: parking_lot::Mutex::new(IdPool::bounded(1, max_sessions)),
            tables,
            log,
        }
    }

    /// Look a session up.
    pub async fn get(&self, game_id: GameId) -> Option<Arc<Mutex<GameSession>>> {
        self.registry.read().await.sessions.get(&game_id).cloned()
    }

    /// Create a game and seat its creator.
    pub async fn create(
        &self,
        player: PlayerId,
        sender: mpsc::Sender<Outbound>,
        trans_id: u32,
        game_type: GameType,
        params: &GameParams,
    ) -> Result<GameId, SessionError> {
        let session = self.open(
            player,
            sender,
            srv2cli::GAME_CREATE_REPLY,
            trans_id,
            game_type,
            params,
            None,
        )?;
        let id = session.id();
        self.registry
            .write()
            .await
            .sessions
            .insert(id, Arc::new(Mutex::new(session)));
        Ok(id)
    }

    /// Seat `player` in an existing game.
    pub async fn join(
        &self,
        game_id: GameId,
        player: PlayerId,
        sender: mpsc::Sender<Outbound>,
        trans_id: u32,
    ) -> Result<GameType, SessionError> {
        let session = self.get(game_id).await.ok_or(SessionError::NotFound(game_id))?;
        let mut session = session.lock().await;
        let ack = proto::session_reply(
            srv2cli::GAME_JOIN_REPLY,
            trans_id,
            NetResult::Success,
            game_id,
            Some(session.game_type()),
        )?;
        session.join(player, sender, ack, Instant::now())?;
        Ok(session.game_type())
    }

    /// Join the common table `table_id` of `game_type`, creating it if needed.
    pub async fn join_common(
        &self,
        game_type: GameType,
        table_id: u32,
        player: PlayerId,
        sender: mpsc::Sender<Outbound>,
        trans_id: u32,
    ) -> Result<GameId, SessionError> {
        let key = (game_type, table_id);
        let existing = {
            let mut registry = self.registry.write().await;
            let existing = registry
                .common
                .get(&key)
                .and_then(|id| registry.sessions.get(id))
                .cloned();
            match existing {
                Some(session) => session,
                None => {
                    let params = GameParams::default();
                    let session = self.open(
                        player,
                        sender,
                        srv2cli::GAME_JOIN_COMMON_REPLY,
                        trans_id,
                        game_type,
                        &params,
                        Some(table_id),
                    )?;
                    let id = session.id();
                    registry.sessions.insert(id, Arc::new(Mutex::new(session)));
                    registry.common.insert(key, id);
                    return Ok(id);
                }
            }
        };

        let mut session = existing.lock().await;
        let id = session.id();
        let ack = proto::session_reply(
            srv2cli::GAME_JOIN_COMMON_REPLY,
            trans_id,
            NetResult::Success,
            id,
            Some(game_type),
        )?;
        session.join(player, sender, ack, Instant::now())?;
        Ok(id)
    }

    /// Give up `player`'s seat in `game_id`.
    pub async fn leave(&self, game_id: GameId, player: PlayerId) -> Result<(), SessionError> {
        let session = self.get(game_id).await.ok_or(SessionError::NotFound(game_id))?;
        let mut session = session.lock().await;
        session.leave(player, Instant::now())
    }

    /// Route a `GameMsg` carrier from `player` into its session.
    pub async fn input(&self, carrier: &Message, player: PlayerId) -> Result<(), SessionError> {
        let game_id = carrier.u32("game_id")?;
        let session = self.get(game_id).await.ok_or(SessionError::NotFound(game_id))?;
        let mut session = session.lock().await;
        let inner = proto::unwrap(&self.tables, session.game_type(), carrier)?;
        session.input(player, &inner, Instant::now())
    }

    /// Mark every seat `player` holds as disconnected.
    pub async fn player_disconnected(&self, player: PlayerId) {
        let now = Instant::now();
        for session in self.snapshot().await {
            let mut session = session.lock().await;
            match session.disconnect(player, now) {
                Ok(true) => self.log.dispatch(&NetEvent::SeatDisconnected {
                    game_id: session.id(),
                    player,
                }),
                Ok(false) => {}
                Err(e) => warn!(game_id = session.id(), player, "disconnect: {}", e),
            }
        }
    }

    /// Run every session's timers.
    pub async fn tick_all(&self, now: Instant) {
        for session in self.snapshot().await {
            let mut session = session.lock().await;
            if let Err(e) = session.tick(now) {
                debug!(game_id = session.id(), "tick: {}", e);
            }
        }
    }

    /// Disconnect seats idle for longer than `idle`. Returns how many.
    pub async fn check_idle(&self, now: Instant, idle: Duration) -> usize {
        let mut count = 0;
        for session in self.snapshot().await {
            let mut session = session.lock().await;
            for player in session.disconnect_idle(now, idle) {
                info!(game_id = session.id(), player, "seat idle, disconnecting");
                self.log.dispatch(&NetEvent::SeatDisconnected {
                    game_id: session.id(),
                    player,
                });
                count += 1;
            }
        }
        count
    }

    /// Remove terminal and empty sessions and release their ids.
    ///
    /// Sessions busy with a transition are left for the next pass.
    pub async fn reap(&self) -> usize {
        let mut registry = self.registry.write().await;
        let mut reaped = Vec::new();
        for (id, session) in registry.sessions.iter() {
            let Ok(mut session) = session.try_lock() else {
                continue;
            };
            if session.is_finished() {
                session.abort();
                reaped.push((*id, session.phase()));
            }
        }

        let mut ids = self.ids.lock();
        for (id, phase) in &reaped {
            registry.sessions.remove(id);
            ids.release(*id);
            self.log.dispatch(&NetEvent::SessionDestroyed {
                game_id: *id,
                phase: *phase,
            });
        }
        registry.common.retain(|_, id| !reaped.iter().any(|(r, _)| r == id));
        reaped.len()
    }

    /// Operator view of every session.
    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let mut out = Vec::new();
        for session in self.snapshot().await {
            out.push(session.lock().await.summary());
        }
        out
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    async fn snapshot(&self) -> Vec<Arc<Mutex<GameSession>>> {
        self.registry.read().await.sessions.values().cloned().collect()
    }

    /// Allocate an id, build the session and seat its creator.
    #[allow(clippy::too_many_arguments)]
    fn open(
        &self,
        player: PlayerId,
        sender: mpsc::Sender<Outbound>,
        reply_opcode: u16,
        trans_id: u32,
        game_type: GameType,
        params: &GameParams,
        table_id: Option<u32>,
    ) -> Result<GameSession, SessionError> {
        let id = self.ids.lock().allocate().ok_or(SessionError::Exhausted)?;
        let built = GameSession::new(
            id,
            game_type,
            params,
            player,
            table_id,
            GameRng::from_entropy(),
            Instant::now(),
        )
        .map(|session| session.with_version(self.tables.version()))
        .and_then(|mut session| {
            let ack = proto::session_reply(
                reply_opcode,
                trans_id,
                NetResult::Success,
                id,
                Some(game_type),
            )?;
            session.join(player, sender, ack, Instant::now())?;
            Ok(session)
        });

        match built {
            Ok(session) => {
                info!(game_id = id, ?game_type, owner = player, "game created");
                self.log.dispatch(&NetEvent::SessionCreated { game_id: id, game_type });
                Ok(session)
            }
            Err(e) => {
                self.ids.lock().release(id);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

// =============================================================================
// GAME SERVICE
// =============================================================================

/// Handle one Game service request from `player`.
///
/// Successful create and join replies are queued on `sender` by the session
/// itself so they precede the notices the join causes; failures come back
/// as the returned replies.
pub async fn handle(
    msg: &Message,
    player: Option<PlayerId>,
    sender: &mpsc::Sender<Outbound>,
    sessions: &SessionManager,
) -> Result<Vec<Message>, ProtocolError> {
    if msg.opcode() == cli2srv::PING_REQUEST {
        return Ok(vec![proto::ping_reply(msg.u32("ping_time_ms")?)?]);
    }

    match msg.opcode() {
        cli2srv::GAME_CREATE_REQUEST | cli2srv::GAME_JOIN_COMMON_REQUEST => {
            let trans_id = msg.u32("trans_id")?;
            let reply_opcode = if msg.opcode() == cli2srv::GAME_CREATE_REQUEST {
                srv2cli::GAME_CREATE_REPLY
            } else {
                srv2cli::GAME_JOIN_COMMON_REPLY
            };
            let Ok(game_type) = GameType::from_u8(msg.u8("game_type")?) else {
                return Ok(vec![proto::session_reply(
                    reply_opcode,
                    trans_id,
                    NetResult::InvalidGameType,
                    0,
                    None,
                )?]);
            };
            let Some(player) = player else {
                return Ok(vec![proto::session_reply(
                    reply_opcode,
                    trans_id,
                    NetResult::PlayerNotFound,
                    0,
                    Some(game_type),
                )?]);
            };
            let result = if msg.opcode() == cli2srv::GAME_CREATE_REQUEST {
                let params = GameParams {
                    param0: msg.u32("param0")?,
                    param1: msg.u32("param1")?,
                    name: msg.str("name")?.to_string(),
                };
                sessions
                    .create(player, sender.clone(), trans_id, game_type, &params)
                    .await
            } else {
                let table_id = msg.u32("table_id")?;
                sessions
                    .join_common(game_type, table_id, player, sender.clone(), trans_id)
                    .await
            };
            match result {
                Ok(_) => Ok(Vec::new()),
                Err(e) => {
                    debug!(player, "game request refused: {}", e);
                    Ok(vec![proto::session_reply(
                        reply_opcode,
                        trans_id,
                        e.net_result(),
                        0,
                        Some(game_type),
                    )?])
                }
            }
        }
        cli2srv::GAME_JOIN_REQUEST => {
            let trans_id = msg.u32("trans_id")?;
            let game_id = msg.u32("game_id")?;
            let result = match player {
                Some(player) => sessions.join(game_id, player, sender.clone(), trans_id).await,
                None => Err(SessionError::NotSeated { game_id, player: 0 }),
            };
            match result {
                Ok(_) => Ok(Vec::new()),
                Err(e) => {
                    debug!(game_id, "join refused: {}", e);
                    Ok(vec![proto::session_reply(
                        srv2cli::GAME_JOIN_REPLY,
                        trans_id,
                        e.net_result(),
                        game_id,
                        None,
                    )?])
                }
            }
        }
        cli2srv::GAME_LEAVE_REQUEST => {
            let trans_id = msg.u32("trans_id")?;
            let game_id = msg.u32("game_id")?;
            let result = match player {
                Some(player) => sessions.leave(game_id, player).await,
                None => Err(SessionError::NotSeated { game_id, player: 0 }),
            };
            let code = match result {
                Ok(()) => NetResult::Success,
                Err(e) => e.net_result(),
            };
            Ok(vec![proto::leave_reply(trans_id, code)?])
        }
        cli2srv::GAME_MSG => {
            let Some(player) = player else {
                return Ok(Vec::new());
            };
            match sessions.input(msg, player).await {
                Ok(()) => {}
                Err(SessionError::Rejected(e)) => debug!(player, "game input rejected: {}", e),
                Err(e) => debug!(player, "game input dropped: {}", e),
            }
            Ok(Vec::new())
        }
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::minigames::climbing_wall::{self as wall, ReadyDetail, ReadyType};
    use crate::protocol::minigames::{heek, ttt, var_sync};

    fn manager() -> SessionManager {
        let tables = Arc::new(ProtocolTables::new(PROTOCOL_VERSION).unwrap());
        SessionManager::new(tables, Arc::new(LogRegistry::new()), 16)
    }

    fn channel() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(64)
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Message(m) = item {
                out.push(m);
            }
        }
        out
    }

    fn names(messages: &[Message]) -> Vec<&'static str> {
        messages.iter().map(|m| m.name()).collect()
    }

    /// Names of the mini-game messages inside the `GameMsg` carriers.
    fn inner_names(tables: &ProtocolTables, game: GameType, messages: &[Message]) -> Vec<&'static str> {
        messages
            .iter()
            .filter(|m| m.opcode() == srv2cli::GAME_MSG)
            .map(|m| proto::unwrap(tables, game, m).unwrap().name())
            .collect()
    }

    fn carrier(game_id: GameId, inner: &Message) -> Message {
        proto::wrap(game_id, inner).unwrap()
    }

    #[tokio::test]
    async fn test_create_seats_owner_and_replies_first() {
        let sessions = manager();
        let (tx, mut rx) = channel();
        let id = sessions
            .create(7, tx, 11, GameType::VarSync, &GameParams::default())
            .await
            .unwrap();

        let out = drain(&mut rx);
        assert_eq!(out[0].name(), "GameCreateReply");
        assert_eq!(out[0].u32("trans_id").unwrap(), 11);
        assert_eq!(out[0].u32("game_id").unwrap(), id);
        assert!(names(&out).contains(&"PhaseChanged"));

        let session = sessions.get(id).await.unwrap();
        let session = session.lock().await;
        assert_eq!(session.owner(), 7);
        assert_eq!(session.connected_players(), vec![7]);
        assert_eq!(session.phase(), GamePhase::InProgress);
    }

    #[tokio::test]
    async fn test_join_notifies_both_sides_and_starts_ttt() {
        let sessions = manager();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let id = sessions
            .create(1, tx1, 1, GameType::Ttt, &GameParams::default())
            .await
            .unwrap();
        drain(&mut rx1);

        assert_eq!(sessions.join(id, 2, tx2, 5).await.unwrap(), GameType::Ttt);

        let joiner = drain(&mut rx2);
        assert_eq!(
            names(&joiner)[..2],
            ["GameJoinReply", "PlayerJoined"]
        );
        assert_eq!(joiner[1].u32("player_id").unwrap(), 1);
        assert_eq!(inner_names(&sessions.tables, GameType::Ttt, &joiner), vec!["GameStarted"]);

        let owner = drain(&mut rx1);
        assert_eq!(owner[0].name(), "PlayerJoined");
        assert_eq!(owner[0].u32("player_id").unwrap(), 2);
        assert!(names(&owner).contains(&"PhaseChanged"));
    }

    #[tokio::test]
    async fn test_full_game_refuses_third_player() {
        let sessions = manager();
        let (tx, _rx) = channel();
        let id = sessions
            .create(1, tx.clone(), 1, GameType::Ttt, &GameParams::default())
            .await
            .unwrap();
        sessions.join(id, 2, tx.clone(), 2).await.unwrap();
        assert_eq!(sessions.join(id, 3, tx, 3).await, Err(SessionError::Full(id)));
        assert_eq!(sessions.join(99, 3, channel().0, 4).await, Err(SessionError::NotFound(99)));
    }

    #[tokio::test]
    async fn test_input_reaches_game_and_is_broadcast() {
        let sessions = manager();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let id = sessions
            .create(1, tx1, 1, GameType::Ttt, &GameParams::default())
            .await
            .unwrap();
        sessions.join(id, 2, tx2, 2).await.unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        sessions
            .input(&carrier(id, &ttt::make_move(0, 0).unwrap()), 1)
            .await
            .unwrap();
        assert_eq!(inner_names(&sessions.tables, GameType::Ttt, &drain(&mut rx2)), vec!["MoveMade"]);

        // Out of turn: refused by the game, nothing broadcast.
        let refused = sessions
            .input(&carrier(id, &ttt::make_move(1, 1).unwrap()), 1)
            .await;
        assert!(matches!(refused, Err(SessionError::Rejected(GameError::NotYourTurn(1)))));
        drain(&mut rx1);
        assert!(drain(&mut rx2).is_empty());

        // Strangers cannot play.
        let stranger = sessions
            .input(&carrier(id, &ttt::make_move(2, 2).unwrap()), 9)
            .await;
        assert_eq!(stranger, Err(SessionError::NotSeated { game_id: id, player: 9 }));
    }

    #[tokio::test]
    async fn test_concurrent_slot_claims_have_one_winner() {
        let sessions = Arc::new(manager());
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let id = sessions
            .create(1, tx1, 1, GameType::ClimbingWall, &GameParams::default())
            .await
            .unwrap();
        sessions.join(id, 2, tx2, 2).await.unwrap();

        let setup = [
            wall::change_num_blockers(4).unwrap(),
            wall::ready(ReadyType::NumBlockers, 0, ReadyDetail::Count).unwrap(),
            wall::ready(ReadyType::NumBlockers, 1, ReadyDetail::Count).unwrap(),
        ];
        for msg in &setup {
            sessions.input(&carrier(id, msg), 1).await.unwrap();
        }
        drain(&mut rx1);
        drain(&mut rx2);

        let claim = carrier(id, &wall::change_blocker(0, 3, true).unwrap());
        let (a, b) = tokio::join!(
            {
                let sessions = sessions.clone();
                let claim = claim.clone();
                tokio::spawn(async move { sessions.input(&claim, 1).await })
            },
            {
                let sessions = sessions.clone();
                let claim = claim.clone();
                tokio::spawn(async move { sessions.input(&claim, 2).await })
            }
        );
        let results = [a.unwrap(), b.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);

        let (winner, loser_rx) = if results[0].is_ok() { (1, &mut rx2) } else { (2, &mut rx1) };
        let loser = if winner == 1 { 2 } else { 1 };
        assert!(results.iter().any(|r| matches!(
            r,
            Err(SessionError::Rejected(GameError::SlotTaken { slot: 3, occupant })) if *occupant == winner
        )));

        let seen = drain(loser_rx);
        let inner: Vec<Message> = seen
            .iter()
            .filter(|m| m.opcode() == srv2cli::GAME_MSG)
            .map(|m| proto::unwrap(&sessions.tables, GameType::ClimbingWall, m).unwrap())
            .collect();
        let changed = inner.iter().find(|m| m.name() == "BlockersChanged").unwrap();
        assert_eq!(changed.u32("changed_by").unwrap(), winner);
        let rejected = inner.iter().find(|m| m.name() == "BlockerRejected").unwrap();
        assert_eq!(rejected.u32("requester").unwrap(), loser);
    }

    #[tokio::test]
    async fn test_idle_seat_is_disconnected_without_ending_session() {
        let sessions = manager();
        let (tx1, _rx1) = channel();
        let (tx2, mut rx2) = channel();
        let id = sessions
            .create(1, tx1, 1, GameType::VarSync, &GameParams::default())
            .await
            .unwrap();
        sessions.join(id, 2, tx2, 2).await.unwrap();
        drain(&mut rx2);

        let start = Instant::now();
        {
            let session = sessions.get(id).await.unwrap();
            let mut session = session.lock().await;
            let ask = var_sync::request_all_vars().unwrap();
            session.input(2, &ask, start + Duration::from_secs(30)).unwrap();
        }

        let idle = Duration::from_secs(60);
        assert_eq!(sessions.check_idle(start + Duration::from_secs(61), idle).await, 1);
        assert_eq!(sessions.reap().await, 0);

        let session = sessions.get(id).await.unwrap();
        let session = session.lock().await;
        assert_eq!(session.connected_players(), vec![2]);
        assert_eq!(session.owner(), 2);
        drop(session);

        let notices = drain(&mut rx2);
        let left = notices.iter().find(|m| m.name() == "PlayerLeft").unwrap();
        assert_eq!(left.u32("player_id").unwrap(), 1);
        let owner = notices.iter().find(|m| m.name() == "OwnerChanged").unwrap();
        assert_eq!(owner.u32("owner_id").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_refused_rejoin_keeps_disconnected_seat() {
        let sessions = manager();
        let (tx1, _rx1) = channel();
        let id = sessions
            .create(1, tx1, 1, GameType::Ttt, &GameParams::default())
            .await
            .unwrap();
        {
            let session = sessions.get(id).await.unwrap();
            let mut session = session.lock().await;
            assert!(session.disconnect(1, Instant::now()).unwrap());
        }

        // Two others take both ttt slots while the owner is away.
        let (tx2, mut rx2) = channel();
        let (tx3, mut rx3) = channel();
        sessions.join(id, 2, tx2, 2).await.unwrap();
        sessions.join(id, 3, tx3, 3).await.unwrap();
        drain(&mut rx2);
        drain(&mut rx3);

        let (tx1, mut rx1) = channel();
        let result = sessions.join(id, 1, tx1, 4).await;
        assert!(matches!(result, Err(SessionError::Full(g)) if g == id));
        assert!(drain(&mut rx1).is_empty());
        // Nothing of the refused join reaches the seated players.
        assert!(drain(&mut rx2).is_empty());
        assert!(drain(&mut rx3).is_empty());

        let session = sessions.get(id).await.unwrap();
        let session = session.lock().await;
        let seat = session.seats.iter().find(|s| s.player == 1).unwrap();
        assert!(!seat.connected);
        assert_eq!(session.seats.len(), 3);
        assert_eq!(session.connected_players(), vec![2, 3]);
    }

    #[test]
    fn test_game_output_newer_than_session_version_is_dropped() {
        let now = Instant::now();
        let mut session = GameSession::new(
            3,
            GameType::Heek,
            &GameParams::default(),
            1,
            None,
            GameRng::new(5),
            now,
        )
        .unwrap()
        .with_version(crate::protocol::MIN_PROTOCOL_VERSION);
        let (tx, mut rx) = channel();
        let ack = proto::session_reply(srv2cli::GAME_JOIN_REPLY, 1, NetResult::Success, 3, Some(GameType::Heek))
            .unwrap();
        session.join(1, tx, ack, now).unwrap();
        drain(&mut rx);

        session.deliver_game(Outgoing {
            to: Recipient::All,
            message: heek::point_update(true, 10, 1).unwrap(),
        });
        assert!(drain(&mut rx).is_empty());

        session.deliver_game(Outgoing {
            to: Recipient::All,
            message: heek::goodbye().unwrap(),
        });
        let tables = ProtocolTables::new(crate::protocol::MIN_PROTOCOL_VERSION).unwrap();
        assert_eq!(inner_names(&tables, GameType::Heek, &drain(&mut rx)), vec!["Goodbye"]);
    }

    #[tokio::test]
    async fn test_reap_releases_ids_and_common_tables() {
        let sessions = manager();
        let (tx, _rx) = channel();
        let first = sessions
            .join_common(GameType::Heek, 4, 1, tx.clone(), 1)
            .await
            .unwrap();
        let again = sessions
            .join_common(GameType::Heek, 4, 2, tx.clone(), 2)
            .await
            .unwrap();
        assert_eq!(first, again);
        let other = sessions
            .join_common(GameType::Heek, 5, 3, tx.clone(), 3)
            .await
            .unwrap();
        assert_ne!(first, other);

        for player in [1, 2, 3] {
            sessions.player_disconnected(player).await;
        }
        assert_eq!(sessions.reap().await, 2);
        assert_eq!(sessions.session_count().await, 0);

        // Freed ids come back and the common table is rebuilt on demand.
        let rebuilt = sessions.join_common(GameType::Heek, 4, 1, tx, 4).await.unwrap();
        assert!(rebuilt == first || rebuilt == other);
        assert_eq!(sessions.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_leave_moves_ownership() {
        let sessions = manager();
        let (tx1, _rx1) = channel();
        let (tx2, mut rx2) = channel();
        let id = sessions
            .create(1, tx1, 1, GameType::VarSync, &GameParams::default())
            .await
            .unwrap();
        sessions.join(id, 2, tx2, 2).await.unwrap();
        drain(&mut rx2);

        sessions.leave(id, 1).await.unwrap();
        assert_eq!(
            sessions.leave(id, 1).await,
            Err(SessionError::NotSeated { game_id: id, player: 1 })
        );
        let out = drain(&mut rx2);
        assert_eq!(names(&out), vec!["PlayerLeft", "OwnerChanged"]);

        let summaries = sessions.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].owner, 2);
        assert_eq!(summaries[0].seats.len(), 1);
    }

    #[tokio::test]
    async fn test_game_service_replies() {
        let sessions = manager();
        let (tx, mut rx) = channel();

        let bad = Message::new(&proto::CLI2SRV, cli2srv::GAME_CREATE_REQUEST, vec![
            1u32.into(),
            0u8.into(),
            0u32.into(),
            0u32.into(),
            "".into(),
        ])
        .unwrap();
        let replies = handle(&bad, Some(1), &tx, &sessions).await.unwrap();
        assert_eq!(
            replies[0].u32("result").unwrap(),
            NetResult::InvalidGameType.code()
        );

        let create = proto::create_request(2, GameType::Ttt, 0, 0, "table").unwrap();
        assert!(handle(&create, None, &tx, &sessions).await.unwrap()[0]
            .u32("result")
            .unwrap()
            == NetResult::PlayerNotFound.code());
        assert!(handle(&create, Some(1), &tx, &sessions).await.unwrap().is_empty());
        assert_eq!(drain(&mut rx)[0].name(), "GameCreateReply");

        let join = proto::session_request(cli2srv::GAME_JOIN_REQUEST, 3, 77).unwrap();
        let replies = handle(&join, Some(2), &tx, &sessions).await.unwrap();
        assert_eq!(replies[0].u32("result").unwrap(), NetResult::GameNotFound.code());

        let ping = Message::new(&proto::CLI2SRV, cli2srv::PING_REQUEST, vec![42u32.into()]).unwrap();
        let replies = handle(&ping, None, &tx, &sessions).await.unwrap();
        assert_eq!(replies[0].u32("ping_time_ms").unwrap(), 42);
    }
}
