//! CSR Console
//!
//! Admin-only console commands run over the Csr service. Output is plain
//! text, or JSON for the listing commands.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::auth::Login;
use super::connection::Outbound;
use super::log::ConnId;
use super::server::ClientTable;
use super::session::SessionManager;
use crate::protocol::services::auth as auth_proto;
use crate::protocol::services::csr::{self, cli2srv};
use crate::protocol::{Message, NetResult, ProtocolError};

const HELP: &str = "\
help                 this text
connections          live connections (JSON)
sessions             game sessions (JSON)
kick <player|account> drop every connection of a player or account";

/// A connection as listed by `connections`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    /// Connection id.
    pub conn: ConnId,
    /// Peer address.
    pub addr: String,
    /// Logged-in account.
    pub account: Option<String>,
    /// Active player.
    pub player: Option<u32>,
    /// Connection time.
    pub connected_at: DateTime<Utc>,
    /// Seconds since the last frame.
    pub idle_secs: u64,
}

/// Handle one Csr request.
pub async fn handle(
    message: &Message,
    login: Option<&Login>,
    clients: &ClientTable,
    sessions: &SessionManager,
) -> Result<Vec<Message>, ProtocolError> {
    let trans_id = message.u32("trans_id")?;
    match message.opcode() {
        cli2srv::PING_REQUEST => Ok(vec![csr::ping_reply(trans_id, message.u32("ping_time_ms")?)?]),
        cli2srv::EXECUTE_COMMAND => {
            let command = message.str("command")?;
            let Some(login) = login.filter(|l| l.admin) else {
                warn!(command, "console command refused");
                return Ok(vec![csr::command_reply(trans_id, NetResult::NotPermitted, "")?]);
            };
            info!(account = %login.account_name, command, "console command");
            let (result, output) = execute(command, clients, sessions).await;
            Ok(vec![csr::command_reply(trans_id, result, &output)?])
        }
        _ => Ok(Vec::new()),
    }
}

async fn execute(command: &str, clients: &ClientTable, sessions: &SessionManager) -> (NetResult, String) {
    let mut words = command.split_whitespace();
    match (words.next(), words.next()) {
        (Some("help"), None) | (None, _) => (NetResult::Success, HELP.to_string()),
        (Some("connections"), None) => json(&connections(clients).await),
        (Some("sessions"), None) => json(&sessions.summaries().await),
        (Some("kick"), Some(target)) => match kick(clients, target).await {
            0 => (NetResult::PlayerNotFound, format!("nobody matches '{}'", target)),
            n => (NetResult::Success, format!("kicked {} connection(s)", n)),
        },
        _ => (NetResult::NotSupported, format!("unknown command '{}'; try help", command)),
    }
}

fn json<T: Serialize>(value: &T) -> (NetResult, String) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => (NetResult::Success, text),
        Err(e) => (NetResult::InternalError, e.to_string()),
    }
}

async fn connections(clients: &ClientTable) -> Vec<ConnectionSummary> {
    let now = Instant::now();
    clients
        .read()
        .await
        .iter()
        .map(|(conn, client)| ConnectionSummary {
            conn: *conn,
            addr: client.addr.to_string(),
            account: client.login.as_ref().map(|l| l.account_name.clone()),
            player: client.login.as_ref().and_then(|l| l.player),
            connected_at: client.connected_at,
            idle_secs: now.saturating_duration_since(client.last_activity).as_secs(),
        })
        .collect()
}

/// Kick by player id or account name. Returns how many connections matched.
async fn kick(clients: &ClientTable, target: &str) -> usize {
    let player: Option<u32> = target.parse().ok();
    let clients = clients.read().await;
    let mut kicked = 0;
    for (conn, client) in clients.iter() {
        let Some(login) = client.login.as_ref() else {
            continue;
        };
        let matches = match player {
            Some(id) => login.player == Some(id),
            None => login.account_name.eq_ignore_ascii_case(target),
        };
        if !matches {
            continue;
        }
        if let Ok(notice) = auth_proto::kicked_off(NetResult::NotPermitted) {
            let _ = client.sender.try_send(Outbound::Message(notice));
        }
        client.kick.notify_one();
        info!(conn, account = %login.account_name, "kicked from console");
        kicked += 1;
    }
    kicked
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use tokio::sync::{mpsc, Notify, RwLock};
    use uuid::Uuid;

    use super::*;
    use crate::network::log::LogRegistry;
    use crate::network::server::ClientInfo;
    use crate::protocol::{ProtocolTables, PROTOCOL_VERSION};

    fn login(name: &str, admin: bool, player: Option<u32>) -> Login {
        Login {
            account_id: Uuid::nil(),
            account_name: name.to_string(),
            admin,
            player,
        }
    }

    fn fixture() -> (ClientTable, SessionManager, mpsc::Receiver<Outbound>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(8);
        let kick = Arc::new(Notify::new());
        let mut table = BTreeMap::new();
        table.insert(
            3,
            ClientInfo {
                addr: "127.0.0.1:5000".parse().unwrap(),
                login: Some(login("atrus", false, Some(42))),
                connected_at: Utc::now(),
                last_activity: Instant::now(),
                sender: tx,
                kick: kick.clone(),
            },
        );
        let tables = Arc::new(ProtocolTables::new(PROTOCOL_VERSION).unwrap());
        let sessions = SessionManager::new(tables, Arc::new(LogRegistry::new()), 4);
        (RwLock::new(table), sessions, rx, kick)
    }

    async fn run(command: &str, who: &Login, clients: &ClientTable, sessions: &SessionManager) -> Message {
        let request = csr::execute_command(1, command).unwrap();
        handle(&request, Some(who), clients, sessions)
            .await
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn test_non_admin_is_refused() {
        let (clients, sessions, _rx, _kick) = fixture();
        let reply = run("connections", &login("gehn", false, None), &clients, &sessions).await;
        assert_eq!(reply.u32("result").unwrap(), NetResult::NotPermitted.code());
    }

    #[tokio::test]
    async fn test_connections_lists_json() {
        let (clients, sessions, _rx, _kick) = fixture();
        let admin = login("root", true, None);
        let reply = run("connections", &admin, &clients, &sessions).await;
        assert_eq!(reply.u32("result").unwrap(), NetResult::Success.code());

        let listed: serde_json::Value = serde_json::from_str(reply.str("output").unwrap()).unwrap();
        assert_eq!(listed[0]["conn"], 3);
        assert_eq!(listed[0]["account"], "atrus");
        assert_eq!(listed[0]["player"], 42);

        let reply = run("sessions", &admin, &clients, &sessions).await;
        assert_eq!(reply.str("output").unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_kick_by_player_and_account() {
        let (clients, sessions, mut rx, kick) = fixture();
        let admin = login("root", true, None);

        let reply = run("kick 42", &admin, &clients, &sessions).await;
        assert_eq!(reply.u32("result").unwrap(), NetResult::Success.code());
        match rx.try_recv().unwrap() {
            Outbound::Message(m) => assert_eq!(m.name(), "KickedOff"),
            other => panic!("unexpected {:?}", other),
        }
        // The stored permit wakes the connection task immediately.
        tokio::time::timeout(std::time::Duration::from_millis(100), kick.notified())
            .await
            .unwrap();

        let reply = run("kick ATRUS", &admin, &clients, &sessions).await;
        assert_eq!(reply.u32("result").unwrap(), NetResult::Success.code());

        let reply = run("kick nobody", &admin, &clients, &sessions).await;
        assert_eq!(reply.u32("result").unwrap(), NetResult::PlayerNotFound.code());
    }

    #[tokio::test]
    async fn test_unknown_command_and_ping() {
        let (clients, sessions, _rx, _kick) = fixture();
        let admin = login("root", true, None);
        let reply = run("reboot now", &admin, &clients, &sessions).await;
        assert_eq!(reply.u32("result").unwrap(), NetResult::NotSupported.code());
        let reply = run("help", &admin, &clients, &sessions).await;
        assert!(reply.str("output").unwrap().contains("kick"));

        let ping = Message::new(&csr::CLI2SRV, cli2srv::PING_REQUEST, vec![4u32.into(), 99u32.into()]).unwrap();
        let replies = handle(&ping, None, &clients, &sessions).await.unwrap();
        assert_eq!(replies[0].u32("ping_time_ms").unwrap(), 99);
    }
}
