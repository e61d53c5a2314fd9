//! Server discovery: hands out auth and file server addresses round-robin.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::protocol::services::gatekeeper::{self, cli2srv, srv2cli};
use crate::protocol::{Message, ProtocolError};

/// Configured server addresses.
#[derive(Debug)]
pub struct AddressBook {
    auth: Vec<String>,
    file: Vec<String>,
    next_auth: AtomicUsize,
    next_file: AtomicUsize,
    fallback: String,
}

impl AddressBook {
    /// Book over the given lists. Empty lists answer with `fallback`,
    /// normally this server's own address.
    pub fn new(auth: Vec<String>, file: Vec<String>, fallback: impl Into<String>) -> Self {
        Self {
            auth,
            file,
            next_auth: AtomicUsize::new(0),
            next_file: AtomicUsize::new(0),
            fallback: fallback.into(),
        }
    }

    fn pick(&self, list: &[String], cursor: &AtomicUsize) -> String {
        if list.is_empty() {
            return self.fallback.clone();
        }
        let i = cursor.fetch_add(1, Ordering::Relaxed) % list.len();
        list[i].clone()
    }

    /// Next auth server.
    pub fn auth_server(&self) -> String {
        self.pick(&self.auth, &self.next_auth)
    }

    /// Next file server.
    pub fn file_server(&self) -> String {
        self.pick(&self.file, &self.next_file)
    }
}

/// Handle one GateKeeper request.
pub fn handle(message: &Message, book: &AddressBook) -> Result<Vec<Message>, ProtocolError> {
    let trans_id = message.u32("trans_id")?;
    let reply = match message.opcode() {
        cli2srv::PING_REQUEST => gatekeeper::ping_reply(
            trans_id,
            message.u32("ping_time_ms")?,
            message.bytes("payload")?.to_vec(),
        )?,
        cli2srv::FILE_SRV_IP_ADDRESS_REQUEST => gatekeeper::address_reply(
            srv2cli::FILE_SRV_IP_ADDRESS_REPLY,
            trans_id,
            &book.file_server(),
        )?,
        cli2srv::AUTH_SRV_IP_ADDRESS_REQUEST => gatekeeper::address_reply(
            srv2cli::AUTH_SRV_IP_ADDRESS_REPLY,
            trans_id,
            &book.auth_server(),
        )?,
        other => {
            return Err(ProtocolError::UnknownOpcode {
                table: message.table().name,
                opcode: other,
            })
        }
    };
    Ok(vec![reply])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_and_fallback() {
        let book = AddressBook::new(
            vec!["a:1".into(), "b:1".into()],
            Vec::new(),
            "self:14617",
        );
        assert_eq!(book.auth_server(), "a:1");
        assert_eq!(book.auth_server(), "b:1");
        assert_eq!(book.auth_server(), "a:1");
        assert_eq!(book.file_server(), "self:14617");
    }

    #[test]
    fn test_address_requests() {
        let book = AddressBook::new(vec!["auth.example:14617".into()], vec!["files.example:80".into()], "x");
        let request = gatekeeper::address_request(cli2srv::AUTH_SRV_IP_ADDRESS_REQUEST, 3).unwrap();
        let out = handle(&request, &book).unwrap();
        assert_eq!(out[0].opcode(), srv2cli::AUTH_SRV_IP_ADDRESS_REPLY);
        assert_eq!(out[0].str("address").unwrap(), "auth.example:14617");

        let request = gatekeeper::address_request(cli2srv::FILE_SRV_IP_ADDRESS_REQUEST, 4).unwrap();
        let out = handle(&request, &book).unwrap();
        assert_eq!(out[0].u32("trans_id").unwrap(), 4);
        assert_eq!(out[0].str("address").unwrap(), "files.example:80");
    }
}
