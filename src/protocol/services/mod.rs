//! Per-service opcode tables.
//!
//! Each service module declares its opcodes as constants, its two
//! append-ordered [`MessageTable`]s, and constructors for the messages the
//! server and client build.

pub mod auth;
pub mod csr;
pub mod db;
pub mod echo;
pub mod game;
pub mod gatekeeper;
pub mod score;
pub mod vault;

use super::field::{field, FieldDef, FieldKind};
use super::message::MessageTable;
use super::{Direction, ServiceId};

/// Transaction id echoed from request to reply.
pub(crate) const TRANS_ID: FieldDef = field("trans_id", FieldKind::U32);

/// `NetResult` code.
pub(crate) const RESULT: FieldDef = field("result", FieldKind::U32);

/// Static table for a service and direction.
pub fn table(service: ServiceId, direction: Direction) -> &'static MessageTable {
    use Direction::*;
    match (service, direction) {
        (ServiceId::Auth, ClientToServer) => &auth::CLI2SRV,
        (ServiceId::Auth, ServerToClient) => &auth::SRV2CLI,
        (ServiceId::Vault, ClientToServer) => &vault::CLI2SRV,
        (ServiceId::Vault, ServerToClient) => &vault::SRV2CLI,
        (ServiceId::Game, ClientToServer) => &game::CLI2SRV,
        (ServiceId::Game, ServerToClient) => &game::SRV2CLI,
        (ServiceId::Score, ClientToServer) => &score::CLI2SRV,
        (ServiceId::Score, ServerToClient) => &score::SRV2CLI,
        (ServiceId::Csr, ClientToServer) => &csr::CLI2SRV,
        (ServiceId::Csr, ServerToClient) => &csr::SRV2CLI,
        (ServiceId::GateKeeper, ClientToServer) => &gatekeeper::CLI2SRV,
        (ServiceId::GateKeeper, ServerToClient) => &gatekeeper::SRV2CLI,
        (ServiceId::Db, ClientToServer) => &db::CLI2SRV,
        (ServiceId::Db, ServerToClient) => &db::SRV2CLI,
        (ServiceId::Echo, ClientToServer) => &echo::CLI2SRV,
        (ServiceId::Echo, ServerToClient) => &echo::SRV2CLI,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::TableOwner;

    #[test]
    fn test_tables_are_labelled_consistently() {
        for service in ServiceId::ALL {
            for direction in [Direction::ClientToServer, Direction::ServerToClient] {
                let t = table(service, direction);
                assert_eq!(t.owner, TableOwner::Service(service));
                assert_eq!(t.direction, direction);
            }
        }
    }
}
