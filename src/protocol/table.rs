//! Versioned Opcode Tables
//!
//! A [`MessageTable`] is the static, append-ordered list of schemas. An
//! [`OpcodeTable`] is the runtime lookup built from it for one protocol
//! version, after checking the list for duplicate opcodes and out-of-order
//! insertions. [`ProtocolTables`] holds every table a process needs and is
//! built once at startup.

use std::collections::BTreeMap;

use super::error::ProtocolError;
use super::message::{Message, MessageDef, MessageTable};
use super::services::game::GameType;
use super::{minigames, services, Direction, ServiceId};

/// Runtime opcode lookup for one table at one protocol version.
#[derive(Debug)]
pub struct OpcodeTable {
    source: &'static MessageTable,
    version: u32,
    entries: BTreeMap<u16, &'static MessageDef>,
}

impl OpcodeTable {
    /// Validate `source` and keep the entries introduced at or before `version`.
    pub fn build(source: &'static MessageTable, version: u32) -> Result<Self, ProtocolError> {
        Self::validate(source)?;
        let entries = source
            .messages
            .iter()
            .filter(|m| m.since <= version)
            .map(|m| (m.opcode, m))
            .collect();
        Ok(Self {
            source,
            version,
            entries,
        })
    }

    /// Check append-only discipline: unique opcodes, and no entry listed
    /// after an entry from a newer protocol version.
    pub fn validate(source: &'static MessageTable) -> Result<(), ProtocolError> {
        let mut seen = BTreeMap::new();
        let mut newest = 0;
        for def in source.messages {
            if seen.insert(def.opcode, def.name).is_some() {
                return Err(ProtocolError::DuplicateOpcode {
                    table: source.name,
                    opcode: def.opcode,
                });
            }
            if def.since < newest {
                return Err(ProtocolError::VersionOrder {
                    table: source.name,
                    opcode: def.opcode,
                });
            }
            newest = def.since;
        }
        Ok(())
    }

    /// Decode a payload for `opcode`.
    pub fn decode(&self, opcode: u16, payload: &[u8]) -> Result<Message, ProtocolError> {
        let def = self.entries.get(&opcode).ok_or(ProtocolError::UnknownOpcode {
            table: self.source.name,
            opcode,
        })?;
        Message::decode(self.source, def, payload)
    }

    /// Whether this build knows `opcode`.
    pub fn contains(&self, opcode: u16) -> bool {
        self.entries.contains_key(&opcode)
    }

    /// Schema for `opcode`.
    pub fn get(&self, opcode: u16) -> Option<&'static MessageDef> {
        self.entries.get(&opcode).copied()
    }

    /// Known opcodes in ascending order.
    pub fn opcodes(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.keys().copied()
    }

    /// Number of known opcodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no opcodes are known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Protocol version this table was built for.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Static source table.
    pub fn source(&self) -> &'static MessageTable {
        self.source
    }

    /// True if every entry here exists in `other` with the same schema.
    pub fn is_subset_of(&self, other: &OpcodeTable) -> bool {
        self.entries.iter().all(|(opcode, def)| {
            other
                .entries
                .get(opcode)
                .map(|o| o.name == def.name && o.fields == def.fields)
                .unwrap_or(false)
        })
    }
}

/// Every service and mini-game table for one protocol version.
#[derive(Debug)]
pub struct ProtocolTables {
    version: u32,
    services: BTreeMap<(ServiceId, Direction), OpcodeTable>,
    games: BTreeMap<(GameType, Direction), OpcodeTable>,
}

impl ProtocolTables {
    /// Build and validate all tables.
    pub fn new(version: u32) -> Result<Self, ProtocolError> {
        let mut services = BTreeMap::new();
        for service in ServiceId::ALL {
            for direction in [Direction::ClientToServer, Direction::ServerToClient] {
                let source = services::table(service, direction);
                services.insert((service, direction), OpcodeTable::build(source, version)?);
            }
        }

        let mut games = BTreeMap::new();
        for game in GameType::ALL {
            for direction in [Direction::ClientToServer, Direction::ServerToClient] {
                let source = minigames::table(game, direction);
                games.insert((game, direction), OpcodeTable::build(source, version)?);
            }
        }

        Ok(Self {
            version,
            services,
            games,
        })
    }

    /// Protocol version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Table for a service and direction.
    pub fn service(&self, service: ServiceId, direction: Direction) -> &OpcodeTable {
        // Every (service, direction) pair is inserted by `new`.
        &self.services[&(service, direction)]
    }

    /// Table for a mini-game sub-protocol and direction.
    pub fn game(&self, game: GameType, direction: Direction) -> &OpcodeTable {
        &self.games[&(game, direction)]
    }
}
