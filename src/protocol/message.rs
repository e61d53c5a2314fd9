//! Message schemas and decoded messages.

use std::fmt;
use uuid::Uuid;

use super::error::ProtocolError;
use super::field::{FieldDef, Value, WireReader};
use super::services::game::GameType;
use super::{Direction, ServiceId};

/// Schema of one message: a stable opcode and its ordered fields.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageDef {
    /// Stable opcode within its table.
    pub opcode: u16,
    /// Message name, for logs.
    pub name: &'static str,
    /// Protocol version that introduced the message.
    pub since: u32,
    /// Ordered field schema.
    pub fields: &'static [FieldDef],
}

impl MessageDef {
    /// Declare a schema.
    pub const fn new(
        opcode: u16,
        name: &'static str,
        since: u32,
        fields: &'static [FieldDef],
    ) -> Self {
        Self {
            opcode,
            name,
            since,
            fields,
        }
    }
}

/// What a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOwner {
    /// A top-level network service.
    Service(ServiceId),
    /// A mini-game sub-protocol carried inside game messages.
    Game(GameType),
}

/// Ordered list of message schemas for one owner and direction.
///
/// The list order is the append order: new entries go at the end.
#[derive(Debug)]
pub struct MessageTable {
    /// Table name, for logs.
    pub name: &'static str,
    /// Service or mini-game.
    pub owner: TableOwner,
    /// Direction.
    pub direction: Direction,
    /// Entries in append order.
    pub messages: &'static [MessageDef],
}

impl MessageTable {
    /// Look up a schema by opcode, ignoring versions.
    pub fn get(&'static self, opcode: u16) -> Option<&'static MessageDef> {
        self.messages.iter().find(|m| m.opcode == opcode)
    }
}

/// A message bound to its schema.
#[derive(Clone)]
pub struct Message {
    table: &'static MessageTable,
    def: &'static MessageDef,
    fields: Vec<Value>,
}

impl Message {
    /// Build a message, checking values against the schema.
    pub fn new(
        table: &'static MessageTable,
        opcode: u16,
        fields: Vec<Value>,
    ) -> Result<Self, ProtocolError> {
        let def = table.get(opcode).ok_or(ProtocolError::UnknownOpcode {
            table: table.name,
            opcode,
        })?;
        if def.fields.len() != fields.len() {
            return Err(ProtocolError::FieldCount {
                message: def.name,
                expected: def.fields.len(),
                got: fields.len(),
            });
        }
        for (schema, value) in def.fields.iter().zip(&fields) {
            if !schema.accepts(value) {
                return Err(schema.type_error());
            }
        }
        Ok(Self { table, def, fields })
    }

    /// Decode a payload against a known schema. The payload must be
    /// consumed exactly.
    pub fn decode(
        table: &'static MessageTable,
        def: &'static MessageDef,
        payload: &[u8],
    ) -> Result<Self, ProtocolError> {
        let mut reader = WireReader::new(payload);
        let fields = def
            .fields
            .iter()
            .map(|f| f.read(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;
        if reader.remaining() != 0 {
            return Err(ProtocolError::TrailingBytes {
                message: def.name,
                extra: reader.remaining(),
            });
        }
        Ok(Self { table, def, fields })
    }

    /// Encode the field values; exact inverse of [`Message::decode`].
    pub fn encode_body(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        for (schema, value) in self.def.fields.iter().zip(&self.fields) {
            schema.write(value, &mut out)?;
        }
        Ok(out)
    }

    /// Fail if a peer speaking `version` would not know this message.
    pub fn check_version(&self, version: u32) -> Result<(), ProtocolError> {
        if self.def.since <= version {
            Ok(())
        } else {
            Err(ProtocolError::NotInVersion {
                message: self.def.name,
                since: self.def.since,
                version,
            })
        }
    }

    /// Owning table.
    pub fn table(&self) -> &'static MessageTable {
        self.table
    }

    /// Schema.
    pub fn def(&self) -> &'static MessageDef {
        self.def
    }

    /// Opcode.
    pub fn opcode(&self) -> u16 {
        self.def.opcode
    }

    /// Schema name.
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Field values in schema order.
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Service the message travels on. Mini-game messages travel on Game.
    pub fn service(&self) -> ServiceId {
        match self.table.owner {
            TableOwner::Service(service) => service,
            TableOwner::Game(_) => ServiceId::Game,
        }
    }

    // ========================================================================
    // Named field access
    // ========================================================================

    fn lookup(&self, name: &'static str) -> Result<(&'static FieldDef, &Value), ProtocolError> {
        self.def
            .fields
            .iter()
            .zip(&self.fields)
            .find(|(f, _)| f.name == name)
            .ok_or(ProtocolError::NoSuchField {
                message: self.def.name,
                field: name,
            })
    }

    /// Raw value of a named field.
    pub fn get(&self, name: &'static str) -> Result<&Value, ProtocolError> {
        self.lookup(name).map(|(_, v)| v)
    }

    /// Named u8 field.
    pub fn u8(&self, name: &'static str) -> Result<u8, ProtocolError> {
        match self.lookup(name)? {
            (_, Value::U8(v)) => Ok(*v),
            (f, _) => Err(f.type_error()),
        }
    }

    /// Named u8 field read as a flag.
    pub fn flag(&self, name: &'static str) -> Result<bool, ProtocolError> {
        Ok(self.u8(name)? != 0)
    }

    /// Named u16 field.
    pub fn u16(&self, name: &'static str) -> Result<u16, ProtocolError> {
        match self.lookup(name)? {
            (_, Value::U16(v)) => Ok(*v),
            (f, _) => Err(f.type_error()),
        }
    }

    /// Named u32 field.
    pub fn u32(&self, name: &'static str) -> Result<u32, ProtocolError> {
        match self.lookup(name)? {
            (_, Value::U32(v)) => Ok(*v),
            (f, _) => Err(f.type_error()),
        }
    }

    /// Named u64 field.
    pub fn u64(&self, name: &'static str) -> Result<u64, ProtocolError> {
        match self.lookup(name)? {
            (_, Value::U64(v)) => Ok(*v),
            (f, _) => Err(f.type_error()),
        }
    }

    /// Named i32 field.
    pub fn i32(&self, name: &'static str) -> Result<i32, ProtocolError> {
        match self.lookup(name)? {
            (_, Value::I32(v)) => Ok(*v),
            (f, _) => Err(f.type_error()),
        }
    }

    /// Named f64 field.
    pub fn f64(&self, name: &'static str) -> Result<f64, ProtocolError> {
        match self.lookup(name)? {
            (_, Value::F64(v)) => Ok(*v),
            (f, _) => Err(f.type_error()),
        }
    }

    /// Named string field.
    pub fn str(&self, name: &'static str) -> Result<&str, ProtocolError> {
        match self.lookup(name)? {
            (_, Value::Str(v)) => Ok(v),
            (f, _) => Err(f.type_error()),
        }
    }

    /// Named blob or fixed-bytes field.
    pub fn bytes(&self, name: &'static str) -> Result<&[u8], ProtocolError> {
        match self.lookup(name)? {
            (_, Value::Bytes(v)) | (_, Value::Fixed(v)) => Ok(v),
            (f, _) => Err(f.type_error()),
        }
    }

    /// Named fixed-bytes field as an array.
    pub fn array<const N: usize>(&self, name: &'static str) -> Result<[u8; N], ProtocolError> {
        let (f, value) = self.lookup(name)?;
        match value {
            Value::Fixed(v) if v.len() == N => {
                let mut out = [0u8; N];
                out.copy_from_slice(v);
                Ok(out)
            }
            _ => Err(f.type_error()),
        }
    }

    /// Named 16-byte field as a UUID.
    pub fn uuid(&self, name: &'static str) -> Result<Uuid, ProtocolError> {
        Ok(Uuid::from_bytes(self.array::<16>(name)?))
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.table.name == other.table.name
            && self.def.opcode == other.def.opcode
            && self.fields == other.fields
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.def.name);
        for (schema, value) in self.def.fields.iter().zip(&self.fields) {
            s.field(schema.name, value);
        }
        s.finish()
    }
}
