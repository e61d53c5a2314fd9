//! Variable sync: shared named values for everyone in a room.

use crate::protocol::field::{field, FieldDef, FieldKind::*};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::services::game::GameType;
use crate::protocol::{Direction, ProtocolError};

/// Longest variable name.
pub const MAX_VAR_NAME: usize = 64;
/// Longest string value.
pub const MAX_STRING_VALUE: usize = 256;

const VAR_ID: FieldDef = field("var_id", U32);
const VAR_NAME: FieldDef = field("name", Str { max: MAX_VAR_NAME });
const STRING_VALUE: FieldDef = field("value", Str { max: MAX_STRING_VALUE });
const NUMERIC_VALUE: FieldDef = field("value", F64);

/// Client to server opcodes.
pub mod cli2srv {
    /// Set a string variable.
    pub const SET_STRING_VAR: u16 = 0;
    /// Set a numeric variable.
    pub const SET_NUMERIC_VAR: u16 = 1;
    /// Ask for every variable.
    pub const REQUEST_ALL_VARS: u16 = 2;
    /// Create a string variable.
    pub const CREATE_STRING_VAR: u16 = 3;
    /// Create a numeric variable.
    pub const CREATE_NUMERIC_VAR: u16 = 4;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// String variable changed.
    pub const STRING_VAR_CHANGED: u16 = 0;
    /// Numeric variable changed.
    pub const NUMERIC_VAR_CHANGED: u16 = 1;
    /// End of a full listing.
    pub const ALL_VARS_SENT: u16 = 2;
    /// String variable created.
    pub const STRING_VAR_CREATED: u16 = 3;
    /// Numeric variable created.
    pub const NUMERIC_VAR_CREATED: u16 = 4;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2VarSync",
    owner: TableOwner::Game(GameType::VarSync),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::SET_STRING_VAR, name: "SetStringVar", since: 1, fields: &[VAR_ID, STRING_VALUE] },
        MessageDef { opcode: cli2srv::SET_NUMERIC_VAR, name: "SetNumericVar", since: 1, fields: &[VAR_ID, NUMERIC_VALUE] },
        MessageDef { opcode: cli2srv::REQUEST_ALL_VARS, name: "RequestAllVars", since: 1, fields: &[] },
        MessageDef { opcode: cli2srv::CREATE_STRING_VAR, name: "CreateStringVar", since: 1, fields: &[VAR_NAME, STRING_VALUE] },
        MessageDef { opcode: cli2srv::CREATE_NUMERIC_VAR, name: "CreateNumericVar", since: 1, fields: &[VAR_NAME, NUMERIC_VALUE] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "VarSync2Cli",
    owner: TableOwner::Game(GameType::VarSync),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::STRING_VAR_CHANGED, name: "StringVarChanged", since: 1, fields: &[VAR_ID, STRING_VALUE] },
        MessageDef { opcode: srv2cli::NUMERIC_VAR_CHANGED, name: "NumericVarChanged", since: 1, fields: &[VAR_ID, NUMERIC_VALUE] },
        MessageDef { opcode: srv2cli::ALL_VARS_SENT, name: "AllVarsSent", since: 1, fields: &[] },
        MessageDef { opcode: srv2cli::STRING_VAR_CREATED, name: "StringVarCreated", since: 1, fields: &[
            VAR_NAME, VAR_ID, STRING_VALUE,
        ] },
        MessageDef { opcode: srv2cli::NUMERIC_VAR_CREATED, name: "NumericVarCreated", since: 1, fields: &[
            VAR_NAME, VAR_ID, NUMERIC_VALUE,
        ] },
    ],
};

/// A variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    /// Numeric.
    Numeric(f64),
    /// String.
    String(String),
}

/// Create request.
pub fn create_var(name: &str, value: &VarValue) -> Result<Message, ProtocolError> {
    match value {
        VarValue::Numeric(v) => Message::new(&CLI2SRV, cli2srv::CREATE_NUMERIC_VAR, vec![
            name.into(),
            (*v).into(),
        ]),
        VarValue::String(v) => Message::new(&CLI2SRV, cli2srv::CREATE_STRING_VAR, vec![
            name.into(),
            v.as_str().into(),
        ]),
    }
}

/// Set request.
pub fn set_var(var_id: u32, value: &VarValue) -> Result<Message, ProtocolError> {
    match value {
        VarValue::Numeric(v) => {
            Message::new(&CLI2SRV, cli2srv::SET_NUMERIC_VAR, vec![var_id.into(), (*v).into()])
        }
        VarValue::String(v) => Message::new(&CLI2SRV, cli2srv::SET_STRING_VAR, vec![
            var_id.into(),
            v.as_str().into(),
        ]),
    }
}

/// Listing request.
pub fn request_all_vars() -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, cli2srv::REQUEST_ALL_VARS, Vec::new())
}

/// Creation notice.
pub fn var_created(name: &str, var_id: u32, value: &VarValue) -> Result<Message, ProtocolError> {
    match value {
        VarValue::Numeric(v) => Message::new(&SRV2CLI, srv2cli::NUMERIC_VAR_CREATED, vec![
            name.into(),
            var_id.into(),
            (*v).into(),
        ]),
        VarValue::String(v) => Message::new(&SRV2CLI, srv2cli::STRING_VAR_CREATED, vec![
            name.into(),
            var_id.into(),
            v.as_str().into(),
        ]),
    }
}

/// Change notice.
pub fn var_changed(var_id: u32, value: &VarValue) -> Result<Message, ProtocolError> {
    match value {
        VarValue::Numeric(v) => {
            Message::new(&SRV2CLI, srv2cli::NUMERIC_VAR_CHANGED, vec![var_id.into(), (*v).into()])
        }
        VarValue::String(v) => Message::new(&SRV2CLI, srv2cli::STRING_VAR_CHANGED, vec![
            var_id.into(),
            v.as_str().into(),
        ]),
    }
}

/// End of listing.
pub fn all_vars_sent() -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::ALL_VARS_SENT, Vec::new())
}
