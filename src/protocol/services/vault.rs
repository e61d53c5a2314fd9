//! Vault service: opaque node persistence.
//!
//! A node is an id, a revision and up to four blob fields. `field_mask`
//! bit `i` marks blob `i` as present; absent blobs travel as empty.

use uuid::Uuid;

use super::{RESULT, TRANS_ID};
use crate::protocol::field::{field, FieldDef, FieldKind::*, Value};
use crate::protocol::message::{Message, MessageDef, MessageTable, TableOwner};
use crate::protocol::{Direction, NetResult, ProtocolError, ServiceId};

/// Blob fields per node.
pub const BLOB_FIELDS: usize = 4;
/// Largest single blob.
pub const MAX_BLOB: usize = 48 * 1024;

const FIELD_MASK: FieldDef = field("field_mask", U8);
const BLOB0: FieldDef = field("blob0", Bytes { max: MAX_BLOB });
const BLOB1: FieldDef = field("blob1", Bytes { max: MAX_BLOB });
const BLOB2: FieldDef = field("blob2", Bytes { max: MAX_BLOB });
const BLOB3: FieldDef = field("blob3", Bytes { max: MAX_BLOB });
const NODE_ID: FieldDef = field("node_id", U32);
const REVISION_ID: FieldDef = field("revision_id", Fixed(16));

/// Field names of the blob slots, in order.
pub const BLOB_NAMES: [&str; BLOB_FIELDS] = ["blob0", "blob1", "blob2", "blob3"];

/// Client to server opcodes.
pub mod cli2srv {
    /// Create a node.
    pub const NODE_CREATE: u16 = 0;
    /// Overwrite a node.
    pub const NODE_SAVE: u16 = 1;
    /// Read a node.
    pub const NODE_FETCH: u16 = 2;
    /// Delete a node.
    pub const NODE_DELETE: u16 = 3;
}

/// Server to client opcodes.
pub mod srv2cli {
    /// Creation result.
    pub const NODE_CREATED: u16 = 0;
    /// Save result.
    pub const NODE_SAVE_REPLY: u16 = 1;
    /// Fetch result.
    pub const NODE_FETCHED: u16 = 2;
    /// Delete result.
    pub const NODE_DELETED: u16 = 3;
    /// A node changed revision.
    pub const NODE_CHANGED: u16 = 4;
}

/// Client to server table.
pub static CLI2SRV: MessageTable = MessageTable {
    name: "Cli2Vault",
    owner: TableOwner::Service(ServiceId::Vault),
    direction: Direction::ClientToServer,
    messages: &[
        MessageDef { opcode: cli2srv::NODE_CREATE, name: "NodeCreate", since: 1, fields: &[
            TRANS_ID, FIELD_MASK, BLOB0, BLOB1, BLOB2, BLOB3,
        ] },
        MessageDef { opcode: cli2srv::NODE_SAVE, name: "NodeSave", since: 1, fields: &[
            TRANS_ID, NODE_ID, REVISION_ID, FIELD_MASK, BLOB0, BLOB1, BLOB2, BLOB3,
        ] },
        MessageDef { opcode: cli2srv::NODE_FETCH, name: "NodeFetch", since: 1, fields: &[TRANS_ID, NODE_ID] },
        MessageDef { opcode: cli2srv::NODE_DELETE, name: "NodeDelete", since: 1, fields: &[TRANS_ID, NODE_ID] },
    ],
};

/// Server to client table.
pub static SRV2CLI: MessageTable = MessageTable {
    name: "Vault2Cli",
    owner: TableOwner::Service(ServiceId::Vault),
    direction: Direction::ServerToClient,
    messages: &[
        MessageDef { opcode: srv2cli::NODE_CREATED, name: "NodeCreated", since: 1, fields: &[TRANS_ID, RESULT, NODE_ID] },
        MessageDef { opcode: srv2cli::NODE_SAVE_REPLY, name: "NodeSaveReply", since: 1, fields: &[TRANS_ID, RESULT] },
        MessageDef { opcode: srv2cli::NODE_FETCHED, name: "NodeFetched", since: 1, fields: &[
            TRANS_ID, RESULT, NODE_ID, REVISION_ID, FIELD_MASK, BLOB0, BLOB1, BLOB2, BLOB3,
        ] },
        MessageDef { opcode: srv2cli::NODE_DELETED, name: "NodeDeleted", since: 1, fields: &[TRANS_ID, RESULT] },
        MessageDef { opcode: srv2cli::NODE_CHANGED, name: "NodeChanged", since: 2, fields: &[NODE_ID, REVISION_ID] },
    ],
};

/// Blob slots of a node; `None` is an absent field.
pub type NodeBlobs = [Option<Vec<u8>>; BLOB_FIELDS];

fn blob_values(blobs: &NodeBlobs) -> (u8, Vec<Value>) {
    let mut mask = 0u8;
    let mut values = Vec::with_capacity(BLOB_FIELDS);
    for (i, blob) in blobs.iter().enumerate() {
        if blob.is_some() {
            mask |= 1 << i;
        }
        values.push(Value::Bytes(blob.clone().unwrap_or_default()));
    }
    (mask, values)
}

/// Read the blob slots of a create, save or fetched message.
pub fn read_blobs(message: &Message) -> Result<NodeBlobs, ProtocolError> {
    let mask = message.u8("field_mask")?;
    let mut blobs: NodeBlobs = Default::default();
    for (i, name) in BLOB_NAMES.iter().enumerate() {
        if mask & (1 << i) != 0 {
            blobs[i] = Some(message.bytes(name)?.to_vec());
        }
    }
    Ok(blobs)
}

/// Create request.
pub fn node_create(trans_id: u32, blobs: &NodeBlobs) -> Result<Message, ProtocolError> {
    let (mask, values) = blob_values(blobs);
    let mut fields = vec![trans_id.into(), mask.into()];
    fields.extend(values);
    Message::new(&CLI2SRV, cli2srv::NODE_CREATE, fields)
}

/// Save request.
pub fn node_save(
    trans_id: u32,
    node_id: u32,
    revision: Uuid,
    blobs: &NodeBlobs,
) -> Result<Message, ProtocolError> {
    let (mask, values) = blob_values(blobs);
    let mut fields = vec![
        trans_id.into(),
        node_id.into(),
        Value::Fixed(revision.as_bytes().to_vec()),
        mask.into(),
    ];
    fields.extend(values);
    Message::new(&CLI2SRV, cli2srv::NODE_SAVE, fields)
}

/// Fetch or delete request.
pub fn node_request(opcode: u16, trans_id: u32, node_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&CLI2SRV, opcode, vec![trans_id.into(), node_id.into()])
}

/// Creation result.
pub fn node_created(trans_id: u32, result: NetResult, node_id: u32) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::NODE_CREATED, vec![
        trans_id.into(),
        result.into(),
        node_id.into(),
    ])
}

/// Fetch result. On failure pass an empty node.
pub fn node_fetched(
    trans_id: u32,
    result: NetResult,
    node_id: u32,
    revision: Uuid,
    blobs: &NodeBlobs,
) -> Result<Message, ProtocolError> {
    let (mask, values) = blob_values(blobs);
    let mut fields = vec![
        trans_id.into(),
        result.into(),
        node_id.into(),
        Value::Fixed(revision.as_bytes().to_vec()),
        mask.into(),
    ];
    fields.extend(values);
    Message::new(&SRV2CLI, srv2cli::NODE_FETCHED, fields)
}

/// Save or delete result.
pub fn result_reply(opcode: u16, trans_id: u32, result: NetResult) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, opcode, vec![trans_id.into(), result.into()])
}

/// Revision change notice.
pub fn node_changed(node_id: u32, revision: Uuid) -> Result<Message, ProtocolError> {
    Message::new(&SRV2CLI, srv2cli::NODE_CHANGED, vec![
        node_id.into(),
        Value::Fixed(revision.as_bytes().to_vec()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_mask_tracks_present_blobs() {
        let blobs: NodeBlobs = [Some(b"age".to_vec()), None, Some(Vec::new()), None];
        let msg = node_create(1, &blobs).unwrap();
        assert_eq!(msg.u8("field_mask").unwrap(), 0b0101);
        assert_eq!(read_blobs(&msg).unwrap(), blobs);
    }
}
