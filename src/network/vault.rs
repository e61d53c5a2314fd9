//! Vault Persistence
//!
//! Nodes are opaque to the server: an id, a revision id and up to four
//! blobs. The [`VaultBackend`] trait is the seam to storage. Two backends
//! ship here: [`MemoryBackend`] and [`FileBackend`], which snapshots the
//! whole table with `bincode` on flush.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::protocol::services::db::{self, request_type};
use crate::protocol::services::vault::{self, cli2srv, srv2cli, NodeBlobs};
use crate::protocol::{Message, NetResult, ProtocolError};

/// Vault errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No node with that id.
    #[error("vault node {0} not found")]
    NodeNotFound(u32),

    /// Node id space exhausted.
    #[error("vault node ids exhausted")]
    Exhausted,

    /// Storage I/O failure.
    #[error("vault io: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("vault snapshot: {0}")]
    Codec(#[from] bincode::Error),
}

impl VaultError {
    /// Result code reported to the client.
    pub fn net_result(&self) -> NetResult {
        match self {
            VaultError::NodeNotFound(_) => NetResult::VaultNodeNotFound,
            VaultError::Exhausted => NetResult::ServerBusy,
            VaultError::Io(_) | VaultError::Codec(_) => NetResult::InternalError,
        }
    }
}

/// One stored node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultNode {
    /// Node id.
    pub id: u32,
    /// Revision of the last save.
    pub revision: Uuid,
    /// Blob slots.
    pub blobs: NodeBlobs,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last save time.
    pub modified_at: DateTime<Utc>,
}

/// Storage for vault nodes.
pub trait VaultBackend: Send {
    /// Store a new node and return its id.
    fn create(&mut self, blobs: NodeBlobs) -> Result<u32, VaultError>;

    /// Replace the present blobs of a node. Absent blobs keep their stored
    /// value. A nil `revision` asks the backend to pick one. Returns the
    /// stored revision.
    fn save(&mut self, id: u32, revision: Uuid, blobs: NodeBlobs) -> Result<Uuid, VaultError>;

    /// Read a node.
    fn fetch(&self, id: u32) -> Result<VaultNode, VaultError>;

    /// Remove a node.
    fn delete(&mut self, id: u32) -> Result<(), VaultError>;

    /// Ids of all stored nodes, ascending.
    fn node_ids(&self) -> Vec<u32>;

    /// Push pending changes to durable storage.
    fn flush(&mut self) -> Result<(), VaultError>;
}

// ============================================================================
// Memory backend
// ============================================================================

/// Nodes in a map. Ids are never reused, even after delete, so a stale
/// reference held by a client can never reach a different node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryBackend {
    next_id: u32,
    nodes: BTreeMap<u32, VaultNode>,
}

impl MemoryBackend {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            nodes: BTreeMap::new(),
        }
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no nodes are stored.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl VaultBackend for MemoryBackend {
    fn create(&mut self, blobs: NodeBlobs) -> Result<u32, VaultError> {
        let id = self.next_id.max(1);
        self.next_id = id.checked_add(1).ok_or(VaultError::Exhausted)?;
        let now = Utc::now();
        self.nodes.insert(
            id,
            VaultNode {
                id,
                revision: Uuid::new_v4(),
                blobs,
                created_at: now,
                modified_at: now,
            },
        );
        Ok(id)
    }

    fn save(&mut self, id: u32, revision: Uuid, blobs: NodeBlobs) -> Result<Uuid, VaultError> {
        let node = self.nodes.get_mut(&id).ok_or(VaultError::NodeNotFound(id))?;
        for (slot, blob) in node.blobs.iter_mut().zip(blobs) {
            if blob.is_some() {
                *slot = blob;
            }
        }
        node.revision = if revision.is_nil() {
            Uuid::new_v4()
        } else {
            revision
        };
        node.modified_at = Utc::now();
        Ok(node.revision)
    }

    fn fetch(&self, id: u32) -> Result<VaultNode, VaultError> {
        self.nodes.get(&id).cloned().ok_or(VaultError::NodeNotFound(id))
    }

    fn delete(&mut self, id: u32) -> Result<(), VaultError> {
        self.nodes
            .remove(&id)
            .map(|_| ())
            .ok_or(VaultError::NodeNotFound(id))
    }

    fn node_ids(&self) -> Vec<u32> {
        self.nodes.keys().copied().collect()
    }

    fn flush(&mut self) -> Result<(), VaultError> {
        Ok(())
    }
}

// ============================================================================
// File backend
// ============================================================================

/// Memory backend mirrored to a snapshot file.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    memory: MemoryBackend,
    dirty: bool,
}

impl FileBackend {
    /// Open `path`, loading the snapshot if one exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let path = path.into();
        let memory = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let memory: MemoryBackend = bincode::deserialize(&bytes)?;
            info!(path = %path.display(), nodes = memory.len(), "Vault snapshot loaded");
            memory
        } else {
            MemoryBackend::new()
        };
        Ok(Self {
            path,
            memory,
            dirty: false,
        })
    }

    /// Snapshot location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mark<T>(&mut self, result: Result<T, VaultError>) -> Result<T, VaultError> {
        if result.is_ok() {
            self.dirty = true;
        }
        result
    }
}

impl VaultBackend for FileBackend {
    fn create(&mut self, blobs: NodeBlobs) -> Result<u32, VaultError> {
        let result = self.memory.create(blobs);
        self.mark(result)
    }

    fn save(&mut self, id: u32, revision: Uuid, blobs: NodeBlobs) -> Result<Uuid, VaultError> {
        let result = self.memory.save(id, revision, blobs);
        self.mark(result)
    }

    fn fetch(&self, id: u32) -> Result<VaultNode, VaultError> {
        self.memory.fetch(id)
    }

    fn delete(&mut self, id: u32) -> Result<(), VaultError> {
        let result = self.memory.delete(id);
        self.mark(result)
    }

    fn node_ids(&self) -> Vec<u32> {
        self.memory.node_ids()
    }

    fn flush(&mut self) -> Result<(), VaultError> {
        if !self.dirty {
            return Ok(());
        }
        let bytes = bincode::serialize(&self.memory)?;
        // Write aside and rename so a crash never leaves a torn snapshot.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Vault snapshot written");
        Ok(())
    }
}

/// Backend chosen by configuration.
pub fn open_backend(path: Option<&Path>) -> Result<Box<dyn VaultBackend>, VaultError> {
    Ok(match path {
        Some(path) => Box::new(FileBackend::open(path)?),
        None => Box::new(MemoryBackend::new()),
    })
}

// ============================================================================
// Service handlers
// ============================================================================

/// Handle one Vault service request. Returns replies for the caller.
pub fn handle(message: &Message, backend: &mut dyn VaultBackend) -> Result<Vec<Message>, ProtocolError> {
    let trans_id = message.u32("trans_id")?;
    match message.opcode() {
        cli2srv::NODE_CREATE => {
            let reply = match backend.create(vault::read_blobs(message)?) {
                Ok(id) => vault::node_created(trans_id, NetResult::Success, id)?,
                Err(e) => vault::node_created(trans_id, e.net_result(), 0)?,
            };
            Ok(vec![reply])
        }
        cli2srv::NODE_SAVE => {
            let id = message.u32("node_id")?;
            let revision = message.uuid("revision_id")?;
            match backend.save(id, revision, vault::read_blobs(message)?) {
                Ok(stored) => Ok(vec![
                    vault::result_reply(srv2cli::NODE_SAVE_REPLY, trans_id, NetResult::Success)?,
                    vault::node_changed(id, stored)?,
                ]),
                Err(e) => Ok(vec![vault::result_reply(
                    srv2cli::NODE_SAVE_REPLY,
                    trans_id,
                    e.net_result(),
                )?]),
            }
        }
        cli2srv::NODE_FETCH => {
            let id = message.u32("node_id")?;
            let reply = match backend.fetch(id) {
                Ok(node) => {
                    vault::node_fetched(trans_id, NetResult::Success, id, node.revision, &node.blobs)?
                }
                Err(e) => {
                    let empty: NodeBlobs = Default::default();
                    vault::node_fetched(trans_id, e.net_result(), id, Uuid::nil(), &empty)?
                }
            };
            Ok(vec![reply])
        }
        cli2srv::NODE_DELETE => {
            let id = message.u32("node_id")?;
            let result = backend
                .delete(id)
                .err()
                .map(|e| e.net_result())
                .unwrap_or(NetResult::Success);
            Ok(vec![vault::result_reply(srv2cli::NODE_DELETED, trans_id, result)?])
        }
        other => Err(ProtocolError::UnknownOpcode {
            table: message.table().name,
            opcode: other,
        }),
    }
}

/// Handle one Db pass-through request. Only admins reach the backend.
pub fn handle_db(
    message: &Message,
    backend: &mut dyn VaultBackend,
    admin: bool,
) -> Result<Vec<Message>, ProtocolError> {
    let trans_id = message.u32("trans_id")?;
    if !admin {
        return Ok(vec![db::reply(trans_id, NetResult::NotPermitted, Vec::new())?]);
    }
    let reply = match message.u32("request_type")? {
        request_type::LIST_NODES => {
            let ids = backend.node_ids();
            let payload = bincode::serialize(&ids).map_err(|e| ProtocolError::Encoding {
                field: "payload",
                reason: e.to_string(),
            })?;
            db::reply(trans_id, NetResult::Success, payload)?
        }
        request_type::FLUSH => match backend.flush() {
            Ok(()) => db::reply(trans_id, NetResult::Success, Vec::new())?,
            Err(e) => db::reply(trans_id, e.net_result(), e.to_string().into_bytes())?,
        },
        _ => db::reply(trans_id, NetResult::NotSupported, Vec::new())?,
    };
    Ok(vec![reply])
}
