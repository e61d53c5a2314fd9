//! Protocol errors.
//!
//! Every variant is connection-scoped: a peer sending bad bytes costs
//! that peer its frame or its connection, never the process.

use super::Direction;

/// Wire decoding and encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Service byte names no known service.
    #[error("unknown service {0}")]
    UnknownService(u8),

    /// Game type byte names no known mini-game.
    #[error("unknown game type {0}")]
    UnknownGameType(u8),

    /// Opcode is not in this build's table.
    #[error("unknown opcode {opcode} in {table}")]
    UnknownOpcode {
        /// Table name.
        table: &'static str,
        /// Offending opcode.
        opcode: u16,
    },

    /// Buffer ended before the declared data.
    #[error("truncated message: needed {needed} bytes, {available} available")]
    TruncatedMessage {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Frame length exceeds the configured limit.
    #[error("frame of {length} bytes exceeds limit {max}")]
    FrameTooLarge {
        /// Declared length.
        length: usize,
        /// Limit.
        max: usize,
    },

    /// Variable-length field exceeds its schema bound.
    #[error("field {field} length {length} exceeds {max}")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Actual length.
        length: usize,
        /// Schema bound.
        max: usize,
    },

    /// String field is not valid UTF-16.
    #[error("field {0} is not valid UTF-16")]
    InvalidString(&'static str),

    /// Value kind does not match the schema, or accessor asked for the wrong kind.
    #[error("field {field}: expected {expected}")]
    FieldType {
        /// Field name.
        field: &'static str,
        /// Expected kind.
        expected: &'static str,
    },

    /// Named field does not exist on this message.
    #[error("message {message} has no field {field}")]
    NoSuchField {
        /// Message name.
        message: &'static str,
        /// Field name requested.
        field: &'static str,
    },

    /// Field count differs from the schema.
    #[error("message {message} expects {expected} fields, got {got}")]
    FieldCount {
        /// Message name.
        message: &'static str,
        /// Schema field count.
        expected: usize,
        /// Supplied field count.
        got: usize,
    },

    /// Payload had bytes left after the last field.
    #[error("message {message} has {extra} trailing bytes")]
    TrailingBytes {
        /// Message name.
        message: &'static str,
        /// Unconsumed bytes.
        extra: usize,
    },

    /// Two entries in one table share an opcode.
    #[error("duplicate opcode {opcode} in {table}")]
    DuplicateOpcode {
        /// Table name.
        table: &'static str,
        /// Duplicated opcode.
        opcode: u16,
    },

    /// An entry was inserted before entries from an older protocol version.
    #[error("opcode {opcode} in {table} is older than the entry before it")]
    VersionOrder {
        /// Table name.
        table: &'static str,
        /// Misplaced opcode.
        opcode: u16,
    },

    /// Message sent through a table for the other direction.
    #[error("message {message} is not a {direction:?} message")]
    WrongDirection {
        /// Message name.
        message: &'static str,
        /// Direction required.
        direction: Direction,
    },

    /// Message was introduced after the protocol version in use.
    #[error("message {message} needs protocol {since}, connection speaks {version}")]
    NotInVersion {
        /// Message name.
        message: &'static str,
        /// Version that introduced it.
        since: u32,
        /// Negotiated version.
        version: u32,
    },

    /// Mini-game messages travel inside a game message, never as frames.
    #[error("message {0} must be wrapped in a game message")]
    NotFramable(&'static str),

    /// Structured payload inside a blob field failed to encode or decode.
    #[error("field {field}: {reason}")]
    Encoding {
        /// Field name.
        field: &'static str,
        /// Codec message.
        reason: String,
    },

    /// Encryption layer failure.
    #[error("cipher: {0}")]
    Cipher(String),
}
