//! Handshake Wire Messages
//!
//! Sent in the clear before any session key exists.
//!
//! ```text
//! type u8 | length u16 LE | body[length]
//!
//! Connect (0)  version u32 | build u32 | cipher u8 | keyLen u16 | dhPublic[keyLen]
//! Encrypt (1)  keyLen u16 | dhPublic[keyLen] | serverSeed[7]
//! Error   (2)  result u32
//! ```

use super::error::ProtocolError;
use super::field::WireReader;
use super::NetResult;
use crate::core::crypt::{ServerSeed, SEED_BYTES};

/// Bytes in a handshake header.
pub const HANDSHAKE_HEADER_LEN: usize = 3;

const CONNECT: u8 = 0;
const ENCRYPT: u8 = 1;
const ERROR: u8 = 2;

/// One handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    /// Client opens with its version and public value.
    Connect {
        /// Client protocol version.
        version: u32,
        /// Client build number.
        build_id: u32,
        /// Requested cipher id.
        cipher: u8,
        /// Client DH public value, fixed width big-endian.
        dh_public: Vec<u8>,
    },
    /// Server accepts and completes the exchange.
    Encrypt {
        /// Server DH public value, fixed width big-endian.
        dh_public: Vec<u8>,
        /// Seed mixed into the session key.
        server_seed: ServerSeed,
    },
    /// Server refuses.
    Error {
        /// Reason.
        result: NetResult,
    },
}

/// Parsed handshake header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeHeader {
    /// Message type.
    pub kind: u8,
    /// Body length.
    pub length: u16,
}

impl HandshakeHeader {
    /// Parse header bytes.
    pub fn parse(bytes: &[u8; HANDSHAKE_HEADER_LEN]) -> Self {
        Self {
            kind: bytes[0],
            length: u16::from_le_bytes([bytes[1], bytes[2]]),
        }
    }
}

impl HandshakeMessage {
    /// Serialize header and body.
    pub fn encode(&self) -> Vec<u8> {
        let (kind, body) = match self {
            HandshakeMessage::Connect {
                version,
                build_id,
                cipher,
                dh_public,
            } => {
                let mut body = Vec::with_capacity(11 + dh_public.len());
                body.extend_from_slice(&version.to_le_bytes());
                body.extend_from_slice(&build_id.to_le_bytes());
                body.push(*cipher);
                body.extend_from_slice(&(dh_public.len() as u16).to_le_bytes());
                body.extend_from_slice(dh_public);
                (CONNECT, body)
            }
            HandshakeMessage::Encrypt {
                dh_public,
                server_seed,
            } => {
                let mut body = Vec::with_capacity(2 + dh_public.len() + SEED_BYTES);
                body.extend_from_slice(&(dh_public.len() as u16).to_le_bytes());
                body.extend_from_slice(dh_public);
                body.extend_from_slice(server_seed);
                (ENCRYPT, body)
            }
            HandshakeMessage::Error { result } => (ERROR, result.code().to_le_bytes().to_vec()),
        };

        let mut out = Vec::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
        out.push(kind);
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Parse a body for a header already read.
    pub fn decode(header: HandshakeHeader, body: &[u8]) -> Result<Self, ProtocolError> {
        if body.len() != header.length as usize {
            return Err(ProtocolError::TruncatedMessage {
                needed: header.length as usize,
                available: body.len(),
            });
        }
        let mut r = WireReader::new(body);
        let message = match header.kind {
            CONNECT => {
                let version = r.u32()?;
                let build_id = r.u32()?;
                let cipher = r.u8()?;
                let key_len = r.u16()? as usize;
                HandshakeMessage::Connect {
                    version,
                    build_id,
                    cipher,
                    dh_public: r.take(key_len)?.to_vec(),
                }
            }
            ENCRYPT => {
                let key_len = r.u16()? as usize;
                let dh_public = r.take(key_len)?.to_vec();
                let mut server_seed = [0u8; SEED_BYTES];
                server_seed.copy_from_slice(r.take(SEED_BYTES)?);
                HandshakeMessage::Encrypt {
                    dh_public,
                    server_seed,
                }
            }
            ERROR => HandshakeMessage::Error {
                result: NetResult::from_code(r.u32()?),
            },
            other => {
                return Err(ProtocolError::UnknownOpcode {
                    table: "Handshake",
                    opcode: other as u16,
                })
            }
        };
        if r.remaining() != 0 {
            return Err(ProtocolError::TrailingBytes {
                message: "Handshake",
                extra: r.remaining(),
            });
        }
        Ok(message)
    }

    /// Parse a complete message including its header.
    pub fn decode_all(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HANDSHAKE_HEADER_LEN {
            return Err(ProtocolError::TruncatedMessage {
                needed: HANDSHAKE_HEADER_LEN,
                available: bytes.len(),
            });
        }
        let header = HandshakeHeader::parse(&[bytes[0], bytes[1], bytes[2]]);
        Self::decode(header, &bytes[HANDSHAKE_HEADER_LEN..])
    }
}
