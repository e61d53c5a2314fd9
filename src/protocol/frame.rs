//! Frame Layout
//!
//! ```text
//! ┌─────────┬───────────┬────────────┬───────────────────┐
//! │ service │ opcode    │ length     │ payload           │
//! │ u8      │ u16 LE    │ u32 LE     │ length bytes      │
//! └─────────┴───────────┴────────────┴───────────────────┘
//! ```
//!
//! After the handshake the session cipher runs over the frame bytes in
//! stream order. A reader decrypts the 7-byte header first, checks
//! `length` against [`Limits`], then reads and decrypts the payload.

use serde::{Deserialize, Serialize};

use super::error::ProtocolError;
use super::message::{Message, TableOwner};
use super::table::ProtocolTables;
use super::{Direction, ServiceId};

/// Bytes in a frame header.
pub const FRAME_HEADER_LEN: usize = 7;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw service byte.
    pub service: u8,
    /// Opcode within the service table.
    pub opcode: u16,
    /// Payload length.
    pub length: u32,
}

impl FrameHeader {
    /// Parse header bytes.
    pub fn parse(bytes: &[u8; FRAME_HEADER_LEN]) -> Self {
        Self {
            service: bytes[0],
            opcode: u16::from_le_bytes([bytes[1], bytes[2]]),
            length: u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
        }
    }

    /// Serialize header bytes.
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0] = self.service;
        out[1..3].copy_from_slice(&self.opcode.to_le_bytes());
        out[3..7].copy_from_slice(&self.length.to_le_bytes());
        out
    }
}

/// Size limits applied before any allocation driven by peer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest frame payload accepted.
    pub max_frame_payload: usize,
    /// Largest handshake message body accepted.
    pub max_handshake: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_payload: 256 * 1024,
            max_handshake: 1024,
        }
    }
}

impl Limits {
    /// Reject a header whose payload is over the limit.
    pub fn check(&self, header: &FrameHeader) -> Result<(), ProtocolError> {
        let length = header.length as usize;
        if length > self.max_frame_payload {
            return Err(ProtocolError::FrameTooLarge {
                length,
                max: self.max_frame_payload,
            });
        }
        Ok(())
    }
}

/// Encode a service message as a plaintext frame.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let service = match message.table().owner {
        TableOwner::Service(service) => service,
        TableOwner::Game(_) => return Err(ProtocolError::NotFramable(message.name())),
    };
    let body = message.encode_body()?;
    let header = FrameHeader {
        service: service as u8,
        opcode: message.opcode(),
        length: body.len() as u32,
    };
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode one plaintext frame from the front of `bytes`.
///
/// Returns the message and the number of bytes consumed.
pub fn decode_frame(
    tables: &ProtocolTables,
    direction: Direction,
    limits: &Limits,
    bytes: &[u8],
) -> Result<(Message, usize), ProtocolError> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(ProtocolError::TruncatedMessage {
            needed: FRAME_HEADER_LEN,
            available: bytes.len(),
        });
    }
    let mut raw = [0u8; FRAME_HEADER_LEN];
    raw.copy_from_slice(&bytes[..FRAME_HEADER_LEN]);
    let header = FrameHeader::parse(&raw);
    limits.check(&header)?;

    let length = header.length as usize;
    let available = bytes.len() - FRAME_HEADER_LEN;
    if available < length {
        return Err(ProtocolError::TruncatedMessage {
            needed: length,
            available,
        });
    }

    let service = ServiceId::from_u8(header.service)?;
    let payload = &bytes[FRAME_HEADER_LEN..FRAME_HEADER_LEN + length];
    let message = tables
        .service(service, direction)
        .decode(header.opcode, payload)?;
    Ok((message, FRAME_HEADER_LEN + length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::GameRng;
    use crate::protocol::field::{FieldKind, Value};
    use crate::protocol::services::{echo, game::GameType};
    use crate::protocol::{minigames, services, MessageTable, PROTOCOL_VERSION};

    fn sample(kind: FieldKind, rng: &mut GameRng) -> Value {
        match kind {
            FieldKind::U8 => Value::U8(rng.next_u32() as u8),
            FieldKind::U16 => Value::U16(rng.next_u32() as u16),
            FieldKind::U32 => Value::U32(rng.next_u32()),
            FieldKind::U64 => Value::U64(rng.next_u64()),
            FieldKind::I32 => Value::I32(rng.next_u32() as i32),
            FieldKind::F64 => Value::F64(rng.next_int(100_000) as f64 / 8.0 - 1000.0),
            FieldKind::Fixed(n) => Value::Fixed((0..n).map(|_| rng.next_u32() as u8).collect()),
            FieldKind::Str { max } => {
                let len = rng.next_int(max.min(24) as u32 + 1) as usize;
                Value::Str(
                    (0..len)
                        .map(|_| char::from_u32(0x41 + rng.next_int(0x3000)).unwrap_or('x'))
                        .collect(),
                )
            }
            FieldKind::Bytes { max } => {
                let len = rng.next_int(max.min(64) as u32 + 1) as usize;
                Value::Bytes((0..len).map(|_| rng.next_u32() as u8).collect())
            }
        }
    }

    fn sample_message(table: &'static MessageTable, index: usize, rng: &mut GameRng) -> Message {
        let def = &table.messages[index];
        let fields = def.fields.iter().map(|f| sample(f.kind, rng)).collect();
        Message::new(table, def.opcode, fields).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let header = FrameHeader {
            service: 3,
            opcode: 0x0102,
            length: 0x0A0B0C0D,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes, [3, 0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(FrameHeader::parse(&bytes), header);
    }

    #[test]
    fn test_every_service_schema_round_trips_and_detects_truncation() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let limits = Limits::default();
        let mut rng = GameRng::new(0x5EED);

        for service in ServiceId::ALL {
            for direction in [Direction::ClientToServer, Direction::ServerToClient] {
                let table = services::table(service, direction);
                for index in 0..table.messages.len() {
                    let message = sample_message(table, index, &mut rng);
                    let bytes = encode_frame(&message).unwrap();

                    let (decoded, used) =
                        decode_frame(&tables, direction, &limits, &bytes).unwrap();
                    assert_eq!(decoded, message);
                    assert_eq!(used, bytes.len());

                    for cut in 0..bytes.len() {
                        let err = decode_frame(&tables, direction, &limits, &bytes[..cut])
                            .unwrap_err();
                        assert!(
                            matches!(err, ProtocolError::TruncatedMessage { .. }),
                            "{} cut at {}: {:?}",
                            message.name(),
                            cut,
                            err
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_every_minigame_schema_round_trips() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let mut rng = GameRng::new(77);
        for game in GameType::ALL {
            for direction in [Direction::ClientToServer, Direction::ServerToClient] {
                let table = minigames::table(game, direction);
                for index in 0..table.messages.len() {
                    let message = sample_message(table, index, &mut rng);
                    let body = message.encode_body().unwrap();
                    let decoded = tables
                        .game(game, direction)
                        .decode(message.opcode(), &body)
                        .unwrap();
                    assert_eq!(decoded, message);
                    assert!(matches!(
                        encode_frame(&message),
                        Err(ProtocolError::NotFramable(_))
                    ));
                }
            }
        }
    }

    #[test]
    fn test_oversized_frame_rejected_before_payload() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let limits = Limits {
            max_frame_payload: 16,
            ..Limits::default()
        };
        let header = FrameHeader {
            service: ServiceId::Echo as u8,
            opcode: echo::cli2srv::ECHO_REQUEST,
            length: 17,
        };
        assert!(matches!(
            decode_frame(&tables, Direction::ClientToServer, &limits, &header.to_bytes()),
            Err(ProtocolError::FrameTooLarge { length: 17, max: 16 })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let message = echo::ping_request(5).unwrap();
        let mut bytes = encode_frame(&message).unwrap();
        // Grow the declared length and append junk.
        let len = u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]) + 2;
        bytes[3..7].copy_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert!(matches!(
            decode_frame(&tables, Direction::ClientToServer, &Limits::default(), &bytes),
            Err(ProtocolError::TrailingBytes { extra: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_service_byte() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let header = FrameHeader {
            service: 99,
            opcode: 0,
            length: 0,
        };
        assert!(matches!(
            decode_frame(&tables, Direction::ClientToServer, &Limits::default(), &header.to_bytes()),
            Err(ProtocolError::UnknownService(99))
        ));
    }
}
