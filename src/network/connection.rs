//! Connection State and Encrypted Framing
//!
//! ```text
//! Connecting ──▶ Handshaking ──▶ Ready ──▶ Closing ──▶ Closed
//!      │              │            │          │
//!      └──────────────┴────────────┴──────────┴──▶ Error
//! ```
//!
//! [`FrameReader`] and [`FrameWriter`] own one half of a socket each, plus
//! the cipher state for that direction. The reader decrypts the header,
//! checks its length against [`Limits`], then reads and decrypts exactly
//! that many payload bytes, so a frame it cannot decode still leaves the
//! stream aligned on the next frame.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::crypt::{CryptError, CryptoKey};
use crate::protocol::frame::{encode_frame, FrameHeader, Limits, FRAME_HEADER_LEN};
use crate::protocol::{Direction, Message, ProtocolError, ProtocolTables, ServiceId, PROTOCOL_VERSION};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Socket up, no crypto.
    Connecting,
    /// Exchanging DH values.
    Handshaking,
    /// Encrypted traffic.
    Ready,
    /// Tearing down.
    Closing,
    /// Done.
    Closed,
    /// Failed; the socket is dropped.
    Error,
}

impl ConnState {
    /// `Closed` and `Error` go nowhere.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Closed | ConnState::Error)
    }

    /// Legal single steps.
    pub fn can_transition(self, to: ConnState) -> bool {
        use ConnState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, to),
            (_, Error)
                | (Connecting, Handshaking)
                | (Connecting, Closing)
                | (Handshaking, Ready)
                | (Handshaking, Closing)
                | (Ready, Closing)
                | (Closing, Closed)
        )
    }

    /// Step to `to` or fail.
    pub fn transition(self, to: ConnState) -> Result<ConnState, ConnectionError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(ConnectionError::InvalidTransition { from: self, to })
        }
    }
}

/// Connection-scoped errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Socket failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Undecodable frame.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// Cipher failure.
    #[error("cipher: {0}")]
    Crypt(#[from] CryptError),

    /// Frame for an opcode this build does not know. The payload has been
    /// consumed.
    #[error("unknown opcode {opcode} for {service:?}")]
    UnknownOpcode {
        /// Target service.
        service: ServiceId,
        /// Opcode.
        opcode: u16,
    },

    /// Peer closed the socket between frames.
    #[error("connection closed")]
    Closed,

    /// Illegal state change.
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: ConnState,
        /// Requested state.
        to: ConnState,
    },
}

/// Item queued for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Send a message.
    Message(Message),
    /// Flush what is queued ahead and close the socket.
    Close,
}

/// Receive half of a connection.
pub struct FrameReader<R> {
    inner: R,
    key: Option<CryptoKey>,
    limits: Limits,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a read half. `key` is `None` only for unencrypted test links.
    pub fn new(inner: R, key: Option<CryptoKey>, limits: Limits) -> Self {
        Self { inner, key, limits }
    }

    /// Read one frame's header and decrypted payload.
    pub async fn read_frame(&mut self) -> Result<(FrameHeader, Vec<u8>), ConnectionError> {
        let mut raw = [0u8; FRAME_HEADER_LEN];
        match self.inner.read_exact(&mut raw).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ConnectionError::Closed)
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(key) = self.key.as_mut() {
            key.decrypt(&mut raw)?;
        }
        let header = FrameHeader::parse(&raw);
        self.limits.check(&header)?;

        let mut payload = vec![0u8; header.length as usize];
        self.inner.read_exact(&mut payload).await?;
        if let Some(key) = self.key.as_mut() {
            key.decrypt(&mut payload)?;
        }
        Ok((header, payload))
    }

    /// Read and decode one message addressed in `direction`.
    pub async fn read_message(
        &mut self,
        tables: &ProtocolTables,
        direction: Direction,
    ) -> Result<Message, ConnectionError> {
        let (header, payload) = self.read_frame().await?;
        let service = ServiceId::from_u8(header.service)?;
        let table = tables.service(service, direction);
        if !table.contains(header.opcode) {
            return Err(ConnectionError::UnknownOpcode {
                service,
                opcode: header.opcode,
            });
        }
        Ok(table.decode(header.opcode, &payload)?)
    }
}

/// Send half of a connection.
pub struct FrameWriter<W> {
    inner: W,
    key: Option<CryptoKey>,
    version: u32,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a write half speaking the current protocol version.
    pub fn new(inner: W, key: Option<CryptoKey>) -> Self {
        Self {
            inner,
            key,
            version: PROTOCOL_VERSION,
        }
    }

    /// Refuse messages newer than the negotiated `version`.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Encode, encrypt and send one message.
    ///
    /// A message the peer's version lacks fails with
    /// [`ProtocolError::NotInVersion`] before any byte is written.
    pub async fn write_message(&mut self, message: &Message) -> Result<(), ConnectionError> {
        message.check_version(self.version)?;
        let mut bytes = encode_frame(message)?;
        if let Some(key) = self.key.as_mut() {
            key.encrypt(&mut bytes)?;
        }
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write side.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bignum::BigNum;
    use crate::core::crypt::{CipherAlgorithm, KeyDirection, SessionKeys};
    use crate::protocol::services::{auth, echo};
    use crate::protocol::PROTOCOL_VERSION;

    fn keys(alg: CipherAlgorithm, dir: KeyDirection) -> SessionKeys {
        SessionKeys::derive(alg, &BigNum::from_u64(0xDEAD_BEEF_1234), &[3; 7], dir).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        use ConnState::*;
        let state = Connecting.transition(Handshaking).unwrap();
        let state = state.transition(Ready).unwrap();
        let state = state.transition(Closing).unwrap();
        assert_eq!(state.transition(Closed).unwrap(), Closed);

        assert!(Ready.transition(Handshaking).is_err());
        assert!(Handshaking.can_transition(Error));
        assert!(!Error.can_transition(Closed));
        assert!(!Closed.can_transition(Error));
    }

    #[tokio::test]
    async fn test_encrypted_frames_cross_a_duplex() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        for alg in [CipherAlgorithm::Rc4, CipherAlgorithm::ChaCha20] {
            let (client_io, server_io) = tokio::io::duplex(4096);
            let client_keys = keys(alg, KeyDirection::ClientToServer);
            let server_keys = keys(alg, KeyDirection::ServerToClient);

            let mut writer = FrameWriter::new(client_io, Some(client_keys.outbound));
            let mut reader = FrameReader::new(server_io, Some(server_keys.inbound), Limits::default());

            let first = echo::echo_request(1, b"hello".to_vec()).unwrap();
            let second = auth::client_register_request(918).unwrap();
            writer.write_message(&first).await.unwrap();
            writer.write_message(&second).await.unwrap();

            let got = reader.read_message(&tables, Direction::ClientToServer).await.unwrap();
            assert_eq!(got, first);
            let got = reader.read_message(&tables, Direction::ClientToServer).await.unwrap();
            assert_eq!(got, second);
        }
    }

    #[tokio::test]
    async fn test_unknown_opcode_keeps_stream_aligned() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let (mut client_io, server_io) = tokio::io::duplex(4096);
        let mut reader = FrameReader::new(server_io, None, Limits::default());

        let bogus = FrameHeader {
            service: ServiceId::Echo as u8,
            opcode: 900,
            length: 3,
        };
        client_io.write_all(&bogus.to_bytes()).await.unwrap();
        client_io.write_all(&[1, 2, 3]).await.unwrap();
        let ping = echo::ping_request(5).unwrap();
        client_io.write_all(&encode_frame(&ping).unwrap()).await.unwrap();

        let err = reader.read_message(&tables, Direction::ClientToServer).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::UnknownOpcode { service: ServiceId::Echo, opcode: 900 }
        ));
        let got = reader.read_message(&tables, Direction::ClientToServer).await.unwrap();
        assert_eq!(got, ping);
    }

    #[tokio::test]
    async fn test_writer_refuses_messages_newer_than_peer() {
        use crate::protocol::services::game::{self, srv2cli, GameType};
        use crate::protocol::{NetResult, MIN_PROTOCOL_VERSION};

        let tables = ProtocolTables::new(MIN_PROTOCOL_VERSION).unwrap();
        let (server_io, client_io) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(server_io, None).with_version(MIN_PROTOCOL_VERSION);
        let mut reader = FrameReader::new(client_io, None, Limits::default());

        let common = game::session_reply(
            srv2cli::GAME_JOIN_COMMON_REPLY,
            1,
            NetResult::Success,
            9,
            Some(GameType::VarSync),
        )
        .unwrap();
        let err = writer.write_message(&common).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Protocol(ProtocolError::NotInVersion { since: 2, version: 1, .. })
        ));

        // Nothing reached the wire; the next frame reads cleanly.
        let pong = echo::ping_reply(42).unwrap();
        writer.write_message(&pong).await.unwrap();
        let got = reader.read_message(&tables, Direction::ServerToClient).await.unwrap();
        assert_eq!(got, pong);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_payload() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let (mut client_io, server_io) = tokio::io::duplex(64);
        let limits = Limits {
            max_frame_payload: 16,
            ..Limits::default()
        };
        let mut reader = FrameReader::new(server_io, None, limits);
        let header = FrameHeader {
            service: ServiceId::Echo as u8,
            opcode: 1,
            length: 1 << 20,
        };
        client_io.write_all(&header.to_bytes()).await.unwrap();
        let err = reader.read_message(&tables, Direction::ClientToServer).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Protocol(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_clean_eof_is_closed() {
        let tables = ProtocolTables::new(PROTOCOL_VERSION).unwrap();
        let (client_io, server_io) = tokio::io::duplex(64);
        drop(client_io);
        let mut reader = FrameReader::new(server_io, None, Limits::default());
        let err = reader.read_message(&tables, Direction::ClientToServer).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Closed));
    }
}
