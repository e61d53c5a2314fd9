//! Key-Exchange Handshake Driver
//!
//! ```text
//! client                                   server
//!   │ Connect{version, build, cipher, g^x} ──▶│  version / cipher / width check
//!   │                                         │  worker: y, g^y, (g^x)^y, seed
//!   │◀── Encrypt{g^y, seed}  |  Error{result} │
//!   │ worker: (g^y)^x                         │
//!   ▼ keys(ClientToServer)                    ▼ keys(ServerToClient)
//! ```
//!
//! Both sides run the exponentiations on a [`CryptoWorker`] so the I/O
//! driver never stalls on big-number work. The whole exchange runs under a
//! timeout; a failure at any step is final for the socket.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::core::crypt::{CipherAlgorithm, CryptError, KeyDirection, SessionKeys, SEED_BYTES};
use crate::core::dh::{DhError, DhKeyPair, DhParams};
use crate::protocol::handshake::{HandshakeHeader, HandshakeMessage, HANDSHAKE_HEADER_LEN};
use crate::protocol::NetResult;

/// Handshake failures. All of them close the connection.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// The exchange did not finish in time.
    #[error("handshake timed out")]
    Timeout,

    /// Protocol versions differ. `remote` is unknown on the client side.
    #[error("protocol version mismatch: local {local}, remote {remote:?}")]
    VersionMismatch {
        /// Our version.
        local: u32,
        /// Peer version, when it told us.
        remote: Option<u32>,
    },

    /// Cipher id or DH key width differ.
    #[error("cipher or key width mismatch")]
    AlgorithmMismatch,

    /// Message could not be parsed or arrived out of order.
    #[error("malformed handshake: {0}")]
    Malformed(String),

    /// Declared body is over the limit.
    #[error("handshake message of {length} bytes exceeds {max}")]
    Oversized {
        /// Declared length.
        length: usize,
        /// Limit.
        max: usize,
    },

    /// Server refused with a result code.
    #[error("rejected by server: {0:?}")]
    Rejected(NetResult),

    /// Socket failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Key agreement or derivation failed.
    #[error("crypto: {0}")]
    Crypto(String),
}

impl From<DhError> for HandshakeError {
    fn from(e: DhError) -> Self {
        HandshakeError::Crypto(e.to_string())
    }
}

impl From<CryptError> for HandshakeError {
    fn from(e: CryptError) -> Self {
        HandshakeError::Crypto(e.to_string())
    }
}

/// Parameters both sides must agree on.
#[derive(Debug, Clone)]
pub struct HandshakeSettings {
    /// Protocol version spoken.
    pub version: u32,
    /// Build number announced by clients.
    pub build_id: u32,
    /// Session cipher.
    pub cipher: CipherAlgorithm,
    /// DH group.
    pub dh: Arc<DhParams>,
    /// Deadline for the whole exchange.
    pub timeout: Duration,
    /// Largest handshake body accepted.
    pub max_message: usize,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            version: crate::protocol::PROTOCOL_VERSION,
            build_id: 0,
            cipher: CipherAlgorithm::ChaCha20,
            dh: Arc::new(DhParams::default()),
            timeout: Duration::from_secs(10),
            max_message: 1024,
        }
    }
}

/// Bounded pool for CPU-bound key agreement.
#[derive(Debug, Clone)]
pub struct CryptoWorker {
    permits: Arc<Semaphore>,
}

impl CryptoWorker {
    /// Pool running at most `workers` jobs at once.
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run `job` on the blocking pool once a permit is free.
    pub async fn run<T, F>(&self, job: F) -> Result<T, HandshakeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HandshakeError::Crypto("worker pool closed".into()))?;
        // The job holds the permit, so a cancelled caller cannot free the
        // slot while the computation is still running.
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
            .map_err(|e| HandshakeError::Crypto(e.to_string()))
    }
}

impl Default for CryptoWorker {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Result of a completed exchange.
#[derive(Debug)]
pub struct Established {
    /// Session keys for this side.
    pub keys: SessionKeys,
    /// Protocol version in use.
    pub version: u32,
    /// Client build number (server side) or our own (client side).
    pub build_id: u32,
}

async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max: usize,
) -> Result<HandshakeMessage, HandshakeError> {
    let mut raw = [0u8; HANDSHAKE_HEADER_LEN];
    reader.read_exact(&mut raw).await?;
    let header = HandshakeHeader::parse(&raw);
    let length = header.length as usize;
    if length > max {
        return Err(HandshakeError::Oversized { length, max });
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    HandshakeMessage::decode(header, &body).map_err(|e| HandshakeError::Malformed(e.to_string()))
}

async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &HandshakeMessage,
) -> Result<(), HandshakeError> {
    writer.write_all(&message.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Best effort; the caller is about to drop the socket anyway.
async fn reject<W: AsyncWrite + Unpin>(writer: &mut W, result: NetResult) {
    if let Err(e) = write_message(writer, &HandshakeMessage::Error { result }).await {
        debug!("Failed to send handshake rejection: {}", e);
    }
}

// ============================================================================
// Server side
// ============================================================================

/// Accept a client handshake on `stream`.
pub async fn accept<S>(
    stream: &mut S,
    settings: &HandshakeSettings,
    worker: &CryptoWorker,
) -> Result<Established, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(settings.timeout, accept_inner(stream, settings, worker))
        .await
        .map_err(|_| HandshakeError::Timeout)?
}

async fn accept_inner<S>(
    stream: &mut S,
    settings: &HandshakeSettings,
    worker: &CryptoWorker,
) -> Result<Established, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (version, build_id, cipher, client_public) =
        match read_message(stream, settings.max_message).await? {
            HandshakeMessage::Connect {
                version,
                build_id,
                cipher,
                dh_public,
            } => (version, build_id, cipher, dh_public),
            other => {
                return Err(HandshakeError::Malformed(format!(
                    "expected Connect, got {:?}",
                    other
                )))
            }
        };

    if version != settings.version {
        reject(stream, NetResult::VersionMismatch).await;
        return Err(HandshakeError::VersionMismatch {
            local: settings.version,
            remote: Some(version),
        });
    }
    if cipher != settings.cipher.id() || client_public.len() != settings.dh.key_bytes() {
        reject(stream, NetResult::AlgorithmMismatch).await;
        return Err(HandshakeError::AlgorithmMismatch);
    }

    let dh = settings.dh.clone();
    let algorithm = settings.cipher;
    let agreed = worker
        .run(move || -> Result<_, HandshakeError> {
            let mut rng = rand::thread_rng();
            let pair = DhKeyPair::generate(&dh, &mut rng)?;
            let shared = pair.agree(&dh, &client_public)?;
            let mut seed = [0u8; SEED_BYTES];
            rng.fill_bytes(&mut seed);
            let keys = SessionKeys::derive(algorithm, &shared, &seed, KeyDirection::ServerToClient)?;
            Ok((pair.public_bytes(&dh)?, seed, keys))
        })
        .await?;

    let (server_public, server_seed, keys) = match agreed {
        Ok(parts) => parts,
        Err(e) => {
            reject(stream, NetResult::InvalidParameter).await;
            return Err(e);
        }
    };

    write_message(
        stream,
        &HandshakeMessage::Encrypt {
            dh_public: server_public,
            server_seed,
        },
    )
    .await?;

    Ok(Established {
        keys,
        version,
        build_id,
    })
}

// ============================================================================
// Client side
// ============================================================================

/// Run the client half of the handshake on `stream`.
pub async fn connect<S>(
    stream: &mut S,
    settings: &HandshakeSettings,
    worker: &CryptoWorker,
) -> Result<Established, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(settings.timeout, connect_inner(stream, settings, worker))
        .await
        .map_err(|_| HandshakeError::Timeout)?
}

async fn connect_inner<S>(
    stream: &mut S,
    settings: &HandshakeSettings,
    worker: &CryptoWorker,
) -> Result<Established, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let dh = settings.dh.clone();
    let (pair, client_public) = worker
        .run(move || -> Result<_, HandshakeError> {
            let pair = DhKeyPair::generate(&dh, &mut rand::thread_rng())?;
            let public = pair.public_bytes(&dh)?;
            Ok((pair, public))
        })
        .await??;

    write_message(
        stream,
        &HandshakeMessage::Connect {
            version: settings.version,
            build_id: settings.build_id,
            cipher: settings.cipher.id(),
            dh_public: client_public,
        },
    )
    .await?;

    let (server_public, server_seed) = match read_message(stream, settings.max_message).await? {
        HandshakeMessage::Encrypt {
            dh_public,
            server_seed,
        } => (dh_public, server_seed),
        HandshakeMessage::Error { result } => {
            return Err(match result {
                NetResult::VersionMismatch => HandshakeError::VersionMismatch {
                    local: settings.version,
                    remote: None,
                },
                NetResult::AlgorithmMismatch => HandshakeError::AlgorithmMismatch,
                other => HandshakeError::Rejected(other),
            })
        }
        other => {
            return Err(HandshakeError::Malformed(format!(
                "expected Encrypt, got {:?}",
                other
            )))
        }
    };

    let dh = settings.dh.clone();
    let algorithm = settings.cipher;
    let keys = worker
        .run(move || -> Result<_, HandshakeError> {
            let shared = pair.agree(&dh, &server_public)?;
            Ok(SessionKeys::derive(
                algorithm,
                &shared,
                &server_seed,
                KeyDirection::ClientToServer,
            )?)
        })
        .await??;

    Ok(Established {
        keys,
        version: settings.version,
        build_id: settings.build_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> HandshakeSettings {
        HandshakeSettings {
            build_id: 918,
            timeout: Duration::from_secs(5),
            ..HandshakeSettings::default()
        }
    }

    #[tokio::test]
    async fn test_keys_pair_up_after_exchange() {
        for cipher in [CipherAlgorithm::Rc4, CipherAlgorithm::ChaCha20] {
            let (mut client_io, mut server_io) = tokio::io::duplex(1024);
            let worker = CryptoWorker::new(2);
            let server_settings = HandshakeSettings { cipher, ..settings() };
            let client_settings = server_settings.clone();

            let server_worker = worker.clone();
            let server = tokio::spawn(async move {
                accept(&mut server_io, &server_settings, &server_worker).await
            });
            let mut client = connect(&mut client_io, &client_settings, &worker).await.unwrap();
            let mut server = server.await.unwrap().unwrap();

            assert_eq!(server.build_id, 918);
            let mut buf = b"shorah".to_vec();
            client.keys.outbound.encrypt(&mut buf).unwrap();
            server.keys.inbound.decrypt(&mut buf).unwrap();
            assert_eq!(buf, b"shorah");

            let mut reply = b"welcome".to_vec();
            server.keys.outbound.encrypt(&mut reply).unwrap();
            client.keys.inbound.decrypt(&mut reply).unwrap();
            assert_eq!(reply, b"welcome");
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_is_not_negotiated_down() {
        let (mut client_io, mut server_io) = tokio::io::duplex(1024);
        let worker = CryptoWorker::new(1);
        let server_settings = settings();
        let client_settings = HandshakeSettings { version: 1, ..settings() };

        let server_worker = worker.clone();
        let server = tokio::spawn(async move {
            accept(&mut server_io, &server_settings, &server_worker).await
        });
        let client_err = connect(&mut client_io, &client_settings, &worker).await.unwrap_err();
        assert!(matches!(
            client_err,
            HandshakeError::VersionMismatch { local: 1, remote: None }
        ));
        let server_err = server.await.unwrap().unwrap_err();
        assert!(matches!(
            server_err,
            HandshakeError::VersionMismatch { local: 2, remote: Some(1) }
        ));
    }

    #[tokio::test]
    async fn test_cipher_mismatch_rejected() {
        let (mut client_io, mut server_io) = tokio::io::duplex(1024);
        let worker = CryptoWorker::new(1);
        let server_settings = HandshakeSettings { cipher: CipherAlgorithm::Rc4, ..settings() };
        let client_settings = HandshakeSettings { cipher: CipherAlgorithm::ChaCha20, ..settings() };

        let server_worker = worker.clone();
        let server = tokio::spawn(async move {
            accept(&mut server_io, &server_settings, &server_worker).await
        });
        let err = connect(&mut client_io, &client_settings, &worker).await.unwrap_err();
        assert!(matches!(err, HandshakeError::AlgorithmMismatch));
        assert!(matches!(
            server.await.unwrap(),
            Err(HandshakeError::AlgorithmMismatch)
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (_client_io, mut server_io) = tokio::io::duplex(1024);
        let server_settings = HandshakeSettings {
            timeout: Duration::from_millis(50),
            ..settings()
        };
        let err = accept(&mut server_io, &server_settings, &CryptoWorker::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout));
    }

    #[tokio::test]
    async fn test_oversized_connect_rejected() {
        let (mut client_io, mut server_io) = tokio::io::duplex(1024);
        client_io.write_all(&[0, 0xFF, 0xFF]).await.unwrap();
        let err = accept(&mut server_io, &settings(), &CryptoWorker::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Oversized { length: 65535, max: 1024 }));
    }

    #[tokio::test]
    async fn test_out_of_order_message_is_malformed() {
        let (mut client_io, mut server_io) = tokio::io::duplex(1024);
        let stray = HandshakeMessage::Error { result: NetResult::Success };
        client_io.write_all(&stray.encode()).await.unwrap();
        let err = accept(&mut server_io, &settings(), &CryptoWorker::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_cancelled_jobs_keep_pool_bounded() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let worker = CryptoWorker::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut callers = Vec::new();
        for _ in 0..4 {
            let worker = worker.clone();
            let running = running.clone();
            let peak = peak.clone();
            callers.push(tokio::spawn(async move {
                let job = move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(300));
                    running.fetch_sub(1, Ordering::SeqCst);
                };
                tokio::time::timeout(Duration::from_millis(20), worker.run(job)).await
            }));
        }
        for caller in callers {
            assert!(caller.await.unwrap().is_err());
        }

        // Let the job that did start run to completion.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert_eq!(worker.run(|| 7).await.unwrap(), 7);
    }
}
