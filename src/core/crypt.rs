//! Session Cipher Keys
//!
//! A [`CryptoKey`] is an opaque capability: callers encrypt and decrypt
//! through it without knowing which stream cipher sits underneath.
//!
//! ```text
//! DH shared secret ──┬── RC4:      key = le(shared)[0..7] ^ serverSeed
//!   + serverSeed     └── ChaCha20: key = SHA-256(be(shared) || serverSeed)
//!                                  nonce = direction tag
//! ```
//!
//! Ciphertext has the same length as plaintext. There is no integrity tag:
//! a wrong key yields garbage that only frame validation can notice.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use rc4::consts::U7;
use rc4::{KeyInit, Rc4};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::bignum::BigNum;
use super::hash::{digest256, ChallengeHasher};

/// Bytes of seed material exchanged during the handshake.
pub const SEED_BYTES: usize = 7;

/// Server-chosen seed mixed into the session key.
pub type ServerSeed = [u8; SEED_BYTES];

/// Crypto errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptError {
    /// Key material has the wrong length for the algorithm.
    #[error("invalid key length for {0:?}")]
    InvalidKeyLength(CipherAlgorithm),

    /// Unknown algorithm identifier on the wire.
    #[error("unknown cipher id {0}")]
    UnknownAlgorithm(u8),

    /// Stream cipher ran out of keystream.
    #[error("keystream exhausted")]
    KeystreamExhausted,
}

/// Supported stream ciphers. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherAlgorithm {
    /// RC4 keyed by a 7-byte seed (legacy clients).
    Rc4,
    /// ChaCha20 keyed by a SHA-256 of the shared secret.
    ChaCha20,
}

impl CipherAlgorithm {
    /// Wire identifier.
    pub fn id(self) -> u8 {
        match self {
            CipherAlgorithm::Rc4 => 1,
            CipherAlgorithm::ChaCha20 => 2,
        }
    }

    /// Parse a wire identifier.
    pub fn from_id(id: u8) -> Result<Self, CryptError> {
        match id {
            1 => Ok(CipherAlgorithm::Rc4),
            2 => Ok(CipherAlgorithm::ChaCha20),
            other => Err(CryptError::UnknownAlgorithm(other)),
        }
    }
}

impl std::str::FromStr for CipherAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rc4" => Ok(CipherAlgorithm::Rc4),
            "chacha20" => Ok(CipherAlgorithm::ChaCha20),
            other => Err(format!("unknown cipher '{}'", other)),
        }
    }
}

/// Which way traffic flows through a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    /// Client to server.
    ClientToServer,
    /// Server to client.
    ServerToClient,
}

impl KeyDirection {
    fn nonce(self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[0] = match self {
            KeyDirection::ClientToServer => 0x43,
            KeyDirection::ServerToClient => 0x53,
        };
        nonce
    }
}

/// Opaque stream-cipher state owned by one side of one connection.
///
/// Deliberately neither `Clone` nor `Serialize`: keystream position is part
/// of the state and must never be duplicated.
pub enum CryptoKey {
    /// RC4 state.
    Rc4(Box<Rc4<U7>>),
    /// ChaCha20 state.
    ChaCha20(Box<ChaCha20>),
}

impl CryptoKey {
    /// Derive the key for one direction of a session.
    pub fn derive_session(
        algorithm: CipherAlgorithm,
        shared_secret: &BigNum,
        server_seed: &ServerSeed,
        direction: KeyDirection,
    ) -> Result<Self, CryptError> {
        match algorithm {
            CipherAlgorithm::Rc4 => {
                let mut seed = [0u8; SEED_BYTES];
                let le = shared_secret.to_le_bytes();
                for (i, byte) in seed.iter_mut().enumerate() {
                    *byte = le.get(i).copied().unwrap_or(0) ^ server_seed[i];
                }
                Self::rc4(&seed)
            }
            CipherAlgorithm::ChaCha20 => {
                let mut hasher = ChallengeHasher::new(b"");
                hasher.update_bytes(&shared_secret.to_be_bytes());
                hasher.update_bytes(server_seed);
                let key = hasher.finalize();
                Ok(Self::chacha(key, direction.nonce()))
            }
        }
    }

    /// Key from a well-known seed, for traffic that is obfuscated rather
    /// than secret.
    pub fn from_seed(algorithm: CipherAlgorithm, seed: &[u8]) -> Result<Self, CryptError> {
        let digest = digest256(seed);
        match algorithm {
            CipherAlgorithm::Rc4 => Self::rc4(&digest[..SEED_BYTES]),
            CipherAlgorithm::ChaCha20 => Ok(Self::chacha(digest, [0u8; 12])),
        }
    }

    fn rc4(seed: &[u8]) -> Result<Self, CryptError> {
        Rc4::<U7>::new_from_slice(seed)
            .map(|cipher| CryptoKey::Rc4(Box::new(cipher)))
            .map_err(|_| CryptError::InvalidKeyLength(CipherAlgorithm::Rc4))
    }

    fn chacha(key: [u8; 32], nonce: [u8; 12]) -> Self {
        CryptoKey::ChaCha20(Box::new(ChaCha20::new(&key.into(), &nonce.into())))
    }

    /// Algorithm tag.
    pub fn algorithm(&self) -> CipherAlgorithm {
        match self {
            CryptoKey::Rc4(_) => CipherAlgorithm::Rc4,
            CryptoKey::ChaCha20(_) => CipherAlgorithm::ChaCha20,
        }
    }

    /// Encrypt in place. Output length equals input length.
    pub fn encrypt(&mut self, buf: &mut [u8]) -> Result<(), CryptError> {
        self.apply(buf)
    }

    /// Decrypt in place. A wrong key produces garbage, not an error.
    pub fn decrypt(&mut self, buf: &mut [u8]) -> Result<(), CryptError> {
        self.apply(buf)
    }

    fn apply(&mut self, buf: &mut [u8]) -> Result<(), CryptError> {
        let result = match self {
            CryptoKey::Rc4(cipher) => cipher.try_apply_keystream(buf),
            CryptoKey::ChaCha20(cipher) => cipher.try_apply_keystream(buf),
        };
        result.map_err(|_| CryptError::KeystreamExhausted)
    }
}

impl fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CryptoKey({:?})", self.algorithm())
    }
}

/// A pair of keys for one connection.
#[derive(Debug)]
pub struct SessionKeys {
    /// Applied to outgoing frames.
    pub outbound: CryptoKey,
    /// Applied to incoming frames.
    pub inbound: CryptoKey,
}

impl SessionKeys {
    /// Keys for the side that sends in `outgoing` direction.
    pub fn derive(
        algorithm: CipherAlgorithm,
        shared_secret: &BigNum,
        server_seed: &ServerSeed,
        outgoing: KeyDirection,
    ) -> Result<Self, CryptError> {
        let incoming = match outgoing {
            KeyDirection::ClientToServer => KeyDirection::ServerToClient,
            KeyDirection::ServerToClient => KeyDirection::ClientToServer,
        };
        Ok(Self {
            outbound: CryptoKey::derive_session(algorithm, shared_secret, server_seed, outgoing)?,
            inbound: CryptoKey::derive_session(algorithm, shared_secret, server_seed, incoming)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: ServerSeed = [1, 2, 3, 4, 5, 6, 7];

    fn secret() -> BigNum {
        BigNum::from_hex("1234567890abcdef1234567890abcdef").unwrap()
    }

    #[test]
    fn test_algorithm_ids() {
        for alg in [CipherAlgorithm::Rc4, CipherAlgorithm::ChaCha20] {
            assert_eq!(CipherAlgorithm::from_id(alg.id()).unwrap(), alg);
        }
        assert_eq!(
            CipherAlgorithm::from_id(9),
            Err(CryptError::UnknownAlgorithm(9))
        );
        assert_eq!("ChaCha20".parse::<CipherAlgorithm>(), Ok(CipherAlgorithm::ChaCha20));
    }

    #[test]
    fn test_client_and_server_keys_pair_up() {
        for alg in [CipherAlgorithm::Rc4, CipherAlgorithm::ChaCha20] {
            let mut client =
                SessionKeys::derive(alg, &secret(), &SEED, KeyDirection::ClientToServer).unwrap();
            let mut server =
                SessionKeys::derive(alg, &secret(), &SEED, KeyDirection::ServerToClient).unwrap();

            let plain = b"hello relto".to_vec();
            let mut buf = plain.clone();
            client.outbound.encrypt(&mut buf).unwrap();
            assert_ne!(buf, plain);
            assert_eq!(buf.len(), plain.len());
            server.inbound.decrypt(&mut buf).unwrap();
            assert_eq!(buf, plain);

            let mut reply = b"welcome".to_vec();
            server.outbound.encrypt(&mut reply).unwrap();
            client.inbound.decrypt(&mut reply).unwrap();
            assert_eq!(reply, b"welcome");
        }
    }

    #[test]
    fn test_keystream_is_continuous() {
        let mut a = CryptoKey::derive_session(
            CipherAlgorithm::ChaCha20,
            &secret(),
            &SEED,
            KeyDirection::ClientToServer,
        )
        .unwrap();
        let mut b = CryptoKey::derive_session(
            CipherAlgorithm::ChaCha20,
            &secret(),
            &SEED,
            KeyDirection::ClientToServer,
        )
        .unwrap();

        let mut whole = vec![0u8; 20];
        a.encrypt(&mut whole).unwrap();

        let mut first = vec![0u8; 7];
        let mut rest = vec![0u8; 13];
        b.encrypt(&mut first).unwrap();
        b.encrypt(&mut rest).unwrap();
        first.extend(rest);
        assert_eq!(whole, first);
    }

    #[test]
    fn test_wrong_key_yields_garbage() {
        let mut enc = CryptoKey::from_seed(CipherAlgorithm::Rc4, b"right").unwrap();
        let mut dec = CryptoKey::from_seed(CipherAlgorithm::Rc4, b"wrong").unwrap();
        let mut buf = b"attack at dawn".to_vec();
        enc.encrypt(&mut buf).unwrap();
        dec.decrypt(&mut buf).unwrap();
        assert_ne!(buf, b"attack at dawn");
    }

    #[test]
    fn test_server_seed_changes_key() {
        let mut a = CryptoKey::derive_session(
            CipherAlgorithm::Rc4,
            &secret(),
            &SEED,
            KeyDirection::ClientToServer,
        )
        .unwrap();
        let mut b = CryptoKey::derive_session(
            CipherAlgorithm::Rc4,
            &secret(),
            &[0; SEED_BYTES],
            KeyDirection::ClientToServer,
        )
        .unwrap();
        let mut x = vec![0u8; 16];
        let mut y = vec![0u8; 16];
        a.encrypt(&mut x).unwrap();
        b.encrypt(&mut y).unwrap();
        assert_ne!(x, y);
    }
}
