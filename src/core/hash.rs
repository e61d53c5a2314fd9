//! Digests for Password and Challenge Verification
//!
//! Two digest widths are used by the protocol:
//! - 128-bit (MD5) for identifier derivation
//! - 256-bit (SHA-256) for password and challenge-response hashes
//!
//! Neither is used to protect traffic; that is the session cipher's job.

use md5::Md5;
use sha2::{Digest, Sha256};

/// 128-bit digest output.
pub type Digest128 = [u8; 16];

/// 256-bit digest output.
pub type Digest256 = [u8; 32];

/// Incremental SHA-256 hasher with a domain separator.
///
/// Integers are absorbed little-endian and strings as UTF-16LE, matching
/// the wire encoding.
pub struct ChallengeHasher {
    hasher: Sha256,
}

impl ChallengeHasher {
    /// Create a hasher with a domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a string as UTF-16LE units.
    pub fn update_utf16(&mut self, text: &str) {
        for unit in text.encode_utf16() {
            self.hasher.update(unit.to_le_bytes());
        }
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> Digest256 {
        self.hasher.finalize().into()
    }
}

/// 128-bit digest of arbitrary data.
pub fn digest128(data: &[u8]) -> Digest128 {
    Md5::digest(data).into()
}

/// 256-bit digest of arbitrary data.
pub fn digest256(data: &[u8]) -> Digest256 {
    Sha256::digest(data).into()
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Digest256 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Stored credential for an account: hash of password and lowercased name.
pub fn name_pass_hash(account_name: &str, password: &str) -> Digest256 {
    let mut hasher = ChallengeHasher::new(b"PLASMA_NAME_PASS_V1");
    hasher.update_utf16(password);
    hasher.update_utf16(&account_name.to_lowercase());
    hasher.finalize()
}

/// Challenge-response proof sent at login.
///
/// Both challenges take part so that a captured proof cannot be replayed
/// against a different server challenge.
pub fn challenge_hash(
    client_challenge: u32,
    server_challenge: u32,
    name_pass_hash: &Digest256,
) -> Digest256 {
    let mut hasher = ChallengeHasher::new(b"PLASMA_CHALLENGE_V1");
    hasher.update_u32(client_challenge);
    hasher.update_u32(server_challenge);
    hasher.update_bytes(name_pass_hash);
    hasher.finalize()
}
