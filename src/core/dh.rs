//! Diffie-Hellman Key Agreement
//!
//! Each side picks a random private exponent `x`, publishes `g^x mod p`
//! as a fixed-width big-endian buffer, and raises the peer's value to its
//! own exponent. Both arrive at `g^(xy) mod p`.

use rand::RngCore;

use super::bignum::{BigNum, BigNumError};

/// 768-bit MODP group 1 prime (RFC 2409).
const OAKLEY_GROUP1_PRIME: &str = "
    FFFFFFFF FFFFFFFF C90FDAA2 2168C234 C4C6628B 80DC1CD1
    29024E08 8A67CC74 020BBEA6 3B139B22 514A0879 8E3404DD
    EF9519B3 CD3A431B 302B0A6D F25F1437 4FE1356D 6D51C245
    E485B576 625E7EC6 F44C42E9 A63A3620 FFFFFFFF FFFFFFFF";

/// Default private exponent length in bytes.
pub const DEFAULT_PRIVATE_BYTES: usize = 32;

/// Diffie-Hellman errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DhError {
    /// Arithmetic failure.
    #[error("arithmetic: {0}")]
    Arithmetic(#[from] BigNumError),

    /// Peer value is out of range or has the wrong width.
    #[error("invalid public value")]
    InvalidPublicValue,

    /// Group parameters are unusable.
    #[error("invalid group parameters: {0}")]
    InvalidParams(String),
}

/// Group parameters shared by client and server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    /// Generator `g`.
    pub generator: BigNum,
    /// Prime modulus `p`.
    pub modulus: BigNum,
    /// Private exponent length in bytes.
    pub private_bytes: usize,
}

impl Default for DhParams {
    fn default() -> Self {
        Self::oakley_group1()
    }
}

impl DhParams {
    /// The 768-bit Oakley group with generator 2.
    pub fn oakley_group1() -> Self {
        Self {
            generator: BigNum::from_u64(2),
            modulus: BigNum::from_hex(OAKLEY_GROUP1_PRIME).unwrap_or_default(),
            private_bytes: DEFAULT_PRIVATE_BYTES,
        }
    }

    /// Build from hex strings.
    pub fn from_hex(generator: &str, modulus: &str, private_bytes: usize) -> Result<Self, DhError> {
        let params = Self {
            generator: BigNum::from_hex(generator)
                .map_err(|e| DhError::InvalidParams(format!("generator: {}", e)))?,
            modulus: BigNum::from_hex(modulus)
                .map_err(|e| DhError::InvalidParams(format!("modulus: {}", e)))?,
            private_bytes,
        };
        params.validate()?;
        Ok(params)
    }

    /// Width of public values on the wire.
    pub fn key_bytes(&self) -> usize {
        (self.modulus.bit_len() + 7) / 8
    }

    /// Sanity-check the group.
    pub fn validate(&self) -> Result<(), DhError> {
        if self.modulus.bit_len() < 64 {
            return Err(DhError::InvalidParams("modulus too small".into()));
        }
        if self.generator <= BigNum::one() || self.generator >= self.modulus {
            return Err(DhError::InvalidParams("generator out of range".into()));
        }
        if self.private_bytes == 0 {
            return Err(DhError::InvalidParams("empty private exponent".into()));
        }
        Ok(())
    }
}

/// One side's key pair.
pub struct DhKeyPair {
    private: BigNum,
    public: BigNum,
}

impl DhKeyPair {
    /// Generate a fresh key pair.
    pub fn generate<R: RngCore>(params: &DhParams, rng: &mut R) -> Result<Self, DhError> {
        let mut bytes = vec![0u8; params.private_bytes];
        rng.fill_bytes(&mut bytes);
        // Full-length exponent; never zero.
        bytes[0] |= 0x80;
        Self::from_private(params, BigNum::from_be_bytes(&bytes))
    }

    /// Build from a known private exponent.
    pub fn from_private(params: &DhParams, private: BigNum) -> Result<Self, DhError> {
        let public = params.generator.modpow(&private, &params.modulus)?;
        Ok(Self { private, public })
    }

    /// Public value.
    pub fn public(&self) -> &BigNum {
        &self.public
    }

    /// Public value as the fixed-width wire buffer.
    pub fn public_bytes(&self, params: &DhParams) -> Result<Vec<u8>, DhError> {
        Ok(self.public.to_be_bytes_padded(params.key_bytes())?)
    }

    /// Compute the shared secret from the peer's wire buffer.
    pub fn agree(&self, params: &DhParams, peer_public: &[u8]) -> Result<BigNum, DhError> {
        if peer_public.len() != params.key_bytes() {
            return Err(DhError::InvalidPublicValue);
        }
        let peer = BigNum::from_be_bytes(peer_public);
        let upper = params.modulus.sub(&BigNum::one())?;
        // Reject 0, 1 and p-1, which would pin the secret to a known value.
        if peer <= BigNum::one() || peer >= upper {
            return Err(DhError::InvalidPublicValue);
        }
        Ok(peer.modpow(&self.private, &params.modulus)?)
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
