//! Core primitives.
//!
//! Big-number arithmetic, Diffie-Hellman, session ciphers and digests,
//! plus the small allocators and RNG the network and game layers share.

pub mod bignum;
pub mod crypt;
pub mod dh;
pub mod hash;
pub mod idpool;
pub mod rng;

// Re-export core types
pub use bignum::{BigNum, BigNumError};
pub use crypt::{CipherAlgorithm, CryptError, CryptoKey, KeyDirection, ServerSeed, SessionKeys};
pub use dh::{DhError, DhKeyPair, DhParams};
pub use idpool::IdPool;
pub use rng::GameRng;
