//! # Cryptographic Primitives
//!
//! Everything that proves a caller is who they claim to be flows through
//! here:
//!
//! - **Ed25519** for signing calls.
//! - **BLAKE3** for deriving addresses from public keys and contract labels.
//!
//! These are thin, type-safe wrappers around audited crates. No hand-rolled
//! curve arithmetic lives here.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, domain_hash};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use signatures::{sign, verify, SignatureError};
