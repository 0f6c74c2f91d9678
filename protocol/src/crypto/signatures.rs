//! # Digital Signatures
//!
//! Free-function wrappers around [`Keypair::sign`] and [`PublicKey::verify`],
//! plus a `Result`-returning variant for call sites that want to propagate
//! the failure with `?`.

use thiserror::Error;

use super::keys::{Keypair, PublicKey, Signature};

/// Signature verification failure.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Sign `message` with `keypair`.
pub fn sign(keypair: &Keypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify `signature` over `message` against `public_key`.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

/// Like [`verify`], but as a `Result`.
pub fn verify_strict(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    if verify(public_key, message, signature) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}
