//! # Authenticated Callers
//!
//! On a chain, "the sender" is implicit: the host checked the transaction
//! signature before the contract ran. Here that check is made explicit.
//! A [`Caller`] can only be obtained by
//!
//! - verifying a signature ([`Caller::authenticate`]),
//! - holding the signing key in-process ([`Caller::from_keypair`]), or
//! - being a contract the runtime invokes on its own behalf
//!   ([`Caller::contract`]).
//!
//! Ledger and distributor operations take `&Caller` and act only on the
//! caller's own address, which is how `CheckWitness`-style authorization is
//! expressed in this codebase.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::address::Address;
use crate::crypto::keys::{Keypair, PublicKey, Signature};

/// Authentication failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("signature does not verify against the claimed signer")]
    InvalidSignature,
}

/// How a caller's identity was established.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallerKind {
    /// An external account that proved control of its key.
    Account(PublicKey),
    /// A contract acting for its own address.
    Contract,
}

/// An address whose control has been proven for the current call.
///
/// Not `Deserialize`: a caller read back from bytes would be an unproven one.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    address: Address,
    kind: CallerKind,
}

impl Caller {
    /// Verify `signature` over `message` and return the signer as a caller.
    pub fn authenticate(
        signer: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> Result<Self, AuthError> {
        if !signer.verify(message, signature) {
            return Err(AuthError::InvalidSignature);
        }
        Ok(Self {
            address: Address::from_public_key(signer),
            kind: CallerKind::Account(*signer),
        })
    }

    /// Holding the secret key is proof enough for in-process callers.
    pub fn from_keypair(keypair: &Keypair) -> Self {
        let public_key = keypair.public_key();
        Self {
            address: Address::from_public_key(&public_key),
            kind: CallerKind::Account(public_key),
        }
    }

    /// The identity a contract uses when it calls another contract.
    ///
    /// Only the runtime hosting the contract should construct these.
    pub fn contract(address: Address) -> Self {
        Self {
            address,
            kind: CallerKind::Contract,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn kind(&self) -> CallerKind {
        self.kind
    }

    pub fn is_contract(&self) -> bool {
        matches!(self.kind, CallerKind::Contract)
    }
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CallerKind::Account(_) => write!(f, "Caller(account {})", self.address),
            CallerKind::Contract => write!(f, "Caller(contract {})", self.address),
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
