//! Signed call envelopes.
//!
//! Every external entry point reaches the runtime as a [`SignedCall`]: the
//! [`Call`] itself, the signer's public key, a per-account nonce and an
//! Ed25519 signature over
//!
//! ```text
//! "redpacket-call-v1" || nonce (u64 LE) || bincode(call)
//! ```
//!
//! The domain tag keeps these signatures from being valid for anything
//! else signed with the same key. The nonce is covered by the signature, so
//! a replayed envelope can be told apart from a fresh one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use redpacket_protocol::crypto::{Keypair, PublicKey, Signature};
use redpacket_protocol::identity::{Address, AuthError, Caller};
use redpacket_protocol::ledger::TransferItem;

use crate::red_packet::PacketId;

const CALL_DOMAIN: &[u8] = b"redpacket-call-v1";

#[derive(Debug, Error)]
pub enum CallError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("call encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Every public entry point of the token and the distributor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    /// Mint the configured supply to the token admin.
    Init,
    Transfer {
        to: Address,
        amount: u64,
    },
    TransferMulti {
        items: Vec<TransferItem>,
    },
    Approve {
        spender: Address,
        amount: u64,
    },
    TransferFrom {
        owner: Address,
        to: Address,
        amount: u64,
    },
    /// Fund a new red packet from the caller's allowance to the distributor.
    Deposit {
        amount: u64,
        share_count: u64,
    },
    Claim {
        packet_id: PacketId,
    },
}

impl Call {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Call::Init => "init",
            Call::Transfer { .. } => "transfer",
            Call::TransferMulti { .. } => "transfer_multi",
            Call::Approve { .. } => "approve",
            Call::TransferFrom { .. } => "transfer_from",
            Call::Deposit { .. } => "deposit",
            Call::Claim { .. } => "claim",
        }
    }
}

/// A [`Call`] together with the proof of who sent it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedCall {
    pub signer: PublicKey,
    pub nonce: u64,
    pub call: Call,
    pub signature: Signature,
}

impl SignedCall {
    /// Sign `call` with `keypair` at `nonce`.
    pub fn sign(keypair: &Keypair, nonce: u64, call: Call) -> Result<Self, CallError> {
        let message = signing_message(nonce, &call)?;
        Ok(Self {
            signer: keypair.public_key(),
            nonce,
            signature: keypair.sign(&message),
            call,
        })
    }

    /// Address the call claims to come from. Unverified until
    /// [`authenticate`](Self::authenticate) succeeds.
    pub fn claimed_address(&self) -> Address {
        Address::from_public_key(&self.signer)
    }

    /// Verify the signature and return the proven caller.
    pub fn authenticate(&self) -> Result<Caller, CallError> {
        let message = signing_message(self.nonce, &self.call)?;
        Ok(Caller::authenticate(&self.signer, &message, &self.signature)?)
    }
}

/// The exact bytes a [`SignedCall`] signature covers.
pub fn signing_message(nonce: u64, call: &Call) -> Result<Vec<u8>, CallError> {
    let encoded = bincode::serialize(call)?;
    let mut buf = Vec::with_capacity(CALL_DOMAIN.len() + 8 + encoded.len());
    buf.extend_from_slice(CALL_DOMAIN);
    buf.extend_from_slice(&nonce.to_le_bytes());
    buf.extend_from_slice(&encoded);
    Ok(buf)
}
