//! # Host Runtime
//!
//! Owns the token ledger and the distributor and executes [`SignedCall`]s
//! against them, one at a time.
//!
//! ## Execution
//!
//! 1. Verify the envelope signature (outside the lock).
//! 2. Take the state lock and check `nonce == nonce_of(signer)`.
//! 3. Apply the call to the live state. Ledger and distributor operations
//!    check every precondition before they write anything, and
//!    `transfer_multi` stages its batch internally, so a failing call has
//!    not touched the state when it returns.
//! 4. On success, drain the emitted events and bump the signer's nonce and
//!    the global sequence. On failure leave both alone.
//!
//! A rejected call therefore changes nothing: not balances, not packets,
//! not the signer's nonce.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use redpacket_protocol::config::{
    self, ConfigError, DistributorConfig, TokenConfig, Validate, DEFAULT_DISTRIBUTOR_LABEL,
    DEFAULT_TOKEN_LABEL,
};
use redpacket_protocol::crypto::blake3_hash;
use redpacket_protocol::identity::{Address, Caller};
use redpacket_protocol::ledger::{FungibleLedger, LedgerError, LedgerEvent, TokenLedger};
use redpacket_protocol::logging::LoggingConfig;

use crate::call::{Call, CallError, SignedCall};
use crate::red_packet::{Distributor, DistributorError, DistributorEvent, Packet, PacketId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The envelope failed to authenticate.
    #[error("call rejected: {0}")]
    Call(#[from] CallError),

    #[error("bad nonce for {account}: expected {expected}, got {got}")]
    BadNonce {
        account: Address,
        expected: u64,
        got: u64,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Distributor(#[from] DistributorError),

    #[error("state snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything needed to deploy the token and the distributor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub token: TokenConfig,
    #[serde(default)]
    pub distributor: DistributorConfig,
    /// The token contract's address is derived from this label.
    #[serde(default = "default_token_label")]
    pub token_label: String,
    /// The distributor's address is derived from this label.
    #[serde(default = "default_distributor_label")]
    pub distributor_label: String,
    /// Subscriber settings for the embedding process. The runtime itself
    /// only emits events.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_token_label() -> String {
    DEFAULT_TOKEN_LABEL.to_string()
}

fn default_distributor_label() -> String {
    DEFAULT_DISTRIBUTOR_LABEL.to_string()
}

impl RuntimeConfig {
    /// Default token and distributor, administered by `admin`.
    pub fn new(admin: Address) -> Self {
        Self {
            token: TokenConfig::new(admin),
            distributor: DistributorConfig::default(),
            token_label: default_token_label(),
            distributor_label: default_distributor_label(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        config::from_json_file(path)
    }
}

impl Validate for RuntimeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.token.validate()?;
        self.distributor.validate()?;
        if self.token_label.trim().is_empty() || self.distributor_label.trim().is_empty() {
            return Err(ConfigError::Invalid("contract labels must be non-empty".into()));
        }
        if self.token_label == self.distributor_label {
            return Err(ConfigError::Invalid(
                "token and distributor must be deployed under different labels".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// What a successful call returned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Initialized { supply: u64 },
    Transferred,
    Approved,
    Deposited { packet_id: PacketId },
    Claimed { packet_id: PacketId, amount: u64 },
}

/// An event emitted by one of the hosted contracts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Ledger(LedgerEvent),
    Distributor(DistributorEvent),
}

/// Proof that a call committed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Receipt {
    /// Position of this call among all committed calls, starting at 1.
    pub sequence: u64,
    pub caller: Address,
    pub nonce: u64,
    pub call: String,
    pub outcome: Outcome,
    pub events: Vec<Event>,
    /// Hex BLAKE3 digest of the world state after this call.
    pub state_root: String,
    pub executed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// World state
// ---------------------------------------------------------------------------

/// Everything the runtime persists.
#[derive(Debug, Serialize, Deserialize)]
struct WorldState {
    token: TokenLedger,
    distributor: Distributor,
    /// Next expected nonce per account. Missing means zero.
    nonces: BTreeMap<Address, u64>,
    /// Number of committed calls.
    sequence: u64,
}

impl WorldState {
    fn nonce_of(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    fn apply(&mut self, caller: &Caller, call: &Call) -> Result<Outcome, RuntimeError> {
        let outcome = match call {
            Call::Init => Outcome::Initialized {
                supply: self.token.init(caller)?,
            },
            Call::Transfer { to, amount } => {
                self.token.transfer(caller, to, *amount)?;
                Outcome::Transferred
            }
            Call::TransferMulti { items } => {
                self.token.transfer_multi(caller, items)?;
                Outcome::Transferred
            }
            Call::Approve { spender, amount } => {
                self.token.approve(caller, spender, *amount)?;
                Outcome::Approved
            }
            Call::TransferFrom { owner, to, amount } => {
                self.token.transfer_from(caller, owner, to, *amount)?;
                Outcome::Transferred
            }
            Call::Deposit {
                amount,
                share_count,
            } => Outcome::Deposited {
                packet_id: self
                    .distributor
                    .deposit(&mut self.token, caller, *amount, *share_count)?,
            },
            Call::Claim { packet_id } => Outcome::Claimed {
                packet_id: *packet_id,
                amount: self.distributor.claim(&mut self.token, caller, *packet_id)?,
            },
        };
        Ok(outcome)
    }

    /// Ledger events first, then distributor events. Within one call that is
    /// also the order they happened in.
    fn drain_events(&mut self) -> Vec<Event> {
        let mut events: Vec<Event> = self.token.take_events().into_iter().map(Event::Ledger).collect();
        events.extend(self.distributor.take_events().into_iter().map(Event::Distributor));
        events
    }

    fn root(&self) -> [u8; 32] {
        blake3_hash(&serde_json::to_vec(self).unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Hosts the token and the distributor behind a single lock.
pub struct Runtime {
    token_address: Address,
    distributor_address: Address,
    state: Mutex<WorldState>,
}

impl Runtime {
    /// Deploys an uninitialized token and an empty distributor bound to it.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let token_address = Address::for_contract(&config.token_label);
        let distributor_address = Address::for_contract(&config.distributor_label);
        let token = TokenLedger::new(token_address, &config.token);
        let distributor = Distributor::new(distributor_address, token_address, config.distributor);

        info!(
            token = %token_address,
            distributor = %distributor_address,
            admin = %config.token.admin,
            "runtime deployed"
        );

        Ok(Self {
            token_address,
            distributor_address,
            state: Mutex::new(WorldState {
                token,
                distributor,
                nonces: BTreeMap::new(),
                sequence: 0,
            }),
        })
    }

    /// Authenticates and runs one call. Either the whole call commits and a
    /// receipt comes back, or nothing changes.
    pub fn execute(&self, signed: &SignedCall) -> Result<Receipt, RuntimeError> {
        let caller = signed.authenticate().map_err(|e| {
            warn!(signer = %signed.claimed_address(), call = signed.call.name(), error = %e, "call rejected");
            e
        })?;
        let account = caller.address();

        let mut state = self.state.lock();

        let expected = state.nonce_of(&account);
        if signed.nonce != expected {
            warn!(account = %account, expected, got = signed.nonce, "bad nonce");
            return Err(RuntimeError::BadNonce {
                account,
                expected,
                got: signed.nonce,
            });
        }

        let outcome = match state.apply(&caller, &signed.call) {
            Ok(outcome) => outcome,
            Err(e) => {
                // Events are only pushed on success; clear the buffers anyway.
                state.drain_events();
                warn!(account = %account, call = signed.call.name(), error = %e, "call failed");
                return Err(e);
            }
        };

        let events = state.drain_events();
        state.nonces.insert(account, expected + 1);
        state.sequence += 1;
        let state_root = hex::encode(state.root());
        let sequence = state.sequence;
        drop(state);

        info!(
            sequence,
            account = %account,
            call = signed.call.name(),
            events = events.len(),
            "call committed"
        );
        debug!(?outcome, state_root = %state_root, "receipt");

        Ok(Receipt {
            sequence,
            caller: account,
            nonce: expected,
            call: signed.call.name().to_string(),
            outcome,
            events,
            state_root,
            executed_at: Utc::now(),
        })
    }

    pub fn token_address(&self) -> Address {
        self.token_address
    }

    pub fn distributor_address(&self) -> Address {
        self.distributor_address
    }

    pub fn balance_of(&self, account: &Address) -> u64 {
        self.state.lock().token.balance_of(account)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.state.lock().token.allowance(owner, spender)
    }

    pub fn total_supply(&self) -> u64 {
        self.state.lock().token.total_supply()
    }

    pub fn packet(&self, packet_id: PacketId) -> Option<Packet> {
        self.state.lock().distributor.packet(packet_id).cloned()
    }

    pub fn next_packet_id(&self) -> PacketId {
        self.state.lock().distributor.next_packet_id()
    }

    pub fn has_claimed(&self, packet_id: PacketId, claimant: &Address) -> bool {
        self.state.lock().distributor.has_claimed(packet_id, claimant)
    }

    /// Unclaimed shares plus remainders across all packets.
    pub fn outstanding(&self) -> u64 {
        self.state.lock().distributor.outstanding()
    }

    /// Nonce the next call from `account` must carry.
    pub fn nonce_of(&self, account: &Address) -> u64 {
        self.state.lock().nonce_of(account)
    }

    /// Number of calls committed so far.
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    /// BLAKE3 digest of the current world state.
    pub fn state_root(&self) -> [u8; 32] {
        self.state.lock().root()
    }

    /// The whole world state as pretty-printed JSON.
    pub fn export_state(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string_pretty(&*self.state.lock())?)
    }

    /// Rebuilds a runtime from [`export_state`](Self::export_state) output.
    ///
    /// The distributor is checked against the restored ledger before the
    /// runtime accepts the snapshot: packet ids, share arithmetic and claim
    /// counts must be consistent, and its balance must cover what it owes.
    pub fn from_state(json: &str) -> Result<Self, RuntimeError> {
        let state: WorldState = serde_json::from_str(json)?;
        let token_address = state.token.address();
        let distributor_address = state.distributor.address();
        if let Err(e) = state.distributor.check_integrity(&state.token) {
            warn!(error = %e, "snapshot rejected");
            return Err(e.into());
        }
        info!(sequence = state.sequence, "runtime restored from snapshot");
        Ok(Self {
            token_address,
            distributor_address,
            state: Mutex::new(state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redpacket_protocol::crypto::Keypair;
    use redpacket_protocol::ledger::TransferItem;
    use redpacket_protocol::logging::LogFormat;

    fn runtime_with_admin() -> (Runtime, Keypair) {
        let admin = Keypair::from_seed(&[9u8; 32]);
        let config = RuntimeConfig::new(admin.address());
        (Runtime::new(config).unwrap(), admin)
    }

    #[test]
    fn new_derives_contract_addresses_from_labels() {
        let (rt, _) = runtime_with_admin();
        assert_eq!(rt.token_address(), Address::for_contract(DEFAULT_TOKEN_LABEL));
        assert_eq!(rt.distributor_address(), Address::for_contract(DEFAULT_DISTRIBUTOR_LABEL));
        assert_eq!(rt.total_supply(), 0);
        assert_eq!(rt.sequence(), 0);
    }

    #[test]
    fn config_rejects_shared_labels() {
        let mut config = RuntimeConfig::new(Address::for_contract("admin"));
        config.distributor_label = config.token_label.clone();
        assert!(matches!(Runtime::new(config), Err(RuntimeError::Config(_))));
    }

    #[test]
    fn config_json_fills_defaults() {
        let admin = Address::for_contract("admin");
        let json = format!(r#"{{"token":{{"name":"Lucky","symbol":"LCK","admin":"{admin}"}}}}"#);
        let cfg: RuntimeConfig = config::from_json_str(&json).unwrap();
        assert_eq!(cfg.distributor, DistributorConfig::default());
        assert_eq!(cfg.token_label, DEFAULT_TOKEN_LABEL);
        assert_eq!(cfg.distributor_label, DEFAULT_DISTRIBUTOR_LABEL);
        assert_eq!(cfg.logging, LoggingConfig::default());
    }

    #[test]
    fn config_json_reads_logging_section() {
        let admin = Address::for_contract("admin");
        let json = format!(
            r#"{{"token":{{"name":"Lucky","symbol":"LCK","admin":"{admin}"}},
                "logging":{{"filter":"redpacket_contracts=trace","format":"json"}}}}"#
        );
        let cfg: RuntimeConfig = config::from_json_str(&json).unwrap();
        assert_eq!(cfg.logging.filter, "redpacket_contracts=trace");
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn init_commits_and_bumps_nonce() {
        let (rt, admin) = runtime_with_admin();
        let receipt = rt
            .execute(&SignedCall::sign(&admin, 0, Call::Init).unwrap())
            .unwrap();

        assert_eq!(receipt.sequence, 1);
        assert_eq!(receipt.caller, admin.address());
        assert!(matches!(receipt.outcome, Outcome::Initialized { .. }));
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(receipt.state_root.len(), 64);
        assert_eq!(rt.nonce_of(&admin.address()), 1);
        assert_eq!(rt.balance_of(&admin.address()), rt.total_supply());
    }

    #[test]
    fn failed_call_leaves_nonce_and_state() {
        let (rt, admin) = runtime_with_admin();
        let stranger = Keypair::generate();
        let root_before = rt.state_root();

        let err = rt
            .execute(&SignedCall::sign(&stranger, 0, Call::Init).unwrap())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Ledger(LedgerError::Unauthorized(_))));
        assert_eq!(rt.nonce_of(&stranger.address()), 0);
        assert_eq!(rt.sequence(), 0);
        assert_eq!(rt.state_root(), root_before);

        // The admin's own nonce 0 is still usable.
        rt.execute(&SignedCall::sign(&admin, 0, Call::Init).unwrap())
            .unwrap();
    }

    #[test]
    fn rejected_calls_leave_no_trace_in_later_receipts() {
        let (rt, admin) = runtime_with_admin();
        let bob = Keypair::generate();
        rt.execute(&SignedCall::sign(&admin, 0, Call::Init).unwrap())
            .unwrap();
        let supply = rt.total_supply();
        let root_before = rt.state_root();

        // Second item overdraws; the first must not stick.
        let batch = Call::TransferMulti {
            items: vec![
                TransferItem {
                    from: admin.address(),
                    to: bob.address(),
                    amount: 10,
                },
                TransferItem {
                    from: admin.address(),
                    to: bob.address(),
                    amount: supply,
                },
            ],
        };
        assert!(rt.execute(&SignedCall::sign(&admin, 1, batch).unwrap()).is_err());
        let deposit = Call::Deposit {
            amount: 100,
            share_count: 2,
        };
        assert!(rt.execute(&SignedCall::sign(&admin, 1, deposit).unwrap()).is_err());
        assert_eq!(rt.state_root(), root_before);
        assert_eq!(rt.balance_of(&bob.address()), 0);
        assert_eq!(rt.next_packet_id(), 0);

        let transfer = Call::Transfer {
            to: bob.address(),
            amount: 5,
        };
        let receipt = rt
            .execute(&SignedCall::sign(&admin, 1, transfer).unwrap())
            .unwrap();
        assert_eq!(receipt.sequence, 2);
        assert_eq!(receipt.events.len(), 1);
        assert_ne!(rt.state_root(), root_before);
    }

    #[test]
    fn wrong_nonce_is_rejected() {
        let (rt, admin) = runtime_with_admin();
        let err = rt
            .execute(&SignedCall::sign(&admin, 1, Call::Init).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::BadNonce {
                expected: 0,
                got: 1,
                ..
            }
        ));
    }
}
