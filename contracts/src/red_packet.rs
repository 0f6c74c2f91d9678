//! # Red Packet Contract
//!
//! A split-payment distributor. The lifecycle of a packet is:
//!
//! 1. **Approve**: the sender grants the distributor's address an
//!    allowance on the ledger.
//! 2. **Deposit**: the distributor pulls the amount with `transfer_from`
//!    and records a packet of `share_count` equal shares.
//! 3. **Claim**: any address may take one share of a packet, once. Claims
//!    stop when every share is gone.
//!
//! Share value is `floor(amount / share_count)`. The remainder is never
//! paid out and stays locked in the distributor's ledger balance, as do
//! the shares nobody claims. There is no path to recover either.
//!
//! Packets are append-only: ids start at 0, are never reused, and a packet
//! only ever changes by its claimant set growing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

use redpacket_protocol::config::DistributorConfig;
use redpacket_protocol::identity::{Address, Caller};
use redpacket_protocol::ledger::{FungibleLedger, LedgerError};

/// Packet identifier, assigned in deposit order starting at 0.
pub type PacketId = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during distributor operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DistributorError {
    /// The sender has not approved enough for the deposit.
    #[error("insufficient allowance: approved {allowed}, deposit needs {requested}")]
    InsufficientAllowance {
        /// Current allowance granted to the distributor.
        allowed: u64,
        /// Amount the deposit tried to pull.
        requested: u64,
    },

    /// A ledger balance is too small for the transfer.
    #[error("insufficient balance: {account} has {available}, needs {requested}")]
    InsufficientBalance {
        /// Account that would have been debited.
        account: Address,
        /// Its current balance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// No packet with this id exists.
    #[error("invalid packet: no packet with id {0}")]
    InvalidPacket(PacketId),

    /// The claimant already took a share of this packet.
    #[error("{claimant} already claimed from packet {packet_id}")]
    AlreadyClaimed {
        /// The packet in question.
        packet_id: PacketId,
        /// The repeat claimant.
        claimant: Address,
    },

    /// Every share of the packet has been claimed.
    #[error("packet {0} has no shares left")]
    PacketExhausted(PacketId),

    /// Zero amount, zero share count, or a share count above a configured cap.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The ledger passed in is not the one this distributor is bound to.
    #[error("ledger mismatch: bound to {expected}, got {actual}")]
    LedgerMismatch {
        /// The ledger the distributor was constructed with.
        expected: Address,
        /// The ledger it was handed.
        actual: Address,
    },

    /// Any other ledger failure.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    /// The packet id counter ran out.
    #[error("packet id overflow")]
    Overflow,

    /// Restored state breaks a packet rule or is not backed by the ledger.
    #[error("corrupt distributor state: {0}")]
    Corrupt(String),
}

impl From<LedgerError> for DistributorError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientAllowance {
                allowed, requested, ..
            } => DistributorError::InsufficientAllowance { allowed, requested },
            LedgerError::InsufficientBalance {
                account,
                available,
                requested,
            } => DistributorError::InsufficientBalance {
                account,
                available,
                requested,
            },
            other => DistributorError::Ledger(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One deposit, split into equal shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Position in the distributor's packet list.
    pub id: PacketId,
    /// Address that funded the packet.
    pub sender: Address,
    /// Amount deposited.
    pub total_amount: u64,
    /// Number of shares the deposit was split into.
    pub share_count: u64,
    /// `total_amount / share_count`, rounded down.
    pub share_value: u64,
    /// Addresses that have taken their share.
    pub claimed: BTreeSet<Address>,
    /// When the deposit was recorded.
    pub created_at: DateTime<Utc>,
}

impl Packet {
    /// Units that no share covers. Locked in the distributor for good.
    pub fn remainder(&self) -> u64 {
        self.total_amount
            .saturating_sub(self.share_value.saturating_mul(self.share_count))
    }

    /// Shares not yet claimed.
    pub fn remaining_shares(&self) -> u64 {
        self.share_count.saturating_sub(self.claimed.len() as u64)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_shares() == 0
    }

    pub fn has_claimed(&self, claimant: &Address) -> bool {
        self.claimed.contains(claimant)
    }

    /// What this packet still accounts for in the distributor's balance:
    /// unclaimed shares plus the remainder.
    pub fn outstanding(&self) -> u64 {
        self.remaining_shares()
            .saturating_mul(self.share_value)
            .saturating_add(self.remainder())
    }

    /// Checks the relations `deposit` and `claim` maintain. Only fails for
    /// packets that were not produced by this module, e.g. edited snapshots.
    fn check(&self, expected_id: PacketId) -> Result<(), DistributorError> {
        let corrupt =
            |reason: String| DistributorError::Corrupt(format!("packet {}: {}", self.id, reason));
        if self.id != expected_id {
            return Err(corrupt(format!("expected id {expected_id}")));
        }
        if self.total_amount == 0 || self.share_count == 0 {
            return Err(corrupt("zero amount or share count".into()));
        }
        if self.share_value != self.total_amount / self.share_count {
            return Err(corrupt(format!(
                "share value {} is not {} / {}",
                self.share_value, self.total_amount, self.share_count
            )));
        }
        if self.claimed.len() as u64 > self.share_count {
            return Err(corrupt(format!(
                "{} claims for {} shares",
                self.claimed.len(),
                self.share_count
            )));
        }
        Ok(())
    }
}

/// Events emitted by the distributor on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DistributorEvent {
    PacketCreated {
        packet_id: PacketId,
        sender: Address,
        total_amount: u64,
        share_count: u64,
        share_value: u64,
    },
    ShareClaimed {
        packet_id: PacketId,
        claimant: Address,
        amount: u64,
    },
}

/// The red packet distributor.
///
/// Holds no funds itself: its money is its balance on the bound ledger,
/// which every operation receives explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distributor {
    /// Address the distributor holds its ledger balance under.
    address: Address,
    /// The ledger this distributor is bound to. Fixed at construction.
    token: Address,
    config: DistributorConfig,
    packets: Vec<Packet>,
    next_packet_id: PacketId,
    #[serde(skip)]
    events: Vec<DistributorEvent>,
}

impl Distributor {
    /// Creates a distributor at `address` bound to the ledger at `token`.
    pub fn new(address: Address, token: Address, config: DistributorConfig) -> Self {
        Self {
            address,
            token,
            config,
            packets: Vec::new(),
            next_packet_id: 0,
            events: Vec::new(),
        }
    }

    /// Pulls `amount` from the caller through the ledger allowance and
    /// records a packet of `share_count` equal shares.
    ///
    /// Returns the new packet's id.
    ///
    /// # Errors
    ///
    /// - [`DistributorError::InvalidArgument`] for a zero amount, zero share
    ///   count, or a share count above `max_share_count` when one is set.
    /// - [`DistributorError::InsufficientBalance`] /
    ///   [`DistributorError::InsufficientAllowance`] if the ledger refuses
    ///   the pull.
    /// - [`DistributorError::LedgerMismatch`] if `ledger` is not the bound
    ///   ledger.
    ///
    /// On error no packet is recorded and the id counter is unchanged.
    pub fn deposit<L: FungibleLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: &Caller,
        amount: u64,
        share_count: u64,
    ) -> Result<PacketId, DistributorError> {
        self.check_ledger(ledger)?;
        if amount == 0 {
            return Err(DistributorError::InvalidArgument("amount must be positive".into()));
        }
        if share_count == 0 {
            return Err(DistributorError::InvalidArgument(
                "share count must be positive".into(),
            ));
        }
        if let Some(max) = self.config.max_share_count {
            if share_count > max {
                return Err(DistributorError::InvalidArgument(format!(
                    "share count {share_count} exceeds maximum {max}"
                )));
            }
        }

        let packet_id = self.next_packet_id;
        let next_id = packet_id.checked_add(1).ok_or(DistributorError::Overflow)?;
        let sender = caller.address();

        ledger.transfer_from(&self.as_caller(), &sender, &self.address, amount)?;

        let share_value = amount / share_count;
        self.packets.push(Packet {
            id: packet_id,
            sender,
            total_amount: amount,
            share_count,
            share_value,
            claimed: BTreeSet::new(),
            created_at: Utc::now(),
        });
        self.next_packet_id = next_id;

        self.events.push(DistributorEvent::PacketCreated {
            packet_id,
            sender,
            total_amount: amount,
            share_count,
            share_value,
        });
        info!(
            packet_id,
            sender = %sender,
            amount,
            share_count,
            share_value,
            "packet created"
        );

        Ok(packet_id)
    }

    /// Pays the caller one share of `packet_id`.
    ///
    /// Returns the amount paid. A packet whose share value rounded down to
    /// zero still records the claim but moves nothing on the ledger.
    ///
    /// # Errors
    ///
    /// - [`DistributorError::InvalidPacket`] if the packet does not exist.
    /// - [`DistributorError::AlreadyClaimed`] if the caller claimed before.
    /// - [`DistributorError::PacketExhausted`] if no shares are left.
    /// - [`DistributorError::LedgerMismatch`] if `ledger` is not the bound
    ///   ledger.
    ///
    /// On error the claimant set and every balance are unchanged.
    pub fn claim<L: FungibleLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: &Caller,
        packet_id: PacketId,
    ) -> Result<u64, DistributorError> {
        self.check_ledger(ledger)?;
        let claimant = caller.address();

        let index = self.index_of(packet_id)?;
        let packet = &self.packets[index];
        if packet.has_claimed(&claimant) {
            return Err(DistributorError::AlreadyClaimed {
                packet_id,
                claimant,
            });
        }
        if packet.is_exhausted() {
            return Err(DistributorError::PacketExhausted(packet_id));
        }

        let amount = packet.share_value;
        if amount > 0 {
            ledger.transfer(&self.as_caller(), &claimant, amount)?;
        }

        self.packets[index].claimed.insert(claimant);
        self.events.push(DistributorEvent::ShareClaimed {
            packet_id,
            claimant,
            amount,
        });
        info!(packet_id, claimant = %claimant, amount, "share claimed");

        Ok(amount)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Address of the bound ledger.
    pub fn token(&self) -> Address {
        self.token
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    pub fn packet(&self, packet_id: PacketId) -> Option<&Packet> {
        usize::try_from(packet_id)
            .ok()
            .and_then(|index| self.packets.get(index))
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Id the next deposit will receive; equals the number of packets.
    pub fn next_packet_id(&self) -> PacketId {
        self.next_packet_id
    }

    pub fn has_claimed(&self, packet_id: PacketId, claimant: &Address) -> bool {
        self.packet(packet_id)
            .map(|p| p.has_claimed(claimant))
            .unwrap_or(false)
    }

    pub fn remaining_shares(&self, packet_id: PacketId) -> Option<u64> {
        self.packet(packet_id).map(Packet::remaining_shares)
    }

    pub fn remainder(&self, packet_id: PacketId) -> Option<u64> {
        self.packet(packet_id).map(Packet::remainder)
    }

    /// Sum of [`Packet::outstanding`] over every packet. The distributor's
    /// ledger balance equals this unless someone transfers to it directly.
    pub fn outstanding(&self) -> u64 {
        self.packets
            .iter()
            .map(Packet::outstanding)
            .fold(0, u64::saturating_add)
    }

    /// Verifies state that did not come from `deposit` and `claim`, such as
    /// a deserialized snapshot, against `ledger`.
    ///
    /// Packet ids must run from 0 without gaps, every packet must satisfy
    /// its share arithmetic, and the distributor's balance on `ledger` must
    /// cover [`outstanding`](Self::outstanding).
    ///
    /// # Errors
    ///
    /// [`DistributorError::LedgerMismatch`] if `ledger` is not the bound
    /// ledger, [`DistributorError::Corrupt`] for anything else.
    pub fn check_integrity<L: FungibleLedger + ?Sized>(
        &self,
        ledger: &L,
    ) -> Result<(), DistributorError> {
        self.check_ledger(ledger)?;

        for (index, packet) in self.packets.iter().enumerate() {
            packet.check(index as PacketId)?;
        }
        if self.next_packet_id != self.packets.len() as PacketId {
            return Err(DistributorError::Corrupt(format!(
                "next packet id {} with {} packets",
                self.next_packet_id,
                self.packets.len()
            )));
        }

        let mut owed: u64 = 0;
        for packet in &self.packets {
            let packet_owed = packet
                .remaining_shares()
                .checked_mul(packet.share_value)
                .and_then(|paid| paid.checked_add(packet.remainder()))
                .ok_or(DistributorError::Overflow)?;
            owed = owed.checked_add(packet_owed).ok_or(DistributorError::Overflow)?;
        }
        let balance = ledger.balance_of(&self.address);
        if balance < owed {
            return Err(DistributorError::Corrupt(format!(
                "balance {balance} does not cover {owed} outstanding"
            )));
        }
        Ok(())
    }

    /// Drains the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<DistributorEvent> {
        std::mem::take(&mut self.events)
    }

    fn as_caller(&self) -> Caller {
        Caller::contract(self.address)
    }

    fn check_ledger<L: FungibleLedger + ?Sized>(&self, ledger: &L) -> Result<(), DistributorError> {
        let actual = ledger.address();
        if actual != self.token {
            return Err(DistributorError::LedgerMismatch {
                expected: self.token,
                actual,
            });
        }
        Ok(())
    }

    fn index_of(&self, packet_id: PacketId) -> Result<usize, DistributorError> {
        usize::try_from(packet_id)
            .ok()
            .filter(|index| *index < self.packets.len())
            .ok_or(DistributorError::InvalidPacket(packet_id))
    }
}
