//! # Token Ledger
//!
//! An OEP-4 style fungible token: fixed supply minted once to an admin,
//! direct transfers, batched transfers and allowance-based delegated
//! transfers.
//!
//! ## Storage rules
//!
//! - A balance entry exists only while it is non-zero. Debiting an account
//!   to zero removes it.
//! - An allowance entry is removed once it is fully consumed (or approved
//!   down to zero).
//! - Every check runs before the first write, so an `Err` from any method
//!   means nothing changed. `transfer_multi` stages the whole batch on a
//!   scratch copy of the balances and commits it in one swap.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::error::LedgerError;
use super::event::LedgerEvent;
use super::FungibleLedger;
use crate::config::{TokenConfig, MAX_TRANSFER_BATCH};
use crate::identity::{Address, Caller};

/// One leg of a [`TokenLedger::transfer_multi`] batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

/// A fungible token ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenLedger {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    admin: Address,
    /// Supply minted by `init`. Zero until then.
    total_supply: u64,
    /// Supply `init` will mint.
    configured_supply: u64,
    /// Set by the first successful `init`, whatever supply it minted.
    initialized: bool,
    balances: BTreeMap<Address, u64>,
    /// `owner -> spender -> remaining allowance`.
    allowances: BTreeMap<Address, BTreeMap<Address, u64>>,
    /// Events since the last [`take_events`](Self::take_events).
    #[serde(skip)]
    events: Vec<LedgerEvent>,
}

impl TokenLedger {
    /// Creates an uninitialized ledger at `address`. No units exist until
    /// the admin calls [`init`](Self::init).
    pub fn new(address: Address, config: &TokenConfig) -> Self {
        Self {
            address,
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            decimals: config.decimals,
            admin: config.admin,
            total_supply: 0,
            configured_supply: config.total_supply,
            initialized: false,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Mints the configured supply to the admin. Callable once, by the admin.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] if the caller is not the admin,
    /// [`LedgerError::AlreadyInitialized`] on a second call.
    pub fn init(&mut self, caller: &Caller) -> Result<u64, LedgerError> {
        if caller.address() != self.admin {
            return Err(LedgerError::Unauthorized(caller.address()));
        }
        if self.is_initialized() {
            return Err(LedgerError::AlreadyInitialized);
        }

        let supply = self.configured_supply;
        self.initialized = true;
        self.total_supply = supply;
        if supply > 0 {
            self.balances.insert(self.admin, supply);
        }
        self.events.push(LedgerEvent::Transfer {
            from: Address::ZERO,
            to: self.admin,
            amount: supply,
        });

        info!(token = %self.symbol, admin = %self.admin, supply, "token initialized");
        Ok(supply)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    /// Remaining amount `spender` may move out of `owner`'s balance.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// All non-zero balances, ordered by address.
    pub fn balances(&self) -> impl Iterator<Item = (&Address, u64)> {
        self.balances.iter().map(|(addr, amount)| (addr, *amount))
    }

    /// Sets `spender`'s allowance from the caller to exactly `amount`,
    /// replacing any previous value.
    pub fn approve(
        &mut self,
        owner: &Caller,
        spender: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let owner_addr = owner.address();
        if amount == 0 {
            if let Some(spenders) = self.allowances.get_mut(&owner_addr) {
                spenders.remove(spender);
                if spenders.is_empty() {
                    self.allowances.remove(&owner_addr);
                }
            }
        } else {
            self.allowances
                .entry(owner_addr)
                .or_default()
                .insert(*spender, amount);
        }

        self.events.push(LedgerEvent::Approval {
            owner: owner_addr,
            spender: *spender,
            amount,
        });
        debug!(owner = %owner_addr, spender = %spender, amount, "allowance set");
        Ok(())
    }

    /// Applies a batch of transfers, all of which must debit the caller.
    /// Either every leg applies or none does.
    pub fn transfer_multi(
        &mut self,
        caller: &Caller,
        items: &[TransferItem],
    ) -> Result<(), LedgerError> {
        if items.len() > MAX_TRANSFER_BATCH {
            return Err(LedgerError::BatchTooLarge {
                len: items.len(),
                max: MAX_TRANSFER_BATCH,
            });
        }
        if let Some(item) = items.iter().find(|item| item.from != caller.address()) {
            return Err(LedgerError::Unauthorized(item.from));
        }
        if items.iter().any(|item| item.amount == 0) {
            return Err(LedgerError::InvalidArgument("transfer amount must be positive".into()));
        }

        let mut staged = self.balances.clone();
        for item in items {
            move_balance(&mut staged, &item.from, &item.to, item.amount)?;
        }
        self.balances = staged;

        self.events.extend(items.iter().map(|item| LedgerEvent::Transfer {
            from: item.from,
            to: item.to,
            amount: item.amount,
        }));
        debug!(from = %caller.address(), legs = items.len(), "batch transfer applied");
        Ok(())
    }

    /// Drains the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }
}

impl FungibleLedger for TokenLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: &Caller, to: &Address, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidArgument("transfer amount must be positive".into()));
        }
        let from_addr = from.address();
        move_balance(&mut self.balances, &from_addr, to, amount)?;

        self.events.push(LedgerEvent::Transfer {
            from: from_addr,
            to: *to,
            amount,
        });
        debug!(from = %from_addr, to = %to, amount, "transfer");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: &Caller,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let spender_addr = spender.address();

        let available = self.balance_of(owner);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *owner,
                available,
                requested: amount,
            });
        }

        let allowed = self.allowance(owner, &spender_addr);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *owner,
                spender: spender_addr,
                allowed,
                requested: amount,
            });
        }

        move_balance(&mut self.balances, owner, to, amount)?;

        let remaining = allowed - amount;
        if let Some(spenders) = self.allowances.get_mut(owner) {
            if remaining == 0 {
                spenders.remove(&spender_addr);
            } else {
                spenders.insert(spender_addr, remaining);
            }
            if spenders.is_empty() {
                self.allowances.remove(owner);
            }
        }

        self.events.push(LedgerEvent::Transfer {
            from: *owner,
            to: *to,
            amount,
        });
        debug!(owner = %owner, spender = %spender_addr, to = %to, amount, "delegated transfer");
        Ok(())
    }
}

/// Debits `from` and credits `to` in `balances`, or changes nothing.
fn move_balance(
    balances: &mut BTreeMap<Address, u64>,
    from: &Address,
    to: &Address,
    amount: u64,
) -> Result<(), LedgerError> {
    let from_balance = balances.get(from).copied().unwrap_or(0);
    if from_balance < amount {
        return Err(LedgerError::InsufficientBalance {
            account: *from,
            available: from_balance,
            requested: amount,
        });
    }
    if from == to || amount == 0 {
        return Ok(());
    }

    let to_balance = balances.get(to).copied().unwrap_or(0);
    let credited = to_balance
        .checked_add(amount)
        .ok_or(LedgerError::Overflow { account: *to })?;

    let debited = from_balance - amount;
    if debited == 0 {
        balances.remove(from);
    } else {
        balances.insert(*from, debited);
    }
    balances.insert(*to, credited);
    Ok(())
}
