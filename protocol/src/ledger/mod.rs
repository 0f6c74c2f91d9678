//! # Ledger Module: Fungible Balances
//!
//! The distributor never owns money directly; it owns a balance on a
//! ledger and moves it through the three operations in [`FungibleLedger`].
//! Anything that implements that trait can back a red packet.
//!
//! ```text
//! error.rs  LedgerError
//! event.rs  Transfer / Approval events
//! token.rs  TokenLedger, an OEP-4 style token with allowances
//! ```

pub mod error;
pub mod event;
pub mod token;

pub use error::LedgerError;
pub use event::LedgerEvent;
pub use token::{TokenLedger, TransferItem};

use crate::identity::{Address, Caller};

/// The slice of a fungible token the distributor depends on.
///
/// Implementations must be all-or-nothing per call: an `Err` means no
/// balance or allowance changed.
pub trait FungibleLedger {
    /// Address the ledger is deployed at. The distributor uses this to make
    /// sure it is always handed the ledger it was bound to.
    fn address(&self) -> Address;

    /// Balance of `account`, zero if it has never been credited.
    fn balance_of(&self, account: &Address) -> u64;

    /// Move `amount` from the caller's own balance to `to`.
    fn transfer(&mut self, from: &Caller, to: &Address, amount: u64) -> Result<(), LedgerError>;

    /// Move `amount` from `owner` to `to` on the strength of the allowance
    /// `owner` granted to `spender`. The allowance is reduced by `amount`.
    fn transfer_from(
        &mut self,
        spender: &Caller,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError>;
}
