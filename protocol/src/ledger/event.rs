//! Events emitted by a ledger on every successful state change. The
//! runtime drains them into call receipts; nothing is emitted for a call
//! that fails.

use serde::{Deserialize, Serialize};

use crate::identity::Address;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Units moved between accounts. The initial mint is reported as a
    /// transfer from [`Address::ZERO`].
    Transfer {
        from: Address,
        to: Address,
        amount: u64,
    },
    /// `owner` set `spender`'s allowance to `amount`.
    Approval {
        owner: Address,
        spender: Address,
        amount: u64,
    },
}
