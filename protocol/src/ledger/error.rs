use thiserror::Error;

use crate::identity::Address;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The debited account holds less than the requested amount.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        account: Address,
        available: u64,
        requested: u64,
    },

    /// The spender's allowance from the owner is smaller than the amount.
    #[error("insufficient allowance: {spender} may move {allowed} from {owner}, requested {requested}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowed: u64,
        requested: u64,
    },

    /// A malformed argument, e.g. a zero-amount direct transfer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller is not allowed to perform this operation.
    #[error("unauthorized: {0} may not perform this operation")]
    Unauthorized(Address),

    /// `init` was called on a ledger that already minted its supply.
    #[error("ledger already initialized")]
    AlreadyInitialized,

    /// A `transfer_multi` batch longer than the configured maximum.
    #[error("batch too large: {len} transfers, maximum {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// A credit would push a balance past `u64::MAX`.
    #[error("balance overflow crediting {account}")]
    Overflow { account: Address },
}
