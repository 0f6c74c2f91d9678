// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Red Packet Protocol: Core Library
//!
//! The pieces every red packet deployment stands on: who is calling, how
//! they prove it, and the fungible ledger that actually holds the money.
//! The distributor contract itself lives in `redpacket-contracts` and only
//! ever talks to the ledger through the [`ledger::FungibleLedger`]
//! capability trait.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants and the serde configuration structs.
//! - **crypto**: Ed25519 keys, signatures and BLAKE3 hashing.
//! - **identity**: 20-byte addresses and authenticated [`identity::Caller`]s.
//! - **ledger**: The capability trait plus an OEP-4 style token ledger.
//! - **logging**: `tracing` subscriber setup.
//!
//! ## Design Philosophy
//!
//! 1. Every mutating entry point takes the caller's identity explicitly.
//!    There is no ambient "current sender".
//! 2. Validate everything, then mutate. A failed call leaves no trace.
//! 3. Money is `u64` in the smallest unit and all arithmetic is checked.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod ledger;
pub mod logging;

pub use identity::{Address, Caller};
pub use ledger::{FungibleLedger, LedgerError, LedgerEvent, TokenLedger};
