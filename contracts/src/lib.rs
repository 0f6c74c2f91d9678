//! # Red Packet Contracts
//!
//! The split-payment distributor and the runtime that hosts it:
//!
//! - **Red Packet**: a sender deposits pre-approved ledger units and splits
//!   them into equal shares; each distinct claimant withdraws one share,
//!   once.
//! - **Call**: the signed envelope every external entry point arrives in.
//! - **Runtime**: authenticates calls, runs them one at a time, and
//!   commits a call's effects only if the whole call succeeds.
//!
//! ## Design Principles
//!
//! 1. Balance updates use checked arithmetic. Derived packet figures
//!    saturate, and restored snapshots are validated before use.
//! 2. The caller is an explicit, authenticated parameter of every entry
//!    point.
//! 3. Preconditions are checked before anything is written, so a failed
//!    call leaves the world state as it found it.
//! 4. Every public state type is serializable (serde) so the whole world
//!    can be snapshotted and restored.

pub mod call;
pub mod red_packet;
pub mod runtime;

pub use call::{Call, CallError, SignedCall};
pub use red_packet::{Distributor, DistributorError, DistributorEvent, Packet, PacketId};
pub use runtime::{Event, Outcome, Receipt, Runtime, RuntimeConfig, RuntimeError};
