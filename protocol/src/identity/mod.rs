//! # Identity Module
//!
//! Who is on the other end of a call.
//!
//! 1. **Address**: a 20-byte account identifier. External accounts derive
//!    it from their Ed25519 public key; contracts derive it from the label
//!    they were deployed under.
//! 2. **Caller**: an address whose control has been *proven* for the
//!    current call, either by a signature check or because the runtime is
//!    invoking a contract on its own behalf. Every mutating ledger and
//!    distributor operation takes a `&Caller`, never a bare `Address`.

pub mod address;
pub mod caller;

pub use address::{Address, AddressError};
pub use caller::{AuthError, Caller, CallerKind};
