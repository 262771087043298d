//! The wallet ledger engine: the single writer to wallet balance state.
//!
//! Every mutation of a wallet's `balance` / `unconfirmed` / `holded` columns
//! goes through [`engine::post_operation`], which appends the ledger entry
//! and updates the wallet row inside the caller's transaction. On top of
//! that sit the domain entry points: deposit processing, withdrawal intake,
//! wallet-to-wallet transfers and receive-address resolution.

pub mod addresses;
pub mod deposits;
pub mod engine;
pub mod errors;
pub mod transfers;
pub mod withdrawals;

pub use deposits::DepositNotice;
pub use engine::{post_operation, Ledger};
pub use errors::{LedgerError, LedgerResult};
