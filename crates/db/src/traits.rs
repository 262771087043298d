//! Trait definitions for the ledger storage interface.
//!
//! The ledger engine is the single writer to wallet balance state and needs
//! multi-row atomicity: an operation row, the wallet columns it moves, and
//! any queue rows it touches must commit together. The interface therefore
//! exposes one transactional closure instead of per-method atomic calls; the
//! backend decides how to serialise (the in-memory backend with a coarse
//! lock, a SQL backend with SERIALIZABLE + `SELECT ... FOR UPDATE`).

use custodia_primitives::{Amount, Ticker};

use crate::errors::{DbError, DbResult};
use crate::types::*;

/// Handle to a ledger database.
pub trait LedgerDatabase: Send + Sync + 'static {
    type Txn<'a>: LedgerTxn
    where
        Self: 'a;

    /// Runs `f` inside one serialisable transaction. The transaction commits
    /// when `f` returns `Ok` and rolls back completely when it returns `Err`.
    /// The error type is the caller's; domain errors abort the transaction
    /// the same way storage errors do.
    fn with_txn<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut Self::Txn<'_>) -> Result<T, E>;
}

/// Accessors available inside a transaction.
///
/// Uniqueness of `(address, ticker)` and `(txid, address, ticker)` is the
/// backend's job and surfaces as [`DbError::Duplicate`]; callers lean on it
/// as their idempotence key rather than re-checking.
///
/// [`DbError::Duplicate`]: crate::errors::DbError::Duplicate
pub trait LedgerTxn {
    // -- currencies --

    /// Inserts or replaces a currency row.
    fn put_currency(&mut self, entry: CurrencyEntry) -> DbResult<()>;

    fn get_currency(&mut self, ticker: &Ticker) -> DbResult<Option<CurrencyEntry>>;

    fn list_currencies(&mut self) -> DbResult<Vec<CurrencyEntry>>;

    fn set_last_block_hash(&mut self, ticker: &Ticker, hash: &str) -> DbResult<()>;

    // -- wallets --

    fn insert_wallet(&mut self, ticker: &Ticker, label: &str) -> DbResult<WalletEntry>;

    /// Fetches a wallet row, locked for update until the transaction ends.
    fn wallet_for_update(&mut self, id: WalletId) -> DbResult<Option<WalletEntry>>;

    fn update_wallet(&mut self, entry: &WalletEntry) -> DbResult<()>;

    // -- addresses --

    fn insert_address(&mut self, entry: AddressEntry) -> DbResult<()>;

    fn get_address(&mut self, ticker: &Ticker, address: &str) -> DbResult<Option<AddressEntry>>;

    fn wallet_addresses(&mut self, wallet: WalletId) -> DbResult<Vec<AddressEntry>>;

    /// Any one unassigned pool address for the currency.
    fn next_unassigned_address(&mut self, ticker: &Ticker) -> DbResult<Option<AddressEntry>>;

    fn count_unassigned_addresses(&mut self, ticker: &Ticker) -> DbResult<u64>;

    fn update_address(&mut self, entry: &AddressEntry) -> DbResult<()>;

    // -- deposits --

    fn get_deposit(&mut self, key: &DepositKey) -> DbResult<Option<DepositEntry>>;

    fn insert_deposit(&mut self, entry: DepositEntry) -> DbResult<()>;

    fn mark_deposit_processed(&mut self, key: &DepositKey) -> DbResult<()>;

    // -- withdrawals --

    fn insert_withdrawal(
        &mut self,
        wallet: WalletId,
        ticker: &Ticker,
        address: &str,
        amount: Amount,
    ) -> DbResult<WithdrawalEntry>;

    fn get_withdrawal(&mut self, id: WithdrawalId) -> DbResult<Option<WithdrawalEntry>>;

    /// Rows still waiting for a batch: `status = New`, no txid.
    fn pending_withdrawals(&mut self, ticker: &Ticker) -> DbResult<Vec<WithdrawalEntry>>;

    fn sent_withdrawals_by_txid(
        &mut self,
        ticker: &Ticker,
        txid: &str,
    ) -> DbResult<Vec<WithdrawalEntry>>;

    fn update_withdrawal(&mut self, entry: &WithdrawalEntry) -> DbResult<()>;

    // -- operations --

    fn append_operation(&mut self, op: NewOperation) -> DbResult<OperationEntry>;

    /// Backfills the reason of an operation appended earlier in this same
    /// transaction (used to link the two halves of a transfer).
    fn set_operation_reason(&mut self, id: OperationId, reason: OpReason) -> DbResult<()>;

    fn wallet_operations(&mut self, wallet: WalletId) -> DbResult<Vec<OperationEntry>>;

    fn operations_for_reason(&mut self, reason: &OpReason) -> DbResult<Vec<OperationEntry>>;
}
