//! Ledger handle and the operation posting primitive.

use std::sync::Arc;

use custodia_db::traits::{LedgerDatabase, LedgerTxn};
use custodia_db::types::{CurrencyEntry, NewOperation, OperationEntry, WalletEntry, WalletId};
use custodia_primitives::Ticker;

use crate::errors::{LedgerError, LedgerResult};

/// Decides whether `address` is acceptable for `currency`. The default is
/// base58check against the currency's magic bytes; chains with other
/// encodings plug in their own.
pub type AddressValidator = fn(&CurrencyEntry, &str) -> bool;

fn base58check_validator(currency: &CurrencyEntry, address: &str) -> bool {
    custodia_primitives::is_valid_address(&currency.magic_bytes, address)
}

/// Handle to the wallet ledger over some database backend.
pub struct Ledger<D> {
    db: Arc<D>,
    pub(crate) validator: AddressValidator,
}

impl<D> Clone for Ledger<D> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            validator: self.validator,
        }
    }
}

impl<D: LedgerDatabase> Ledger<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self {
            db,
            validator: base58check_validator,
        }
    }

    pub fn with_validator(db: Arc<D>, validator: AddressValidator) -> Self {
        Self { db, validator }
    }

    pub fn db(&self) -> &Arc<D> {
        &self.db
    }

    /// Inserts or updates a currency row, keeping the scan cursor of an
    /// existing row. This is how the daemon seeds the registry from config.
    pub fn upsert_currency(&self, mut entry: CurrencyEntry) -> LedgerResult<CurrencyEntry> {
        self.db.with_txn(|txn| {
            if let Some(existing) = txn.get_currency(&entry.ticker)? {
                if entry.last_block_hash.is_none() {
                    entry.last_block_hash = existing.last_block_hash;
                }
            }
            txn.put_currency(entry.clone())?;
            Ok(entry)
        })
    }

    /// Every currency in the registry.
    pub fn currencies(&self) -> LedgerResult<Vec<CurrencyEntry>> {
        self.db.with_txn(|txn| Ok(txn.list_currencies()?))
    }

    pub fn currency(&self, ticker: &Ticker) -> LedgerResult<CurrencyEntry> {
        self.db.with_txn(|txn| {
            txn.get_currency(ticker)?
                .ok_or_else(|| LedgerError::UnknownCurrency(ticker.clone()))
        })
    }

    pub fn create_wallet(&self, ticker: &Ticker, label: &str) -> LedgerResult<WalletEntry> {
        self.db.with_txn(|txn| {
            if txn.get_currency(ticker)?.is_none() {
                return Err(LedgerError::UnknownCurrency(ticker.clone()));
            }
            Ok(txn.insert_wallet(ticker, label)?)
        })
    }

    pub fn wallet(&self, id: WalletId) -> LedgerResult<WalletEntry> {
        self.db.with_txn(|txn| {
            txn.wallet_for_update(id)?
                .ok_or(LedgerError::UnknownWallet(id))
        })
    }
}

/// Appends a ledger entry and folds its deltas into the owning wallet's
/// columns, all inside the caller's transaction. Rejects a posting that
/// would leave any column negative; the caller's transaction then rolls
/// back. This is the only code path that writes wallet amount columns.
pub fn post_operation(
    txn: &mut impl LedgerTxn,
    op: NewOperation,
) -> LedgerResult<OperationEntry> {
    let mut wallet = txn
        .wallet_for_update(op.wallet)?
        .ok_or(LedgerError::UnknownWallet(op.wallet))?;

    wallet.balance += op.balance;
    wallet.unconfirmed += op.unconfirmed;
    wallet.holded += op.holded;

    if wallet.balance.is_negative()
        || wallet.unconfirmed.is_negative()
        || wallet.holded.is_negative()
    {
        return Err(LedgerError::Invariant(wallet.id));
    }

    let entry = txn.append_operation(op)?;
    txn.update_wallet(&wallet)?;
    Ok(entry)
}
