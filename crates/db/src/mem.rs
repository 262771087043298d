//! In-memory ledger database.
//!
//! Backs the daemon and the test suites. One coarse mutex serialises all
//! transactions; a clone of the state taken at transaction start is restored
//! when the closure fails, which models full rollback.

use std::collections::BTreeMap;

use custodia_primitives::{Amount, Ticker};
use parking_lot::{Mutex, MutexGuard};

use crate::errors::{DbError, DbResult};
use crate::traits::{LedgerDatabase, LedgerTxn};
use crate::types::*;

#[derive(Clone, Debug, Default)]
struct MemState {
    currencies: BTreeMap<Ticker, CurrencyEntry>,
    wallets: BTreeMap<WalletId, WalletEntry>,
    addresses: BTreeMap<(Ticker, String), AddressEntry>,
    deposits: BTreeMap<DepositKey, DepositEntry>,
    withdrawals: BTreeMap<WithdrawalId, WithdrawalEntry>,
    operations: BTreeMap<OperationId, OperationEntry>,
    next_wallet_id: u64,
    next_withdrawal_id: u64,
    next_operation_id: u64,
}

#[derive(Debug, Default)]
pub struct MemDb {
    state: Mutex<MemState>,
}

impl MemDb {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemTxn<'a> {
    state: MutexGuard<'a, MemState>,
}

impl LedgerDatabase for MemDb {
    type Txn<'a>
        = MemTxn<'a>
    where
        Self: 'a;

    fn with_txn<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut Self::Txn<'_>) -> Result<T, E>,
    {
        let guard = self.state.lock();
        let snapshot = guard.clone();
        let mut txn = MemTxn { state: guard };
        match f(&mut txn) {
            Ok(val) => Ok(val),
            Err(e) => {
                *txn.state = snapshot;
                Err(e)
            }
        }
    }
}

impl LedgerTxn for MemTxn<'_> {
    fn put_currency(&mut self, entry: CurrencyEntry) -> DbResult<()> {
        self.state.currencies.insert(entry.ticker.clone(), entry);
        Ok(())
    }

    fn get_currency(&mut self, ticker: &Ticker) -> DbResult<Option<CurrencyEntry>> {
        Ok(self.state.currencies.get(ticker).cloned())
    }

    fn list_currencies(&mut self) -> DbResult<Vec<CurrencyEntry>> {
        Ok(self.state.currencies.values().cloned().collect())
    }

    fn set_last_block_hash(&mut self, ticker: &Ticker, hash: &str) -> DbResult<()> {
        let entry = self
            .state
            .currencies
            .get_mut(ticker)
            .ok_or_else(|| DbError::MissingRow("currency", ticker.to_string()))?;
        entry.last_block_hash = Some(hash.to_owned());
        Ok(())
    }

    fn insert_wallet(&mut self, ticker: &Ticker, label: &str) -> DbResult<WalletEntry> {
        self.state.next_wallet_id += 1;
        let entry = WalletEntry {
            id: WalletId(self.state.next_wallet_id),
            ticker: ticker.clone(),
            label: label.to_owned(),
            balance: Amount::ZERO,
            unconfirmed: Amount::ZERO,
            holded: Amount::ZERO,
        };
        self.state.wallets.insert(entry.id, entry.clone());
        Ok(entry)
    }

    fn wallet_for_update(&mut self, id: WalletId) -> DbResult<Option<WalletEntry>> {
        // The transaction holds the state lock, so the row is ours already.
        Ok(self.state.wallets.get(&id).cloned())
    }

    fn update_wallet(&mut self, entry: &WalletEntry) -> DbResult<()> {
        match self.state.wallets.get_mut(&entry.id) {
            Some(row) => {
                *row = entry.clone();
                Ok(())
            }
            None => Err(DbError::MissingRow("wallet", entry.id.to_string())),
        }
    }

    fn insert_address(&mut self, entry: AddressEntry) -> DbResult<()> {
        let key = (entry.ticker.clone(), entry.address.clone());
        if self.state.addresses.contains_key(&key) {
            return Err(DbError::Duplicate("address", entry.address));
        }
        self.state.addresses.insert(key, entry);
        Ok(())
    }

    fn get_address(&mut self, ticker: &Ticker, address: &str) -> DbResult<Option<AddressEntry>> {
        let key = (ticker.clone(), address.to_owned());
        Ok(self.state.addresses.get(&key).cloned())
    }

    fn wallet_addresses(&mut self, wallet: WalletId) -> DbResult<Vec<AddressEntry>> {
        Ok(self
            .state
            .addresses
            .values()
            .filter(|a| a.wallet == Some(wallet))
            .cloned()
            .collect())
    }

    fn next_unassigned_address(&mut self, ticker: &Ticker) -> DbResult<Option<AddressEntry>> {
        Ok(self
            .state
            .addresses
            .values()
            .find(|a| a.ticker == *ticker && a.wallet.is_none())
            .cloned())
    }

    fn count_unassigned_addresses(&mut self, ticker: &Ticker) -> DbResult<u64> {
        Ok(self
            .state
            .addresses
            .values()
            .filter(|a| a.ticker == *ticker && a.wallet.is_none())
            .count() as u64)
    }

    fn update_address(&mut self, entry: &AddressEntry) -> DbResult<()> {
        let key = (entry.ticker.clone(), entry.address.clone());
        match self.state.addresses.get_mut(&key) {
            Some(row) => {
                *row = entry.clone();
                Ok(())
            }
            None => Err(DbError::MissingRow("address", entry.address.clone())),
        }
    }

    fn get_deposit(&mut self, key: &DepositKey) -> DbResult<Option<DepositEntry>> {
        Ok(self.state.deposits.get(key).cloned())
    }

    fn insert_deposit(&mut self, entry: DepositEntry) -> DbResult<()> {
        if self.state.deposits.contains_key(&entry.key) {
            return Err(DbError::Duplicate("deposit", entry.key.txid));
        }
        self.state.deposits.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn mark_deposit_processed(&mut self, key: &DepositKey) -> DbResult<()> {
        let entry = self
            .state
            .deposits
            .get_mut(key)
            .ok_or_else(|| DbError::MissingRow("deposit", key.txid.clone()))?;
        entry.processed = true;
        Ok(())
    }

    fn insert_withdrawal(
        &mut self,
        wallet: WalletId,
        ticker: &Ticker,
        address: &str,
        amount: Amount,
    ) -> DbResult<WithdrawalEntry> {
        self.state.next_withdrawal_id += 1;
        let entry = WithdrawalEntry {
            id: WithdrawalId(self.state.next_withdrawal_id),
            wallet,
            ticker: ticker.clone(),
            address: address.to_owned(),
            amount,
            txid: None,
            fee: Amount::ZERO,
            status: WithdrawalStatus::New,
        };
        self.state.withdrawals.insert(entry.id, entry.clone());
        Ok(entry)
    }

    fn get_withdrawal(&mut self, id: WithdrawalId) -> DbResult<Option<WithdrawalEntry>> {
        Ok(self.state.withdrawals.get(&id).cloned())
    }

    fn pending_withdrawals(&mut self, ticker: &Ticker) -> DbResult<Vec<WithdrawalEntry>> {
        Ok(self
            .state
            .withdrawals
            .values()
            .filter(|w| {
                w.ticker == *ticker && w.status == WithdrawalStatus::New && w.txid.is_none()
            })
            .cloned()
            .collect())
    }

    fn sent_withdrawals_by_txid(
        &mut self,
        ticker: &Ticker,
        txid: &str,
    ) -> DbResult<Vec<WithdrawalEntry>> {
        Ok(self
            .state
            .withdrawals
            .values()
            .filter(|w| {
                w.ticker == *ticker
                    && w.status == WithdrawalStatus::Sent
                    && w.txid.as_deref() == Some(txid)
            })
            .cloned()
            .collect())
    }

    fn update_withdrawal(&mut self, entry: &WithdrawalEntry) -> DbResult<()> {
        match self.state.withdrawals.get_mut(&entry.id) {
            Some(row) => {
                *row = entry.clone();
                Ok(())
            }
            None => Err(DbError::MissingRow("withdrawal", entry.id.to_string())),
        }
    }

    fn append_operation(&mut self, op: NewOperation) -> DbResult<OperationEntry> {
        self.state.next_operation_id += 1;
        let entry = OperationEntry {
            id: OperationId(self.state.next_operation_id),
            wallet: op.wallet,
            balance: op.balance,
            unconfirmed: op.unconfirmed,
            holded: op.holded,
            description: op.description,
            reason: op.reason,
        };
        self.state.operations.insert(entry.id, entry.clone());
        Ok(entry)
    }

    fn set_operation_reason(&mut self, id: OperationId, reason: OpReason) -> DbResult<()> {
        let entry = self
            .state
            .operations
            .get_mut(&id)
            .ok_or_else(|| DbError::MissingRow("operation", id.to_string()))?;
        entry.reason = Some(reason);
        Ok(())
    }

    fn wallet_operations(&mut self, wallet: WalletId) -> DbResult<Vec<OperationEntry>> {
        Ok(self
            .state
            .operations
            .values()
            .filter(|o| o.wallet == wallet)
            .cloned()
            .collect())
    }

    fn operations_for_reason(&mut self, reason: &OpReason) -> DbResult<Vec<OperationEntry>> {
        Ok(self
            .state
            .operations
            .values()
            .filter(|o| o.reason.as_ref() == Some(reason))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn btc() -> Ticker {
        Ticker::new("btc")
    }

    #[test]
    fn test_rollback_on_error() {
        let db = MemDb::new();
        db.with_txn::<_, DbError, _>(|txn| txn.put_currency(CurrencyEntry::new(btc(), "Bitcoin")))
            .unwrap();

        let res: DbResult<()> = db.with_txn(|txn| {
            let wallet = txn.insert_wallet(&btc(), "doomed")?;
            txn.update_wallet(&WalletEntry {
                balance: Amount::from_str("1").unwrap(),
                ..wallet
            })?;
            Err(DbError::Other("abort".into()))
        });
        assert!(res.is_err());

        db.with_txn(|txn| -> DbResult<()> {
            assert!(txn.wallet_for_update(WalletId(1))?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_wallet_ids_monotonic() {
        let db = MemDb::new();
        let w1 = db
            .with_txn::<_, DbError, _>(|txn| txn.insert_wallet(&btc(), "a"))
            .unwrap();
        let w2 = db
            .with_txn::<_, DbError, _>(|txn| txn.insert_wallet(&btc(), "b"))
            .unwrap();
        assert!(w2.id > w1.id);
    }

    #[test]
    fn test_address_uniqueness() {
        let db = MemDb::new();
        let entry = AddressEntry {
            address: "1111111111111111111114oLvT2".to_owned(),
            ticker: btc(),
            wallet: None,
            active: false,
        };
        db.with_txn(|txn| txn.insert_address(entry.clone())).unwrap();
        let res = db.with_txn(|txn| txn.insert_address(entry.clone()));
        assert!(matches!(res, Err(DbError::Duplicate("address", _))));

        // Same string under a different currency is a distinct row.
        let ltc = AddressEntry {
            ticker: Ticker::new("ltc"),
            ..entry
        };
        db.with_txn(|txn| txn.insert_address(ltc)).unwrap();
    }

    #[test]
    fn test_deposit_uniqueness() {
        let db = MemDb::new();
        let key = DepositKey {
            txid: "sometx".to_owned(),
            address: "addr".to_owned(),
            ticker: btc(),
        };
        db.with_txn(|txn| {
            txn.insert_deposit(DepositEntry {
                key: key.clone(),
                processed: false,
            })
        })
        .unwrap();
        let res = db.with_txn(|txn| {
            txn.insert_deposit(DepositEntry {
                key: key.clone(),
                processed: false,
            })
        });
        assert!(matches!(res, Err(DbError::Duplicate("deposit", _))));
    }
}
