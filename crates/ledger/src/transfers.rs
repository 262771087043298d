//! Internal wallet-to-wallet transfers.

use custodia_db::traits::{LedgerDatabase, LedgerTxn};
use custodia_db::types::{NewOperation, OpReason, WalletId};
use custodia_primitives::Amount;
use tracing::*;

use crate::engine::{post_operation, Ledger};
use crate::errors::{LedgerError, LedgerResult};

impl<D: LedgerDatabase> Ledger<D> {
    /// Moves `amount` of spendable balance between two wallets of the same
    /// currency. Posts the debit and the credit with symmetric reason links
    /// in one transaction.
    pub fn transfer(
        &self,
        source: WalletId,
        amount: Amount,
        destination: WalletId,
    ) -> LedgerResult<()> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount);
        }

        self.db().with_txn(|txn| {
            let src = txn
                .wallet_for_update(source)?
                .ok_or(LedgerError::UnknownWallet(source))?;
            let dst = txn
                .wallet_for_update(destination)?
                .ok_or(LedgerError::UnknownWallet(destination))?;

            if src.ticker != dst.ticker {
                return Err(LedgerError::CurrencyMismatch);
            }
            if src.balance < amount {
                return Err(LedgerError::NotEnoughFunds(source));
            }

            let debit = post_operation(
                txn,
                NewOperation::on(source)
                    .balance(-amount)
                    .description("Transfer"),
            )?;
            let credit = post_operation(
                txn,
                NewOperation::on(destination)
                    .balance(amount)
                    .description("Transfer")
                    .reason(OpReason::Operation(debit.id)),
            )?;
            txn.set_operation_reason(debit.id, OpReason::Operation(credit.id))?;

            debug!(%source, %destination, %amount, "transfer posted");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;
    use std::sync::Arc;

    use custodia_db::types::CurrencyEntry;
    use custodia_db::MemDb;
    use custodia_primitives::Ticker;

    use super::*;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn setup() -> (Ledger<MemDb>, WalletId, WalletId) {
        let ledger = Ledger::new(Arc::new(MemDb::new()));
        let tst = Ticker::new("tst");
        ledger
            .upsert_currency(CurrencyEntry::new(tst.clone(), "Testnet"))
            .unwrap();
        let w1 = ledger.create_wallet(&tst, "one").unwrap();
        let w2 = ledger.create_wallet(&tst, "two").unwrap();
        ledger
            .db()
            .with_txn(|txn| post_operation(txn, NewOperation::on(w1.id).balance(amt("1"))))
            .unwrap();
        (ledger, w1.id, w2.id)
    }

    #[test]
    fn test_transfer_moves_balance() {
        let (ledger, w1, w2) = setup();
        ledger.transfer(w1, amt("1"), w2).unwrap();

        assert_eq!(ledger.wallet(w1).unwrap().balance, Amount::ZERO);
        assert_eq!(ledger.wallet(w2).unwrap().balance, amt("1"));
    }

    #[test]
    fn test_transfer_operations_are_linked() {
        let (ledger, w1, w2) = setup();
        ledger.transfer(w1, amt("1"), w2).unwrap();

        let (debit, credit) = ledger
            .db()
            .with_txn(|txn| -> LedgerResult<_> {
                let debit = txn.wallet_operations(w1)?.pop().unwrap();
                let credit = txn.wallet_operations(w2)?.pop().unwrap();
                Ok((debit, credit))
            })
            .unwrap();

        assert_eq!(debit.balance, -amt("1"));
        assert_eq!(credit.balance, amt("1"));
        assert_eq!(debit.reason, Some(OpReason::Operation(credit.id)));
        assert_eq!(credit.reason, Some(OpReason::Operation(debit.id)));
    }

    #[test]
    fn test_transfer_requires_funds() {
        let (ledger, w1, w2) = setup();
        let res = ledger.transfer(w2, amt("1"), w1);
        assert!(matches!(res, Err(LedgerError::NotEnoughFunds(_))));
    }

    #[test]
    fn test_transfer_requires_same_currency() {
        let (ledger, w1, _) = setup();
        let ltc = Ticker::new("ltc");
        ledger
            .upsert_currency(CurrencyEntry::new(ltc.clone(), "Litecoin"))
            .unwrap();
        let other = ledger.create_wallet(&ltc, "other").unwrap();

        let res = ledger.transfer(w1, amt("1"), other.id);
        assert!(matches!(res, Err(LedgerError::CurrencyMismatch)));
    }
}
