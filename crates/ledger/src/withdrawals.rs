//! Withdrawal intake.
//!
//! Records the queue row and moves the funds from `balance` to `holded` in
//! one transaction. The batched sender picks the row up later; until then
//! the hold keeps the funds out of spendable balance.

use custodia_db::traits::{LedgerDatabase, LedgerTxn};
use custodia_db::types::{NewOperation, OpReason, WalletId, WithdrawalEntry};
use custodia_primitives::Amount;
use tracing::*;

use crate::engine::{post_operation, Ledger};
use crate::errors::{LedgerError, LedgerResult};

impl<D: LedgerDatabase> Ledger<D> {
    /// Queues a withdrawal of `amount` from `wallet_id` to `address`.
    ///
    /// Fails without touching any state when the address does not validate
    /// for the wallet's currency, the amount is not positive, or the wallet's
    /// spendable balance cannot cover it.
    pub fn withdraw_to_address(
        &self,
        wallet_id: WalletId,
        address: &str,
        amount: Amount,
        description: Option<&str>,
    ) -> LedgerResult<WithdrawalEntry> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount);
        }

        self.db().with_txn(|txn| {
            let wallet = txn
                .wallet_for_update(wallet_id)?
                .ok_or(LedgerError::UnknownWallet(wallet_id))?;
            let currency = txn
                .get_currency(&wallet.ticker)?
                .ok_or_else(|| LedgerError::UnknownCurrency(wallet.ticker.clone()))?;

            if !(self.validator)(&currency, address) {
                return Err(LedgerError::InvalidAddress(
                    wallet.ticker.clone(),
                    address.to_owned(),
                ));
            }
            if wallet.balance < amount {
                return Err(LedgerError::NotEnoughFunds(wallet_id));
            }

            let entry = txn.insert_withdrawal(wallet_id, &wallet.ticker, address, amount)?;
            post_operation(
                txn,
                NewOperation::on(wallet_id)
                    .balance(-amount)
                    .holded(amount)
                    .description(description.unwrap_or_default())
                    .reason(OpReason::Withdrawal(entry.id)),
            )?;

            debug!(withdrawal = %entry.id, wallet = %wallet_id, %amount, "withdrawal queued");
            Ok(entry)
        })
    }
}
