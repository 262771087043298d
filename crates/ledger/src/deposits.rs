//! Inbound deposit processing.
//!
//! Turns a chain-transaction descriptor (from a wallet notification or the
//! since-block scanner) into ledger operations, honouring the currency's
//! confirmation threshold. Processing is idempotent on the
//! `(txid, address, currency)` deposit row, so duplicate node notifications
//! and rescans are harmless.

use custodia_db::traits::{LedgerDatabase, LedgerTxn};
use custodia_db::types::{DepositEntry, DepositKey, NewOperation, OpReason};
use custodia_primitives::{Amount, Ticker, TxCategory};
use tracing::*;

use crate::engine::{post_operation, Ledger};
use crate::errors::{LedgerError, LedgerResult};

/// Subset of the node's transaction detail the deposit processor acts on.
#[derive(Clone, Debug)]
pub struct DepositNotice {
    pub category: TxCategory,
    pub txid: String,
    pub address: String,
    pub amount: Amount,
    pub confirmations: i64,
}

impl<D: LedgerDatabase> Ledger<D> {
    /// Processes one inbound chain credit for `ticker`.
    ///
    /// No-ops: categories that cannot credit us, credits to addresses we do
    /// not own or have not assigned to a wallet yet, and deposits already
    /// processed. Conflicted transactions (negative confirmation count) are
    /// logged and skipped pending manual review.
    pub fn process_deposit(&self, notice: &DepositNotice, ticker: &Ticker) -> LedgerResult<()> {
        if !notice.category.is_inbound() {
            return Ok(());
        }
        if notice.confirmations < 0 {
            warn!(txid = %notice.txid, ticker = %ticker, "conflicted transaction, skipping");
            return Ok(());
        }

        self.db().with_txn(|txn| {
            let currency = txn
                .get_currency(ticker)?
                .ok_or_else(|| LedgerError::UnknownCurrency(ticker.clone()))?;

            // The daemon can receive funds on addresses we have not handed
            // out; they stay unaccounted until the address is assigned.
            let Some(address) = txn.get_address(ticker, &notice.address)? else {
                debug!(address = %notice.address, "credit to foreign address ignored");
                return Ok(());
            };
            let Some(wallet_id) = address.wallet else {
                debug!(address = %notice.address, "credit to unassigned address ignored");
                return Ok(());
            };

            let key = DepositKey {
                txid: notice.txid.clone(),
                address: notice.address.clone(),
                ticker: ticker.clone(),
            };
            let (processed, first_sighting) = match txn.get_deposit(&key)? {
                Some(deposit) => (deposit.processed, false),
                None => {
                    txn.insert_deposit(DepositEntry {
                        key: key.clone(),
                        processed: false,
                    })?;
                    (false, true)
                }
            };
            if processed {
                // Duplicate notification for a settled deposit.
                return Ok(());
            }

            let confirmed = notice.confirmations >= currency.confirmations_required
                && matches!(notice.category, TxCategory::Receive | TxCategory::Generate);

            if confirmed {
                let op = if first_sighting {
                    // Never seen below the threshold; credit balance directly.
                    NewOperation::on(wallet_id).balance(notice.amount)
                } else {
                    // Seen before while unconfirmed; move the funds over.
                    NewOperation::on(wallet_id)
                        .balance(notice.amount)
                        .unconfirmed(-notice.amount)
                };
                post_operation(
                    txn,
                    op.description("Deposit").reason(OpReason::Deposit(key.clone())),
                )?;
                txn.mark_deposit_processed(&key)?;
                info!(txid = %key.txid, wallet = %wallet_id, amount = %notice.amount, "deposit confirmed");
            } else if first_sighting {
                post_operation(
                    txn,
                    NewOperation::on(wallet_id)
                        .unconfirmed(notice.amount)
                        .description("Unconfirmed deposit")
                        .reason(OpReason::Deposit(key)),
                )?;
            }
            Ok(())
        })
    }
}
