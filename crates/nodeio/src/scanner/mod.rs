//! Since-block reconciliation.
//!
//! Walks the node's incremental transaction feed from the currency's saved
//! cursor, funnels inbound credits through the deposit processor (whose
//! row-level idempotence makes rescans harmless) and advances the cursor to
//! a tip deep enough to be stable.

use custodia_db::errors::DbError;
use custodia_db::traits::{LedgerDatabase, LedgerTxn};
use custodia_ledger::{DepositNotice, Ledger, LedgerError};
use custodia_primitives::{Ticker, TxCategory};
use thiserror::Error;
use tracing::*;

use crate::rpc::error::ClientError;
use crate::rpc::traits::NodeRpc;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("rpc: {0}")]
    Rpc(#[from] ClientError),
}

pub struct ChainScanner<D> {
    ledger: Ledger<D>,
}

impl<D: LedgerDatabase> ChainScanner<D> {
    pub fn new(ledger: Ledger<D>) -> Self {
        Self { ledger }
    }

    /// Resyncs `ticker` against the node: processes everything the wallet
    /// saw since the last scan, then moves the cursor to
    /// `tip - confirmations_required` so reorged blocks get rescanned.
    pub async fn query_transactions(
        &self,
        ticker: &Ticker,
        rpc: &impl NodeRpc,
    ) -> Result<(), ScanError> {
        let currency = self.ledger.currency(ticker)?;

        let tip = rpc.get_block_count().await?;
        let safe_height = tip.saturating_sub(currency.confirmations_required.max(0) as u64);
        let cursor = rpc.get_block_hash(safe_height).await?;

        let since = rpc
            .list_since_block(currency.last_block_hash.as_deref())
            .await?;
        debug!(%ticker, entries = since.transactions.len(), "since-block scan");

        for envelope in &since.transactions {
            match envelope.category {
                Some(TxCategory::Receive) => {
                    let Some(address) = &envelope.address else {
                        continue;
                    };
                    let notice = DepositNotice {
                        category: TxCategory::Receive,
                        txid: envelope.txid.clone(),
                        address: address.clone(),
                        amount: envelope.amount,
                        confirmations: envelope.confirmations,
                    };
                    self.ledger.process_deposit(&notice, ticker)?;
                }
                Some(TxCategory::Send) => {
                    // Our own batch coming back around; nothing to move once
                    // the rows are sent, just surface finality.
                    let confirmed = envelope.confirmations >= currency.confirmations_required;
                    let rows = self.ledger.db().with_txn(|txn| -> Result<_, ScanError> {
                        Ok(txn.sent_withdrawals_by_txid(ticker, &envelope.txid)?)
                    })?;
                    if confirmed && !rows.is_empty() {
                        debug!(txid = %envelope.txid, rows = rows.len(), "withdrawal batch confirmed");
                    }
                }
                _ => {}
            }
        }

        self.ledger
            .db()
            .with_txn(|txn| -> Result<_, ScanError> {
                Ok(txn.set_last_block_hash(ticker, &cursor)?)
            })?;
        Ok(())
    }

    /// One-shot re-query of a single transaction, e.g. from a wallet
    /// notification. Every receive detail goes through the deposit
    /// processor with the envelope-level confirmation count.
    pub async fn query_transaction(
        &self,
        ticker: &Ticker,
        txid: &str,
        rpc: &impl NodeRpc,
    ) -> Result<(), ScanError> {
        let envelope = rpc.get_transaction(txid).await?;
        for detail in &envelope.details {
            if detail.category != TxCategory::Receive {
                continue;
            }
            let Some(address) = &detail.address else {
                continue;
            };
            let notice = DepositNotice {
                category: detail.category,
                txid: envelope.txid.clone(),
                address: address.clone(),
                amount: detail.amount,
                confirmations: envelope.confirmations,
            };
            self.ledger.process_deposit(&notice, ticker)?;
        }
        Ok(())
    }
}
