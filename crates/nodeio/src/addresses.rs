//! Receive-address pool refill.
//!
//! Keeps the queue of unassigned addresses for a currency topped up to its
//! configured target by asking the node wallet for fresh addresses. Insert
//! collisions on the `(address, currency)` key are swallowed, which makes
//! re-runs and concurrent refills harmless.

use custodia_db::errors::DbError;
use custodia_db::traits::{LedgerDatabase, LedgerTxn};
use custodia_db::types::AddressEntry;
use custodia_ledger::Ledger;
use custodia_primitives::Ticker;
use thiserror::Error;
use tracing::*;

use crate::rpc::error::ClientError;
use crate::rpc::traits::NodeRpc;

/// A node handing back the same address this many times in a row means its
/// wallet is not generating; bail instead of spinning.
const MAX_CONSECUTIVE_DUPLICATES: u32 = 5;

#[derive(Debug, Error)]
pub enum RefillError {
    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("rpc: {0}")]
    Rpc(#[from] ClientError),

    #[error("node keeps returning known addresses for {0}")]
    Stalled(Ticker),
}

/// Tops the unassigned pool for `ticker` up to `target`. Returns how many
/// addresses were added.
pub async fn refill_addresses_queue<D: LedgerDatabase>(
    ledger: &Ledger<D>,
    ticker: &Ticker,
    target: u64,
    account: &str,
    rpc: &impl NodeRpc,
) -> Result<u64, RefillError> {
    let mut added = 0;
    let mut duplicates = 0;
    loop {
        let count = ledger
            .db()
            .with_txn(|txn| -> Result<_, RefillError> {
                Ok(txn.count_unassigned_addresses(ticker)?)
            })?;
        if count >= target {
            break;
        }

        let address = rpc.get_new_address(account).await?;
        let res = ledger.db().with_txn(|txn| {
            txn.insert_address(AddressEntry {
                address: address.clone(),
                ticker: ticker.clone(),
                wallet: None,
                active: false,
            })
        });
        match res {
            Ok(()) => {
                added += 1;
                duplicates = 0;
            }
            Err(DbError::Duplicate(..)) => {
                debug!(%address, %ticker, "node returned a known address");
                duplicates += 1;
                if duplicates >= MAX_CONSECUTIVE_DUPLICATES {
                    return Err(RefillError::Stalled(ticker.clone()));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    if added > 0 {
        info!(%ticker, added, "address pool refilled");
    }
    Ok(added)
}
