use std::collections::BTreeMap;

use async_trait::async_trait;
use custodia_primitives::Amount;

use super::error::ClientResult;
use super::types::{SinceBlock, TransactionEnvelope};

/// Wallet RPC surface of a Bitcoin-family node daemon. One instance per
/// currency; the settlement tasks are generic over this.
#[async_trait]
pub trait NodeRpc: Sync + Send + 'static {
    /// Asks the node wallet for a fresh receive address.
    async fn get_new_address(&self, account: &str) -> ClientResult<String>;

    /// Sends to multiple outputs in one on-chain transaction; returns its
    /// txid.
    async fn send_many(
        &self,
        account: &str,
        outputs: &BTreeMap<String, Amount>,
    ) -> ClientResult<String>;

    async fn get_transaction(&self, txid: &str) -> ClientResult<TransactionEnvelope>;

    /// Incremental wallet-transaction feed rooted at `blockhash` (or the
    /// genesis when `None`).
    async fn list_since_block(&self, blockhash: Option<&str>) -> ClientResult<SinceBlock>;

    async fn get_block_count(&self) -> ClientResult<u64>;

    async fn get_block_hash(&self, height: u64) -> ClientResult<String>;
}
