//! Canned node client for tests: fixed responses plus call recording, so
//! tests can assert the exact RPC arguments the tasks produced.

use std::collections::BTreeMap;

use async_trait::async_trait;
use custodia_primitives::Amount;
use parking_lot::Mutex;

use crate::rpc::error::{ClientError, ClientResult};
use crate::rpc::traits::NodeRpc;
use crate::rpc::types::{SinceBlock, TransactionEnvelope};

fn unavailable(method: &str) -> ClientError {
    ClientError::Rpc {
        code: -32601,
        message: format!("{method}: no canned response"),
    }
}

/// Test double for [`NodeRpc`]. Responses left unset make the corresponding
/// call fail, which doubles as the RPC-failure fixture.
#[derive(Default)]
pub struct TestNodeClient {
    send_many_txid: Option<String>,
    transaction: Option<TransactionEnvelope>,
    since_block: Option<SinceBlock>,
    block_count: Option<u64>,
    block_hash: Option<String>,
    address_seq: Mutex<u64>,
    canned_addresses: Mutex<Vec<String>>,

    pub send_many_calls: Mutex<Vec<(String, BTreeMap<String, Amount>)>>,
    pub get_transaction_calls: Mutex<Vec<String>>,
    pub list_since_block_calls: Mutex<Vec<Option<String>>>,
    pub get_block_hash_calls: Mutex<Vec<u64>>,
    pub get_new_address_calls: Mutex<u64>,
}

impl TestNodeClient {
    pub fn with_send_many(mut self, txid: &str) -> Self {
        self.send_many_txid = Some(txid.to_owned());
        self
    }

    pub fn with_transaction(mut self, envelope: TransactionEnvelope) -> Self {
        self.transaction = Some(envelope);
        self
    }

    pub fn with_since_block(mut self, since: SinceBlock) -> Self {
        self.since_block = Some(since);
        self
    }

    pub fn with_chain_tip(mut self, count: u64, hash: &str) -> Self {
        self.block_count = Some(count);
        self.block_hash = Some(hash.to_owned());
        self
    }

    /// Queues addresses returned by `getnewaddress` before the generated
    /// `taddr-N` fallback kicks in. Useful for forcing duplicates.
    pub fn with_addresses(self, addresses: &[&str]) -> Self {
        let mut queued: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        queued.reverse();
        *self.canned_addresses.lock() = queued;
        self
    }
}

#[async_trait]
impl NodeRpc for TestNodeClient {
    async fn get_new_address(&self, _account: &str) -> ClientResult<String> {
        *self.get_new_address_calls.lock() += 1;
        if let Some(addr) = self.canned_addresses.lock().pop() {
            return Ok(addr);
        }
        let mut seq = self.address_seq.lock();
        *seq += 1;
        Ok(format!("taddr-{seq}"))
    }

    async fn send_many(
        &self,
        account: &str,
        outputs: &BTreeMap<String, Amount>,
    ) -> ClientResult<String> {
        match &self.send_many_txid {
            Some(txid) => {
                self.send_many_calls
                    .lock()
                    .push((account.to_owned(), outputs.clone()));
                Ok(txid.clone())
            }
            None => Err(unavailable("sendmany")),
        }
    }

    async fn get_transaction(&self, txid: &str) -> ClientResult<TransactionEnvelope> {
        self.get_transaction_calls.lock().push(txid.to_owned());
        self.transaction
            .clone()
            .ok_or_else(|| unavailable("gettransaction"))
    }

    async fn list_since_block(&self, blockhash: Option<&str>) -> ClientResult<SinceBlock> {
        self.list_since_block_calls
            .lock()
            .push(blockhash.map(str::to_owned));
        self.since_block
            .clone()
            .ok_or_else(|| unavailable("listsinceblock"))
    }

    async fn get_block_count(&self) -> ClientResult<u64> {
        self.block_count.ok_or_else(|| unavailable("getblockcount"))
    }

    async fn get_block_hash(&self, height: u64) -> ClientResult<String> {
        self.get_block_hash_calls.lock().push(height);
        self.block_hash
            .clone()
            .ok_or_else(|| unavailable("getblockhash"))
    }
}
