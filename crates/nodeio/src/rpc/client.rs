//! Reqwest-backed JSON-RPC 1.0 client for a node's wallet interface.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use custodia_primitives::Amount;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, to_value, Value};
use tracing::*;

use super::error::{ClientError, ClientResult};
use super::traits::NodeRpc;
use super::types::{SinceBlock, TransactionEnvelope};

const RETRY_BACKOFF: Duration = Duration::from_millis(1_000);

/// Error object of a JSON-RPC response envelope.
#[derive(Debug, Clone, Deserialize)]
struct RpcErrorBody {
    code: i32,
    message: String,
}

/// JSON-RPC response envelope, generic over the result payload.
#[derive(Debug, Deserialize)]
struct Response<R> {
    result: Option<R>,
    error: Option<RpcErrorBody>,
    #[allow(unused)]
    #[serde(default)]
    id: Value,
}

/// Connection to one currency's node. Bitcoin-family daemons speak JSON-RPC
/// 1.0 over HTTP with basic auth.
#[derive(Debug, Clone)]
pub struct CoindClient {
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl CoindClient {
    /// Creates a client for `url` with the given credentials. `timeout`
    /// bounds each HTTP round trip; transport failures are retried up to
    /// `max_retries` times with a fixed backoff.
    pub fn new(
        url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        let auth = base64::engine::general_purpose::STANDARD
            .encode(format!("{username}:{password}"));
        let auth_value = format!("Basic {auth}")
            .parse()
            .map_err(|_| ClientError::Format("invalid basic-auth credentials".to_owned()))?;
        headers.insert("Authorization", auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            url: url.to_owned(),
            client,
            max_retries,
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> ClientResult<T> {
        let mut attempt = 0;
        loop {
            match self.call_once(method, &params).await {
                Err(ClientError::Transport(err)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(%method, %err, attempt, "node request failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                other => return other,
            }
        }
    }

    async fn call_once<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[Value],
    ) -> ClientResult<T> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "1.0",
                "id": method,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        let envelope = response.json::<Response<T>>().await?;
        if let Some(error) = envelope.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| ClientError::Format(format!("{method}: missing result")))
    }
}

fn param<T: serde::Serialize>(value: T) -> ClientResult<Value> {
    to_value(value).map_err(|e| ClientError::Format(e.to_string()))
}

#[async_trait]
impl NodeRpc for CoindClient {
    async fn get_new_address(&self, account: &str) -> ClientResult<String> {
        self.call("getnewaddress", vec![param(account)?]).await
    }

    async fn send_many(
        &self,
        account: &str,
        outputs: &BTreeMap<String, Amount>,
    ) -> ClientResult<String> {
        // Amounts serialize through arbitrary-precision JSON numbers, so the
        // node sees the exact decimal we computed.
        self.call("sendmany", vec![param(account)?, param(outputs)?])
            .await
    }

    async fn get_transaction(&self, txid: &str) -> ClientResult<TransactionEnvelope> {
        self.call("gettransaction", vec![param(txid)?]).await
    }

    async fn list_since_block(&self, blockhash: Option<&str>) -> ClientResult<SinceBlock> {
        let params = match blockhash {
            Some(hash) => vec![param(hash)?],
            None => vec![],
        };
        self.call("listsinceblock", params).await
    }

    async fn get_block_count(&self) -> ClientResult<u64> {
        self.call("getblockcount", vec![]).await
    }

    async fn get_block_hash(&self, height: u64) -> ClientResult<String> {
        self.call("getblockhash", vec![param(height)?]).await
    }
}
