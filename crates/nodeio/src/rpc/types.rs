//! Wire shapes of the node wallet RPC responses. Unknown fields are
//! ignored; amounts deserialize through [`Amount`] so they stay exact.

use custodia_primitives::{Amount, TxCategory};
use serde::{Deserialize, Serialize};

/// One entry of a `gettransaction` envelope's `details` array.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TransactionDetail {
    pub category: TxCategory,
    /// Absent for some non-standard scripts.
    #[serde(default)]
    pub address: Option<String>,
    pub amount: Amount,
    #[serde(default)]
    pub account: Option<String>,
    /// Negative; only present on send details.
    #[serde(default)]
    pub fee: Option<Amount>,
}

/// Envelope returned by `gettransaction` and, in flattened per-output form,
/// by `listsinceblock` (top-level `address`/`category`/`amount`, empty
/// `details`).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TransactionEnvelope {
    pub txid: String,
    pub amount: Amount,
    /// Negative for sends.
    #[serde(default)]
    pub fee: Option<Amount>,
    pub confirmations: i64,
    #[serde(default)]
    pub blockhash: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub category: Option<TxCategory>,
    #[serde(default)]
    pub details: Vec<TransactionDetail>,
}

/// Result of `listsinceblock`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SinceBlock {
    pub transactions: Vec<TransactionEnvelope>,
    #[serde(default)]
    pub lastblock: Option<String>,
}
