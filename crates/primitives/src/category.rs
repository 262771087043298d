//! Transaction detail categories reported by the node.

use serde::{Deserialize, Serialize};

/// Category the node assigns to a transaction detail in `gettransaction` and
/// `listsinceblock` output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxCategory {
    Send,
    Receive,
    /// Coinbase output that has not matured yet.
    Immature,
    /// Matured coinbase output.
    Generate,
    Orphan,
    /// Anything a newer node version may report that we do not know about.
    #[serde(other)]
    Unknown,
}

impl TxCategory {
    /// Whether this category can credit an owned address.
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::Receive | Self::Immature | Self::Generate)
    }
}
