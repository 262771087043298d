//! Daemon configuration.
//!
//! One `[[currencies]]` block per supported currency plus global task
//! settings. Decimal fields (`dust`) take strings so the configured value is
//! carried exactly.

use std::time::Duration;

use custodia_db::types::CurrencyEntry;
use custodia_primitives::{Amount, Ticker};
use serde::Deserialize;

fn default_scan_poll() -> u64 {
    60
}

fn default_send_poll() -> u64 {
    30
}

fn default_refill_poll() -> u64 {
    300
}

fn default_confirmations() -> i64 {
    2
}

fn default_magic_bytes() -> Vec<u8> {
    vec![0]
}

fn default_queue_target() -> u64 {
    20
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_rpc_retries() -> u32 {
    3
}

/// Global task settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    /// Account label passed to the node wallet calls.
    #[serde(default)]
    pub account_label: String,

    /// Seconds between since-block scans per currency.
    #[serde(default = "default_scan_poll")]
    pub scan_poll_secs: u64,

    /// Seconds between withdrawal-queue drains per currency.
    #[serde(default = "default_send_poll")]
    pub send_poll_secs: u64,

    /// Seconds between address-pool refills per currency.
    #[serde(default = "default_refill_poll")]
    pub refill_poll_secs: u64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            account_label: String::new(),
            scan_poll_secs: default_scan_poll(),
            send_poll_secs: default_send_poll(),
            refill_poll_secs: default_refill_poll(),
        }
    }
}

/// Per-currency settings: node endpoint plus the registry row seed.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    pub ticker: Ticker,
    pub label: String,

    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_password: String,

    #[serde(default = "default_confirmations")]
    pub confirmations_required: i64,

    #[serde(default)]
    pub dust: Amount,

    /// Base58 address version prefixes.
    #[serde(default = "default_magic_bytes")]
    pub magic_bytes: Vec<u8>,

    /// Unassigned receive addresses to keep pre-generated.
    #[serde(default = "default_queue_target")]
    pub address_queue_target: u64,

    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    #[serde(default = "default_rpc_retries")]
    pub rpc_retries: u32,
}

impl CurrencyConfig {
    /// The registry row this config seeds at startup.
    pub fn currency_entry(&self) -> CurrencyEntry {
        CurrencyEntry {
            ticker: self.ticker.clone(),
            label: self.label.clone(),
            magic_bytes: self.magic_bytes.clone(),
            dust: self.dust,
            confirmations_required: self.confirmations_required.max(1),
            last_block_hash: None,
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeSettings,
    pub currencies: Vec<CurrencyConfig>,
}
