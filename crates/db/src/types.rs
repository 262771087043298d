//! Row types for the five ledger relations.

use std::fmt::{self, Display};

use custodia_primitives::{Amount, Ticker};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Copy,
            Clone,
            Debug,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        pub struct $name(pub u64);

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(WalletId);
id_newtype!(WithdrawalId);
id_newtype!(OperationId);

/// Registry row for a supported currency. Created once at setup; only
/// `last_block_hash` moves afterwards, advanced by the since-block scanner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrencyEntry {
    pub ticker: Ticker,
    pub label: String,
    /// Base58 address version prefixes accepted for this currency.
    pub magic_bytes: Vec<u8>,
    /// Amounts must strictly exceed this to be deliverable on-chain.
    pub dust: Amount,
    /// Blocks after which a deposit is considered final. Always ≥ 1.
    pub confirmations_required: i64,
    /// Where the last since-block scan left off.
    pub last_block_hash: Option<String>,
}

impl CurrencyEntry {
    pub fn new(ticker: Ticker, label: &str) -> Self {
        Self {
            ticker,
            label: label.to_owned(),
            magic_bytes: vec![0],
            dust: Amount::ZERO,
            confirmations_required: 2,
            last_block_hash: None,
        }
    }
}

/// A user wallet. The three amount columns are materialised sums over the
/// wallet's operations and are only ever written together with one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: WalletId,
    pub ticker: Ticker,
    pub label: String,
    /// Spendable funds.
    pub balance: Amount,
    /// Inbound funds below the confirmation threshold.
    pub unconfirmed: Amount,
    /// Funds earmarked for pending withdrawals.
    pub holded: Amount,
}

/// A receive address, unique per currency. `wallet = None` means the address
/// sits in the pre-generated pool waiting to be claimed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    pub ticker: Ticker,
    pub wallet: Option<WalletId>,
    /// The wallet's default receive address.
    pub active: bool,
}

/// Identity of an inbound chain credit. A chain transaction paying several
/// owned addresses yields one row per address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DepositKey {
    pub txid: String,
    pub address: String,
    pub ticker: Ticker,
}

/// Inbound transaction record. `processed` flips to true exactly once, when
/// the credit reaches the confirmation threshold, and never reverts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositEntry {
    pub key: DepositKey,
    pub processed: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    /// Queued; funds are held on the wallet.
    New,
    /// Included in a broadcast `sendmany` batch.
    Sent,
}

/// Outbound queue row. Created by withdrawal intake with the funds moved to
/// hold; the batched sender assigns the shared txid and flips the status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalEntry {
    pub id: WithdrawalId,
    pub wallet: WalletId,
    pub ticker: Ticker,
    pub address: String,
    pub amount: Amount,
    pub txid: Option<String>,
    /// This row's share of the batch network fee.
    pub fee: Amount,
    pub status: WithdrawalStatus,
}

/// Tagged reference to the row that caused a ledger entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OpReason {
    Deposit(DepositKey),
    Withdrawal(WithdrawalId),
    /// Peer entry of a wallet-to-wallet transfer.
    Operation(OperationId),
}

/// Append-only ledger entry. The amount fields are signed deltas against the
/// owning wallet's columns; entries are never deleted, corrections are
/// posted as counter-entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub id: OperationId,
    pub wallet: WalletId,
    pub balance: Amount,
    pub unconfirmed: Amount,
    pub holded: Amount,
    pub description: String,
    pub reason: Option<OpReason>,
}

/// An operation about to be appended; the id is assigned by the database.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOperation {
    pub wallet: WalletId,
    pub balance: Amount,
    pub unconfirmed: Amount,
    pub holded: Amount,
    pub description: String,
    pub reason: Option<OpReason>,
}

impl NewOperation {
    /// A zeroed delta against `wallet`; callers set the fields they move.
    pub fn on(wallet: WalletId) -> Self {
        Self {
            wallet,
            balance: Amount::ZERO,
            unconfirmed: Amount::ZERO,
            holded: Amount::ZERO,
            description: String::new(),
            reason: None,
        }
    }

    pub fn balance(mut self, delta: Amount) -> Self {
        self.balance = delta;
        self
    }

    pub fn unconfirmed(mut self, delta: Amount) -> Self {
        self.unconfirmed = delta;
        self
    }

    pub fn holded(mut self, delta: Amount) -> Self {
        self.holded = delta;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    pub fn reason(mut self, reason: OpReason) -> Self {
        self.reason = Some(reason);
        self
    }
}
