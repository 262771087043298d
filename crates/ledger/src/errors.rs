use custodia_db::errors::DbError;
use custodia_db::types::WalletId;
use custodia_primitives::Ticker;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("unknown currency {0}")]
    UnknownCurrency(Ticker),

    #[error("unknown wallet {0}")]
    UnknownWallet(WalletId),

    /// Requested amount was zero or negative.
    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("not enough funds in wallet {0}")]
    NotEnoughFunds(WalletId),

    #[error("invalid {0} address {1}")]
    InvalidAddress(Ticker, String),

    #[error("wallets belong to different currencies")]
    CurrencyMismatch,

    /// Committing would leave a wallet column negative. This is the bug
    /// class: the transaction is rolled back and the condition surfaces to
    /// the operator.
    #[error("operation would leave wallet {0} negative")]
    Invariant(WalletId),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
