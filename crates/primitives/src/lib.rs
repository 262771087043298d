//! Base types shared across the custodia stack: exact monetary amounts,
//! currency tickers, node transaction categories and address validation.

pub mod address;
pub mod amount;
pub mod category;
pub mod currency;

pub use address::is_valid_address;
pub use amount::{Amount, AmountError};
pub use category::TxCategory;
pub use currency::Ticker;
