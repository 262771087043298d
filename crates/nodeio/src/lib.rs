//! Input-output with the per-currency node daemons: the wallet JSON-RPC
//! client, the batched withdrawal sender, the since-block reconciliation
//! scanner and the receive-address pool refill.

pub mod addresses;
pub mod config;
pub mod rpc;
pub mod scanner;
pub mod sender;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
