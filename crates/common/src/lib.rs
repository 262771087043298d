//! Common utilities shared between the custodia crates and binaries.

pub mod logging;
