//! Currency ticker identifiers.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Identifier of a supported currency ("btc", "ltc", "doge", ...).
///
/// Tickers are case-insensitive everywhere they are accepted, so the inner
/// string is normalized to lowercase at construction and comparisons are
/// plain equality.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn new(s: &str) -> Self {
        Self(s.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        assert_eq!(Ticker::new("DOGE"), Ticker::new("doge"));
        assert_eq!(Ticker::new(" BTC "), Ticker::new("btc"));
    }
}
