//! Common type definitions used across the venuesync system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strongly typed exchange identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExchangeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed currency symbol ("BTC", "USD", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named logical partition of an exchange balance. Independent trading
/// strategies each run against their own fund so their balances never
/// overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundId(String);

impl FundId {
    /// The default fund. Venue-side balance changes that cannot be
    /// attributed to a specific fund accrue here.
    pub fn main() -> Self {
        Self("main".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FundId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FundId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for FundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Venue-assigned order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable key identifying one market: (exchange, base, quote).
/// Pairs live for the process lifetime and are never removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub exchange: ExchangeId,
    pub base: Symbol,
    pub quote: Symbol,
}

impl PairKey {
    pub fn new(
        exchange: impl Into<ExchangeId>,
        base: impl Into<Symbol>,
        quote: impl Into<Symbol>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.exchange, self.base, self.quote)
    }
}

/// Direction of a trade relative to the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TradeKind {
    /// Spend the quote currency, receive the base ("buy")
    QuoteToBase,
    /// Spend the base currency, receive the quote ("sell")
    BaseToQuote,
}

impl TradeKind {
    /// The currency this trade spends
    pub fn input_coin<'a>(&self, pair: &'a PairKey) -> &'a Symbol {
        match self {
            TradeKind::QuoteToBase => &pair.quote,
            TradeKind::BaseToQuote => &pair.base,
        }
    }

    /// The currency this trade receives
    pub fn output_coin<'a>(&self, pair: &'a PairKey) -> &'a Symbol {
        match self {
            TradeKind::QuoteToBase => &pair.base,
            TradeKind::BaseToQuote => &pair.quote,
        }
    }
}

impl<'de> serde::Deserialize<'de> for TradeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "quotetobase" | "quote_to_base" | "buy" => Ok(TradeKind::QuoteToBase),
            "basetoquote" | "base_to_quote" | "sell" => Ok(TradeKind::BaseToQuote),
            _ => Err(serde::de::Error::unknown_variant(
                &s,
                &["quote_to_base", "base_to_quote"],
            )),
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKind::QuoteToBase => write!(f, "quote-to-base"),
            TradeKind::BaseToQuote => write!(f, "base-to-quote"),
        }
    }
}

/// Order execution style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    Market,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Limit => write!(f, "Limit"),
            OrderKind::Market => write!(f, "Market"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_display() {
        let pair = PairKey::new("kraken", "BTC", "USD");
        assert_eq!(pair.to_string(), "kraken:BTC/USD");
    }

    #[test]
    fn trade_kind_coins() {
        let pair = PairKey::new("kraken", "BTC", "USD");
        assert_eq!(TradeKind::QuoteToBase.input_coin(&pair).as_str(), "USD");
        assert_eq!(TradeKind::QuoteToBase.output_coin(&pair).as_str(), "BTC");
        assert_eq!(TradeKind::BaseToQuote.input_coin(&pair).as_str(), "BTC");
        assert_eq!(TradeKind::BaseToQuote.output_coin(&pair).as_str(), "USD");
    }

    #[test]
    fn trade_kind_accepts_wire_spellings() {
        let k: TradeKind = serde_json::from_str("\"buy\"").unwrap();
        assert_eq!(k, TradeKind::QuoteToBase);
        let k: TradeKind = serde_json::from_str("\"base_to_quote\"").unwrap();
        assert_eq!(k, TradeKind::BaseToQuote);
    }
}
