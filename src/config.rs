//! Application configuration
//!
//! Loaded once at startup from a YAML file and passed explicitly into the
//! components that need it. There are no process-wide settings singletons.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for per-exchange history stores and logs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Global switch: when false, order placement is rejected and
    /// cancellation becomes a local no-op.
    #[serde(default = "default_true")]
    pub trading_enabled: bool,
    /// Global back-testing mode: venue submit/cancel calls are replaced by
    /// the simulation engine.
    #[serde(default)]
    pub backtest: bool,
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
}

/// Per-exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Taker fee rate applied by the simulation engine (e.g. 0.0025)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Display colour for UI layers; the core only carries it
    #[serde(default)]
    pub color: Option<String>,
    /// Scheduler tick in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub periods: RefreshPeriods,
    /// Starting balances for back-testing, coin -> total
    #[serde(default)]
    pub seed_balances: std::collections::HashMap<String, Decimal>,
    /// Starting order books for back-testing
    #[serde(default)]
    pub seed_books: Vec<SeedBook>,
}

/// One back-testing book, levels as `[price, size]` pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedBook {
    pub base: String,
    pub quote: String,
    #[serde(default)]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Minimum refresh period per update category, in milliseconds.
/// Pairs are refreshed only on demand and carry no period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshPeriods {
    #[serde(default = "default_balances_ms")]
    pub balances_ms: u64,
    #[serde(default = "default_market_ms")]
    pub market_ms: u64,
    #[serde(default = "default_orders_ms")]
    pub orders_ms: u64,
    #[serde(default = "default_transfers_ms")]
    pub transfers_ms: u64,
}

impl Default for RefreshPeriods {
    fn default() -> Self {
        Self {
            balances_ms: default_balances_ms(),
            market_ms: default_market_ms(),
            orders_ms: default_orders_ms(),
            transfers_ms: default_transfers_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

fn default_fee_rate() -> Decimal {
    // 25 bps, a common taker fee
    Decimal::new(25, 4)
}

fn default_tick_ms() -> u64 {
    100
}

fn default_balances_ms() -> u64 {
    1_000
}

fn default_market_ms() -> u64 {
    100
}

fn default_orders_ms() -> u64 {
    1_000
}

fn default_transfers_ms() -> u64 {
    60_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_minimal_config() {
        let yaml = r#"
exchanges:
  - name: kraken
  - name: bitfinex
    enabled: false
    fee_rate: 0.001
    periods:
      balances_ms: 2000
    seed_balances:
      USD: 10000
    seed_books:
      - base: BTC
        quote: USD
        bids: [[9990, 1.5]]
        asks: [[10010, 2]]
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.trading_enabled);
        assert!(!config.backtest);
        assert_eq!(config.exchanges.len(), 2);
        assert_eq!(config.enabled_exchanges().count(), 1);

        let kraken = &config.exchanges[0];
        assert_eq!(kraken.tick_ms, 100);
        assert_eq!(kraken.periods.balances_ms, 1_000);
        assert_eq!(kraken.periods.transfers_ms, 60_000);

        let bitfinex = &config.exchanges[1];
        assert_eq!(bitfinex.fee_rate, dec!(0.001));
        assert_eq!(bitfinex.periods.balances_ms, 2_000);
        assert_eq!(bitfinex.periods.market_ms, 100);
        assert_eq!(bitfinex.seed_balances["USD"], dec!(10000));
        assert_eq!(bitfinex.seed_books[0].asks, vec![(dec!(10010), dec!(2))]);
        assert!(kraken.seed_books.is_empty());
    }
}
