//! Command-line interface
//!
//! Argument parsing with clap and a structured command pattern: each
//! subcommand owns its args and an `execute` body.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use crate::config::AppConfig;
use crate::exchange::{Exchange, ExchangeSet};
use crate::logging::{init_logging, LogMode, LoggingConfig};
use crate::types::{PairKey, Symbol};
use crate::venue::sim::SimVenue;
use crate::view::PriceLevel;

#[derive(Parser)]
#[command(name = "venuesync")]
#[command(version)]
#[command(about = "Multi-exchange market aggregation and order service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true, default_value = "venuesync.yaml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the aggregation service until interrupted
    Run(RunArgs),

    /// Validate the configuration file and print a summary
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Force back-testing mode regardless of the config file
    #[arg(long)]
    pub backtest: bool,
}

#[derive(Args)]
pub struct ConfigArgs {}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let mut config = AppConfig::load(&self.config)?;
        init_logging(LoggingConfig::new(
            LogMode::ConsoleAndFile,
            &config.data_dir,
        ))?;

        match self.command {
            Commands::Run(args) => {
                if args.backtest {
                    config.backtest = true;
                }
                run(config).await
            }
            Commands::Config(_) => {
                summarise(&config);
                Ok(())
            }
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    // The only built-in venue connector is the simulator; live connectors
    // plug in through `VenueApi`.
    if !config.backtest {
        bail!("no live venue connector configured; run with --backtest or set `backtest: true`");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut exchanges = ExchangeSet::new();

    for cfg in config.enabled_exchanges() {
        let sim = Arc::new(SimVenue::new(cfg.name.as_str().into(), cfg.fee_rate));
        for (coin, total) in &cfg.seed_balances {
            sim.seed_balance(coin.as_str().into(), *total).await;
        }
        for book in &cfg.seed_books {
            sim.seed_book(
                PairKey::new(cfg.name.as_str(), book.base.as_str(), book.quote.as_str()),
                levels(&book.bids),
                levels(&book.asks),
            )
            .await;
        }

        let coins: Vec<Symbol> = cfg
            .seed_balances
            .keys()
            .map(|c| Symbol::from(c.as_str()))
            .collect();
        let handle = Exchange::spawn(
            cfg,
            &config.data_dir,
            sim,
            coins,
            config.trading_enabled,
            shutdown_rx.clone(),
        )?;
        for book in &cfg.seed_books {
            handle.track_pair(PairKey::new(
                cfg.name.as_str(),
                book.base.as_str(),
                book.quote.as_str(),
            ));
        }
        exchanges.insert(handle);
    }

    if exchanges.is_empty() {
        bail!("no enabled exchanges in the configuration");
    }
    info!(
        exchanges = exchanges.len(),
        backtest = config.backtest,
        "venuesync running, ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    // Let writer tasks drain their queues before the process exits.
    tokio::time::sleep(Duration::from_millis(250)).await;
    Ok(())
}

fn levels(raw: &[(rust_decimal::Decimal, rust_decimal::Decimal)]) -> Vec<PriceLevel> {
    raw.iter()
        .map(|(price, size)| PriceLevel::new(*price, *size))
        .collect()
}

fn summarise(config: &AppConfig) {
    println!("data_dir:        {}", config.data_dir.display());
    println!("trading_enabled: {}", config.trading_enabled);
    println!("backtest:        {}", config.backtest);
    for cfg in &config.exchanges {
        println!(
            "exchange {}: enabled={} fee_rate={} tick={}ms books={} coins={}",
            cfg.name,
            cfg.enabled,
            cfg.fee_rate,
            cfg.tick_ms,
            cfg.seed_books.len(),
            cfg.seed_balances.len(),
        );
    }
}
