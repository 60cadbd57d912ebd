use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level configuration structure loaded from `config.json`.
//
// It defines:
// - Which exchanges to collect from
// - The instruments to subscribe to
// - Orderbook depth and snapshot cadence
// - Optional publisher / store overrides
//
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Enabled exchanges: any of "binance", "bybit".
    #[serde(default)]
    pub exchanges: Vec<String>,

    /// Legacy scalar form ("binance" / "bybit" / "both"); used as a
    /// fallback when the `exchanges` array is absent or empty.
    #[serde(default)]
    pub exchange: Option<String>,

    /// Instrument symbols, e.g. ["ETHUSDT", "BTCUSDT"].
    pub instruments: Vec<String>,

    /// Requested orderbook depth. Snapped per exchange to the nearest
    /// supported subscription depth.
    #[serde(default = "default_depth")]
    pub order_book_depth: u32,

    /// Snapshot sampling interval in milliseconds. Must be >= 1.
    #[serde(default = "default_poll_ms")]
    pub order_book_poll_frequency_in_ms: u64,

    /// PUB endpoint to bind. Wildcard host accepted.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite file for the market_state table.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_depth() -> u32 {
    20
}

fn default_poll_ms() -> u64 {
    50
}

fn default_bind_addr() -> String {
    "tcp://*:5555".to_string()
}

fn default_db_path() -> String {
    "market_state.db".to_string()
}

/// Exchange selection resolved from the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeChoice {
    Binance,
    Bybit,
    Both,
}

impl ExchangeChoice {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            ExchangeChoice::Binance => name == "binance",
            ExchangeChoice::Bybit => name == "bybit",
            ExchangeChoice::Both => name == "binance" || name == "bybit",
        }
    }

    pub fn names(&self) -> &'static [&'static str] {
        match self {
            ExchangeChoice::Binance => &["binance"],
            ExchangeChoice::Bybit => &["bybit"],
            ExchangeChoice::Both => &["binance", "bybit"],
        }
    }
}

impl Config {
    /// Read and validate a config file.
    ///
    /// Any failure here is fatal for the process (non-zero exit).
    pub fn load(path: &str) -> Result<Self> {
        let data =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        let cfg: Config =
            serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            bail!("config: instruments must not be empty");
        }
        if self.order_book_poll_frequency_in_ms < 1 {
            bail!("config: orderBookPollFrequencyInMs must be >= 1");
        }
        Ok(())
    }

    /// Resolve the exchange selection.
    ///
    /// New format: `"exchanges": ["binance", "bybit"]`. When the array is
    /// absent, empty, or carries no recognized name, the legacy scalar
    /// `"exchange"` field is consulted; its absence selects both.
    pub fn exchange_choice(&self) -> ExchangeChoice {
        let mut has_binance = false;
        let mut has_bybit = false;

        for ex in &self.exchanges {
            match ex.to_lowercase().as_str() {
                "binance" => has_binance = true,
                "bybit" => has_bybit = true,
                _ => {}
            }
        }

        match (has_binance, has_bybit) {
            (true, true) => return ExchangeChoice::Both,
            (true, false) => return ExchangeChoice::Binance,
            (false, true) => return ExchangeChoice::Bybit,
            (false, false) => {}
        }

        match self
            .exchange
            .as_deref()
            .unwrap_or("both")
            .to_lowercase()
            .as_str()
        {
            "binance" => ExchangeChoice::Binance,
            "bybit" => ExchangeChoice::Bybit,
            _ => ExchangeChoice::Both,
        }
    }
}
