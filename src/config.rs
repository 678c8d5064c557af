use crate::time_utils::{DisplayZone, Interval};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// CONFIGURATION STRUCTS
// Every field has a default so a partial (or empty) config.json still loads.

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ExchangeConfig {
    pub markets_url: String,
    pub candles_url: String,
    pub pair_prefix: String,       // e.g., "B" -> "B-BTC_USDT"
    pub quote_asset: String,       // e.g., "USDT"
    pub request_timeout_secs: u64, // per HTTP call
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            markets_url: "https://api.coindcx.com/exchange/v1/markets".to_string(),
            candles_url: "https://public.coindcx.com/market_data/candles".to_string(),
            pair_prefix: "B".to_string(),
            quote_asset: "USDT".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct KlineConfig {
    pub interval: Interval, // e.g., "5m", "15m", "1h"
    pub min_candles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>, // exchange default when absent
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            interval: Interval::FIVE_MINUTES,
            min_candles: 20,
            limit: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RsiConfig {
    pub window: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            window: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ScanConfig {
    pub max_in_flight: usize,
    pub listing_ttl_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 30,
            listing_ttl_secs: 300,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub utc_offset_minutes: i32, // 330 = Asia/Kolkata
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 330,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ScreenerConfig {
    pub exchange: ExchangeConfig,
    pub klines: KlineConfig,
    pub rsi: RsiConfig,
    pub scan: ScanConfig,
    pub display: DisplayConfig,
}

impl ScreenerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rsi.window == 0 {
            bail!("rsi.window must be at least 1");
        }
        if self.klines.min_candles < self.rsi.window + 1 {
            bail!(
                "klines.min_candles ({}) must be at least rsi.window + 1 ({})",
                self.klines.min_candles,
                self.rsi.window + 1
            );
        }
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.rsi.oversold) || !in_range(self.rsi.overbought) {
            bail!("rsi thresholds must lie within [0, 100]");
        }
        if self.rsi.oversold >= self.rsi.overbought {
            bail!(
                "rsi.oversold ({}) must be below rsi.overbought ({})",
                self.rsi.oversold,
                self.rsi.overbought
            );
        }
        if self.scan.max_in_flight == 0 {
            bail!("scan.max_in_flight must be at least 1");
        }
        if self.exchange.request_timeout_secs == 0 {
            bail!("exchange.request_timeout_secs must be at least 1");
        }
        if self.exchange.quote_asset.is_empty() {
            bail!("exchange.quote_asset must not be empty");
        }
        if self.display_zone().is_none() {
            bail!(
                "display.utc_offset_minutes ({}) is out of range",
                self.display.utc_offset_minutes
            );
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange.request_timeout_secs)
    }

    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.scan.listing_ttl_secs)
    }

    pub fn display_zone(&self) -> Option<DisplayZone> {
        DisplayZone::from_offset_minutes(self.display.utc_offset_minutes)
    }
}
