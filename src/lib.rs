//! RSI screener for stablecoin-quoted CoinDCX pairs.
//!
//! [`Scanner::run_scan`] lists every `*USDT` market, fetches recent candles
//! for each pair concurrently, computes a 14-period Wilder RSI, drops pairs
//! whose latest candle is not from the current interval and returns the
//! BUY/SELL readings ordered by RSI.

pub mod candles;
pub mod config;
pub mod error;
pub mod exchange;
pub mod freshness;
pub mod indicators;
pub mod instruments;
pub mod scanner;
pub mod signals;
pub mod storage_utils;
pub mod time_utils;

pub use config::ScreenerConfig;
pub use error::{ListingError, SourceError, Unavailable};
pub use scanner::Scanner;
pub use signals::{ScanResult, Signal, SignalRecord};
