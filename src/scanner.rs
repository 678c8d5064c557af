use crate::candles::fetch_candles;
use crate::config::ScreenerConfig;
use crate::error::{ListingError, Unavailable};
use crate::exchange::{CoinDcxClient, MarketSource};
use crate::freshness::FreshnessGate;
use crate::indicators::compute_rsi;
use crate::instruments::{InstrumentCache, Symbol};
use crate::signals::{ScanResult, SignalRecord, Thresholds, aggregate};
use crate::time_utils::{Clock, Interval, SystemClock};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-symbol knobs, copied into every task.
#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub interval: Interval,
    pub min_candles: usize,
    pub window: usize,
    pub request_timeout: Duration,
    pub max_in_flight: usize,
    pub gate: FreshnessGate,
}

impl ScanSettings {
    pub fn from_config(config: &ScreenerConfig) -> Self {
        let thresholds = Thresholds {
            oversold: config.rsi.oversold,
            overbought: config.rsi.overbought,
        };
        Self {
            interval: config.klines.interval,
            min_candles: config.klines.min_candles,
            window: config.rsi.window,
            request_timeout: config.request_timeout(),
            max_in_flight: config.scan.max_in_flight.max(1),
            gate: FreshnessGate::new(config.klines.interval, thresholds),
        }
    }
}

pub struct Scanner {
    source: Arc<dyn MarketSource>,
    cache: Arc<InstrumentCache>,
    settings: ScanSettings,
    clock: Arc<dyn Clock>,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn MarketSource>,
        cache: Arc<InstrumentCache>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            source,
            cache,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates `config` and wires the CoinDCX client and a fresh instrument cache.
    pub fn from_config(config: &ScreenerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let client = CoinDcxClient::new(&config.exchange, config.klines.limit)?;
        let cache = InstrumentCache::new(config.exchange.quote_asset.clone(), config.listing_ttl());
        Ok(Self::new(
            Arc::new(client),
            Arc::new(cache),
            ScanSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Runs a full scan and returns the ranked signals. Only a failed
    /// instrument listing is an error.
    pub async fn run_scan(&self) -> Result<ScanResult, ListingError> {
        let generated_at = self.clock.now();
        let started = Instant::now();
        let symbols = self.instruments().await?;
        let records = self.fan_out(&symbols).await;
        let accepted = records.len();
        let signals = aggregate(records);

        info!(
            universe = symbols.len(),
            accepted,
            signals = signals.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan finished"
        );

        Ok(ScanResult {
            signals,
            generated_at,
            universe: symbols.len(),
            accepted,
        })
    }

    /// Every record that passed the freshness gate, in completion order.
    pub async fn scan(&self) -> Result<Vec<SignalRecord>, ListingError> {
        let symbols = self.instruments().await?;
        Ok(self.fan_out(&symbols).await)
    }

    async fn instruments(&self) -> Result<Arc<[Symbol]>, ListingError> {
        self.cache
            .get(self.source.as_ref())
            .await
            .inspect_err(|e| warn!(error = %e, "instrument listing failed"))
    }

    /// One spawned task per symbol, at most `max_in_flight` running at once.
    /// Results are gathered as tasks finish; a failed or panicked task only
    /// loses its own symbol.
    async fn fan_out(&self, symbols: &[Symbol]) -> Vec<SignalRecord> {
        info!(
            universe = symbols.len(),
            max_in_flight = self.settings.max_in_flight,
            "scan started"
        );

        stream::iter(symbols.iter().cloned())
            .map(|symbol| {
                let source = self.source.clone();
                let clock = self.clock.clone();
                let settings = self.settings;
                let task_symbol = symbol.clone();
                let handle = tokio::spawn(async move {
                    let clock = clock.as_ref();
                    evaluate_symbol(source.as_ref(), clock, &task_symbol, &settings).await
                });
                async move {
                    let outcome = handle
                        .await
                        .unwrap_or_else(|e| Err(Unavailable::TaskFailed(e.to_string())));
                    (symbol, outcome)
                }
            })
            .buffer_unordered(self.settings.max_in_flight)
            .filter_map(|(symbol, outcome)| async move {
                match outcome {
                    Ok(record) => Some(record),
                    Err(reason) => {
                        debug!(%symbol, %reason, "symbol skipped");
                        None
                    }
                }
            })
            .collect()
            .await
    }
}

/// fetch -> normalise -> RSI -> freshness gate for a single symbol. The
/// boundary is taken from `clock` once the candles have arrived.
pub async fn evaluate_symbol(
    source: &dyn MarketSource,
    clock: &dyn Clock,
    symbol: &str,
    settings: &ScanSettings,
) -> Result<SignalRecord, Unavailable> {
    let series = fetch_candles(
        source,
        symbol,
        settings.interval,
        settings.min_candles,
        settings.request_timeout,
    )
    .await?;

    let rsi = compute_rsi(&series.closes(), settings.window)
        .map_err(|e| Unavailable::TaskFailed(format!("RSI window {}: {e:?}", settings.window)))?;
    let latest_rsi = rsi.last().copied().flatten();

    settings.gate.check(symbol, &series, latest_rsi, clock.now())
}
