use crate::error::ListingError;
use crate::exchange::MarketSource;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

/// Pair in candle-endpoint form, e.g. `BTC_USDT`.
pub type Symbol = String;

/// Keeps identifiers ending in `quote_asset` and rewrites them as
/// `{BASE}_{QUOTE}`. Non-string entries and bare quote identifiers are skipped.
pub fn parse_markets(payload: &Value, quote_asset: &str) -> Result<Vec<Symbol>, ListingError> {
    let entries = payload.as_array().ok_or(ListingError::NotAList)?;

    let mut seen = HashSet::new();
    let pairs: Vec<Symbol> = entries
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|market| {
            let base = market.strip_suffix(quote_asset)?;
            (!base.is_empty()).then(|| format!("{}_{}", base, quote_asset))
        })
        .filter(|pair| seen.insert(pair.clone()))
        .collect();

    Ok(pairs)
}

pub async fn list_instruments(
    source: &dyn MarketSource,
    quote_asset: &str,
) -> Result<Vec<Symbol>, ListingError> {
    let payload = source.fetch_markets().await?;
    parse_markets(&payload, quote_asset)
}

struct CachedList {
    symbols: Arc<[Symbol]>,
    fetched_at: Instant,
}

/// Process-wide instrument list with a time-to-live.
///
/// Reads within the TTL share the cached list. On expiry one caller refetches
/// while the others wait on the refresh lock and then reuse its result.
pub struct InstrumentCache {
    quote_asset: String,
    ttl: Duration,
    entry: RwLock<Option<CachedList>>,
    refresh: Mutex<()>,
}

impl InstrumentCache {
    pub fn new(quote_asset: impl Into<String>, ttl: Duration) -> Self {
        Self {
            quote_asset: quote_asset.into(),
            ttl,
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    async fn fresh(&self) -> Option<Arc<[Symbol]>> {
        let guard = self.entry.read().await;
        guard
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.symbols.clone())
    }

    pub async fn get(&self, source: &dyn MarketSource) -> Result<Arc<[Symbol]>, ListingError> {
        if let Some(symbols) = self.fresh().await {
            debug!(count = symbols.len(), "instrument list served from cache");
            return Ok(symbols);
        }

        let _refreshing = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(symbols) = self.fresh().await {
            return Ok(symbols);
        }

        let symbols: Arc<[Symbol]> = list_instruments(source, &self.quote_asset).await?.into();
        *self.entry.write().await = Some(CachedList {
            symbols: symbols.clone(),
            fetched_at: Instant::now(),
        });
        info!(count = symbols.len(), quote = %self.quote_asset, "instrument list refreshed");
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::time_utils::Interval;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        payload: Value,
        calls: AtomicUsize,
    }

    impl CountingSource {
        fn new(payload: Value) -> Self {
            Self {
                payload,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketSource for CountingSource {
        async fn fetch_markets(&self) -> Result<Value, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }

        async fn fetch_candles(
            &self,
            _pair: &str,
            _interval: Interval,
        ) -> Result<Value, SourceError> {
            Err(SourceError::Status(404))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl MarketSource for FailingSource {
        async fn fetch_markets(&self) -> Result<Value, SourceError> {
            Err(SourceError::Timeout)
        }

        async fn fetch_candles(
            &self,
            _pair: &str,
            _interval: Interval,
        ) -> Result<Value, SourceError> {
            Err(SourceError::Timeout)
        }
    }

    #[test]
    fn test_parse_markets_filters_and_rewrites() {
        let payload = json!(["BTCUSDT", "ETHINR", "SOLUSDT", "USDT", 42, "BTCUSDT", "USDTINR"]);
        let pairs = parse_markets(&payload, "USDT").unwrap();
        assert_eq!(pairs, vec!["BTC_USDT".to_string(), "SOL_USDT".to_string()]);
    }

    #[test]
    fn test_parse_markets_rejects_non_list() {
        let payload = json!({"markets": ["BTCUSDT"]});
        assert!(matches!(parse_markets(&payload, "USDT"), Err(ListingError::NotAList)));
    }

    #[tokio::test]
    async fn test_list_instruments_propagates_source_failure() {
        let err = list_instruments(&FailingSource, "USDT").await.unwrap_err();
        assert!(matches!(err, ListingError::Source(SourceError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_serves_within_ttl_and_refetches_after() {
        let source = CountingSource::new(json!(["BTCUSDT", "ETHUSDT"]));
        let cache = InstrumentCache::new("USDT", Duration::from_secs(300));

        let first = cache.get(&source).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        let second = cache.get(&source).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));

        tokio::time::advance(Duration::from_secs(2)).await;
        let third = cache.get(&source).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(&*third, &["BTC_USDT".to_string(), "ETH_USDT".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_readers_share_one_fetch() {
        let source = Arc::new(CountingSource::new(json!(["BTCUSDT"])));
        let cache = Arc::new(InstrumentCache::new("USDT", Duration::from_secs(300)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let source = source.clone();
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(source.as_ref()).await.map(|s| s.len()) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_does_not_store_failures() {
        let cache = InstrumentCache::new("USDT", Duration::from_secs(300));
        assert!(cache.get(&FailingSource).await.is_err());

        let source = CountingSource::new(json!(["XRPUSDT"]));
        let symbols = cache.get(&source).await.unwrap();
        assert_eq!(&*symbols, &["XRP_USDT".to_string()]);
    }
}
