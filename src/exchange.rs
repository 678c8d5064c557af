use crate::config::ExchangeConfig;
use crate::error::SourceError;
use crate::time_utils::Interval;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Raw market-list payload (expected: JSON array of identifiers).
    async fn fetch_markets(&self) -> Result<Value, SourceError>;

    /// Raw candle payload for one `{BASE}_{QUOTE}` pair.
    async fn fetch_candles(&self, pair: &str, interval: Interval) -> Result<Value, SourceError>;
}

pub struct CoinDcxClient {
    client: Client,
    markets_url: String,
    candles_url: String,
    pair_prefix: String,
    limit: Option<u32>,
}

impl CoinDcxClient {
    pub fn new(config: &ExchangeConfig, limit: Option<u32>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(50)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            markets_url: config.markets_url.clone(),
            candles_url: config.candles_url.clone(),
            pair_prefix: config.pair_prefix.clone(),
            limit,
        })
    }

    /// `BTC_USDT` -> `B-BTC_USDT`
    fn qualified_pair(&self, pair: &str) -> String {
        if self.pair_prefix.is_empty() {
            pair.to_string()
        } else {
            format!("{}-{}", self.pair_prefix, pair)
        }
    }

    fn candle_query(&self, pair: &str, interval: Interval) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("pair", self.qualified_pair(pair)),
            ("interval", interval.to_string()),
        ];
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        query
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value, SourceError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MarketSource for CoinDcxClient {
    async fn fetch_markets(&self) -> Result<Value, SourceError> {
        self.get_json(self.client.get(&self.markets_url)).await
    }

    async fn fetch_candles(&self, pair: &str, interval: Interval) -> Result<Value, SourceError> {
        let query = self.candle_query(pair, interval);
        self.get_json(self.client.get(&self.candles_url).query(&query))
            .await
    }
}
