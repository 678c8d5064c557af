use crate::error::{SourceError, Unavailable};
use crate::exchange::MarketSource;
use crate::time_utils::Interval;
use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

// --- Data Structures ---

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candles sorted ascending by open time with no duplicate timestamps.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Sorts by open time; when a timestamp repeats, the row that came later
    /// in the input wins.
    pub fn from_unsorted(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.open_time);
        candles.reverse();
        candles.dedup_by_key(|c| c.open_time);
        candles.reverse();
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

// --- Lenient wire decoding ---
// Prices arrive as numbers or numeric strings depending on the endpoint.

struct Price(f64);

struct PriceVisitor;

impl<'de> Visitor<'de> for PriceVisitor {
    type Value = Price;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a finite float, an integer, or a string representing one")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.is_finite() {
            Ok(Price(v))
        } else {
            Err(E::custom("non-finite price"))
        }
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Price(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Price(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let parsed = v.trim().parse::<f64>().map_err(E::custom)?;
        self.visit_f64(parsed)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PriceVisitor)
    }
}

/// Open time as whole epoch seconds: only the leading 10 digits of the
/// millisecond value are significant.
struct EpochSeconds(i64);

struct EpochSecondsVisitor;

impl EpochSecondsVisitor {
    fn from_digits<E: de::Error>(digits: &str) -> Result<EpochSeconds, E> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(E::custom(format!("invalid candle time {digits:?}")));
        }
        let leading = &digits[..digits.len().min(10)];
        leading.parse::<i64>().map(EpochSeconds).map_err(E::custom)
    }
}

impl<'de> Visitor<'de> for EpochSecondsVisitor {
    type Value = EpochSeconds;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a non-negative epoch timestamp")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Self::from_digits(&v.to_string())
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Self::from_digits(&v.to_string())
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if !v.is_finite() || v < 0.0 {
            return Err(E::custom("invalid candle time"));
        }
        Self::from_digits(&format!("{:.0}", v.trunc()))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Self::from_digits(v.trim())
    }
}

impl<'de> Deserialize<'de> for EpochSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(EpochSecondsVisitor)
    }
}

/// One candle row: `[time, open, high, low, close, volume]` or the keyed form.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCandle {
    Row(EpochSeconds, Price, Price, Price, Price, Price),
    Keyed {
        time: EpochSeconds,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Price,
    },
}

impl RawCandle {
    fn into_candle(self) -> Option<Candle> {
        let (time, open, high, low, close, volume) = match self {
            RawCandle::Row(t, o, h, l, c, v) => (t, o, h, l, c, v),
            RawCandle::Keyed {
                time,
                open,
                high,
                low,
                close,
                volume,
            } => (time, open, high, low, close, volume),
        };
        Some(Candle {
            open_time: DateTime::from_timestamp(time.0, 0)?,
            open: open.0,
            high: high.0,
            low: low.0,
            close: close.0,
            volume: volume.0,
        })
    }
}

// --- Normalisation ---

/// Turns a raw candle payload into a sorted series holding at least
/// `min_candles` entries. Any malformed row rejects the whole payload.
pub fn parse_candles(payload: &Value, min_candles: usize) -> Result<CandleSeries, Unavailable> {
    let rows = payload
        .as_array()
        .ok_or_else(|| Unavailable::Malformed("candle payload is not an array".to_string()))?;

    if rows.len() < min_candles {
        return Err(Unavailable::InsufficientHistory {
            got: rows.len(),
            need: min_candles,
        });
    }

    let candles = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            RawCandle::deserialize(row)
                .ok()
                .and_then(RawCandle::into_candle)
                .ok_or_else(|| Unavailable::Malformed(format!("row {i}: {row}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let series = CandleSeries::from_unsorted(candles);
    if series.len() < min_candles {
        return Err(Unavailable::InsufficientHistory {
            got: series.len(),
            need: min_candles,
        });
    }
    Ok(series)
}

/// One bounded request for `symbol`, normalised. Every failure, including
/// the timeout, comes back as [`Unavailable`].
pub async fn fetch_candles(
    source: &dyn MarketSource,
    symbol: &str,
    interval: Interval,
    min_candles: usize,
    timeout: Duration,
) -> Result<CandleSeries, Unavailable> {
    let payload = tokio::time::timeout(timeout, source.fetch_candles(symbol, interval))
        .await
        .map_err(|_| SourceError::Timeout)??;
    parse_candles(&payload, min_candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE_MS: i64 = 1_709_251_200_000; // 2024-03-01T00:00:00Z

    fn rows(count: i64) -> Vec<Value> {
        (0..count)
            .map(|i| json!([BASE_MS + i * 300_000, 1.0, 2.0, 0.5, 1.0 + i as f64, 10.0]))
            .collect()
    }

    #[test]
    fn test_parse_sorts_descending_payload() {
        let mut data = rows(25);
        data.reverse();
        let series = parse_candles(&Value::Array(data), 20).unwrap();
        assert_eq!(series.len(), 25);
        assert!(series.candles().windows(2).all(|w| w[0].open_time < w[1].open_time));
        assert_eq!(series.latest().unwrap().close, 25.0);
        assert_eq!(
            series.candles()[0].open_time,
            DateTime::from_timestamp(BASE_MS / 1000, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_accepts_keyed_rows_and_string_numbers() {
        let data: Vec<Value> = (0..20)
            .map(|i| {
                json!({
                    "time": (BASE_MS + i * 300_000).to_string(),
                    "open": "1.5",
                    "high": 2,
                    "low": "0.25",
                    "close": format!("{}", 3 + i),
                    "volume": 1e3,
                })
            })
            .collect();
        let series = parse_candles(&Value::Array(data), 20).unwrap();
        let first = &series.candles()[0];
        assert_eq!(first.open, 1.5);
        assert_eq!(first.high, 2.0);
        assert_eq!(first.low, 0.25);
        assert_eq!(first.close, 3.0);
        assert_eq!(first.volume, 1000.0);
    }

    #[test]
    fn test_time_keeps_leading_ten_digits() {
        // Microsecond-precision value still maps to whole seconds.
        let data: Vec<Value> = (0..20)
            .map(|i| json!([(BASE_MS + i * 300_000) * 1000 + 999, 1, 1, 1, 1, 1]))
            .collect();
        let series = parse_candles(&Value::Array(data), 20).unwrap();
        assert_eq!(series.candles()[0].open_time.timestamp(), BASE_MS / 1000);
    }

    #[test]
    fn test_rejects_short_and_empty_payloads() {
        for count in [0, 1, 19] {
            let err = parse_candles(&Value::Array(rows(count)), 20).unwrap_err();
            assert!(matches!(err, Unavailable::InsufficientHistory { need: 20, .. }));
        }
    }

    #[test]
    fn test_duplicates_collapse_and_count_against_minimum() {
        let mut data = rows(20);
        data.push(json!([BASE_MS, 1, 1, 1, 99, 1]));
        let series = parse_candles(&Value::Array(data.clone()), 20).unwrap();
        assert_eq!(series.len(), 20);
        assert_eq!(series.candles()[0].close, 99.0);

        data[1] = data[0].clone();
        let err = parse_candles(&Value::Array(data), 20).unwrap_err();
        assert!(matches!(err, Unavailable::InsufficientHistory { got: 19, .. }));
    }

    #[test]
    fn test_malformed_rows_reject_payload() {
        let mut data = rows(20);
        data[3] = json!([BASE_MS, "abc", 1, 1, 1, 1]);
        assert!(matches!(
            parse_candles(&Value::Array(data.clone()), 20),
            Err(Unavailable::Malformed(_))
        ));

        data[3] = json!([BASE_MS, 1, 1, 1, 1]);
        assert!(matches!(
            parse_candles(&Value::Array(data), 20),
            Err(Unavailable::Malformed(_))
        ));

        assert!(matches!(
            parse_candles(&json!({"error": "bad pair"}), 20),
            Err(Unavailable::Malformed(_))
        ));
    }
}
