use crate::time_utils::DisplayZone;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oversold / overbought cut-offs. Both bounds are inclusive.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl Thresholds {
    pub fn classify(&self, rsi: Option<f64>) -> Signal {
        match rsi {
            Some(v) if v <= self.oversold => Signal::Buy,
            Some(v) if v >= self.overbought => Signal::Sell,
            _ => Signal::Neutral,
        }
    }
}

/// One symbol's reading from a scan, created after the freshness gate accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub rsi: Option<f64>,
    pub signal: Signal,
}

impl SignalRecord {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        rsi: Option<f64>,
        thresholds: &Thresholds,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            rsi,
            signal: thresholds.classify(rsi),
        }
    }

    pub fn display_time(&self, zone: &DisplayZone) -> String {
        zone.format(self.timestamp)
    }
}

/// Drops NEUTRAL records and orders the rest by ascending RSI, symbol as the
/// tie-break, so the result does not depend on arrival order.
pub fn aggregate(records: Vec<SignalRecord>) -> Vec<SignalRecord> {
    let mut signals: Vec<SignalRecord> = records
        .into_iter()
        .filter(|r| r.signal != Signal::Neutral)
        .collect();

    signals.sort_unstable_by(|a, b| {
        let by_rsi = match (a.rsi, b.rsi) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        by_rsi.then_with(|| a.symbol.cmp(&b.symbol))
    });
    signals
}

/// Outcome of one scan. `signals` empty means "no signals", which is a
/// successful scan and distinct from a failed listing.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub signals: Vec<SignalRecord>,
    pub generated_at: DateTime<Utc>,
    /// Symbols dispatched.
    pub universe: usize,
    /// Records that passed the freshness gate, neutral ones included.
    pub accepted: usize,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(symbol: &str, rsi: Option<f64>) -> SignalRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        SignalRecord::new(symbol, ts, rsi, &Thresholds::default())
    }

    #[test]
    fn test_threshold_edges() {
        let t = Thresholds::default();
        assert_eq!(t.classify(Some(30.0)), Signal::Buy);
        assert_eq!(t.classify(Some(0.0)), Signal::Buy);
        assert_eq!(t.classify(Some(70.0)), Signal::Sell);
        assert_eq!(t.classify(Some(100.0)), Signal::Sell);
        assert_eq!(t.classify(Some(30.01)), Signal::Neutral);
        assert_eq!(t.classify(Some(69.99)), Signal::Neutral);
        assert_eq!(t.classify(None), Signal::Neutral);
    }

    #[test]
    fn test_aggregate_filters_neutral_and_sorts() {
        let out = aggregate(vec![
            record("SOL_USDT", Some(75.5)),
            record("BTC_USDT", Some(50.0)),
            record("ETH_USDT", Some(12.3)),
            record("XRP_USDT", None),
            record("ADA_USDT", Some(30.0)),
        ]);
        let symbols: Vec<&str> = out.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ETH_USDT", "ADA_USDT", "SOL_USDT"]);
        assert!(out.iter().all(|r| r.signal != Signal::Neutral));
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let records = vec![
            record("A_USDT", Some(20.0)),
            record("B_USDT", Some(80.0)),
            record("C_USDT", Some(20.0)),
            record("D_USDT", Some(45.0)),
            record("E_USDT", Some(70.0)),
            record("F_USDT", None),
        ];
        let expected = aggregate(records.clone());
        let n = records.len();
        for shift in 0..n {
            let mut rotated = records.clone();
            rotated.rotate_left(shift);
            assert_eq!(aggregate(rotated.clone()), expected);
            rotated.reverse();
            assert_eq!(aggregate(rotated), expected);
        }
        assert_eq!(expected[0].symbol, "A_USDT");
        assert_eq!(expected[1].symbol, "C_USDT");
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(Vec::new()).is_empty());
        assert!(aggregate(vec![record("X_USDT", Some(50.0))]).is_empty());
    }

    #[test]
    fn test_display_time_uses_zone() {
        let r = record("BTC_USDT", Some(10.0));
        assert_eq!(r.display_time(&DisplayZone::default()), "2024-03-01 15:30:00");
    }
}
