use crate::candles::CandleSeries;
use crate::error::Unavailable;
use crate::signals::{SignalRecord, Thresholds};
use crate::time_utils::{Interval, align_to_interval};
use chrono::{DateTime, Utc};

/// Rejects series whose latest candle predates the current interval
/// boundary; accepted ones become a [`SignalRecord`].
#[derive(Debug, Clone, Copy)]
pub struct FreshnessGate {
    pub interval: Interval,
    pub thresholds: Thresholds,
}

impl FreshnessGate {
    pub fn new(interval: Interval, thresholds: Thresholds) -> Self {
        Self {
            interval,
            thresholds,
        }
    }

    pub fn check(
        &self,
        symbol: &str,
        series: &CandleSeries,
        latest_rsi: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<SignalRecord, Unavailable> {
        let latest = series
            .latest()
            .ok_or(Unavailable::InsufficientHistory { got: 0, need: 1 })?;

        let boundary = align_to_interval(now, self.interval);
        if latest.open_time < boundary {
            return Err(Unavailable::Stale {
                latest: latest.open_time,
                boundary,
            });
        }

        let rsi = latest_rsi.filter(|v| v.is_finite()).map(round2);
        Ok(SignalRecord::new(
            symbol,
            latest.open_time,
            rsi,
            &self.thresholds,
        ))
    }
}

// Ties go to the even hundredth: 30.005 -> 30.0.
fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}
