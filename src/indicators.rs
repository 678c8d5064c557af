use ta::errors::{Result, TaError};
use ta::{Next, Period, Reset};

/// RSI value per input close; `None` while the lookback is incomplete or
/// when the window saw no movement at all.
pub type OscillatorSeries = Vec<Option<f64>>;

/// Relative Strength Index with Wilder smoothing.
///
/// The first `period` price changes seed the averages with a simple mean;
/// after that each average is updated as `(prev * (period - 1) + x) / period`.
/// Output starts at the input whose index equals `period`.
#[derive(Debug, Clone)]
pub struct WilderRsi {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderRsi {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(TaError::InvalidParameter);
        }
        Ok(Self {
            period,
            prev_close: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }

    fn value(&self) -> Option<f64> {
        if self.avg_loss == 0.0 {
            return (self.avg_gain > 0.0).then_some(100.0);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

impl Next<f64> for WilderRsi {
    type Output = Option<f64>;

    fn next(&mut self, close: f64) -> Self::Output {
        let prev = self.prev_close.replace(close)?;
        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = self.period as f64;

        self.changes += 1;
        if self.changes <= self.period {
            // Seeding: accumulate the simple mean.
            self.avg_gain += gain / n;
            self.avg_loss += loss / n;
            if self.changes < self.period {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }
        self.value()
    }
}

impl Period for WilderRsi {
    fn period(&self) -> usize {
        self.period
    }
}

impl Reset for WilderRsi {
    fn reset(&mut self) {
        self.prev_close = None;
        self.changes = 0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }
}

/// RSI series aligned 1:1 with `closes`.
pub fn compute_rsi(closes: &[f64], window: usize) -> Result<OscillatorSeries> {
    let mut rsi = WilderRsi::new(window)?;
    Ok(closes.iter().map(|&close| rsi.next(close)).collect())
}
