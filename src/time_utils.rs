use chrono::{DateTime, FixedOffset, Offset, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static INTERVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-9][0-9]{0,5})([mhdw])$").expect("valid interval regex"));

pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl IntervalUnit {
    fn seconds(self) -> i64 {
        match self {
            IntervalUnit::Minute => 60,
            IntervalUnit::Hour => 3_600,
            IntervalUnit::Day => 86_400,
            IntervalUnit::Week => 604_800,
        }
    }

    fn suffix(self) -> char {
        match self {
            IntervalUnit::Minute => 'm',
            IntervalUnit::Hour => 'h',
            IntervalUnit::Day => 'd',
            IntervalUnit::Week => 'w',
        }
    }
}

/// A candle interval as the exchange names it, e.g. `5m` or `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    count: u32,
    unit: IntervalUnit,
}

impl Interval {
    pub const FIVE_MINUTES: Interval = Interval {
        count: 5,
        unit: IntervalUnit::Minute,
    };

    pub fn seconds(&self) -> i64 {
        i64::from(self.count) * self.unit.seconds()
    }

    pub fn duration(&self) -> TimeDelta {
        TimeDelta::seconds(self.seconds())
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::FIVE_MINUTES
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = INTERVAL_RE
            .captures(s.trim())
            .ok_or_else(|| anyhow::anyhow!("unrecognised interval {s:?}"))?;
        let count: u32 = caps[1].parse()?;
        let unit = match &caps[2] {
            "m" => IntervalUnit::Minute,
            "h" => IntervalUnit::Hour,
            "d" => IntervalUnit::Day,
            _ => IntervalUnit::Week,
        };
        Ok(Interval { count, unit })
    }
}

impl TryFrom<String> for Interval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}

/// Latest grid boundary `<= t` for an epoch-aligned grid of `interval`.
/// Sub-second components are always zeroed.
pub fn align_to_interval(t: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    let secs = t.timestamp();
    let floored = secs - secs.rem_euclid(interval.seconds());
    DateTime::from_timestamp(floored, 0).unwrap_or(t)
}

/// Wall-clock source for the freshness check.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed offset used when printing timestamps. Defaults to India Standard Time.
#[derive(Debug, Clone, Copy)]
pub struct DisplayZone(FixedOffset);

impl DisplayZone {
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(DisplayZone)
    }

    pub fn convert(&self, t: DateTime<Utc>) -> DateTime<FixedOffset> {
        t.with_timezone(&self.0)
    }

    pub fn format(&self, t: DateTime<Utc>) -> String {
        self.convert(t).format(DISPLAY_FORMAT).to_string()
    }
}

impl Default for DisplayZone {
    fn default() -> Self {
        // +05:30
        DisplayZone::from_offset_minutes(330).unwrap_or(DisplayZone(Utc.fix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_align_truncates_to_five_minutes() {
        let t = utc(2024, 3, 1, 10, 7, 42) + TimeDelta::microseconds(123_456);
        let aligned = align_to_interval(t, Interval::FIVE_MINUTES);
        assert_eq!(aligned, utc(2024, 3, 1, 10, 5, 0));
        assert_eq!(aligned.nanosecond(), 0);
    }

    #[test]
    fn test_align_is_idempotent_and_never_later() {
        let start = utc(2024, 1, 1, 0, 0, 0);
        for step in 0..2_000 {
            let t = start + TimeDelta::seconds(step * 37) + TimeDelta::milliseconds(step % 1000);
            let once = align_to_interval(t, Interval::FIVE_MINUTES);
            assert_eq!(align_to_interval(once, Interval::FIVE_MINUTES), once);
            assert!(once <= t);
            assert_eq!(once.minute() % 5, 0);
            assert_eq!(once.second(), 0);
            assert_eq!(once.nanosecond(), 0);
            assert!(t - once < TimeDelta::minutes(5));
        }
    }

    #[test]
    fn test_align_on_boundary_is_unchanged() {
        let t = utc(2024, 6, 30, 23, 55, 0);
        assert_eq!(align_to_interval(t, Interval::FIVE_MINUTES), t);
    }

    #[test]
    fn test_align_matches_display_zone_grid() {
        // IST is a whole half-hour offset so the 5m grid lines up in both zones.
        let zone = DisplayZone::default();
        let t = utc(2024, 3, 1, 4, 33, 10);
        let local = zone.convert(align_to_interval(t, Interval::FIVE_MINUTES));
        assert_eq!(local.minute() % 5, 0);
        assert_eq!((local.hour(), local.minute()), (10, 0));
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("5m".parse::<Interval>().unwrap(), Interval::FIVE_MINUTES);
        assert_eq!("1h".parse::<Interval>().unwrap().seconds(), 3_600);
        assert_eq!("1d".parse::<Interval>().unwrap().to_string(), "1d");
        assert!("0m".parse::<Interval>().is_err());
        assert!("5x".parse::<Interval>().is_err());
        assert!("".parse::<Interval>().is_err());
    }

    #[test]
    fn test_interval_serde_uses_wire_string() {
        let parsed: Interval = serde_json::from_str("\"15m\"").unwrap();
        assert_eq!(parsed.seconds(), 900);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"15m\"");
        assert!(serde_json::from_str::<Interval>("\"fast\"").is_err());
    }

    #[test]
    fn test_display_zone_formats_ist() {
        let zone = DisplayZone::from_offset_minutes(330).unwrap();
        assert_eq!(zone.format(utc(2024, 3, 1, 4, 30, 0)), "2024-03-01 10:00:00");
    }
}
