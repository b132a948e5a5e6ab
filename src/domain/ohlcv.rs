//! OHLCV bar representation and series identity.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

use super::error::RciTraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub period_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Width of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandleWidth {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    TwelveHours,
    OneDay,
}

impl CandleWidth {
    pub fn seconds(self) -> i64 {
        match self {
            CandleWidth::OneMinute => 60,
            CandleWidth::ThreeMinutes => 3 * 60,
            CandleWidth::FiveMinutes => 5 * 60,
            CandleWidth::FifteenMinutes => 15 * 60,
            CandleWidth::ThirtyMinutes => 30 * 60,
            CandleWidth::OneHour => 3600,
            CandleWidth::TwoHours => 2 * 3600,
            CandleWidth::FourHours => 4 * 3600,
            CandleWidth::SixHours => 6 * 3600,
            CandleWidth::TwelveHours => 12 * 3600,
            CandleWidth::OneDay => 24 * 3600,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CandleWidth::OneMinute => "1m",
            CandleWidth::ThreeMinutes => "3m",
            CandleWidth::FiveMinutes => "5m",
            CandleWidth::FifteenMinutes => "15m",
            CandleWidth::ThirtyMinutes => "30m",
            CandleWidth::OneHour => "1h",
            CandleWidth::TwoHours => "2h",
            CandleWidth::FourHours => "4h",
            CandleWidth::SixHours => "6h",
            CandleWidth::TwelveHours => "12h",
            CandleWidth::OneDay => "1d",
        }
    }
}

impl fmt::Display for CandleWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleWidth {
    type Err = RciTraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(CandleWidth::OneMinute),
            "3m" => Ok(CandleWidth::ThreeMinutes),
            "5m" => Ok(CandleWidth::FiveMinutes),
            "15m" => Ok(CandleWidth::FifteenMinutes),
            "30m" => Ok(CandleWidth::ThirtyMinutes),
            "1h" => Ok(CandleWidth::OneHour),
            "2h" => Ok(CandleWidth::TwoHours),
            "4h" => Ok(CandleWidth::FourHours),
            "6h" => Ok(CandleWidth::SixHours),
            "12h" => Ok(CandleWidth::TwelveHours),
            "1d" => Ok(CandleWidth::OneDay),
            other => Err(RciTraderError::invalid_parameter(
                "candle_width",
                format!("unknown candle width '{other}'"),
            )),
        }
    }
}

/// Identity of one bar series: instrument plus bar width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub instrument: String,
    pub candle_width: CandleWidth,
}

impl SeriesKey {
    pub fn new(instrument: impl Into<String>, candle_width: CandleWidth) -> Self {
        Self {
            instrument: instrument.into(),
            candle_width,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.instrument, self.candle_width)
    }
}

/// Inclusive time range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.from && t <= self.to
    }
}
