//! Hysteresis threshold-crossing detection.
//!
//! The sign of a detector's level selects its direction. A negative level
//! fires when the value rises back through it after having been below it; a
//! positive level fires when the value falls back through it after having
//! been above it. Both cases are evaluated as "rising through a threshold"
//! after multiplying value and level by `k`.

use chrono::{DateTime, Utc};

use super::error::RciTraderError;
use super::indicator::IndicatorSeries;
use super::ohlcv::Bar;

/// A fired crossing: when it happened and at which price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub time: DateTime<Utc>,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossingDetector {
    level: f64,
    is_below: bool,
}

impl CrossingDetector {
    pub fn new(level: f64) -> Result<Self, RciTraderError> {
        if level == 0.0 || !level.is_finite() {
            return Err(RciTraderError::invalid_parameter(
                "crossing_level",
                format!("must be a non-zero finite number, got {level}"),
            ));
        }
        Ok(Self {
            level,
            is_below: false,
        })
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn is_below(&self) -> bool {
        self.is_below
    }

    /// Feed one sample. NaN samples never change the state.
    pub fn evaluate(&mut self, time: DateTime<Utc>, value: f64, price: f64) -> Option<Crossing> {
        let k = if self.level >= 0.0 { -1.0 } else { 1.0 };
        let x = value * k;
        let level = self.level * k;

        if !self.is_below && x < level {
            self.is_below = true;
            return None;
        }
        if self.is_below && x > level {
            self.is_below = false;
            return Some(Crossing { time, price });
        }
        None
    }
}

/// Run one detector over a whole indicator series.
///
/// `indicator` must be aligned with `bars`; the crossing price is the close of
/// the bar at the same index.
pub fn crossing_series(
    indicator: &IndicatorSeries,
    bars: &[Bar],
    level: f64,
) -> Result<Vec<Option<Crossing>>, RciTraderError> {
    let mut detector = CrossingDetector::new(level)?;
    Ok(indicator
        .values
        .iter()
        .zip(bars)
        .map(|(point, bar)| detector.evaluate(point.time, point.value, bar.close))
        .collect())
}

/// Signals emitted by a [`Speculation`] on the latest tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Signals {
    pub entry: Option<Crossing>,
    pub exit: Option<Crossing>,
}

impl Signals {
    pub fn entry(&self) -> bool {
        self.entry.is_some()
    }

    pub fn exit(&self) -> bool {
        self.exit.is_some()
    }
}

/// Entry and exit detectors for one trend direction.
#[derive(Debug, Clone)]
pub struct Speculation {
    entry: CrossingDetector,
    exit: CrossingDetector,
    signals: Signals,
}

impl Speculation {
    pub fn new(entry_level: f64, exit_level: f64) -> Result<Self, RciTraderError> {
        Ok(Self {
            entry: CrossingDetector::new(entry_level)?,
            exit: CrossingDetector::new(exit_level)?,
            signals: Signals::default(),
        })
    }

    /// Long side: enter when RCI recovers from below `-entry`, exit when it
    /// drops back from above `+exit`.
    pub fn uptrend(entry_level: u32, exit_level: u32) -> Result<Self, RciTraderError> {
        Self::new(-(entry_level as f64), exit_level as f64)
    }

    /// Short side: mirror image of [`Speculation::uptrend`].
    pub fn downtrend(entry_level: u32, exit_level: u32) -> Result<Self, RciTraderError> {
        Self::new(entry_level as f64, -(exit_level as f64))
    }

    /// Evaluate the latest entry and exit RCI values; replaces the previous
    /// tick's signals.
    pub fn determine(
        &mut self,
        time: DateTime<Utc>,
        price: f64,
        entry_rci: f64,
        exit_rci: f64,
    ) -> Signals {
        self.signals = Signals {
            entry: self.entry.evaluate(time, entry_rci, price),
            exit: self.exit.evaluate(time, exit_rci, price),
        };
        self.signals
    }

    pub fn signals(&self) -> Signals {
        self.signals
    }
}
