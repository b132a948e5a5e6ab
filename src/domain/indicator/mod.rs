//! Technical indicator series.
//!
//! - `IndicatorPoint`: one timestamped value, `NaN` where undefined
//! - `IndicatorType`: indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: values aligned one-to-one with a bar series

pub mod rci;
pub mod trend;

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl IndicatorPoint {
    pub fn is_defined(&self) -> bool {
        !self.value.is_nan()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Rci(usize),
    Adx(usize),
    PlusDi(usize),
    MinusDi(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<&IndicatorPoint> {
        self.values.last()
    }

    /// Value at exactly `time`, if the series has a point there.
    pub fn value_at(&self, time: DateTime<Utc>) -> Option<f64> {
        self.values
            .binary_search_by(|p| p.time.cmp(&time))
            .ok()
            .map(|i| self.values[i].value)
    }

    /// Index of the latest point with `point.time <= time`.
    pub fn index_at_or_before(&self, time: DateTime<Utc>) -> Option<usize> {
        let upper = self.values.partition_point(|p| p.time <= time);
        upper.checked_sub(1)
    }

    /// Latest point with `point.time <= time`.
    pub fn latest_at(&self, time: DateTime<Utc>) -> Option<&IndicatorPoint> {
        self.index_at_or_before(time).map(|i| &self.values[i])
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Rci(duration) => write!(f, "RCI({})", duration),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::PlusDi(period) => write!(f, "+DI({})", period),
            IndicatorType::MinusDi(period) => write!(f, "-DI({})", period),
        }
    }
}
