//! Incrementally refreshed bar series.
//!
//! A [`BarSeries`] publishes its bars as immutable snapshots. `refresh` builds
//! the extended vector off to the side and swaps the shared pointer, so a
//! reader holding a snapshot never observes a partial append and never waits
//! on a refresh in progress.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::error::RciTraderError;
use super::ohlcv::{Bar, SeriesKey, TimeRange};
use crate::ports::data_port::BarSource;

/// How much history a series loads on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    /// Every bar in the range; retention is unbounded.
    Range(TimeRange),
    /// The most recent `n` bars (`now - width * n ..= now`); retention is `n`.
    Recent(usize),
}

pub struct BarSeries {
    key: SeriesKey,
    source: Arc<dyn BarSource>,
    max_length: Option<usize>,
    /// Lower bound used when the series is still empty.
    origin: DateTime<Utc>,
    snapshot: RwLock<Arc<Vec<Bar>>>,
    refresh_guard: Mutex<()>,
}

impl BarSeries {
    pub fn create(
        source: Arc<dyn BarSource>,
        key: SeriesKey,
        lookback: Lookback,
    ) -> Result<Self, RciTraderError> {
        Self::create_at(source, key, lookback, Utc::now())
    }

    pub fn create_at(
        source: Arc<dyn BarSource>,
        key: SeriesKey,
        lookback: Lookback,
        now: DateTime<Utc>,
    ) -> Result<Self, RciTraderError> {
        let (range, max_length) = match lookback {
            Lookback::Range(range) => (range, None),
            Lookback::Recent(0) => {
                return Err(RciTraderError::invalid_parameter(
                    "lookback",
                    "number of recent bars must be positive",
                ));
            }
            Lookback::Recent(n) => {
                let from = i32::try_from(n)
                    .ok()
                    .and_then(|count| key.candle_width.duration().checked_mul(count))
                    .and_then(|span| now.checked_sub_signed(span))
                    .ok_or_else(|| {
                        RciTraderError::invalid_parameter(
                            "lookback",
                            format!("{n} recent {} bars reach outside the calendar", key.candle_width),
                        )
                    })?;
                (TimeRange::new(from, now), Some(n))
            }
        };

        let fetched = source.query(&key, range)?;
        let mut bars = Vec::with_capacity(fetched.len());
        append_strictly_newer(&mut bars, fetched, None);
        truncate_front(&mut bars, max_length);

        debug!(series = %key, bars = bars.len(), "loaded bar series");

        Ok(Self {
            key,
            source,
            max_length,
            origin: range.from,
            snapshot: RwLock::new(Arc::new(bars)),
            refresh_guard: Mutex::new(()),
        })
    }

    /// Override the retention bound. Zero is rejected.
    pub fn with_max_length(mut self, max_length: usize) -> Result<Self, RciTraderError> {
        if max_length == 0 {
            return Err(RciTraderError::invalid_parameter(
                "max_length",
                "must be positive",
            ));
        }
        self.max_length = Some(max_length);
        let mut bars = self.snapshot.get_mut().as_ref().clone();
        truncate_front(&mut bars, self.max_length);
        *self.snapshot.get_mut() = Arc::new(bars);
        Ok(self)
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Consistent view of the whole series at the time of the call.
    pub fn snapshot(&self) -> Arc<Vec<Bar>> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    pub fn last_period_start(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().last().map(|b| b.period_start)
    }

    pub fn refresh(&self) -> Result<usize, RciTraderError> {
        self.refresh_until(Utc::now())
    }

    /// Append every bar newer than the last known one up to `now`.
    ///
    /// Returns the number of appended bars. On failure the published series
    /// is left as it was.
    pub fn refresh_until(&self, now: DateTime<Utc>) -> Result<usize, RciTraderError> {
        let _guard = self.refresh_guard.lock();

        let current = self.snapshot();
        let last = current.last().map(|b| b.period_start);
        let from = last.unwrap_or(self.origin);
        if now < from {
            return Ok(0);
        }

        let fetched = self.source.query(&self.key, TimeRange::new(from, now)).map_err(|e| {
            warn!(series = %self.key, error = %e, "refresh failed, keeping current bars");
            e
        })?;

        let mut bars = Vec::with_capacity(current.len() + fetched.len());
        bars.extend(current.iter().cloned());
        let appended = append_strictly_newer(&mut bars, fetched, last);
        if appended == 0 {
            return Ok(0);
        }
        truncate_front(&mut bars, self.max_length);

        *self.snapshot.write() = Arc::new(bars);
        debug!(series = %self.key, appended, "refreshed bar series");
        Ok(appended)
    }
}

/// Push bars that keep `period_start` strictly increasing; returns how many.
fn append_strictly_newer(
    bars: &mut Vec<Bar>,
    incoming: Vec<Bar>,
    mut last: Option<DateTime<Utc>>,
) -> usize {
    let mut appended = 0;
    for bar in incoming {
        if last.is_some_and(|l| bar.period_start <= l) {
            continue;
        }
        last = Some(bar.period_start);
        bars.push(bar);
        appended += 1;
    }
    appended
}

fn truncate_front(bars: &mut Vec<Bar>, max_length: Option<usize>) {
    if let Some(max) = max_length {
        if bars.len() > max {
            let excess = bars.len() - max;
            bars.drain(..excess);
        }
    }
}
