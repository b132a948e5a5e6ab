//! Read-through indicator cache shared by the workers of one sweep.
//!
//! RCI series are keyed by duration and crossing series by
//! `(duration, signed level)`. Each key is computed at most once per winner:
//! two workers racing on the same key may both compute it, the first insert
//! wins and both get the same `Arc`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::crossing::{Crossing, crossing_series};
use crate::domain::error::RciTraderError;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::indicator::rci::calculate_rci;
use crate::domain::ohlcv::Bar;
use crate::domain::strategy::StrategyParams;

pub type CrossingSeries = Arc<Vec<Option<Crossing>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrossingKey {
    pub duration: usize,
    pub level: i64,
}

/// The four crossing series a strategy reads on every tick.
#[derive(Debug, Clone)]
pub struct SignalSet {
    pub uptrend_entry: CrossingSeries,
    pub uptrend_exit: CrossingSeries,
    pub downtrend_entry: CrossingSeries,
    pub downtrend_exit: CrossingSeries,
}

impl SignalSet {
    /// Compute the signals of one parameter set without sharing.
    pub fn compute(trade_bars: &[Bar], params: &StrategyParams) -> Result<Self, RciTraderError> {
        IndicatorCache::new(trade_bars).signal_set(params)
    }

    pub fn len(&self) -> usize {
        self.uptrend_entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uptrend_entry.is_empty()
    }
}

pub struct IndicatorCache<'a> {
    bars: &'a [Bar],
    rci: RwLock<HashMap<usize, Arc<IndicatorSeries>>>,
    crossings: RwLock<HashMap<CrossingKey, CrossingSeries>>,
}

impl<'a> IndicatorCache<'a> {
    pub fn new(bars: &'a [Bar]) -> Self {
        Self {
            bars,
            rci: RwLock::new(HashMap::new()),
            crossings: RwLock::new(HashMap::new()),
        }
    }

    pub fn bars(&self) -> &'a [Bar] {
        self.bars
    }

    pub fn rci(&self, duration: usize) -> Result<Arc<IndicatorSeries>, RciTraderError> {
        get_or_try_insert(&self.rci, duration, || {
            calculate_rci(self.bars, duration).map(Arc::new)
        })
    }

    pub fn crossings(&self, duration: usize, level: i64) -> Result<CrossingSeries, RciTraderError> {
        let key = CrossingKey { duration, level };
        get_or_try_insert(&self.crossings, key, || {
            let rci = self.rci(duration)?;
            crossing_series(&rci, self.bars, level as f64).map(Arc::new)
        })
    }

    pub fn signal_set(&self, params: &StrategyParams) -> Result<SignalSet, RciTraderError> {
        params.validate()?;
        let entry = i64::from(params.entry_rci_level);
        let exit = i64::from(params.exit_rci_level);
        Ok(SignalSet {
            uptrend_entry: self.crossings(params.entry_rci_duration, -entry)?,
            uptrend_exit: self.crossings(params.exit_rci_duration, exit)?,
            downtrend_entry: self.crossings(params.entry_rci_duration, entry)?,
            downtrend_exit: self.crossings(params.exit_rci_duration, -exit)?,
        })
    }

    pub fn cached_rci_count(&self) -> usize {
        self.rci.read().len()
    }

    pub fn cached_crossing_count(&self) -> usize {
        self.crossings.read().len()
    }
}

fn get_or_try_insert<K, V, F>(
    map: &RwLock<HashMap<K, Arc<V>>>,
    key: K,
    compute: F,
) -> Result<Arc<V>, RciTraderError>
where
    K: Eq + Hash,
    F: FnOnce() -> Result<Arc<V>, RciTraderError>,
{
    if let Some(hit) = map.read().get(&key) {
        return Ok(Arc::clone(hit));
    }
    let value = compute()?;
    let mut guard = map.write();
    Ok(Arc::clone(guard.entry(key).or_insert(value)))
}
