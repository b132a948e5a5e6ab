//! RCI-only long/short pairing.
//!
//! No trend filter and no state machine: every crossing of the opening leg
//! starts a trade that settles at the first crossing of the other leg
//! strictly after it. Entries at or before the previous settlement are
//! skipped, so trades never overlap. The long leg is RCI(`long_duration`)
//! recovering from below `-long_level`; the short leg is
//! RCI(`short_duration`) falling back from above `short_level`.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{info, warn};

use super::crossing::Crossing;
use super::error::RciTraderError;
use super::indicator_helpers::{CrossingSeries, IndicatorCache};
use super::ohlcv::{Bar, CandleWidth};
use super::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairParams {
    pub long_duration: usize,
    pub long_level: u32,
    pub short_duration: usize,
    pub short_level: u32,
}

impl PairParams {
    pub fn validate(&self) -> Result<(), RciTraderError> {
        for (name, duration) in [
            ("long_duration", self.long_duration),
            ("short_duration", self.short_duration),
        ] {
            if duration < 2 {
                return Err(RciTraderError::invalid_parameter(
                    name,
                    format!("must be at least 2, got {duration}"),
                ));
            }
        }
        for (name, level) in [("long_level", self.long_level), ("short_level", self.short_level)] {
            if level == 0 || level > 100 {
                return Err(RciTraderError::invalid_parameter(
                    name,
                    format!("must be within 1..=100, got {level}"),
                ));
            }
        }
        Ok(())
    }
}

/// Cumulative profit right after a settlement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairResult {
    pub trade_candle: CandleWidth,
    pub params: PairParams,
    /// Leg that opens each trade.
    pub entry: Side,
    pub trade_count: usize,
    pub won_count: usize,
    pub profit: f64,
    /// Empty unless requested.
    pub history: Vec<EquityPoint>,
}

impl PairResult {
    fn empty(trade_candle: CandleWidth, params: PairParams, entry: Side) -> Self {
        Self {
            trade_candle,
            params,
            entry,
            trade_count: 0,
            won_count: 0,
            profit: 0.0,
            history: Vec::new(),
        }
    }

    pub fn won_ratio(&self) -> f64 {
        if self.trade_count == 0 {
            0.0
        } else {
            self.won_count as f64 / self.trade_count as f64
        }
    }
}

/// Pairs crossings of one trade series.
pub struct PairSimulator<'c, 'b> {
    cache: &'c IndicatorCache<'b>,
    trade_candle: CandleWidth,
}

impl<'c, 'b> PairSimulator<'c, 'b> {
    pub fn new(cache: &'c IndicatorCache<'b>, trade_candle: CandleWidth) -> Self {
        Self { cache, trade_candle }
    }

    /// Simulate one leg order. Breakeven trades are not won.
    pub fn run(
        &self,
        params: &PairParams,
        entry: Side,
        record_history: bool,
    ) -> Result<PairResult, RciTraderError> {
        params.validate()?;
        let (long, short) = self.legs(params)?;
        let (opens, settles) = match entry {
            Side::Long => (&long, &short),
            Side::Short => (&short, &long),
        };

        let mut result = PairResult::empty(self.trade_candle, *params, entry);
        let mut settled_at: Option<usize> = None;
        for (i, open) in opens.iter().enumerate() {
            let Some(open) = open else { continue };
            if settled_at.is_some_and(|s| s >= i) {
                continue;
            }
            let Some((j, settle)) = first_after(settles, i) else {
                break;
            };
            settled_at = Some(j);

            let profit = match entry {
                Side::Long => settle.price - open.price,
                Side::Short => open.price - settle.price,
            };
            result.trade_count += 1;
            if profit > 0.0 {
                result.won_count += 1;
            }
            result.profit += profit;
            if record_history {
                result.history.push(EquityPoint {
                    time: settle.time,
                    profit: result.profit,
                });
            }
        }
        Ok(result)
    }

    /// Long-first and short-first results of one parameter set.
    pub fn run_both(&self, params: &PairParams) -> Result<[PairResult; 2], RciTraderError> {
        Ok([
            self.run(params, Side::Long, false)?,
            self.run(params, Side::Short, false)?,
        ])
    }

    fn legs(&self, params: &PairParams) -> Result<(CrossingSeries, CrossingSeries), RciTraderError> {
        let long = self
            .cache
            .crossings(params.long_duration, -i64::from(params.long_level))?;
        let short = self
            .cache
            .crossings(params.short_duration, i64::from(params.short_level))?;
        Ok((long, short))
    }
}

fn first_after(series: &[Option<Crossing>], i: usize) -> Option<(usize, Crossing)> {
    series
        .iter()
        .enumerate()
        .skip(i + 1)
        .find_map(|(j, c)| c.map(|c| (j, c)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairGrid {
    pub trade_candles: Vec<CandleWidth>,
    pub long_levels: Vec<u32>,
    pub short_levels: Vec<u32>,
    pub long_durations: Vec<usize>,
    pub short_durations: Vec<usize>,
}

impl Default for PairGrid {
    fn default() -> Self {
        let durations: Vec<usize> = (9..100).collect();
        let levels = vec![70, 75, 80, 85, 90, 95];
        Self {
            trade_candles: vec![CandleWidth::OneMinute],
            long_levels: levels.clone(),
            short_levels: levels,
            long_durations: durations.clone(),
            short_durations: durations,
        }
    }
}

impl PairGrid {
    /// Every axis must be non-empty.
    pub fn validate(&self) -> Result<(), RciTraderError> {
        let axes = [
            ("trade_candles", self.trade_candles.len()),
            ("long_levels", self.long_levels.len()),
            ("short_levels", self.short_levels.len()),
            ("long_durations", self.long_durations.len()),
            ("short_durations", self.short_durations.len()),
        ];
        for (name, len) in axes {
            if len == 0 {
                return Err(RciTraderError::invalid_parameter(name, "axis has no values"));
            }
        }
        Ok(())
    }

    /// Every combination must also be a valid parameter set.
    pub fn validate_combinations(&self) -> Result<(), RciTraderError> {
        self.validate()?;
        self.param_combinations().iter().try_for_each(PairParams::validate)
    }

    /// Long level, short level, long duration, short duration; the last
    /// varies fastest.
    pub fn param_combinations(&self) -> Vec<PairParams> {
        let mut out = Vec::with_capacity(self.params_per_candle());
        for &long_level in &self.long_levels {
            for &short_level in &self.short_levels {
                for &long_duration in &self.long_durations {
                    for &short_duration in &self.short_durations {
                        out.push(PairParams {
                            long_duration,
                            long_level,
                            short_duration,
                            short_level,
                        });
                    }
                }
            }
        }
        out
    }

    pub fn params_per_candle(&self) -> usize {
        self.long_levels.len()
            * self.short_levels.len()
            * self.long_durations.len()
            * self.short_durations.len()
    }

    pub fn len(&self) -> usize {
        self.trade_candles.len() * self.params_per_candle()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct PairFailure {
    pub trade_candle: CandleWidth,
    pub params: PairParams,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PairReport {
    /// Two rows per combination: long-first, then short-first.
    pub results: Vec<PairResult>,
    pub failures: Vec<PairFailure>,
}

impl PairReport {
    /// Row with the highest profit; ties keep the earliest.
    pub fn best(&self) -> Option<&PairResult> {
        self.results.iter().fold(None, |best, r| match best {
            Some(b) if b.profit >= r.profit => Some(b),
            _ => Some(r),
        })
    }
}

/// Run the pair grid over the bars of each trade candle.
///
/// A width named by the grid but missing or empty in `trade_bars` fails with
/// `NoData` before anything runs. Failing combinations are logged and
/// reported without stopping the others.
pub fn run_pair_sweep(
    grid: &PairGrid,
    trade_bars: &std::collections::HashMap<CandleWidth, Vec<Bar>>,
) -> Result<PairReport, RciTraderError> {
    grid.validate()?;
    let mut series = Vec::with_capacity(grid.trade_candles.len());
    for &width in &grid.trade_candles {
        match trade_bars.get(&width) {
            Some(bars) if !bars.is_empty() => series.push((width, bars.as_slice())),
            _ => {
                return Err(RciTraderError::NoData {
                    series: format!("trade {width}"),
                });
            }
        }
    }

    let combinations = grid.param_combinations();
    info!(
        candles = series.len(),
        per_candle = combinations.len(),
        "starting pair sweep"
    );

    let mut report = PairReport::default();
    for (trade_candle, bars) in series {
        let cache = IndicatorCache::new(bars);
        let simulator = PairSimulator::new(&cache, trade_candle);

        let outcomes: Vec<Result<[PairResult; 2], (PairParams, RciTraderError)>> = combinations
            .par_iter()
            .map(|params| simulator.run_both(params).map_err(|e| (*params, e)))
            .collect();

        for outcome in outcomes {
            match outcome {
                Ok(rows) => report.results.extend(rows),
                Err((params, e)) => {
                    warn!(%trade_candle, ?params, error = %e, "pair combination failed");
                    report.failures.push(PairFailure {
                        trade_candle,
                        params,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(%trade_candle, rci_series = cache.cached_rci_count(), "trade candle done");
    }

    info!(
        rows = report.results.len(),
        failures = report.failures.len(),
        "pair sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                period_start: t0() + Duration::minutes(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    /// 10 down to 1, up to 11, back down to 1.
    fn zigzag() -> Vec<f64> {
        let mut closes: Vec<f64> = (1..=10).rev().map(f64::from).collect();
        closes.extend((2..=11).map(f64::from));
        closes.extend((1..=10).rev().map(f64::from));
        closes
    }

    fn params() -> PairParams {
        PairParams {
            long_duration: 5,
            long_level: 80,
            short_duration: 5,
            short_level: 80,
        }
    }

    #[test]
    fn long_first_pairs_trough_with_next_peak() {
        let data = bars(&zigzag());
        let cache = IndicatorCache::new(&data);
        let r = PairSimulator::new(&cache, CandleWidth::OneMinute)
            .run(&params(), Side::Long, true)
            .unwrap();

        // bought at 2 on the way up, sold at 9 on the way down
        assert_eq!(r.trade_count, 1);
        assert_eq!(r.won_count, 1);
        assert_relative_eq!(r.profit, 7.0);
        assert_relative_eq!(r.won_ratio(), 1.0);
        assert_eq!(r.history.len(), 1);
        assert_eq!(r.history[0].time, t0() + Duration::minutes(21));
        assert_relative_eq!(r.history[0].profit, 7.0);
    }

    #[test]
    fn short_first_without_settlement_stops() {
        let data = bars(&zigzag());
        let cache = IndicatorCache::new(&data);
        let r = PairSimulator::new(&cache, CandleWidth::OneMinute)
            .run(&params(), Side::Short, false)
            .unwrap();

        // the peak entry has no later trough recovery to settle on
        assert_eq!(r.trade_count, 0);
        assert_eq!(r.profit, 0.0);
        assert_eq!(r.won_ratio(), 0.0);
        assert!(r.history.is_empty());
    }

    #[test]
    fn entries_before_settlement_are_skipped() {
        // two troughs before the first peak: only the first opens a trade
        let mut closes: Vec<f64> = (1..=10).rev().map(f64::from).collect();
        closes.extend([2.0, 3.0, 2.0, 1.0, 0.5, 0.4, 0.3, 1.0]);
        closes.extend((2..=12).map(f64::from));
        closes.extend((1..=10).rev().map(f64::from));
        let data = bars(&closes);
        let cache = IndicatorCache::new(&data);
        let sim = PairSimulator::new(&cache, CandleWidth::OneMinute);
        let r = sim.run(&params(), Side::Long, true).unwrap();

        let long = cache.crossings(5, -80).unwrap();
        assert!(long.iter().filter(|c| c.is_some()).count() >= 2);
        // opened at 2, settled at 10 on the turn after the 12 peak
        assert_eq!(r.trade_count, 1);
        assert_relative_eq!(r.profit, 8.0);
        assert_eq!(r.history[0].time, t0() + Duration::minutes(29));
    }

    #[test]
    fn invalid_params_rejected() {
        let data = bars(&zigzag());
        let cache = IndicatorCache::new(&data);
        let sim = PairSimulator::new(&cache, CandleWidth::OneMinute);
        let bad = PairParams {
            short_level: 0,
            ..params()
        };
        assert!(matches!(
            sim.run(&bad, Side::Long, false),
            Err(RciTraderError::InvalidParameter { ref name, .. }) if name == "short_level"
        ));
    }

    #[test]
    fn default_grid_covers_original_ranges() {
        let grid = PairGrid::default();
        assert_eq!(grid.long_durations.first(), Some(&9));
        assert_eq!(grid.long_durations.last(), Some(&99));
        assert_eq!(grid.params_per_candle(), 6 * 6 * 91 * 91);
        assert!(grid.validate_combinations().is_ok());
    }

    #[test]
    fn combinations_vary_short_duration_fastest() {
        let grid = PairGrid {
            trade_candles: vec![CandleWidth::OneMinute],
            long_levels: vec![80, 90],
            short_levels: vec![80],
            long_durations: vec![5],
            short_durations: vec![5, 9],
        };
        let combos = grid.param_combinations();
        assert_eq!(combos.len(), 4);
        assert_eq!((combos[0].long_level, combos[0].short_duration), (80, 5));
        assert_eq!((combos[1].long_level, combos[1].short_duration), (80, 9));
        assert_eq!((combos[2].long_level, combos[2].short_duration), (90, 5));
    }

    #[test]
    fn sweep_emits_long_and_short_rows() {
        let grid = PairGrid {
            trade_candles: vec![CandleWidth::OneMinute],
            long_levels: vec![80],
            short_levels: vec![80, 120],
            long_durations: vec![5],
            short_durations: vec![5, 7],
        };
        let data = HashMap::from([(CandleWidth::OneMinute, bars(&zigzag()))]);
        let report = run_pair_sweep(&grid, &data).unwrap();

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.params.short_level == 120));
        assert!(report.failures[0].reason.contains("short_level"));
        for pair in report.results.chunks(2) {
            assert_eq!(pair[0].entry, Side::Long);
            assert_eq!(pair[1].entry, Side::Short);
            assert_eq!(pair[0].params, pair[1].params);
        }
        assert!(report.results.iter().all(|r| r.history.is_empty()));
        assert_eq!(report.best().map(|r| r.profit), Some(7.0));
    }

    #[test]
    fn sweep_without_bars_is_no_data() {
        let grid = PairGrid {
            trade_candles: vec![CandleWidth::FiveMinutes],
            ..PairGrid::default()
        };
        let data = HashMap::from([(CandleWidth::OneMinute, bars(&zigzag()))]);
        assert!(matches!(
            run_pair_sweep(&grid, &data),
            Err(RciTraderError::NoData { .. })
        ));
    }
}
