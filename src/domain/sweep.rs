//! Grid search over strategy parameters.
//!
//! For every (trade candle, trend candle) pair the Cartesian product of the
//! remaining axes is simulated on the rayon pool. RCI and crossing series are
//! shared between combinations through one [`IndicatorCache`] per trade
//! series; the DMI is computed once per trend series.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{info, warn};

use super::backtest::Simulator;
use super::error::RciTraderError;
use super::indicator::trend::{Dmi, TrendCalculator};
use super::indicator_helpers::IndicatorCache;
use super::metrics::SimulationResult;
use super::ohlcv::{Bar, CandleWidth};
use super::strategy::StrategyParams;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid {
    pub trend_candles: Vec<CandleWidth>,
    pub trade_candles: Vec<CandleWidth>,
    pub entry_rci_durations: Vec<usize>,
    pub entry_rci_levels: Vec<u32>,
    pub exit_rci_durations: Vec<usize>,
    pub exit_rci_levels: Vec<u32>,
    pub adx_thresholds: Vec<f64>,
    pub di_thresholds: Vec<f64>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        let durations = vec![9, 13, 18, 21, 26, 34, 45];
        let levels = vec![80, 85, 90, 95];
        let thresholds = vec![20.0, 25.0, 30.0];
        Self {
            trend_candles: vec![CandleWidth::ThirtyMinutes, CandleWidth::OneHour],
            trade_candles: vec![CandleWidth::OneMinute, CandleWidth::FiveMinutes],
            entry_rci_durations: durations.clone(),
            entry_rci_levels: levels.clone(),
            exit_rci_durations: durations,
            exit_rci_levels: levels,
            adx_thresholds: thresholds.clone(),
            di_thresholds: thresholds,
        }
    }
}

impl SweepGrid {
    /// Every axis must be non-empty.
    pub fn validate(&self) -> Result<(), RciTraderError> {
        let axes = [
            ("trend_candles", self.trend_candles.len()),
            ("trade_candles", self.trade_candles.len()),
            ("entry_rci_durations", self.entry_rci_durations.len()),
            ("entry_rci_levels", self.entry_rci_levels.len()),
            ("exit_rci_durations", self.exit_rci_durations.len()),
            ("exit_rci_levels", self.exit_rci_levels.len()),
            ("adx_thresholds", self.adx_thresholds.len()),
            ("di_thresholds", self.di_thresholds.len()),
        ];
        for (name, len) in axes {
            if len == 0 {
                return Err(RciTraderError::invalid_parameter(name, "axis has no values"));
            }
        }
        Ok(())
    }

    /// Stricter check for configured grids: every combination must also be a
    /// valid parameter set. [`run_sweep`] records such combinations as
    /// failures instead.
    pub fn validate_combinations(&self) -> Result<(), RciTraderError> {
        self.validate()?;
        self.param_combinations()
            .iter()
            .try_for_each(StrategyParams::validate)
    }

    /// Strategy parameter combinations in grid order, the last axis varying
    /// fastest.
    pub fn param_combinations(&self) -> Vec<StrategyParams> {
        let mut out = Vec::with_capacity(self.params_per_pair());
        for &entry_rci_duration in &self.entry_rci_durations {
            for &entry_rci_level in &self.entry_rci_levels {
                for &exit_rci_duration in &self.exit_rci_durations {
                    for &exit_rci_level in &self.exit_rci_levels {
                        for &adx_threshold in &self.adx_thresholds {
                            for &di_threshold in &self.di_thresholds {
                                out.push(StrategyParams {
                                    entry_rci_duration,
                                    entry_rci_level,
                                    exit_rci_duration,
                                    exit_rci_level,
                                    adx_threshold,
                                    di_threshold,
                                });
                            }
                        }
                    }
                }
            }
        }
        out
    }

    pub fn params_per_pair(&self) -> usize {
        self.entry_rci_durations.len()
            * self.entry_rci_levels.len()
            * self.exit_rci_durations.len()
            * self.exit_rci_levels.len()
            * self.adx_thresholds.len()
            * self.di_thresholds.len()
    }

    pub fn len(&self) -> usize {
        self.trend_candles.len() * self.trade_candles.len() * self.params_per_pair()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A combination that could not be simulated.
#[derive(Debug, Clone)]
pub struct SweepFailure {
    pub trend_candle: CandleWidth,
    pub trade_candle: CandleWidth,
    pub params: StrategyParams,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub results: Vec<SimulationResult>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    /// Result with the highest total profit; ties keep the earliest row.
    pub fn best(&self) -> Option<&SimulationResult> {
        self.results.iter().fold(None, |best, r| match best {
            Some(b) if b.profit() >= r.profit() => Some(b),
            _ => Some(r),
        })
    }
}

/// Run the whole grid.
///
/// A combination that fails, including one with an out-of-range value, is
/// logged and reported in [`SweepReport::failures`]; the others still run.
/// `trend_bars` and `trade_bars` hold the historical bars per candle width;
/// a width named by the grid but missing or empty there fails with `NoData`
/// before any simulation starts.
pub fn run_sweep(
    grid: &SweepGrid,
    trend_bars: &HashMap<CandleWidth, Vec<Bar>>,
    trade_bars: &HashMap<CandleWidth, Vec<Bar>>,
    adx_period: usize,
    calculator: &dyn TrendCalculator,
) -> Result<SweepReport, RciTraderError> {
    grid.validate()?;

    let mut trends: HashMap<CandleWidth, Dmi> = HashMap::new();
    for &width in &grid.trend_candles {
        let bars = require(trend_bars, width, "trend")?;
        trends.insert(width, calculator.calculate(bars, adx_period)?);
    }
    for &width in &grid.trade_candles {
        require(trade_bars, width, "trade")?;
    }

    let combinations = grid.param_combinations();
    info!(
        pairs = grid.trend_candles.len() * grid.trade_candles.len(),
        per_pair = combinations.len(),
        "starting sweep"
    );

    let mut report = SweepReport::default();
    for &trade_candle in &grid.trade_candles {
        let bars = require(trade_bars, trade_candle, "trade")?;
        let cache = IndicatorCache::new(bars);

        for &trend_candle in &grid.trend_candles {
            let Some(dmi) = trends.get(&trend_candle) else {
                continue;
            };
            let simulator = Simulator::new(dmi, bars, trend_candle, trade_candle);

            let outcomes: Vec<Result<SimulationResult, (StrategyParams, RciTraderError)>> =
                combinations
                    .par_iter()
                    .map(|params| {
                        cache
                            .signal_set(params)
                            .and_then(|signals| simulator.run(&signals, params))
                            .map(|run| run.result)
                            .map_err(|e| (*params, e))
                    })
                    .collect();

            for outcome in outcomes {
                match outcome {
                    Ok(result) => report.results.push(result),
                    Err((params, e)) => {
                        warn!(%trade_candle, %trend_candle, ?params, error = %e, "combination failed");
                        report.failures.push(SweepFailure {
                            trend_candle,
                            trade_candle,
                            params,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            info!(%trade_candle, %trend_candle, "pair done");
        }
    }

    info!(
        results = report.results.len(),
        failures = report.failures.len(),
        "sweep finished"
    );
    Ok(report)
}

fn require<'m>(
    data: &'m HashMap<CandleWidth, Vec<Bar>>,
    width: CandleWidth,
    role: &str,
) -> Result<&'m [Bar], RciTraderError> {
    match data.get(&width) {
        Some(bars) if !bars.is_empty() => Ok(bars),
        _ => Err(RciTraderError::NoData {
            series: format!("{role} {width}"),
        }),
    }
}
