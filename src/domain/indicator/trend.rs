//! Trend strength and direction (ADX / +DI / -DI).
//!
//! The trading core only depends on [`TrendCalculator`]: three series aligned
//! to the input bars, NaN during warm-up. [`WilderDmi`] is the default
//! routine, using TA-Lib lookbacks:
//!
//! 1. +DM, -DM and TR for every bar transition.
//! 2. Wilder smoothing seeded with the sum of the first `period` transitions.
//! 3. +DI = 100 * sm(+DM) / sm(TR), -DI = 100 * sm(-DM) / sm(TR), from bar `period`.
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI), from bar `period`.
//! 5. ADX = mean of the first `period` DX values at bar `2 * period - 1`,
//!    then (prev * (period - 1) + DX) / period.

use chrono::{DateTime, Utc};

use crate::domain::error::RciTraderError;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_ADX_PERIOD: usize = 14;

/// ADX/DMI output: three series aligned to the same bars.
#[derive(Debug, Clone)]
pub struct Dmi {
    pub period: usize,
    pub adx: IndicatorSeries,
    pub plus_di: IndicatorSeries,
    pub minus_di: IndicatorSeries,
}

/// Trend values at one timestamp, all defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendReading {
    pub time: DateTime<Utc>,
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

impl Dmi {
    pub fn len(&self) -> usize {
        self.adx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adx.is_empty()
    }

    /// Reading at bar `index`; `None` while any component is still warming up.
    pub fn reading_at_index(&self, index: usize) -> Option<TrendReading> {
        let adx = self.adx.values.get(index)?;
        let plus_di = self.plus_di.values.get(index)?;
        let minus_di = self.minus_di.values.get(index)?;
        if !(adx.is_defined() && plus_di.is_defined() && minus_di.is_defined()) {
            return None;
        }
        Some(TrendReading {
            time: adx.time,
            adx: adx.value,
            plus_di: plus_di.value,
            minus_di: minus_di.value,
        })
    }

    /// Reading at the latest trend timestamp `<= time`.
    pub fn reading_at(&self, time: DateTime<Utc>) -> Option<TrendReading> {
        self.adx
            .index_at_or_before(time)
            .and_then(|i| self.reading_at_index(i))
    }
}

pub trait TrendCalculator: Send + Sync {
    fn calculate(&self, bars: &[Bar], period: usize) -> Result<Dmi, RciTraderError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WilderDmi;

impl TrendCalculator for WilderDmi {
    fn calculate(&self, bars: &[Bar], period: usize) -> Result<Dmi, RciTraderError> {
        calculate_dmi(bars, period)
    }
}

pub fn calculate_dmi(bars: &[Bar], period: usize) -> Result<Dmi, RciTraderError> {
    if period == 0 {
        return Err(RciTraderError::invalid_parameter(
            "adx_period",
            "must be positive",
        ));
    }

    let n = bars.len();
    let mut adx = vec![f64::NAN; n];
    let mut plus_di = vec![f64::NAN; n];
    let mut minus_di = vec![f64::NAN; n];

    if n > period {
        let p = period as f64;
        let mut sm_plus = 0.0;
        let mut sm_minus = 0.0;
        let mut sm_tr = 0.0;
        let mut dx_sum = 0.0;
        let mut prev_adx = f64::NAN;

        for i in 1..n {
            let (pdm, mdm) = directional_movement(&bars[i - 1], &bars[i]);
            let tr = bars[i].true_range(bars[i - 1].close);

            if i <= period {
                sm_plus += pdm;
                sm_minus += mdm;
                sm_tr += tr;
                if i < period {
                    continue;
                }
            } else {
                sm_plus = sm_plus - sm_plus / p + pdm;
                sm_minus = sm_minus - sm_minus / p + mdm;
                sm_tr = sm_tr - sm_tr / p + tr;
            }

            let (pdi, mdi) = if sm_tr == 0.0 {
                (0.0, 0.0)
            } else {
                (100.0 * sm_plus / sm_tr, 100.0 * sm_minus / sm_tr)
            };
            plus_di[i] = pdi;
            minus_di[i] = mdi;

            let di_sum = pdi + mdi;
            let dx = if di_sum == 0.0 {
                0.0
            } else {
                100.0 * (pdi - mdi).abs() / di_sum
            };

            if i < 2 * period - 1 {
                dx_sum += dx;
            } else if i == 2 * period - 1 {
                dx_sum += dx;
                prev_adx = dx_sum / p;
                adx[i] = prev_adx;
            } else {
                prev_adx = (prev_adx * (p - 1.0) + dx) / p;
                adx[i] = prev_adx;
            }
        }
    }

    Ok(Dmi {
        period,
        adx: to_series(bars, adx, IndicatorType::Adx(period)),
        plus_di: to_series(bars, plus_di, IndicatorType::PlusDi(period)),
        minus_di: to_series(bars, minus_di, IndicatorType::MinusDi(period)),
    })
}

fn directional_movement(prev: &Bar, bar: &Bar) -> (f64, f64) {
    let up_move = bar.high - prev.high;
    let down_move = prev.low - bar.low;
    let pdm = if up_move > down_move && up_move > 0.0 {
        up_move
    } else {
        0.0
    };
    let mdm = if down_move > up_move && down_move > 0.0 {
        down_move
    } else {
        0.0
    };
    (pdm, mdm)
}

fn to_series(bars: &[Bar], values: Vec<f64>, indicator_type: IndicatorType) -> IndicatorSeries {
    IndicatorSeries {
        indicator_type,
        values: bars
            .iter()
            .zip(values)
            .map(|(bar, value)| IndicatorPoint {
                time: bar.period_start,
                value,
            })
            .collect(),
    }
}
