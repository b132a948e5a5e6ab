//! RCI (Rank Correlation Index) indicator.
//!
//! Spearman rank correlation between chronological order and price order over
//! a sliding window of `d` closes:
//!
//! RCI = (1 - 6 * Σ(time_rank - price_rank)² / (d³ - d)) * 100
//!
//! Price ranks are ordinal: equal closes are ranked by order of appearance.
//! Warmup: the first `d - 1` values are NaN.

use crate::domain::error::RciTraderError;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_rci(bars: &[Bar], duration: usize) -> Result<IndicatorSeries, RciTraderError> {
    if duration < 2 {
        return Err(RciTraderError::invalid_parameter(
            "rci_duration",
            format!("must be at least 2, got {duration}"),
        ));
    }

    let d = duration as f64;
    let denominator = d * d * d - d;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let mut order: Vec<usize> = Vec::with_capacity(duration);
    let mut price_rank: Vec<usize> = vec![0; duration];

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i + 1 < duration {
                return IndicatorPoint {
                    time: bar.period_start,
                    value: f64::NAN,
                };
            }

            let window = &closes[i + 1 - duration..=i];
            order.clear();
            order.extend(0..duration);
            // stable sort keeps ties in order of appearance
            order.sort_by(|&a, &b| window[a].total_cmp(&window[b]));
            for (rank, &pos) in order.iter().enumerate() {
                price_rank[pos] = rank;
            }

            let sum_sq: f64 = price_rank
                .iter()
                .enumerate()
                .map(|(time_rank, &rank)| {
                    let diff = time_rank as f64 - rank as f64;
                    diff * diff
                })
                .sum();

            IndicatorPoint {
                time: bar.period_start,
                value: (1.0 - 6.0 * sum_sq / denominator) * 100.0,
            }
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type: IndicatorType::Rci(duration),
        values,
    })
}
