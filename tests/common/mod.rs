#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rcitrader::domain::error::RciTraderError;
pub use rcitrader::domain::ohlcv::{Bar, CandleWidth, SeriesKey, TimeRange};
use rcitrader::ports::data_port::BarSource;
use rcitrader::ports::order_port::{OrderAck, OrderPort, OrderSide};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory bar store. Bars can be added while series hold a reference.
pub struct MockBarSource {
    data: Mutex<HashMap<SeriesKey, Vec<Bar>>>,
    failing: AtomicBool,
    queries: AtomicUsize,
}

impl MockBarSource {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_bars(self, key: SeriesKey, bars: Vec<Bar>) -> Self {
        self.push(&key, bars);
        self
    }

    pub fn push(&self, key: &SeriesKey, bars: Vec<Bar>) {
        let mut data = self.data.lock();
        let series = data.entry(key.clone()).or_default();
        series.extend(bars);
        series.sort_by_key(|b| b.period_start);
        series.dedup_by_key(|b| b.period_start);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl BarSource for MockBarSource {
    fn query(&self, key: &SeriesKey, range: TimeRange) -> Result<Vec<Bar>, RciTraderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RciTraderError::SourceUnavailable {
                reason: "mock source offline".into(),
            });
        }
        Ok(self
            .data
            .lock()
            .get(key)
            .map(|bars| {
                bars.iter()
                    .filter(|b| range.contains(b.period_start))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Order port that records every call and can be told to reject.
#[derive(Default)]
pub struct RecordingOrderPort {
    pub placed: Vec<(String, OrderSide, f64)>,
    pub reject: bool,
}

impl OrderPort for RecordingOrderPort {
    fn place_order(
        &mut self,
        instrument: &str,
        side: OrderSide,
        size: f64,
    ) -> Result<OrderAck, RciTraderError> {
        if self.reject {
            return Err(RciTraderError::Order {
                reason: "rejected by test".into(),
            });
        }
        self.placed.push((instrument.to_string(), side, size));
        Ok(OrderAck {
            order_id: format!("rec-{}", self.placed.len()),
        })
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn make_bar(period_start: DateTime<Utc>, close: f64) -> Bar {
    Bar {
        period_start,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1.0,
    }
}

/// One bar per `width` starting at `start`, closes taken from `closes`.
pub fn bars_from_closes(start: DateTime<Utc>, width: CandleWidth, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(start + width.duration() * i as i32, c))
        .collect()
}

/// Straight line of `count` bars moving by `step` per bar.
pub fn generate_bars(
    start: DateTime<Utc>,
    width: CandleWidth,
    count: usize,
    start_price: f64,
    step: f64,
) -> Vec<Bar> {
    let closes: Vec<f64> = (0..count).map(|i| start_price + step * i as f64).collect();
    bars_from_closes(start, width, &closes)
}

/// Closes 10 down to 1, then 2 up to 11.
pub fn v_shape_closes() -> Vec<f64> {
    (0..20)
        .map(|i| if i < 10 { 10.0 - i as f64 } else { i as f64 - 8.0 })
        .collect()
}

/// Repeating V with the given half period, around 100.
pub fn wave_closes(count: usize, half_period: usize) -> Vec<f64> {
    let period = 2 * half_period;
    (0..count)
        .map(|i| 100.0 + ((i % period) as f64 - half_period as f64).abs())
        .collect()
}
