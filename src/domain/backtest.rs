//! Offline replay of one parameter set over historical bars.
//!
//! Every trade bar becomes one tick of the position state machine. The trend
//! reading at a tick is the latest trend bar starting at or before the tick,
//! so a trend bar is never seen before it begins.

use chrono::{DateTime, Utc};

use super::crossing::Signals;
use super::error::RciTraderError;
use super::execution::{PositionStateMachine, TickInput, TradeEvent};
use super::indicator::trend::{Dmi, TrendReading};
use super::indicator_helpers::SignalSet;
use super::metrics::SimulationResult;
use super::ohlcv::{Bar, CandleWidth};
use super::position::TradeRecord;
use super::strategy::StrategyParams;
use crate::ports::order_port::{OrderAck, OrderPort, OrderSide};

const SIMULATED_SIZE: f64 = 1.0;

/// Cumulative realized profit after a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub profit: f64,
}

#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub result: SimulationResult,
    pub trades: Vec<TradeRecord>,
    pub equity: Vec<EquityPoint>,
}

/// Order port that acknowledges every order.
#[derive(Debug, Default)]
pub struct SimulatedOrders {
    placed: usize,
}

impl SimulatedOrders {
    pub fn placed(&self) -> usize {
        self.placed
    }
}

impl OrderPort for SimulatedOrders {
    fn place_order(
        &mut self,
        _instrument: &str,
        _side: OrderSide,
        _size: f64,
    ) -> Result<OrderAck, RciTraderError> {
        self.placed += 1;
        Ok(OrderAck {
            order_id: format!("sim-{}", self.placed),
        })
    }
}

pub struct Simulator<'a> {
    trend: &'a Dmi,
    trade_bars: &'a [Bar],
    trend_candle: CandleWidth,
    trade_candle: CandleWidth,
}

impl<'a> Simulator<'a> {
    pub fn new(
        trend: &'a Dmi,
        trade_bars: &'a [Bar],
        trend_candle: CandleWidth,
        trade_candle: CandleWidth,
    ) -> Self {
        Self {
            trend,
            trade_bars,
            trend_candle,
            trade_candle,
        }
    }

    pub fn run(
        &self,
        signals: &SignalSet,
        params: &StrategyParams,
    ) -> Result<SimulationRun, RciTraderError> {
        if signals.len() != self.trade_bars.len() {
            return Err(RciTraderError::invalid_parameter(
                "signals",
                format!(
                    "{} crossing points for {} trade bars",
                    signals.len(),
                    self.trade_bars.len()
                ),
            ));
        }

        let mut machine = PositionStateMachine::new(
            format!("backtest@{}", self.trade_candle),
            SIMULATED_SIZE,
            params.adx_threshold,
            params.di_threshold,
        )?;
        let mut orders = SimulatedOrders::default();
        let mut cursor = TrendCursor::new(self.trend);
        let mut equity = Vec::with_capacity(self.trade_bars.len());
        let mut realized = 0.0;

        for (i, bar) in self.trade_bars.iter().enumerate() {
            let tick = TickInput {
                time: bar.period_start,
                price: bar.close,
                trend: cursor.advance_to(bar.period_start),
                uptrend: Signals {
                    entry: signals.uptrend_entry[i],
                    exit: signals.uptrend_exit[i],
                },
                downtrend: Signals {
                    entry: signals.downtrend_entry[i],
                    exit: signals.downtrend_exit[i],
                },
            };
            for event in machine.step(&tick, &mut orders)? {
                if let TradeEvent::Closed(trade) = event {
                    realized += trade.profit;
                }
            }
            equity.push(EquityPoint {
                time: bar.period_start,
                profit: realized,
            });
        }

        let trades = machine.into_trades();
        let result = SimulationResult::from_trades(
            self.trend_candle,
            self.trade_candle,
            *params,
            &trades,
        );
        Ok(SimulationRun {
            result,
            trades,
            equity,
        })
    }
}

/// Forward-only lookup of the latest trend reading at or before a time.
struct TrendCursor<'a> {
    dmi: &'a Dmi,
    next: usize,
}

impl<'a> TrendCursor<'a> {
    fn new(dmi: &'a Dmi) -> Self {
        Self { dmi, next: 0 }
    }

    /// `time` must not decrease between calls.
    fn advance_to(&mut self, time: DateTime<Utc>) -> Option<TrendReading> {
        let points = &self.dmi.adx.values;
        while self.next < points.len() && points[self.next].time <= time {
            self.next += 1;
        }
        self.next.checked_sub(1).and_then(|i| self.dmi.reading_at_index(i))
    }
}
