//! Single-position trade state machine.
//!
//! Each tick applies, in order: exit on RCI signal, the trend gate, exit on a
//! trend flip, then entry. At most one position is open at any time; every
//! open and close goes through exactly one order placement call.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::crossing::Signals;
use super::error::RciTraderError;
use super::indicator::trend::TrendReading;
use super::position::{Position, Side, TradeRecord};
use crate::ports::order_port::OrderPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
}

/// Classify a trend reading; `None` when the gate blocks trading.
///
/// Blocked when ADX is under its threshold or when +DI and -DI are both at or
/// above (or both at or below) the DI threshold.
pub fn trend_direction(reading: &TrendReading, adx_threshold: f64, di_threshold: f64) -> Option<Trend> {
    if reading.adx < adx_threshold {
        return None;
    }
    let (dip, dim) = (reading.plus_di, reading.minus_di);
    if (dip >= di_threshold && dim >= di_threshold) || (dip <= di_threshold && dim <= di_threshold)
    {
        return None;
    }
    if dip >= di_threshold {
        Some(Trend::Up)
    } else {
        Some(Trend::Down)
    }
}

/// Everything the state machine sees on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    pub time: DateTime<Utc>,
    pub price: f64,
    /// `None` while the trend indicator is warming up.
    pub trend: Option<TrendReading>,
    pub uptrend: Signals,
    pub downtrend: Signals,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Opened(Position),
    Closed(TradeRecord),
}

#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    instrument: String,
    size: f64,
    adx_threshold: f64,
    di_threshold: f64,
    position: Option<Position>,
    trades: Vec<TradeRecord>,
}

impl PositionStateMachine {
    pub fn new(
        instrument: impl Into<String>,
        size: f64,
        adx_threshold: f64,
        di_threshold: f64,
    ) -> Result<Self, RciTraderError> {
        if !(size.is_finite() && size > 0.0) {
            return Err(RciTraderError::invalid_parameter(
                "trade_size",
                format!("must be positive, got {size}"),
            ));
        }
        Ok(Self {
            instrument: instrument.into(),
            size,
            adx_threshold,
            di_threshold,
            position: None,
            trades: Vec::new(),
        })
    }

    pub fn state(&self) -> PositionState {
        match &self.position {
            None => PositionState::Flat,
            Some(p) if p.is_long() => PositionState::Long,
            Some(_) => PositionState::Short,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }

    /// Evaluate one tick.
    ///
    /// Returns the transitions applied. An order error aborts the rest of the
    /// tick; transitions applied before it stay applied, see [`Self::step_into`].
    pub fn step(
        &mut self,
        tick: &TickInput,
        orders: &mut dyn OrderPort,
    ) -> Result<Vec<TradeEvent>, RciTraderError> {
        let mut events = Vec::new();
        self.step_into(tick, orders, &mut events)?;
        Ok(events)
    }

    /// Evaluate one tick, pushing each transition to `events` as soon as it is
    /// applied. On error `events` still holds what happened before the failure.
    pub fn step_into(
        &mut self,
        tick: &TickInput,
        orders: &mut dyn OrderPort,
        events: &mut Vec<TradeEvent>,
    ) -> Result<(), RciTraderError> {
        let signal_exit = match self.state() {
            PositionState::Long => tick.uptrend.exit(),
            PositionState::Short => tick.downtrend.exit(),
            PositionState::Flat => false,
        };
        if signal_exit {
            let trade = self.close(tick.time, tick.price, orders)?;
            events.push(TradeEvent::Closed(trade));
        }

        let Some(reading) = tick.trend else {
            return Ok(());
        };
        let Some(trend) = trend_direction(&reading, self.adx_threshold, self.di_threshold) else {
            return Ok(());
        };

        match (trend, self.state()) {
            (Trend::Up, PositionState::Short) | (Trend::Down, PositionState::Long) => {
                debug!(?trend, "trend flipped against open position");
                let trade = self.close(tick.time, tick.price, orders)?;
                events.push(TradeEvent::Closed(trade));
            }
            (Trend::Up, PositionState::Flat) if tick.uptrend.entry() => {
                let position = self.open(Side::Long, tick.time, tick.price, orders)?;
                events.push(TradeEvent::Opened(position));
            }
            (Trend::Down, PositionState::Flat) if tick.downtrend.entry() => {
                let position = self.open(Side::Short, tick.time, tick.price, orders)?;
                events.push(TradeEvent::Opened(position));
            }
            _ => {}
        }

        Ok(())
    }

    /// Open a position. Fails with `InvalidState` when one is already open.
    pub fn open(
        &mut self,
        side: Side,
        time: DateTime<Utc>,
        price: f64,
        orders: &mut dyn OrderPort,
    ) -> Result<Position, RciTraderError> {
        if let Some(existing) = &self.position {
            return Err(RciTraderError::InvalidState {
                reason: format!("cannot open {side}: a {} position is already open", existing.side),
            });
        }

        let order_side = side.opening_order();
        orders.place_order(&self.instrument, order_side, self.size)?;

        let position = Position {
            side,
            opened_at: time,
            entry_price: price,
            size: self.size,
        };
        debug!(%side, order = %order_side, price, size = self.size, "opened position");
        self.position = Some(position.clone());
        Ok(position)
    }

    /// Close the open position. Fails with `InvalidState` when flat.
    pub fn close(
        &mut self,
        time: DateTime<Utc>,
        price: f64,
        orders: &mut dyn OrderPort,
    ) -> Result<TradeRecord, RciTraderError> {
        let Some(position) = &self.position else {
            return Err(RciTraderError::InvalidState {
                reason: "no position to close".into(),
            });
        };

        let order_side = position.side.closing_order();
        orders.place_order(&self.instrument, order_side, position.size)?;

        let trade = position.close(time, price);
        debug!(
            side = %trade.side,
            order = %order_side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            profit = trade.profit,
            "closed position"
        );
        self.position = None;
        self.trades.push(trade.clone());
        Ok(trade)
    }
}
