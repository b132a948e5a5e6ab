//! Live trading loop.
//!
//! Each tick refreshes both series, then for every trade bar not seen yet
//! feeds its entry and exit RCI to the two speculations, reads the trend at
//! the bar's time and steps the position state machine.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::bar_series::{BarSeries, Lookback};
use super::crossing::Speculation;
use super::error::RciTraderError;
use super::execution::{PositionState, PositionStateMachine, TickInput, TradeEvent};
use super::follower::{Follower, time_to_next_tick};
use super::indicator::rci::calculate_rci;
use super::indicator::trend::TrendCalculator;
use super::ohlcv::{CandleWidth, SeriesKey};
use super::position::TradeRecord;
use super::strategy::StrategyParams;
use crate::ports::data_port::BarSource;
use crate::ports::order_port::OrderPort;

/// Trade bars a tick can still replay with a complete RCI window.
pub const CATCH_UP_BARS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub instrument: String,
    pub trend_candle: CandleWidth,
    pub trade_candle: CandleWidth,
    pub params: StrategyParams,
    pub trade_size: f64,
    pub adx_period: usize,
}

impl LiveConfig {
    pub fn trend_key(&self) -> SeriesKey {
        SeriesKey::new(self.instrument.clone(), self.trend_candle)
    }

    pub fn trade_key(&self) -> SeriesKey {
        SeriesKey::new(self.instrument.clone(), self.trade_candle)
    }

    pub fn trend_lookback(&self) -> Lookback {
        Lookback::Recent(self.adx_period.saturating_mul(2))
    }

    /// Enough bars for the longest RCI window plus [`CATCH_UP_BARS`] bars
    /// replayable after a gap.
    pub fn trade_lookback(&self) -> Lookback {
        Lookback::Recent(self.params.trade_bars_needed() + CATCH_UP_BARS)
    }
}

pub struct LiveTrader<O: OrderPort> {
    config: LiveConfig,
    trend: Arc<BarSeries>,
    trade: Arc<BarSeries>,
    calculator: Box<dyn TrendCalculator>,
    uptrend: Speculation,
    downtrend: Speculation,
    machine: PositionStateMachine,
    orders: O,
    followers: Vec<Follower>,
    last_bar: Option<DateTime<Utc>>,
}

impl<O: OrderPort> LiveTrader<O> {
    /// Load both series from `source` and build the trader.
    pub fn connect(
        source: Arc<dyn BarSource>,
        config: LiveConfig,
        calculator: Box<dyn TrendCalculator>,
        orders: O,
    ) -> Result<Self, RciTraderError> {
        config.params.validate()?;
        let trend = BarSeries::create(Arc::clone(&source), config.trend_key(), config.trend_lookback())?;
        let trade = BarSeries::create(source, config.trade_key(), config.trade_lookback())?;
        Self::new(config, Arc::new(trend), Arc::new(trade), calculator, orders)
    }

    pub fn new(
        config: LiveConfig,
        trend: Arc<BarSeries>,
        trade: Arc<BarSeries>,
        calculator: Box<dyn TrendCalculator>,
        orders: O,
    ) -> Result<Self, RciTraderError> {
        config.params.validate()?;
        if config.adx_period == 0 {
            return Err(RciTraderError::invalid_parameter("adx_period", "must be positive"));
        }
        let (uptrend, downtrend) = config.params.speculations()?;
        let machine = PositionStateMachine::new(
            config.instrument.clone(),
            config.trade_size,
            config.params.adx_threshold,
            config.params.di_threshold,
        )?;
        info!(
            instrument = %config.instrument,
            trend = %config.trend_candle,
            trade = %config.trade_candle,
            params = ?config.params,
            "live trader ready"
        );
        Ok(Self {
            config,
            trend,
            trade,
            calculator,
            uptrend,
            downtrend,
            machine,
            orders,
            followers: Vec::new(),
            last_bar: None,
        })
    }

    /// Refresh both series on background threads instead of on every tick.
    pub fn follow(&mut self, interval: Duration) -> Result<(), RciTraderError> {
        if !self.followers.is_empty() {
            return Ok(());
        }
        self.followers.push(Follower::spawn(Arc::clone(&self.trend), interval)?);
        self.followers.push(Follower::spawn(Arc::clone(&self.trade), interval)?);
        Ok(())
    }

    pub fn is_following(&self) -> bool {
        !self.followers.is_empty()
    }

    pub fn state(&self) -> PositionState {
        self.machine.state()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        self.machine.trades()
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    pub fn tick(&mut self) -> Result<Vec<TradeEvent>, RciTraderError> {
        self.tick_at(Utc::now())
    }

    /// Run one tick as of `now`.
    ///
    /// Every trade bar not evaluated yet is replayed in order: its entry and
    /// exit RCI go to the speculations and the state machine steps at the
    /// bar's close, the same sequence a backtest over those bars sees. On the
    /// first tick the retained history only warms up the speculations and the
    /// latest bar alone is stepped. A tick without a new trade bar does
    /// nothing.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Result<Vec<TradeEvent>, RciTraderError> {
        if self.followers.is_empty() {
            refresh_or_keep(&self.trend, now)?;
            refresh_or_keep(&self.trade, now)?;
        }

        let bars = self.trade.snapshot();
        if bars.is_empty() {
            return Err(RciTraderError::NoData {
                series: self.trade.key().to_string(),
            });
        }
        let start = match self.last_bar {
            Some(seen) => bars.partition_point(|b| b.period_start <= seen),
            None => bars.len() - 1,
        };
        if start == bars.len() {
            debug!(last = ?self.last_bar, "no new trade bar");
            return Ok(Vec::new());
        }

        let params = self.config.params;
        let entry_rci = calculate_rci(&bars, params.entry_rci_duration)?;
        let exit_rci = calculate_rci(&bars, params.exit_rci_duration)?;
        if self.last_bar.is_none() {
            for (i, bar) in bars[..start].iter().enumerate() {
                let (entry, exit) = (entry_rci.values[i].value, exit_rci.values[i].value);
                self.uptrend.determine(bar.period_start, bar.close, entry, exit);
                self.downtrend.determine(bar.period_start, bar.close, entry, exit);
            }
        }

        let dmi = self
            .calculator
            .calculate(&self.trend.snapshot(), self.config.adx_period)?;
        if start + 1 < bars.len() {
            info!(bars = bars.len() - start, "catching up on trade bars");
        }

        let mut events = Vec::new();
        for (i, bar) in bars.iter().enumerate().skip(start) {
            self.last_bar = Some(bar.period_start);
            let (time, price) = (bar.period_start, bar.close);
            let (entry, exit) = (entry_rci.values[i].value, exit_rci.values[i].value);
            let uptrend = self.uptrend.determine(time, price, entry, exit);
            let downtrend = self.downtrend.determine(time, price, entry, exit);
            info!(
                %time,
                price,
                entry_rci = entry,
                exit_rci = exit,
                up_entry = uptrend.entry(),
                up_exit = uptrend.exit(),
                down_entry = downtrend.entry(),
                down_exit = downtrend.exit(),
                "speculations"
            );

            let trend = dmi.reading_at(time);
            if trend.is_none() {
                debug!(%time, "trend indicator not ready");
            }
            let tick = TickInput {
                time,
                price,
                trend,
                uptrend,
                downtrend,
            };
            let applied = events.len();
            let stepped = self.machine.step_into(&tick, &mut self.orders, &mut events);
            events[applied..].iter().for_each(log_event);
            stepped?;
        }
        Ok(events)
    }

    /// Tick every `interval` until `max_ticks` ticks ran (forever when `None`).
    ///
    /// Fatal errors stop the loop; everything else is logged and the next
    /// tick proceeds.
    pub fn run(&mut self, interval: Duration, max_ticks: Option<usize>) -> Result<(), RciTraderError> {
        let started = Instant::now();
        let mut ticks = 0usize;
        loop {
            match self.tick() {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "stopping live trader");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "tick failed"),
            }
            ticks += 1;
            if max_ticks.is_some_and(|max| ticks >= max) {
                info!(ticks, trades = self.trades().len(), "live trader finished");
                return Ok(());
            }
            thread::sleep(time_to_next_tick(started.elapsed(), interval));
        }
    }
}

fn refresh_or_keep(series: &BarSeries, now: DateTime<Utc>) -> Result<(), RciTraderError> {
    match series.refresh_until(now) {
        Ok(_) => Ok(()),
        Err(RciTraderError::SourceUnavailable { reason }) => {
            warn!(series = %series.key(), %reason, "refresh failed, using retained bars");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn log_event(event: &TradeEvent) {
    match event {
        TradeEvent::Opened(p) => {
            info!(side = %p.side, price = p.entry_price, size = p.size, "opened position")
        }
        TradeEvent::Closed(t) => {
            info!(side = %t.side, entry = t.entry_price, exit = t.exit_price, profit = t.profit, "closed position")
        }
    }
}
