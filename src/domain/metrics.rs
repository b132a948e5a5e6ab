//! Backtest scoring: trade counts, win/loss sums and their derived ratios.

use super::ohlcv::CandleWidth;
use super::position::TradeRecord;
use super::strategy::StrategyParams;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub trend_candle: CandleWidth,
    pub trade_candle: CandleWidth,
    pub params: StrategyParams,
    pub trade_count: usize,
    pub won_count: usize,
    pub won_sum: f64,
    pub lost_sum: f64,
}

impl SimulationResult {
    pub fn empty(trend_candle: CandleWidth, trade_candle: CandleWidth, params: StrategyParams) -> Self {
        Self {
            trend_candle,
            trade_candle,
            params,
            trade_count: 0,
            won_count: 0,
            won_sum: 0.0,
            lost_sum: 0.0,
        }
    }

    /// Score a list of closed trades. Breakeven trades count as lost.
    pub fn from_trades(
        trend_candle: CandleWidth,
        trade_candle: CandleWidth,
        params: StrategyParams,
        trades: &[TradeRecord],
    ) -> Self {
        let mut result = Self::empty(trend_candle, trade_candle, params);
        for trade in trades {
            result.record(trade.profit);
        }
        result
    }

    pub fn record(&mut self, profit: f64) {
        self.trade_count += 1;
        if profit > 0.0 {
            self.won_count += 1;
            self.won_sum += profit;
        } else {
            self.lost_sum += profit;
        }
    }

    pub fn lost_count(&self) -> usize {
        self.trade_count - self.won_count
    }

    pub fn profit(&self) -> f64 {
        self.won_sum + self.lost_sum
    }

    pub fn profit_average(&self) -> f64 {
        self.profit() / denominator(self.trade_count)
    }

    pub fn won_average(&self) -> f64 {
        self.won_sum / denominator(self.won_count)
    }

    pub fn lost_average(&self) -> f64 {
        self.lost_sum / denominator(self.lost_count())
    }

    pub fn won_ratio(&self) -> f64 {
        self.won_count as f64 / denominator(self.trade_count)
    }
}

// Zero counts divide by one so an idle combination scores 0 everywhere.
fn denominator(count: usize) -> f64 {
    if count == 0 { 1.0 } else { count as f64 }
}
