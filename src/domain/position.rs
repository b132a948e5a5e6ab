//! Open position and closed trade records.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::ports::order_port::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens a position on this side.
    pub fn opening_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position on this side.
    pub fn closing_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("LONG"),
            Side::Short => f.write_str("SHORT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub opened_at: DateTime<Utc>,
    pub entry_price: f64,
    pub size: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => (price - self.entry_price) * self.size,
            Side::Short => (self.entry_price - price) * self.size,
        }
    }

    pub fn close(&self, closed_at: DateTime<Utc>, exit_price: f64) -> TradeRecord {
        TradeRecord {
            opened_at: self.opened_at,
            closed_at,
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            size: self.size,
            profit: self.unrealized_pnl(exit_price),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub profit: f64,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }
}
