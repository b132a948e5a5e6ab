//! Order placement port trait.

use std::fmt;

use crate::domain::error::RciTraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("BUY"),
            OrderSide::Sell => f.write_str("SELL"),
        }
    }
}

/// Acknowledgement returned by the exchange for an accepted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
}

/// Market order placement. Failures are reported as [`RciTraderError::Order`].
pub trait OrderPort {
    fn place_order(
        &mut self,
        instrument: &str,
        side: OrderSide,
        size: f64,
    ) -> Result<OrderAck, RciTraderError>;
}
