//! Paper trading: orders are logged and acknowledged, never sent anywhere.

use tracing::info;

use crate::domain::error::RciTraderError;
use crate::ports::order_port::{OrderAck, OrderPort, OrderSide};

#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub order_id: String,
    pub instrument: String,
    pub side: OrderSide,
    pub size: f64,
}

#[derive(Debug, Default)]
pub struct PaperOrderAdapter {
    fills: Vec<PaperFill>,
}

impl PaperOrderAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fills(&self) -> &[PaperFill] {
        &self.fills
    }
}

impl OrderPort for PaperOrderAdapter {
    fn place_order(
        &mut self,
        instrument: &str,
        side: OrderSide,
        size: f64,
    ) -> Result<OrderAck, RciTraderError> {
        if !(size.is_finite() && size > 0.0) {
            return Err(RciTraderError::Order {
                reason: format!("invalid size {size}"),
            });
        }
        let order_id = format!("paper-{}", self.fills.len() + 1);
        info!(%order_id, instrument, %side, size, "paper order");
        self.fills.push(PaperFill {
            order_id: order_id.clone(),
            instrument: instrument.to_string(),
            side,
            size,
        });
        Ok(OrderAck { order_id })
    }
}
