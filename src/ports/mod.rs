//! Port traits for the collaborators the trading core talks to.

pub mod config_port;
pub mod data_port;
pub mod order_port;
pub mod report_port;
