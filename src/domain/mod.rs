//! Core domain types and logic.

pub mod ohlcv;
pub mod bar_series;
pub mod follower;
pub mod position;
pub mod execution;
pub mod indicator;
pub mod indicator_helpers;
pub mod crossing;
pub mod backtest;
pub mod metrics;
pub mod strategy;
pub mod sweep;
pub mod pairing;
pub mod live;
pub mod config_validation;
pub mod error;
