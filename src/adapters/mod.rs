//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_result_adapter;
pub mod file_config_adapter;
pub mod paper_order_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
