//! Backtest result sink port trait.

use std::path::Path;

use crate::domain::error::RciTraderError;
use crate::domain::metrics::SimulationResult;

/// Port for exporting simulation results, one row per parameter combination.
pub trait ResultSink {
    fn write(&self, results: &[SimulationResult], output_path: &Path) -> Result<(), RciTraderError>;
}
