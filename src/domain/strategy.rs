//! ADX + RCI strategy parameters.
//!
//! Long trend bars give ADX/+DI/-DI; short trade bars give two RCIs, one for
//! entries and one for exits.
//!
//! - Never hold more than one position at a time.
//! - Go long when ADX and +DI are above their thresholds and the entry RCI
//!   comes back above `-entry_rci_level` after having been below it.
//! - Close the long when the exit RCI falls back below `exit_rci_level` after
//!   having been above it, or when the trend turns down.
//! - Shorts are the mirror image with -DI.

use super::crossing::Speculation;
use super::error::RciTraderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyParams {
    pub entry_rci_duration: usize,
    pub entry_rci_level: u32,
    pub exit_rci_duration: usize,
    pub exit_rci_level: u32,
    pub adx_threshold: f64,
    pub di_threshold: f64,
}

impl StrategyParams {
    pub fn validate(&self) -> Result<(), RciTraderError> {
        for (name, duration) in [
            ("entry_rci_duration", self.entry_rci_duration),
            ("exit_rci_duration", self.exit_rci_duration),
        ] {
            if duration < 2 {
                return Err(RciTraderError::invalid_parameter(
                    name,
                    format!("must be at least 2, got {duration}"),
                ));
            }
        }
        for (name, level) in [
            ("entry_rci_level", self.entry_rci_level),
            ("exit_rci_level", self.exit_rci_level),
        ] {
            if level == 0 || level > 100 {
                return Err(RciTraderError::invalid_parameter(
                    name,
                    format!("must be within 1..=100, got {level}"),
                ));
            }
        }
        for (name, threshold) in [
            ("adx_threshold", self.adx_threshold),
            ("di_threshold", self.di_threshold),
        ] {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(RciTraderError::invalid_parameter(
                    name,
                    format!("must be a non-negative number, got {threshold}"),
                ));
            }
        }
        Ok(())
    }

    /// Bars the trade series must retain to produce both RCIs.
    pub fn trade_bars_needed(&self) -> usize {
        self.entry_rci_duration.max(self.exit_rci_duration) + 1
    }

    pub fn speculations(&self) -> Result<(Speculation, Speculation), RciTraderError> {
        Ok((
            Speculation::uptrend(self.entry_rci_level, self.exit_rci_level)?,
            Speculation::downtrend(self.entry_rci_level, self.exit_rci_level)?,
        ))
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            entry_rci_duration: 9,
            entry_rci_level: 80,
            exit_rci_duration: 18,
            exit_rci_level: 80,
            adx_threshold: 10.0,
            di_threshold: 20.0,
        }
    }
}
