//! Bar source port trait: the historical/live bar store.

use crate::domain::error::RciTraderError;
use crate::domain::ohlcv::{Bar, SeriesKey, TimeRange};

/// Store of OHLCV bars, queried by series and inclusive time range.
///
/// Implementations return bars ascending by `period_start` without duplicates
/// and report any failure as [`RciTraderError::SourceUnavailable`].
pub trait BarSource: Send + Sync {
    fn query(&self, key: &SeriesKey, range: TimeRange) -> Result<Vec<Bar>, RciTraderError>;
}
