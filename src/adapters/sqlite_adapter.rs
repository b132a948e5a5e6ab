//! SQLite bar store.
//!
//! Bars live in one `bars` table keyed by `(instrument, candle_width,
//! period_start)`; `period_start` is stored as Unix seconds so range filters
//! compare numerically.

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::domain::error::RciTraderError;
use crate::domain::ohlcv::{Bar, SeriesKey, TimeRange};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::BarSource;

pub struct SqliteBarAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteBarAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RciTraderError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| RciTraderError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Result<Self, RciTraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), RciTraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                instrument TEXT NOT NULL,
                candle_width TEXT NOT NULL,
                period_start INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (instrument, candle_width, period_start)
            );",
        )
        .map_err(query_error)?;

        Ok(())
    }

    /// Insert or replace bars of one series in a single transaction.
    pub fn insert_bars(&self, key: &SeriesKey, bars: &[Bar]) -> Result<(), RciTraderError> {
        let mut conn = self.pool.get().map_err(pool_error)?;
        let tx = conn.transaction().map_err(query_error)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO bars
                     (instrument, candle_width, period_start, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(query_error)?;
            let width = key.candle_width.as_str();
            for bar in bars {
                stmt.execute(params![
                    key.instrument,
                    width,
                    bar.period_start.timestamp(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ])
                .map_err(query_error)?;
            }
        }

        tx.commit().map_err(query_error)?;
        Ok(())
    }

    /// First bar, last bar and bar count of a series; `None` when empty.
    pub fn data_range(
        &self,
        key: &SeriesKey,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, RciTraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        let (min, max, count): (Option<i64>, Option<i64>, i64) = conn
            .query_row(
                "SELECT MIN(period_start), MAX(period_start), COUNT(*)
                 FROM bars WHERE instrument = ?1 AND candle_width = ?2",
                params![key.instrument, key.candle_width.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_error)?;

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((
                from_timestamp(min).map_err(query_error)?,
                from_timestamp(max).map_err(query_error)?,
                count as usize,
            ))),
            _ => Ok(None),
        }
    }
}

impl BarSource for SqliteBarAdapter {
    fn query(&self, key: &SeriesKey, range: TimeRange) -> Result<Vec<Bar>, RciTraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        let mut stmt = conn
            .prepare(
                "SELECT period_start, open, high, low, close, volume
                 FROM bars
                 WHERE instrument = ?1 AND candle_width = ?2
                   AND period_start >= ?3 AND period_start <= ?4
                 ORDER BY period_start ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(
                params![
                    key.instrument,
                    key.candle_width.as_str(),
                    range.from.timestamp(),
                    range.to.timestamp()
                ],
                |row| {
                    Ok(Bar {
                        period_start: from_timestamp(row.get(0)?)?,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }
}

fn from_timestamp(secs: i64) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, secs))
}

fn pool_error(e: r2d2::Error) -> RciTraderError {
    RciTraderError::SourceUnavailable {
        reason: format!("sqlite pool: {e}"),
    }
}

fn query_error(e: rusqlite::Error) -> RciTraderError {
    RciTraderError::SourceUnavailable {
        reason: format!("sqlite query: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::CandleWidth;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    }

    fn setup() -> SqliteBarAdapter {
        let adapter = SqliteBarAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn key() -> SeriesKey {
        SeriesKey::new("FX_BTC_JPY", CandleWidth::OneMinute)
    }

    fn sample_bars(n: i64) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                period_start: t0() + Duration::minutes(i),
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 0.5,
            })
            .collect()
    }

    #[test]
    fn insert_and_query() {
        let adapter = setup();
        adapter.insert_bars(&key(), &sample_bars(10)).unwrap();

        let bars = adapter
            .query(&key(), TimeRange::new(t0() + Duration::minutes(2), t0() + Duration::minutes(4)))
            .unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].period_start, t0() + Duration::minutes(2));
        assert_eq!(bars[2].close, 104.5);
    }

    #[test]
    fn series_are_isolated_by_width() {
        let adapter = setup();
        adapter.insert_bars(&key(), &sample_bars(5)).unwrap();

        let other = SeriesKey::new("FX_BTC_JPY", CandleWidth::FiveMinutes);
        let bars = adapter
            .query(&other, TimeRange::new(t0(), t0() + Duration::hours(1)))
            .unwrap();
        assert!(bars.is_empty());
    }

    #[test]
    fn reinsert_replaces() {
        let adapter = setup();
        adapter.insert_bars(&key(), &sample_bars(3)).unwrap();
        let mut changed = sample_bars(1);
        changed[0].close = 1.0;
        adapter.insert_bars(&key(), &changed).unwrap();

        let bars = adapter
            .query(&key(), TimeRange::new(t0(), t0() + Duration::hours(1)))
            .unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].close, 1.0);
    }

    #[test]
    fn data_range_reports_bounds() {
        let adapter = setup();
        assert!(adapter.data_range(&key()).unwrap().is_none());

        adapter.insert_bars(&key(), &sample_bars(10)).unwrap();
        let (first, last, count) = adapter.data_range(&key()).unwrap().unwrap();
        assert_eq!(first, t0());
        assert_eq!(last, t0() + Duration::minutes(9));
        assert_eq!(count, 10);
    }

    #[test]
    fn missing_table_is_source_unavailable() {
        let adapter = SqliteBarAdapter::in_memory().unwrap();
        let result = adapter.query(&key(), TimeRange::new(t0(), t0()));
        assert!(matches!(result, Err(RciTraderError::SourceUnavailable { .. })));
    }
}
