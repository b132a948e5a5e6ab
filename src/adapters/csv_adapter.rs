//! CSV bar files, one file per series: `{instrument}_{width}.csv`.
//!
//! Columns: `period_start,open,high,low,close,volume` with `period_start` in
//! RFC 3339.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::domain::error::RciTraderError;
use crate::domain::ohlcv::{Bar, CandleWidth, SeriesKey, TimeRange};
use crate::ports::data_port::BarSource;

const HEADER: [&str; 6] = ["period_start", "open", "high", "low", "close", "volume"];

pub struct CsvBarAdapter {
    base_path: PathBuf,
}

impl CsvBarAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, key: &SeriesKey) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", key.instrument, key.candle_width))
    }

    /// Candle widths that have a file for `instrument`.
    pub fn list_widths(&self, instrument: &str) -> Result<Vec<CandleWidth>, RciTraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| unavailable(format!(
            "failed to read directory {}: {e}",
            self.base_path.display()
        )))?;

        let prefix = format!("{instrument}_");
        let mut widths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| unavailable(format!("directory entry error: {e}")))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(width) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".csv"))
            else {
                continue;
            };
            if let Ok(width) = width.parse::<CandleWidth>() {
                widths.push(width);
            }
        }
        widths.sort();
        Ok(widths)
    }

    /// Write (or replace) the file of one series.
    pub fn write_bars(&self, key: &SeriesKey, bars: &[Bar]) -> Result<(), RciTraderError> {
        let path = self.csv_path(key);
        let mut wtr = csv::Writer::from_path(&path)
            .map_err(|e| unavailable(format!("failed to create {}: {e}", path.display())))?;
        wtr.write_record(HEADER)
            .map_err(|e| unavailable(format!("CSV write error: {e}")))?;
        for bar in bars {
            wtr.write_record([
                bar.period_start.to_rfc3339(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])
            .map_err(|e| unavailable(format!("CSV write error: {e}")))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl BarSource for CsvBarAdapter {
    fn query(&self, key: &SeriesKey, range: TimeRange) -> Result<Vec<Bar>, RciTraderError> {
        let path = self.csv_path(key);
        let content = fs::read_to_string(&path)
            .map_err(|e| unavailable(format!("failed to read {}: {e}", path.display())))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| unavailable(format!("CSV parse error: {e}")))?;
            let bar = parse_bar(&record).map_err(|reason| {
                unavailable(format!("{}: row {}: {reason}", path.display(), line + 1))
            })?;
            if range.contains(bar.period_start) {
                bars.push(bar);
            }
        }

        bars.sort_by_key(|b| b.period_start);
        bars.dedup_by_key(|b| b.period_start);
        Ok(bars)
    }
}

fn parse_bar(record: &csv::StringRecord) -> Result<Bar, String> {
    let raw_time = column(record, 0)?;
    let period_start = DateTime::parse_from_rfc3339(raw_time)
        .map_err(|e| format!("invalid period_start '{raw_time}': {e}"))?
        .with_timezone(&Utc);
    Ok(Bar {
        period_start,
        open: number(record, 1)?,
        high: number(record, 2)?,
        low: number(record, 3)?,
        close: number(record, 4)?,
        volume: number(record, 5)?,
    })
}

fn column(record: &csv::StringRecord, index: usize) -> Result<&str, String> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| format!("missing {} column", HEADER[index]))
}

fn number(record: &csv::StringRecord, index: usize) -> Result<f64, String> {
    let raw = column(record, index)?;
    raw.parse()
        .map_err(|e| format!("invalid {} value '{raw}': {e}", HEADER[index]))
}

fn unavailable(reason: String) -> RciTraderError {
    RciTraderError::SourceUnavailable { reason }
}
