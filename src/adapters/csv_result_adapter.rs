//! CSV export of sweep results, pair sweep results and trade logs.

use std::path::Path;

use crate::domain::error::RciTraderError;
use crate::domain::metrics::SimulationResult;
use crate::domain::pairing::PairResult;
use crate::domain::position::TradeRecord;
use crate::ports::report_port::ResultSink;

pub const RESULT_HEADER: [&str; 17] = [
    "trend_candle",
    "trade_candle",
    "entry_rci_duration",
    "entry_rci_level",
    "exit_rci_duration",
    "exit_rci_level",
    "adx_threshold",
    "di_threshold",
    "won_sum",
    "lost_sum",
    "trade_count",
    "won_count",
    "profit",
    "profit_average",
    "won_average",
    "lost_average",
    "won_ratio",
];

pub const PAIR_HEADER: [&str; 10] = [
    "trade_candle",
    "entry",
    "long_duration",
    "long_level",
    "short_duration",
    "short_level",
    "profit",
    "won_ratio",
    "won_count",
    "trade_count",
];

const TRADE_HEADER: [&str; 7] = [
    "opened_at",
    "closed_at",
    "side",
    "entry_price",
    "exit_price",
    "size",
    "profit",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvResultAdapter;

impl CsvResultAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_trades(&self, trades: &[TradeRecord], output_path: &Path) -> Result<(), RciTraderError> {
        let mut wtr = open(output_path)?;
        wtr.write_record(TRADE_HEADER).map_err(write_error)?;
        for t in trades {
            wtr.write_record([
                t.opened_at.to_rfc3339(),
                t.closed_at.to_rfc3339(),
                t.side.to_string(),
                t.entry_price.to_string(),
                t.exit_price.to_string(),
                t.size.to_string(),
                t.profit.to_string(),
            ])
            .map_err(write_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_pairs(&self, results: &[PairResult], output_path: &Path) -> Result<(), RciTraderError> {
        let mut wtr = open(output_path)?;
        wtr.write_record(PAIR_HEADER).map_err(write_error)?;
        for r in results {
            let p = &r.params;
            wtr.write_record([
                r.trade_candle.to_string(),
                r.entry.to_string(),
                p.long_duration.to_string(),
                p.long_level.to_string(),
                p.short_duration.to_string(),
                p.short_level.to_string(),
                r.profit.to_string(),
                r.won_ratio().to_string(),
                r.won_count.to_string(),
                r.trade_count.to_string(),
            ])
            .map_err(write_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ResultSink for CsvResultAdapter {
    fn write(&self, results: &[SimulationResult], output_path: &Path) -> Result<(), RciTraderError> {
        let mut wtr = open(output_path)?;
        wtr.write_record(RESULT_HEADER).map_err(write_error)?;
        for r in results {
            wtr.write_record(result_row(r)).map_err(write_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn result_row(r: &SimulationResult) -> [String; 17] {
    let p = &r.params;
    [
        r.trend_candle.to_string(),
        r.trade_candle.to_string(),
        p.entry_rci_duration.to_string(),
        p.entry_rci_level.to_string(),
        p.exit_rci_duration.to_string(),
        p.exit_rci_level.to_string(),
        p.adx_threshold.to_string(),
        p.di_threshold.to_string(),
        r.won_sum.to_string(),
        r.lost_sum.to_string(),
        r.trade_count.to_string(),
        r.won_count.to_string(),
        r.profit().to_string(),
        r.profit_average().to_string(),
        r.won_average().to_string(),
        r.lost_average().to_string(),
        r.won_ratio().to_string(),
    ]
}

fn open(path: &Path) -> Result<csv::Writer<std::fs::File>, RciTraderError> {
    csv::Writer::from_path(path).map_err(|e| match e.into_kind() {
        csv::ErrorKind::Io(io) => RciTraderError::Io(io),
        other => RciTraderError::Io(std::io::Error::other(format!("{other:?}"))),
    })
}

fn write_error(e: csv::Error) -> RciTraderError {
    RciTraderError::Io(std::io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::CandleWidth;
    use crate::domain::position::Side;
    use crate::domain::strategy::StrategyParams;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample_result() -> SimulationResult {
        let mut r = SimulationResult::empty(
            CandleWidth::ThirtyMinutes,
            CandleWidth::OneMinute,
            StrategyParams::default(),
        );
        r.record(3.0);
        r.record(-1.0);
        r
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");

        CsvResultAdapter::new()
            .write(&[sample_result()], &path)
            .unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, RESULT_HEADER.to_vec());

        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "30m");
        assert_eq!(&rows[0][1], "1m");
        assert_eq!(&rows[0][2], "9");
        assert_eq!(&rows[0][10], "2");
        assert_eq!(&rows[0][11], "1");
        assert_eq!(&rows[0][12], "2");
        assert_eq!(&rows[0][16], "0.5");
    }

    #[test]
    fn writes_trade_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trades.csv");
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let trade = TradeRecord {
            opened_at: t,
            closed_at: t,
            side: Side::Short,
            entry_price: 10.0,
            exit_price: 8.0,
            size: 1.0,
            profit: 2.0,
        };

        CsvResultAdapter::new().write_trades(&[trade], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("opened_at,closed_at,side,entry_price,exit_price,size,profit"));
        assert!(lines.next().unwrap().contains(",SHORT,10,8,1,2"));
    }

    #[test]
    fn writes_pair_rows() {
        use crate::domain::pairing::{PairParams, PairResult};

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pairs.csv");
        let row = PairResult {
            trade_candle: CandleWidth::FiveMinutes,
            params: PairParams {
                long_duration: 9,
                long_level: 80,
                short_duration: 13,
                short_level: 90,
            },
            entry: Side::Short,
            trade_count: 4,
            won_count: 3,
            profit: 1.5,
            history: vec![],
        };

        CsvResultAdapter::new().write_pairs(&[row], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some(PAIR_HEADER.join(",").as_str()));
        assert_eq!(lines.next(), Some("5m,SHORT,9,80,13,90,1.5,0.75,3,4"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn unwritable_path_is_io_error() {
        let err = CsvResultAdapter::new()
            .write(&[], Path::new("/nonexistent/dir/results.csv"))
            .unwrap_err();
        assert!(matches!(err, RciTraderError::Io(_)));
    }
}
