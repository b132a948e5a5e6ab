//! Typed reads and validation of the INI configuration.
//!
//! Sections: `[market]`, `[strategy]`, `[live]`, `[backtest]`, `[sweep]`,
//! `[pair_sweep]`, `[data]` and `[sqlite]`. Present-but-malformed values are errors; absent
//! optional values fall back to defaults.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::error::RciTraderError;
use crate::domain::indicator::trend::DEFAULT_ADX_PERIOD;
use crate::domain::ohlcv::{CandleWidth, TimeRange};
use crate::domain::pairing::PairGrid;
use crate::domain::strategy::StrategyParams;
use crate::domain::sweep::SweepGrid;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_TRADE_SIZE: f64 = 0.01;
pub const DEFAULT_TICK_SECONDS: i64 = 60;

/// Where bars come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceKind {
    Csv { dir: String },
    Sqlite,
}

pub fn validate_market_config(config: &dyn ConfigPort) -> Result<(), RciTraderError> {
    instrument(config)?;
    candle(config, "market", "trend_candle", CandleWidth::ThirtyMinutes)?;
    candle(config, "market", "trade_candle", CandleWidth::OneMinute)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), RciTraderError> {
    strategy_params(config)?;
    adx_period(config)?;
    Ok(())
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), RciTraderError> {
    trade_size(config)?;
    tick_seconds(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RciTraderError> {
    backtest_range(config).map(|_| ())
}

pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<(), RciTraderError> {
    sweep_grid(config)?
        .validate_combinations()
        .map_err(|e| into_config_error("sweep", e))
}

pub fn validate_pair_sweep_config(config: &dyn ConfigPort) -> Result<(), RciTraderError> {
    pair_grid(config)?
        .validate_combinations()
        .map_err(|e| into_config_error("pair_sweep", e))
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), RciTraderError> {
    data_source(config).map(|_| ())
}

/// Everything a run needs, checked in one pass.
pub fn validate_all(config: &dyn ConfigPort) -> Result<(), RciTraderError> {
    validate_market_config(config)?;
    validate_strategy_config(config)?;
    validate_live_config(config)?;
    validate_data_config(config)?;
    if config.get_string("backtest", "from").is_some() {
        validate_backtest_config(config)?;
    }
    validate_sweep_config(config)?;
    validate_pair_sweep_config(config)
}

pub fn instrument(config: &dyn ConfigPort) -> Result<String, RciTraderError> {
    match config.get_string("market", "instrument") {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(RciTraderError::ConfigMissing {
            section: "market".into(),
            key: "instrument".into(),
        }),
    }
}

pub fn candle(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: CandleWidth,
) -> Result<CandleWidth, RciTraderError> {
    parsed_or(config, section, key, default)
}

pub fn strategy_params(config: &dyn ConfigPort) -> Result<StrategyParams, RciTraderError> {
    let d = StrategyParams::default();
    let params = StrategyParams {
        entry_rci_duration: parsed_or(config, "strategy", "entry_rci_duration", d.entry_rci_duration)?,
        entry_rci_level: parsed_or(config, "strategy", "entry_rci_level", d.entry_rci_level)?,
        exit_rci_duration: parsed_or(config, "strategy", "exit_rci_duration", d.exit_rci_duration)?,
        exit_rci_level: parsed_or(config, "strategy", "exit_rci_level", d.exit_rci_level)?,
        adx_threshold: parsed_or(config, "strategy", "adx_threshold", d.adx_threshold)?,
        di_threshold: parsed_or(config, "strategy", "di_threshold", d.di_threshold)?,
    };
    params
        .validate()
        .map_err(|e| into_config_error("strategy", e))?;
    Ok(params)
}

pub fn adx_period(config: &dyn ConfigPort) -> Result<usize, RciTraderError> {
    let period: usize = parsed_or(config, "strategy", "adx_period", DEFAULT_ADX_PERIOD)?;
    if period == 0 {
        return Err(invalid("strategy", "adx_period", "must be positive"));
    }
    Ok(period)
}

pub fn trade_size(config: &dyn ConfigPort) -> Result<f64, RciTraderError> {
    let size: f64 = parsed_or(config, "live", "trade_size", DEFAULT_TRADE_SIZE)?;
    if !(size.is_finite() && size > 0.0) {
        return Err(invalid("live", "trade_size", "must be positive"));
    }
    Ok(size)
}

pub fn tick_seconds(config: &dyn ConfigPort) -> Result<u64, RciTraderError> {
    let secs: i64 = parsed_or(config, "live", "tick_seconds", DEFAULT_TICK_SECONDS)?;
    if secs <= 0 {
        return Err(invalid("live", "tick_seconds", "must be positive"));
    }
    Ok(secs as u64)
}

/// `[backtest] from` / `to`, RFC 3339 or `YYYY-MM-DD`.
pub fn backtest_range(config: &dyn ConfigPort) -> Result<TimeRange, RciTraderError> {
    let from = time(config, "backtest", "from")?;
    let to = time(config, "backtest", "to")?;
    if from >= to {
        return Err(invalid("backtest", "from", "must be before to"));
    }
    Ok(TimeRange::new(from, to))
}

/// Grid axes from `[sweep]`; absent axes take the built-in defaults.
pub fn sweep_grid(config: &dyn ConfigPort) -> Result<SweepGrid, RciTraderError> {
    let d = SweepGrid::default();
    Ok(SweepGrid {
        trend_candles: list_or(config, "sweep", "trend_candles", d.trend_candles)?,
        trade_candles: list_or(config, "sweep", "trade_candles", d.trade_candles)?,
        entry_rci_durations: list_or(config, "sweep", "entry_rci_durations", d.entry_rci_durations)?,
        entry_rci_levels: list_or(config, "sweep", "entry_rci_levels", d.entry_rci_levels)?,
        exit_rci_durations: list_or(config, "sweep", "exit_rci_durations", d.exit_rci_durations)?,
        exit_rci_levels: list_or(config, "sweep", "exit_rci_levels", d.exit_rci_levels)?,
        adx_thresholds: list_or(config, "sweep", "adx_thresholds", d.adx_thresholds)?,
        di_thresholds: list_or(config, "sweep", "di_thresholds", d.di_thresholds)?,
    })
}

/// Pair grid axes from `[pair_sweep]`; absent axes take the built-in defaults.
pub fn pair_grid(config: &dyn ConfigPort) -> Result<PairGrid, RciTraderError> {
    let d = PairGrid::default();
    Ok(PairGrid {
        trade_candles: list_or(config, "pair_sweep", "trade_candles", d.trade_candles)?,
        long_levels: list_or(config, "pair_sweep", "long_levels", d.long_levels)?,
        short_levels: list_or(config, "pair_sweep", "short_levels", d.short_levels)?,
        long_durations: list_or(config, "pair_sweep", "long_durations", d.long_durations)?,
        short_durations: list_or(config, "pair_sweep", "short_durations", d.short_durations)?,
    })
}

pub fn data_source(config: &dyn ConfigPort) -> Result<DataSourceKind, RciTraderError> {
    let kind = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match kind.trim().to_lowercase().as_str() {
        "csv" => Ok(DataSourceKind::Csv {
            dir: config
                .get_string("data", "csv_dir")
                .unwrap_or_else(|| "data".to_string()),
        }),
        "sqlite" => {
            if config.get_string("sqlite", "path").is_none() {
                return Err(RciTraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                });
            }
            Ok(DataSourceKind::Sqlite)
        }
        other => Err(invalid(
            "data",
            "source",
            &format!("unknown source '{other}', expected csv or sqlite"),
        )),
    }
}

fn parsed_or<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, RciTraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(section, key, &format!("'{}': {e}", raw.trim()))),
    }
}

fn list_or<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Vec<T>,
) -> Result<Vec<T>, RciTraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get_list(section, key) {
        None => Ok(default),
        Some(items) => items
            .iter()
            .map(|item| {
                item.parse()
                    .map_err(|e: T::Err| invalid(section, key, &format!("'{item}': {e}")))
            })
            .collect(),
    }
}

fn time(config: &dyn ConfigPort, section: &str, key: &str) -> Result<DateTime<Utc>, RciTraderError> {
    let raw = config
        .get_string(section, key)
        .ok_or_else(|| RciTraderError::ConfigMissing {
            section: section.into(),
            key: key.into(),
        })?;
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| invalid(section, key, "expected RFC 3339 or YYYY-MM-DD"))
}

fn invalid(section: &str, key: &str, reason: &str) -> RciTraderError {
    RciTraderError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: reason.into(),
    }
}

fn into_config_error(section: &str, e: RciTraderError) -> RciTraderError {
    match e {
        RciTraderError::InvalidParameter { name, reason } => RciTraderError::ConfigInvalid {
            section: section.into(),
            key: name,
            reason,
        },
        other => other,
    }
}
