//! CLI definition and dispatch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::adapters::csv_adapter::CsvBarAdapter;
use crate::adapters::csv_result_adapter::CsvResultAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_order_adapter::PaperOrderAdapter;
use crate::domain::backtest::Simulator;
use crate::domain::config_validation::{self as cfg, DataSourceKind};
use crate::domain::error::RciTraderError;
use crate::domain::indicator::trend::{TrendCalculator, WilderDmi};
use crate::domain::indicator_helpers::SignalSet;
use crate::domain::live::{LiveConfig, LiveTrader};
use crate::domain::metrics::SimulationResult;
use crate::domain::ohlcv::{Bar, CandleWidth, SeriesKey, TimeRange};
use crate::domain::pairing::{PairGrid, run_pair_sweep};
use crate::domain::sweep::{SweepGrid, run_sweep};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::BarSource;
use crate::ports::report_port::ResultSink;

#[derive(Parser, Debug)]
#[command(name = "rcitrader", about = "RCI/ADX trading engine and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the live loop with paper orders
    Trade {
        #[arg(short, long)]
        config: PathBuf,
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<usize>,
        /// Refresh bar series on background threads
        #[arg(long)]
        follow: bool,
    },
    /// Backtest the configured parameter set
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        /// Trade log CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Backtest every combination of the sweep grid
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, default_value = "sweep_results.csv")]
        output: PathBuf,
    },
    /// Pair long and short RCI crossings over the pair grid, without trend filter
    PairSweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, default_value = "pair_results.csv")]
        output: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show bar counts and ranges of the configured series
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Trade {
            config,
            ticks,
            follow,
        } => run_trade(&config, ticks, follow),
        Command::Simulate { config, output } => run_simulate(&config, output.as_deref()),
        Command::Sweep { config, output } => run_sweep_command(&config, &output),
        Command::PairSweep { config, output } => run_pair_sweep_command(&config, &output),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config } => run_info(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RciTraderError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

pub fn build_live_config(config: &dyn ConfigPort) -> Result<LiveConfig, RciTraderError> {
    Ok(LiveConfig {
        instrument: cfg::instrument(config)?,
        trend_candle: cfg::candle(config, "market", "trend_candle", CandleWidth::ThirtyMinutes)?,
        trade_candle: cfg::candle(config, "market", "trade_candle", CandleWidth::OneMinute)?,
        params: cfg::strategy_params(config)?,
        trade_size: cfg::trade_size(config)?,
        adx_period: cfg::adx_period(config)?,
    })
}

pub fn build_sweep_grid(config: &dyn ConfigPort) -> Result<SweepGrid, RciTraderError> {
    cfg::validate_sweep_config(config)?;
    cfg::sweep_grid(config)
}

pub fn build_pair_grid(config: &dyn ConfigPort) -> Result<PairGrid, RciTraderError> {
    cfg::validate_pair_sweep_config(config)?;
    cfg::pair_grid(config)
}

pub fn open_source(config: &dyn ConfigPort) -> Result<Arc<dyn BarSource>, RciTraderError> {
    match cfg::data_source(config)? {
        DataSourceKind::Csv { dir } => {
            info!(%dir, "using CSV bar files");
            Ok(Arc::new(CsvBarAdapter::new(PathBuf::from(dir))))
        }
        #[cfg(feature = "sqlite")]
        DataSourceKind::Sqlite => {
            use crate::adapters::sqlite_adapter::SqliteBarAdapter;
            let adapter = SqliteBarAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            info!("using SQLite bar store");
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "sqlite"))]
        DataSourceKind::Sqlite => Err(RciTraderError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: "built without the sqlite feature".into(),
        }),
    }
}

/// Bars of one series in `range`; an empty result is `NoData`.
pub fn load_bars(
    source: &dyn BarSource,
    key: &SeriesKey,
    range: TimeRange,
) -> Result<Vec<Bar>, RciTraderError> {
    let bars = source.query(key, range)?;
    if bars.is_empty() {
        return Err(RciTraderError::NoData {
            series: key.to_string(),
        });
    }
    info!(series = %key, bars = bars.len(), "loaded bars");
    Ok(bars)
}

pub fn run_trade(config_path: &Path, ticks: Option<usize>, follow: bool) -> Result<(), RciTraderError> {
    let config = load_config(config_path)?;
    cfg::validate_market_config(&config)?;
    cfg::validate_strategy_config(&config)?;
    cfg::validate_live_config(&config)?;

    let live = build_live_config(&config)?;
    let interval = Duration::from_secs(cfg::tick_seconds(&config)?);
    let follow = follow || config.get_bool("live", "follow", false);
    let source = open_source(&config)?;

    let mut trader = LiveTrader::connect(source, live, Box::new(WilderDmi), PaperOrderAdapter::new())?;
    if follow {
        trader.follow(interval)?;
    }
    trader.run(interval, ticks)?;

    info!(
        trades = trader.trades().len(),
        paper_orders = trader.orders().fills().len(),
        "trading stopped"
    );
    Ok(())
}

pub fn run_simulate(config_path: &Path, output: Option<&Path>) -> Result<(), RciTraderError> {
    let config = load_config(config_path)?;
    cfg::validate_market_config(&config)?;
    cfg::validate_strategy_config(&config)?;
    cfg::validate_backtest_config(&config)?;

    let live = build_live_config(&config)?;
    let range = cfg::backtest_range(&config)?;
    let source = open_source(&config)?;

    let trend_bars = load_bars(source.as_ref(), &live.trend_key(), range)?;
    let trade_bars = load_bars(source.as_ref(), &live.trade_key(), range)?;

    let dmi = WilderDmi.calculate(&trend_bars, live.adx_period)?;
    let signals = SignalSet::compute(&trade_bars, &live.params)?;
    let run = Simulator::new(&dmi, &trade_bars, live.trend_candle, live.trade_candle)
        .run(&signals, &live.params)?;

    print_result(&run.result);
    if let Some(path) = output {
        CsvResultAdapter::new().write_trades(&run.trades, path)?;
        info!(path = %path.display(), trades = run.trades.len(), "wrote trade log");
    }
    Ok(())
}

pub fn run_sweep_command(config_path: &Path, output: &Path) -> Result<(), RciTraderError> {
    let config = load_config(config_path)?;
    cfg::validate_market_config(&config)?;
    cfg::validate_strategy_config(&config)?;
    cfg::validate_backtest_config(&config)?;

    let instrument = cfg::instrument(&config)?;
    let adx_period = cfg::adx_period(&config)?;
    let grid = build_sweep_grid(&config)?;
    let range = cfg::backtest_range(&config)?;
    let source = open_source(&config)?;

    let load_all = |widths: &[CandleWidth]| -> Result<HashMap<CandleWidth, Vec<Bar>>, RciTraderError> {
        let mut out = HashMap::new();
        for &width in widths {
            let key = SeriesKey::new(instrument.clone(), width);
            out.insert(width, load_bars(source.as_ref(), &key, range)?);
        }
        Ok(out)
    };
    let trend_bars = load_all(&grid.trend_candles)?;
    let trade_bars = load_all(&grid.trade_candles)?;

    let report = run_sweep(&grid, &trend_bars, &trade_bars, adx_period, &WilderDmi)?;
    CsvResultAdapter::new().write(&report.results, output)?;
    info!(
        path = %output.display(),
        rows = report.results.len(),
        failures = report.failures.len(),
        "wrote sweep results"
    );

    if let Some(best) = report.best() {
        println!("best combination:");
        print_result(best);
    }
    Ok(())
}

pub fn run_pair_sweep_command(config_path: &Path, output: &Path) -> Result<(), RciTraderError> {
    let config = load_config(config_path)?;
    cfg::validate_market_config(&config)?;
    cfg::validate_backtest_config(&config)?;

    let instrument = cfg::instrument(&config)?;
    let grid = build_pair_grid(&config)?;
    let range = cfg::backtest_range(&config)?;
    let source = open_source(&config)?;

    let mut trade_bars = HashMap::new();
    for &width in &grid.trade_candles {
        let key = SeriesKey::new(instrument.clone(), width);
        trade_bars.insert(width, load_bars(source.as_ref(), &key, range)?);
    }

    let report = run_pair_sweep(&grid, &trade_bars)?;
    CsvResultAdapter::new().write_pairs(&report.results, output)?;
    info!(
        path = %output.display(),
        rows = report.results.len(),
        failures = report.failures.len(),
        "wrote pair sweep results"
    );

    if let Some(best) = report.best() {
        let p = &best.params;
        println!(
            "best pair: trade={} entry={} long={}/{} short={}/{} trades={} won_ratio={:.3} profit={:.4}",
            best.trade_candle,
            best.entry,
            p.long_duration,
            p.long_level,
            p.short_duration,
            p.short_level,
            best.trade_count,
            best.won_ratio(),
            best.profit
        );
    }
    Ok(())
}

pub fn run_validate(config_path: &Path) -> Result<(), RciTraderError> {
    let config = load_config(config_path)?;
    cfg::validate_all(&config)?;
    println!("{}: OK", config_path.display());
    Ok(())
}

/// Bar count and bounds of one stored series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub key: SeriesKey,
    pub count: usize,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

/// Summaries of the stored series of the configured instrument.
///
/// A CSV directory is scanned for every width present; SQLite reports the
/// configured trend and trade widths. Empty series are left out.
pub fn series_summaries(config: &dyn ConfigPort) -> Result<Vec<SeriesSummary>, RciTraderError> {
    let live = build_live_config(config)?;
    match cfg::data_source(config)? {
        DataSourceKind::Csv { dir } => {
            let adapter = CsvBarAdapter::new(PathBuf::from(dir));
            let everything = TimeRange::new(DateTime::<Utc>::UNIX_EPOCH, Utc::now());
            let mut out = Vec::new();
            for width in adapter.list_widths(&live.instrument)? {
                let key = SeriesKey::new(live.instrument.clone(), width);
                let bars = adapter.query(&key, everything)?;
                if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
                    out.push(SeriesSummary {
                        count: bars.len(),
                        first: first.period_start,
                        last: last.period_start,
                        key,
                    });
                }
            }
            Ok(out)
        }
        #[cfg(feature = "sqlite")]
        DataSourceKind::Sqlite => {
            use crate::adapters::sqlite_adapter::SqliteBarAdapter;
            let adapter = SqliteBarAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            let mut keys = vec![live.trend_key(), live.trade_key()];
            keys.dedup();
            let mut out = Vec::new();
            for key in keys {
                if let Some((first, last, count)) = adapter.data_range(&key)? {
                    out.push(SeriesSummary { key, count, first, last });
                }
            }
            Ok(out)
        }
        #[cfg(not(feature = "sqlite"))]
        DataSourceKind::Sqlite => Err(RciTraderError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: "built without the sqlite feature".into(),
        }),
    }
}

pub fn run_info(config_path: &Path) -> Result<(), RciTraderError> {
    let config = load_config(config_path)?;
    cfg::validate_market_config(&config)?;
    let summaries = series_summaries(&config)?;
    if summaries.is_empty() {
        println!("no stored bars for {}", cfg::instrument(&config)?);
    }
    for s in &summaries {
        println!(
            "{}: {} bars, {} .. {}",
            s.key,
            s.count,
            s.first.to_rfc3339(),
            s.last.to_rfc3339()
        );
    }
    Ok(())
}

fn print_result(r: &SimulationResult) {
    let p = &r.params;
    println!(
        "trend={} trade={} entry={}/{} exit={}/{} adx>={} di>={}",
        r.trend_candle,
        r.trade_candle,
        p.entry_rci_duration,
        p.entry_rci_level,
        p.exit_rci_duration,
        p.exit_rci_level,
        p.adx_threshold,
        p.di_threshold
    );
    println!(
        "trades={} won={} won_ratio={:.3} profit={:.4} avg={:.4} won_avg={:.4} lost_avg={:.4}",
        r.trade_count,
        r.won_count,
        r.won_ratio(),
        r.profit(),
        r.profit_average(),
        r.won_average(),
        r.lost_average()
    );
}
