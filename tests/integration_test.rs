mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use approx::assert_relative_eq;
use chrono::Duration;
use common::*;
use proptest::prelude::*;
use rcitrader::domain::backtest::Simulator;
use rcitrader::domain::bar_series::{BarSeries, Lookback};
use rcitrader::domain::crossing::{Crossing, Signals, crossing_series};
use rcitrader::domain::error::RciTraderError;
use rcitrader::domain::execution::{PositionState, PositionStateMachine, TickInput, TradeEvent};
use rcitrader::domain::follower::Follower;
use rcitrader::domain::indicator::rci::calculate_rci;
use rcitrader::domain::indicator::trend::{TrendCalculator, TrendReading, WilderDmi};
use rcitrader::domain::indicator_helpers::{IndicatorCache, SignalSet};
use rcitrader::domain::live::{LiveConfig, LiveTrader};
use rcitrader::domain::position::Side;
use rcitrader::domain::strategy::StrategyParams;
use rcitrader::domain::sweep::{SweepGrid, run_sweep};
use rcitrader::ports::order_port::OrderSide;

fn params(entry_duration: usize, exit_duration: usize) -> StrategyParams {
    StrategyParams {
        entry_rci_duration: entry_duration,
        entry_rci_level: 80,
        exit_rci_duration: exit_duration,
        exit_rci_level: 80,
        adx_threshold: 20.0,
        di_threshold: 20.0,
    }
}

/// Hourly bars climbing one point per bar, starting two days before `t0`.
fn rising_trend() -> Vec<Bar> {
    generate_bars(t0() - Duration::days(2), CandleWidth::OneHour, 120, 100.0, 1.0)
}

fn falling_trend() -> Vec<Bar> {
    generate_bars(t0() - Duration::days(2), CandleWidth::OneHour, 120, 300.0, -1.0)
}

fn wave_trade_bars(count: usize) -> Vec<Bar> {
    bars_from_closes(t0(), CandleWidth::OneMinute, &wave_closes(count, 6))
}

mod bar_series {
    use super::*;

    fn key() -> SeriesKey {
        SeriesKey::new("EUR_USD", CandleWidth::OneMinute)
    }

    #[test]
    fn retention_keeps_most_recent_bars_in_order() {
        let source = Arc::new(MockBarSource::new().with_bars(
            key(),
            generate_bars(t0(), CandleWidth::OneMinute, 10, 1.0, 0.0),
        ));
        let range = TimeRange::new(t0(), t0() + Duration::days(1));
        let series = BarSeries::create_at(source.clone(), key(), Lookback::Range(range), t0())
            .unwrap()
            .with_max_length(100)
            .unwrap();
        assert_eq!(series.len(), 10);

        let start = t0() + Duration::minutes(10);
        let new_bars: Vec<Bar> = (0..150)
            .map(|i| make_bar(start + Duration::minutes(i), i as f64))
            .collect();
        source.push(&key(), new_bars);

        let appended = series.refresh_until(t0() + Duration::days(1)).unwrap();
        assert_eq!(appended, 150);

        let bars = series.snapshot();
        assert_eq!(bars.len(), 100);
        assert_eq!(bars.last().unwrap().close, 149.0);
        assert_eq!(bars.first().unwrap().close, 50.0);
        assert!(bars.windows(2).all(|w| w[0].period_start < w[1].period_start));
    }

    #[test]
    fn held_snapshot_is_not_affected_by_refresh() {
        let source = Arc::new(MockBarSource::new().with_bars(
            key(),
            generate_bars(t0(), CandleWidth::OneMinute, 5, 1.0, 1.0),
        ));
        let range = TimeRange::new(t0(), t0() + Duration::days(1));
        let series = BarSeries::create_at(source.clone(), key(), Lookback::Range(range), t0()).unwrap();

        let held = series.snapshot();
        source.push(
            &key(),
            generate_bars(t0() + Duration::minutes(5), CandleWidth::OneMinute, 3, 6.0, 1.0),
        );
        series.refresh_until(t0() + Duration::hours(1)).unwrap();

        assert_eq!(held.len(), 5);
        assert_eq!(series.len(), 8);
    }

    #[test]
    fn failed_refresh_leaves_series_untouched() {
        let source = Arc::new(MockBarSource::new().with_bars(
            key(),
            generate_bars(t0(), CandleWidth::OneMinute, 5, 1.0, 1.0),
        ));
        let series = BarSeries::create_at(
            source.clone(),
            key(),
            Lookback::Range(TimeRange::new(t0(), t0() + Duration::days(1))),
            t0(),
        )
        .unwrap();

        source.set_failing(true);
        let err = series.refresh_until(t0() + Duration::hours(1)).unwrap_err();
        assert!(matches!(err, RciTraderError::SourceUnavailable { .. }));
        assert_eq!(series.len(), 5);
        assert_eq!(series.last_period_start(), Some(t0() + Duration::minutes(4)));
    }

    #[test]
    fn recent_lookback_sets_retention() {
        let now = t0() + Duration::minutes(59);
        let source = Arc::new(MockBarSource::new().with_bars(
            key(),
            generate_bars(t0(), CandleWidth::OneMinute, 60, 1.0, 1.0),
        ));
        let series = BarSeries::create_at(source, key(), Lookback::Recent(20), now).unwrap();
        assert_eq!(series.max_length(), Some(20));
        assert!(series.len() <= 21);
        assert_eq!(series.last_period_start(), Some(now));
    }

    #[test]
    fn follower_refreshes_in_background() {
        // Bars stamped in the past so a wall-clock refresh picks them up.
        let start = chrono::Utc::now() - Duration::hours(2);
        let source = Arc::new(MockBarSource::new().with_bars(
            key(),
            generate_bars(start, CandleWidth::OneMinute, 3, 1.0, 1.0),
        ));
        let series = Arc::new(
            BarSeries::create(
                source.clone(),
                key(),
                Lookback::Range(TimeRange::new(start, start + Duration::days(1))),
            )
            .unwrap(),
        );
        assert_eq!(series.len(), 3);

        source.push(
            &key(),
            generate_bars(start + Duration::minutes(3), CandleWidth::OneMinute, 4, 4.0, 1.0),
        );
        let follower = Follower::spawn(Arc::clone(&series), StdDuration::from_millis(10)).unwrap();

        let mut waited = 0;
        while series.len() < 7 && waited < 200 {
            std::thread::sleep(StdDuration::from_millis(10));
            waited += 1;
        }
        follower.stop();

        assert_eq!(series.len(), 7);
        assert!(source.query_count() >= 2);
    }
}

mod signals {
    use super::*;

    #[test]
    fn v_shape_has_exactly_one_uptrend_entry() {
        let bars = bars_from_closes(t0(), CandleWidth::OneMinute, &v_shape_closes());
        let rci = calculate_rci(&bars, 5).unwrap();
        assert_relative_eq!(rci.values[9].value, -100.0, epsilon = 1e-9);
        assert_relative_eq!(rci.values[10].value, -70.0, epsilon = 1e-9);

        let crossings = crossing_series(&rci, &bars, -80.0).unwrap();
        let fired: Vec<usize> = crossings
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|_| i))
            .collect();
        assert_eq!(fired, vec![10]);

        let Crossing { time, price } = crossings[10].unwrap();
        assert_eq!(time, bars[10].period_start);
        assert_eq!(price, 2.0);
    }

    #[test]
    fn cached_signals_match_fresh_computation() {
        let bars = wave_trade_bars(200);
        let cache = IndicatorCache::new(&bars);
        let p = params(9, 13);

        let cached = cache.signal_set(&p).unwrap();
        let fresh = SignalSet::compute(&bars, &p).unwrap();
        assert_eq!(cached.len(), bars.len());
        assert_eq!(*cached.uptrend_entry, *fresh.uptrend_entry);
        assert_eq!(*cached.downtrend_exit, *fresh.downtrend_exit);

        // second request reuses both RCIs and all four crossing series
        cache.signal_set(&p).unwrap();
        assert_eq!(cache.cached_rci_count(), 2);
        assert_eq!(cache.cached_crossing_count(), 4);
    }
}

mod simulation {
    use super::*;

    #[test]
    fn uptrend_trades_are_long_and_closed() {
        let trend = WilderDmi.calculate(&rising_trend(), 14).unwrap();
        let trade = wave_trade_bars(300);
        let p = params(5, 5);
        let signals = SignalSet::compute(&trade, &p).unwrap();

        let run = Simulator::new(&trend, &trade, CandleWidth::OneHour, CandleWidth::OneMinute)
            .run(&signals, &p)
            .unwrap();

        assert!(run.result.trade_count > 0);
        assert_eq!(run.result.trade_count, run.trades.len());
        assert!(run.trades.iter().all(|t| t.side == Side::Long));
        assert!(run.trades.windows(2).all(|w| w[0].closed_at <= w[1].opened_at));
        assert_eq!(run.equity.len(), trade.len());
        assert_relative_eq!(
            run.equity.last().unwrap().profit,
            run.result.profit(),
            epsilon = 1e-9
        );
    }

    fn v_shape_run(closes: &[f64]) -> rcitrader::domain::backtest::SimulationRun {
        let trend = WilderDmi.calculate(&rising_trend(), 14).unwrap();
        let trade = bars_from_closes(t0(), CandleWidth::OneMinute, closes);
        let p = params(5, 5);
        let signals = SignalSet::compute(&trade, &p).unwrap();
        Simulator::new(&trend, &trade, CandleWidth::OneHour, CandleWidth::OneMinute)
            .run(&signals, &p)
            .unwrap()
    }

    #[test]
    fn v_shape_without_exit_has_no_closed_trades() {
        let run = v_shape_run(&v_shape_closes());
        assert_eq!(run.result.trade_count, 0);
        assert!(run.equity.iter().all(|e| e.profit == 0.0));
    }

    #[test]
    fn v_shape_with_pullback_closes_in_profit() {
        let mut closes = v_shape_closes();
        closes.extend([10.0, 9.0]);
        let run = v_shape_run(&closes);

        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.opened_at, t0() + Duration::minutes(10));
        assert_eq!(trade.closed_at, t0() + Duration::minutes(21));
        assert_relative_eq!(trade.profit, 7.0, epsilon = 1e-9);
        assert_eq!(run.result.won_count, 1);
    }

    #[test]
    fn downtrend_trades_are_short() {
        let trend = WilderDmi.calculate(&falling_trend(), 14).unwrap();
        let trade = wave_trade_bars(300);
        let p = params(5, 5);
        let signals = SignalSet::compute(&trade, &p).unwrap();

        let run = Simulator::new(&trend, &trade, CandleWidth::OneHour, CandleWidth::OneMinute)
            .run(&signals, &p)
            .unwrap();

        assert!(run.result.trade_count > 0);
        assert!(run.trades.iter().all(|t| t.side == Side::Short));
    }

    #[test]
    fn won_and_lost_add_up() {
        let trend = WilderDmi.calculate(&rising_trend(), 14).unwrap();
        let trade = wave_trade_bars(300);
        let p = params(5, 9);
        let signals = SignalSet::compute(&trade, &p).unwrap();
        let result = Simulator::new(&trend, &trade, CandleWidth::OneHour, CandleWidth::OneMinute)
            .run(&signals, &p)
            .unwrap()
            .result;

        assert_eq!(result.won_count + result.lost_count(), result.trade_count);
        assert_relative_eq!(result.profit(), result.won_sum + result.lost_sum, epsilon = 1e-9);
        assert!(result.won_ratio() >= 0.0 && result.won_ratio() <= 1.0);
    }
}

mod sweep {
    use super::*;

    fn grid() -> SweepGrid {
        SweepGrid {
            trend_candles: vec![CandleWidth::OneHour],
            trade_candles: vec![CandleWidth::OneMinute],
            entry_rci_durations: vec![5, 9],
            entry_rci_levels: vec![80, 90],
            exit_rci_durations: vec![5],
            exit_rci_levels: vec![80],
            adx_thresholds: vec![20.0, 25.0],
            di_thresholds: vec![20.0],
        }
    }

    fn data() -> (HashMap<CandleWidth, Vec<Bar>>, HashMap<CandleWidth, Vec<Bar>>) {
        let trend = HashMap::from([(CandleWidth::OneHour, rising_trend())]);
        let trade = HashMap::from([(CandleWidth::OneMinute, wave_trade_bars(300))]);
        (trend, trade)
    }

    #[test]
    fn one_result_per_combination_in_grid_order() {
        let grid = grid();
        let (trend, trade) = data();
        let report = run_sweep(&grid, &trend, &trade, 14, &WilderDmi).unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(report.results.len(), grid.len());
        let order: Vec<StrategyParams> = report.results.iter().map(|r| r.params).collect();
        assert_eq!(order, grid.param_combinations());
    }

    #[test]
    fn sweep_matches_individual_simulations() {
        let grid = grid();
        let (trend, trade) = data();
        let report = run_sweep(&grid, &trend, &trade, 14, &WilderDmi).unwrap();

        let dmi = WilderDmi.calculate(&trend[&CandleWidth::OneHour], 14).unwrap();
        let bars = &trade[&CandleWidth::OneMinute];
        let simulator = Simulator::new(&dmi, bars, CandleWidth::OneHour, CandleWidth::OneMinute);
        for result in &report.results {
            let signals = SignalSet::compute(bars, &result.params).unwrap();
            let alone = simulator.run(&signals, &result.params).unwrap().result;
            assert_eq!(&alone, result);
        }
    }

    #[test]
    fn missing_trade_series_is_no_data() {
        let grid = grid();
        let (trend, _) = data();
        let err = run_sweep(&grid, &trend, &HashMap::new(), 14, &WilderDmi).unwrap_err();
        assert!(matches!(err, RciTraderError::NoData { .. }));
    }

    #[test]
    fn best_has_highest_profit() {
        let (trend, trade) = data();
        let report = run_sweep(&grid(), &trend, &trade, 14, &WilderDmi).unwrap();
        let best = report.best().unwrap();
        assert!(report.results.iter().all(|r| r.profit() <= best.profit()));
    }
}

mod live {
    use super::*;

    #[test]
    fn trader_opens_through_the_order_port() {
        let instrument = "EUR_USD";
        let trend_key = SeriesKey::new(instrument, CandleWidth::OneHour);
        let trade_key = SeriesKey::new(instrument, CandleWidth::OneMinute);
        let trade_bars = wave_trade_bars(120);
        let source = Arc::new(
            MockBarSource::new()
                .with_bars(trend_key.clone(), rising_trend())
                .with_bars(trade_key.clone(), trade_bars[..1].to_vec()),
        );

        let config = LiveConfig {
            instrument: instrument.to_string(),
            trend_candle: CandleWidth::OneHour,
            trade_candle: CandleWidth::OneMinute,
            params: params(5, 5),
            trade_size: 0.5,
            adx_period: 14,
        };
        let window = TimeRange::new(t0() - Duration::days(3), t0() + Duration::days(1));
        let trend = BarSeries::create_at(source.clone(), trend_key, Lookback::Range(window), t0()).unwrap();
        let trade = BarSeries::create_at(source.clone(), trade_key.clone(), Lookback::Range(window), t0())
            .unwrap()
            .with_max_length(config.params.trade_bars_needed())
            .unwrap();
        let mut trader = LiveTrader::new(
            config,
            Arc::new(trend),
            Arc::new(trade),
            Box::new(WilderDmi),
            RecordingOrderPort::default(),
        )
        .unwrap();

        for bar in &trade_bars[1..] {
            source.push(&trade_key, vec![bar.clone()]);
            trader.tick_at(bar.period_start).unwrap();
        }

        let placed = &trader.orders().placed;
        assert!(!placed.is_empty());
        assert_eq!(placed[0], (instrument.to_string(), OrderSide::Buy, 0.5));
        assert!(placed.iter().all(|(_, _, size)| *size == 0.5));
        let opens = placed.iter().filter(|(_, side, _)| *side == OrderSide::Buy).count();
        let closes = placed.len() - opens;
        assert!(opens == closes || opens == closes + 1);
        assert_eq!(trader.trades().len(), closes);
    }
}

fn reading(adx: f64, plus_di: f64, minus_di: f64) -> TrendReading {
    TrendReading {
        time: t0(),
        adx,
        plus_di,
        minus_di,
    }
}

fn signal(fire: bool, minute: i64) -> Option<Crossing> {
    fire.then(|| Crossing {
        time: t0() + Duration::minutes(minute),
        price: 100.0 + minute as f64,
    })
}

proptest! {
    #[test]
    fn at_most_one_position_open(
        ticks in prop::collection::vec(
            (0u8..4, any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()),
            1..120,
        )
    ) {
        let mut machine = PositionStateMachine::new("EUR_USD", 1.0, 20.0, 20.0).unwrap();
        let mut orders = RecordingOrderPort::default();
        let mut opened = 0usize;
        let mut closed = 0usize;

        for (i, (trend, up_entry, up_exit, down_entry, down_exit)) in ticks.into_iter().enumerate() {
            let minute = i as i64;
            let trend = match trend {
                0 => None,
                1 => Some(reading(30.0, 30.0, 10.0)),
                2 => Some(reading(30.0, 10.0, 30.0)),
                _ => Some(reading(10.0, 30.0, 30.0)),
            };
            let tick = TickInput {
                time: t0() + Duration::minutes(minute),
                price: 100.0 + minute as f64,
                trend,
                uptrend: Signals { entry: signal(up_entry, minute), exit: signal(up_exit, minute) },
                downtrend: Signals { entry: signal(down_entry, minute), exit: signal(down_exit, minute) },
            };
            for event in machine.step(&tick, &mut orders).unwrap() {
                match event {
                    TradeEvent::Opened(_) => opened += 1,
                    TradeEvent::Closed(_) => closed += 1,
                }
            }
            prop_assert!(opened == closed || opened == closed + 1);
            prop_assert_eq!(machine.state() == PositionState::Flat, opened == closed);
        }
        prop_assert_eq!(machine.trades().len(), closed);
        prop_assert_eq!(orders.placed.len(), opened + closed);
    }
}
