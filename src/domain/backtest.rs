//! Backtest event loop.
//!
//! Replays analyzed securities day by day over the unified timeline, feeding
//! each day's closes and signals to the [`PositionSimulator`].

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::domain::analysis::SecurityAnalysis;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::{ClosedTrade, Position};
use crate::domain::security_data::DegradedSecurity;
use crate::domain::signal::Signal;
use crate::domain::simulator::{DroppedSignal, PositionSimulator, TradingParams};

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_equity: f64,
    /// In close order.
    pub trades: Vec<ClosedTrade>,
    /// Still open when the range ended; not counted as trades.
    pub open_positions: Vec<Position>,
    pub equity_curve: Vec<EquityPoint>,
    pub dropped: Vec<DroppedSignal>,
    pub degraded: Vec<DegradedSecurity>,
    pub signals_generated: usize,
    pub metrics: Metrics,
}

impl BacktestResult {
    pub fn simulated_days(&self) -> usize {
        self.equity_curve.len()
    }
}

pub fn run_backtest(
    analyses: &[SecurityAnalysis],
    timeline: &[NaiveDate],
    config: &BacktestConfig,
    trading: &TradingParams,
) -> BacktestResult {
    let mut sim = PositionSimulator::new(config.initial_capital, trading.clone());
    let mut signals_generated = 0usize;

    let days = timeline
        .iter()
        .filter(|d| **d >= config.start_date && **d <= config.end_date);

    for &date in days {
        let prices: HashMap<String, f64> = analyses
            .iter()
            .filter_map(|a| a.close_on(date).map(|c| (a.code().to_string(), c)))
            .collect();
        let signals: Vec<Signal> = analyses
            .iter()
            .filter_map(|a| a.signal_on(date).cloned())
            .collect();
        signals_generated += signals.len();

        let summary = sim.step(date, &prices, &signals);
        if !summary.exits.is_empty() || !summary.entries.is_empty() {
            debug!(
                %date,
                exits = summary.exits.len(),
                entries = summary.entries.len(),
                dropped = summary.dropped,
                "simulated day"
            );
        }
    }

    let (portfolio, dropped) = sim.finish();
    let metrics = Metrics::compute(&portfolio, config.risk_free_rate);
    let final_equity = portfolio
        .equity_curve
        .last()
        .map(|p| p.equity)
        .unwrap_or(config.initial_capital);

    info!(
        trades = portfolio.closed_trades.len(),
        open = portfolio.positions.len(),
        signals = signals_generated,
        final_equity,
        "backtest complete"
    );

    BacktestResult {
        start_date: config.start_date,
        end_date: config.end_date,
        initial_capital: config.initial_capital,
        final_equity,
        trades: portfolio.closed_trades,
        open_positions: portfolio.positions.into_values().collect(),
        equity_curve: portfolio.equity_curve,
        dropped,
        degraded: Vec::new(),
        signals_generated,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::analyze_universe;
    use crate::domain::bar::Bar;
    use crate::domain::config::StrategyConfig;
    use crate::domain::position::CloseReason;
    use crate::domain::security_data::{SecurityData, build_unified_timeline};
    use approx::assert_abs_diff_eq;

    fn d(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset)
    }

    fn bars_from(code: &str, closes: &[f64], margins: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .zip(margins)
            .enumerate()
            .map(|(i, (&close, &margin))| Bar {
                code: code.into(),
                date: d(i as i64),
                close,
                volume: 1_000,
                margin_balance: margin,
                margin_limit: 100_000.0,
                short_balance: 100.0,
            })
            .collect()
    }

    fn config(start: i64, end: i64) -> BacktestConfig {
        BacktestConfig {
            start_date: d(start),
            end_date: d(end),
            initial_capital: 1_000_000.0,
            risk_free_rate: 0.0,
        }
    }

    fn run(securities: Vec<SecurityData>, cfg: &BacktestConfig) -> BacktestResult {
        let strategy = StrategyConfig::default();
        let timeline = build_unified_timeline(&securities);
        let analyses = analyze_universe(securities, &strategy);
        run_backtest(&analyses, &timeline, cfg, &strategy.trading)
    }

    #[test]
    fn zero_signals_zero_trades() {
        let closes = vec![50.0; 40];
        let margins = vec![1_000.0; 40];
        let sd = SecurityData::new("1101", bars_from("1101", &closes, &margins)).unwrap();
        let result = run(vec![sd], &config(20, 39));

        assert!(result.trades.is_empty());
        assert!(result.open_positions.is_empty());
        assert_eq!(result.signals_generated, 0);
        assert_abs_diff_eq!(result.metrics.total_return, 0.0);
        assert_abs_diff_eq!(result.final_equity, 1_000_000.0);
        assert_eq!(result.simulated_days(), 20);
    }

    #[test]
    fn selloff_entry_then_holding_expiry() {
        // slide then margin jump on day 39, then flat so only the deadline can exit
        let mut closes = vec![100.0; 30];
        let mut c = 100.0;
        for _ in 30..40 {
            c *= 0.985;
            closes.push(c);
        }
        closes.extend(std::iter::repeat_n(c, 10));
        let mut margins = vec![10_000.0; 50];
        margins[39] = 12_000.0;
        margins[40..].fill(12_000.0);

        let sd = SecurityData::new("2330", bars_from("2330", &closes, &margins)).unwrap();
        let result = run(vec![sd], &config(30, 49));

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_date, d(39));
        assert_eq!(trade.exit_date, d(44));
        assert_eq!(trade.reason, CloseReason::HoldingExpired);
        assert_abs_diff_eq!(trade.return_pct, 0.0, epsilon = 1e-12);
        assert_eq!(result.metrics.per_grade.len(), 1);
    }

    #[test]
    fn open_positions_reported_separately() {
        let mut closes = vec![100.0; 30];
        let mut c = 100.0;
        for _ in 30..40 {
            c *= 0.985;
            closes.push(c);
        }
        let mut margins = vec![10_000.0; 40];
        margins[39] = 12_000.0;

        let sd = SecurityData::new("2330", bars_from("2330", &closes, &margins)).unwrap();
        let result = run(vec![sd], &config(30, 39));

        assert!(result.trades.is_empty());
        assert_eq!(result.open_positions.len(), 1);
        assert_eq!(result.metrics.total_trades, 0);
    }

    #[test]
    fn days_outside_range_not_simulated() {
        let closes = vec![50.0; 10];
        let margins = vec![1_000.0; 10];
        let sd = SecurityData::new("1101", bars_from("1101", &closes, &margins)).unwrap();
        let result = run(vec![sd], &config(3, 5));
        assert_eq!(result.simulated_days(), 3);
        assert_eq!(result.equity_curve[0].date, d(3));
    }
}
