//! Backtest performance statistics.

use std::collections::BTreeMap;

use super::portfolio::{EquityPoint, Portfolio};
use super::position::{ClosedTrade, CloseReason};
use super::signal::BuyGrade;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeStats {
    pub trades: usize,
    pub wins: usize,
    pub avg_return: f64,
}

impl GradeStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades > 0 {
            self.wins as f64 / self.trades as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of days spent below a previous equity peak.
    pub max_drawdown_duration: i64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    pub avg_holding_days: f64,
    pub per_grade: BTreeMap<BuyGrade, GradeStats>,
    pub exits: BTreeMap<CloseReason, usize>,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio, risk_free_rate: f64) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let trades = &portfolio.closed_trades;
        let initial_capital = portfolio.initial_capital;

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = equity_curve.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let sharpe_ratio =
            compute_sharpe(equity_curve, risk_free_rate / TRADING_DAYS_PER_YEAR);

        let total_trades = trades.len();
        let trades_won = trades.iter().filter(|t| t.is_win()).count();
        let trades_lost = trades.iter().filter(|t| t.return_pct < 0.0).count();

        let (win_rate, avg_return, avg_holding_days) = if total_trades > 0 {
            let n = total_trades as f64;
            (
                trades_won as f64 / n,
                trades.iter().map(|t| t.return_pct).sum::<f64>() / n,
                trades.iter().map(|t| t.holding_days() as f64).sum::<f64>() / n,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        let mut exits = BTreeMap::new();
        for trade in trades {
            *exits.entry(trade.reason).or_insert(0) += 1;
        }

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            win_rate,
            avg_return,
            avg_holding_days,
            per_grade: per_grade_stats(trades),
            exits,
        }
    }
}

fn per_grade_stats(trades: &[ClosedTrade]) -> BTreeMap<BuyGrade, GradeStats> {
    let mut stats: BTreeMap<BuyGrade, GradeStats> = BTreeMap::new();
    let mut sums: BTreeMap<BuyGrade, f64> = BTreeMap::new();

    for trade in trades {
        let entry = stats.entry(trade.grade).or_default();
        entry.trades += 1;
        if trade.is_win() {
            entry.wins += 1;
        }
        *sums.entry(trade.grade).or_insert(0.0) += trade.return_pct;
    }

    for (grade, entry) in stats.iter_mut() {
        entry.avg_return = sums[grade] / entry.trades as f64;
    }
    stats
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_sharpe(equity_curve: &[EquityPoint], daily_rf: f64) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    if stddev > 0.0 {
        (mean - daily_rf) / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn make_portfolio(equity: Vec<f64>, trades: Vec<ClosedTrade>) -> Portfolio {
        let initial = equity.first().copied().unwrap_or(100_000.0);
        let mut portfolio = Portfolio::new(initial);
        for trade in trades {
            portfolio.record_trade(trade);
        }
        for point in make_equity_curve(&equity) {
            portfolio.record_equity(point.date, point.equity);
        }
        portfolio
    }

    fn make_trade(grade: BuyGrade, return_pct: f64, days: i64, reason: CloseReason) -> ClosedTrade {
        let entry_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ClosedTrade {
            code: "2330".to_string(),
            grade,
            quantity: 100,
            entry_price: 100.0,
            exit_price: 100.0 * (1.0 + return_pct),
            entry_date,
            exit_date: entry_date + chrono::Duration::days(days),
            pnl: 100.0 * 100.0 * return_pct,
            return_pct,
            reason,
        }
    }

    #[test]
    fn empty_portfolio() {
        let metrics = Metrics::compute(&Portfolio::new(100_000.0), 0.0);
        assert_abs_diff_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.total_trades, 0);
        assert_abs_diff_eq!(metrics.win_rate, 0.0);
        assert!(metrics.per_grade.is_empty());
        assert!(metrics.exits.is_empty());
    }

    #[test]
    fn flat_equity_zero_return() {
        let portfolio = make_portfolio(vec![100_000.0; 20], vec![]);
        let metrics = Metrics::compute(&portfolio, 0.0);
        assert_abs_diff_eq!(metrics.total_return, 0.0);
        assert_abs_diff_eq!(metrics.annualized_return, 0.0);
        assert_abs_diff_eq!(metrics.sharpe_ratio, 0.0);
        assert_abs_diff_eq!(metrics.max_drawdown, 0.0);
    }

    #[test]
    fn total_return() {
        let up = Metrics::compute(&make_portfolio(vec![100_000.0, 110_000.0], vec![]), 0.0);
        assert_abs_diff_eq!(up.total_return, 0.10, epsilon = 1e-9);
        let down = Metrics::compute(&make_portfolio(vec![100_000.0, 90_000.0], vec![]), 0.0);
        assert_abs_diff_eq!(down.total_return, -0.10, epsilon = 1e-9);
    }

    #[test]
    fn annualized_return_over_one_year() {
        let mut values = vec![100_000.0; 251];
        values.push(120_000.0);
        let metrics = Metrics::compute(&make_portfolio(values, vec![]), 0.0);
        assert_abs_diff_eq!(metrics.annualized_return, 0.20, epsilon = 1e-9);
    }

    #[test]
    fn win_rate_and_avg_return() {
        let trades = vec![
            make_trade(BuyGrade::S, 0.10, 3, CloseReason::HoldingExpired),
            make_trade(BuyGrade::A, -0.08, 2, CloseReason::StopLoss),
            make_trade(BuyGrade::B, 0.0, 5, CloseReason::HoldingExpired),
            make_trade(BuyGrade::S, 0.18, 6, CloseReason::TakeProfit),
        ];
        let metrics = Metrics::compute(&make_portfolio(vec![100_000.0, 100_200.0], trades), 0.0);

        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.trades_won, 2);
        assert_eq!(metrics.trades_lost, 1);
        assert_abs_diff_eq!(metrics.win_rate, 0.5);
        assert_abs_diff_eq!(metrics.avg_return, 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.avg_holding_days, 4.0);
    }

    #[test]
    fn per_grade_breakdown() {
        let trades = vec![
            make_trade(BuyGrade::S, 0.10, 3, CloseReason::HoldingExpired),
            make_trade(BuyGrade::S, -0.02, 3, CloseReason::ReverseSignal),
            make_trade(BuyGrade::B, 0.04, 5, CloseReason::HoldingExpired),
        ];
        let metrics = Metrics::compute(&make_portfolio(vec![100_000.0], trades), 0.0);

        let s = &metrics.per_grade[&BuyGrade::S];
        assert_eq!((s.trades, s.wins), (2, 1));
        assert_abs_diff_eq!(s.avg_return, 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(s.win_rate(), 0.5);
        assert!(!metrics.per_grade.contains_key(&BuyGrade::A));
        assert_eq!(metrics.per_grade[&BuyGrade::B].trades, 1);

        assert_eq!(metrics.exits[&CloseReason::HoldingExpired], 2);
        assert_eq!(metrics.exits[&CloseReason::ReverseSignal], 1);
    }

    #[test]
    fn max_drawdown() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, _) = compute_drawdown(&curve);
        assert_abs_diff_eq!(dd, (110.0 - 80.0) / 110.0, epsilon = 1e-9);
    }

    #[test]
    fn max_drawdown_duration() {
        let curve = make_equity_curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0]);
        let (_, duration) = compute_drawdown(&curve);
        assert_eq!(duration, 4);
    }

    #[test]
    fn sharpe_positive_for_steady_gains() {
        let values: Vec<f64> = (0..253)
            .map(|i| 100_000.0 * (1.0 + 0.001 * i as f64) + if i % 2 == 0 { 50.0 } else { 0.0 })
            .collect();
        let metrics = Metrics::compute(&make_portfolio(values, vec![]), 0.0);
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn sharpe_respects_risk_free_rate() {
        let curve = make_equity_curve(&[100.0, 101.0, 100.5, 101.5, 100.0, 102.0]);
        let base = compute_sharpe(&curve, 0.0);
        let with_rf = compute_sharpe(&curve, 0.001);
        assert!(base.is_finite());
        assert!(with_rf < base);
    }
}
