//! CSV report adapter implementing ReportPort.
//!
//! Writes a directory of CSV files for one backtest:
//! `summary.csv`, `grades.csv`, `trades.csv`, `open_positions.csv`,
//! `equity.csv`, `monthly.csv`, `dropped.csv` and `degraded.csv`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TraderError;
use crate::domain::portfolio::EquityPoint;
use crate::ports::report_port::ReportPort;

#[derive(Serialize)]
struct SummaryRow<'a> {
    metric: &'a str,
    value: String,
}

#[derive(Serialize)]
struct GradeRow {
    grade: String,
    trades: usize,
    wins: usize,
    win_rate: f64,
    avg_return: f64,
}

#[derive(Serialize)]
struct TradeRow<'a> {
    code: &'a str,
    grade: String,
    entry_date: NaiveDate,
    exit_date: NaiveDate,
    entry_price: f64,
    exit_price: f64,
    quantity: i64,
    pnl: f64,
    return_pct: f64,
    holding_days: i64,
    reason: String,
}

#[derive(Serialize)]
struct OpenPositionRow<'a> {
    code: &'a str,
    grade: String,
    entry_date: NaiveDate,
    entry_price: f64,
    quantity: i64,
    size: f64,
    stop_loss: f64,
    take_profit: f64,
    deadline: NaiveDate,
}

#[derive(Serialize)]
struct MonthlyRow {
    year: i32,
    month: u32,
    return_pct: f64,
}

#[derive(Serialize)]
struct DroppedRow<'a> {
    date: NaiveDate,
    code: &'a str,
    grade: String,
    reason: String,
}

#[derive(Serialize)]
struct DegradedRow<'a> {
    code: &'a str,
    reason: &'a str,
}

/// Compounded return per calendar month, keyed by the later day of each pair.
fn compute_monthly_returns(equity_curve: &[EquityPoint]) -> Vec<MonthlyRow> {
    let mut monthly: BTreeMap<(i32, u32), f64> = BTreeMap::new();

    for window in equity_curve.windows(2) {
        let (prev, curr) = (&window[0], &window[1]);
        let daily = if prev.equity > 0.0 {
            curr.equity / prev.equity
        } else {
            1.0
        };
        *monthly
            .entry((curr.date.year(), curr.date.month()))
            .or_insert(1.0) *= daily;
    }

    monthly
        .into_iter()
        .map(|((year, month), growth)| MonthlyRow {
            year,
            month,
            return_pct: growth - 1.0,
        })
        .collect()
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), TraderError> {
    let report_err = |e: csv::Error| TraderError::Report {
        reason: format!("{}: {}", path.display(), e),
    };
    let mut writer = csv::Writer::from_path(path).map_err(report_err)?;
    for row in rows {
        writer.serialize(row).map_err(report_err)?;
    }
    writer.flush()?;
    Ok(())
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), TraderError> {
        let dir = Path::new(output_path);
        fs::create_dir_all(dir)?;
        let m = &result.metrics;

        let summary = [
            ("start_date", result.start_date.to_string()),
            ("end_date", result.end_date.to_string()),
            ("initial_capital", format!("{:.2}", result.initial_capital)),
            ("final_equity", format!("{:.2}", result.final_equity)),
            ("total_return", format!("{:.6}", m.total_return)),
            ("annualized_return", format!("{:.6}", m.annualized_return)),
            ("sharpe_ratio", format!("{:.4}", m.sharpe_ratio)),
            ("max_drawdown", format!("{:.6}", m.max_drawdown)),
            ("max_drawdown_duration", m.max_drawdown_duration.to_string()),
            ("total_trades", m.total_trades.to_string()),
            ("win_rate", format!("{:.4}", m.win_rate)),
            ("avg_return", format!("{:.6}", m.avg_return)),
            ("open_positions", result.open_positions.len().to_string()),
            ("signals_generated", result.signals_generated.to_string()),
            ("dropped_signals", result.dropped.len().to_string()),
            ("degraded_securities", result.degraded.len().to_string()),
        ];
        write_rows(
            &dir.join("summary.csv"),
            summary.iter().map(|(metric, value)| SummaryRow {
                metric,
                value: value.clone(),
            }),
        )?;

        write_rows(
            &dir.join("grades.csv"),
            m.per_grade.iter().map(|(grade, s)| GradeRow {
                grade: grade.to_string(),
                trades: s.trades,
                wins: s.wins,
                win_rate: s.win_rate(),
                avg_return: s.avg_return,
            }),
        )?;

        write_rows(
            &dir.join("trades.csv"),
            result.trades.iter().map(|t| TradeRow {
                code: &t.code,
                grade: t.grade.to_string(),
                entry_date: t.entry_date,
                exit_date: t.exit_date,
                entry_price: t.entry_price,
                exit_price: t.exit_price,
                quantity: t.quantity,
                pnl: t.pnl,
                return_pct: t.return_pct,
                holding_days: t.holding_days(),
                reason: t.reason.to_string(),
            }),
        )?;

        write_rows(
            &dir.join("open_positions.csv"),
            result.open_positions.iter().map(|p| OpenPositionRow {
                code: &p.code,
                grade: p.grade.to_string(),
                entry_date: p.entry_date,
                entry_price: p.entry_price,
                quantity: p.quantity,
                size: p.size,
                stop_loss: p.stop_loss,
                take_profit: p.take_profit,
                deadline: p.deadline,
            }),
        )?;

        write_rows(&dir.join("equity.csv"), result.equity_curve.iter())?;
        write_rows(
            &dir.join("monthly.csv"),
            compute_monthly_returns(&result.equity_curve),
        )?;

        write_rows(
            &dir.join("dropped.csv"),
            result.dropped.iter().map(|s| DroppedRow {
                date: s.date,
                code: &s.code,
                grade: s.grade.to_string(),
                reason: format!("{:?}", s.reason),
            }),
        )?;

        write_rows(
            &dir.join("degraded.csv"),
            result.degraded.iter().map(|s| DegradedRow {
                code: &s.code,
                reason: &s.reason,
            }),
        )?;

        info!(path = %dir.display(), trades = result.trades.len(), "report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::Metrics;
    use crate::domain::portfolio::Portfolio;
    use crate::domain::position::{CloseReason, ClosedTrade};
    use crate::domain::security_data::DegradedSecurity;
    use crate::domain::signal::BuyGrade;
    use tempfile::TempDir;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn sample_result() -> BacktestResult {
        let trade = ClosedTrade {
            code: "2330".into(),
            grade: BuyGrade::S,
            quantity: 100,
            entry_price: 100.0,
            exit_price: 110.0,
            entry_date: d(1, 2),
            exit_date: d(1, 5),
            pnl: 1_000.0,
            return_pct: 0.10,
            reason: CloseReason::HoldingExpired,
        };
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.record_trade(trade.clone());
        portfolio.record_equity(d(1, 2), 100_000.0);
        portfolio.record_equity(d(1, 31), 101_000.0);
        portfolio.record_equity(d(2, 1), 101_000.0);

        BacktestResult {
            start_date: d(1, 2),
            end_date: d(2, 1),
            initial_capital: 100_000.0,
            final_equity: 101_000.0,
            trades: vec![trade],
            open_positions: Vec::new(),
            equity_curve: portfolio.equity_curve.clone(),
            dropped: Vec::new(),
            degraded: vec![DegradedSecurity {
                code: "2317".into(),
                reason: "missing bar on 2024-01-03".into(),
            }],
            signals_generated: 1,
            metrics: Metrics::compute(&portfolio, 0.0),
        }
    }

    #[test]
    fn writes_all_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("report");
        CsvReportAdapter::new()
            .write(&sample_result(), out.to_str().unwrap())
            .unwrap();

        for name in [
            "summary.csv",
            "grades.csv",
            "trades.csv",
            "open_positions.csv",
            "equity.csv",
            "monthly.csv",
            "dropped.csv",
            "degraded.csv",
        ] {
            assert!(out.join(name).exists(), "{} missing", name);
        }

        let trades = fs::read_to_string(out.join("trades.csv")).unwrap();
        assert!(trades.starts_with("code,grade,entry_date"));
        assert!(trades.contains("2330,S,2024-01-02,2024-01-05"));
        assert!(trades.contains("HOLDING_EXPIRED"));

        let degraded = fs::read_to_string(out.join("degraded.csv")).unwrap();
        assert!(degraded.contains("2317,missing bar on 2024-01-03"));

        let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
        assert!(summary.contains("total_trades,1"));
    }

    #[test]
    fn monthly_returns_compound_within_month() {
        let curve = vec![
            EquityPoint { date: d(1, 30), equity: 100.0 },
            EquityPoint { date: d(1, 31), equity: 110.0 },
            EquityPoint { date: d(2, 1), equity: 99.0 },
        ];
        let rows = compute_monthly_returns(&curve);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].year, rows[0].month), (2024, 1));
        assert!((rows[0].return_pct - 0.10).abs() < 1e-9);
        assert!((rows[1].return_pct + 0.10).abs() < 1e-9);
    }

    #[test]
    fn unwritable_path_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not_a_dir");
        fs::write(&file, "x").unwrap();
        let result = CsvReportAdapter::new().write(&sample_result(), file.to_str().unwrap());
        assert!(result.is_err());
    }
}
