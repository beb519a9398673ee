//! Signal engine: loads the universe through a [`DataPort`], isolates bad
//! securities, and drives live signal generation or a backtest.

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::domain::analysis::{SecurityAnalysis, analyze_universe};
use crate::domain::backtest::{self, BacktestConfig, BacktestResult};
use crate::domain::config::StrategyConfig;
use crate::domain::error::TraderError;
use crate::domain::security_data::{
    DegradedSecurity, SecurityData, build_unified_timeline, check_coverage, require_bar,
};
use crate::domain::signal::{Signal, filter_and_rank};
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TraderError> {
        if start > end {
            return Err(TraderError::InvalidDateRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        DateRange {
            start: date,
            end: date,
        }
    }
}

/// Signals for one date, filtered and ranked, plus securities that could not
/// be evaluated.
#[derive(Debug, Clone)]
pub struct SignalReport {
    pub date: NaiveDate,
    pub signals: Vec<Signal>,
    pub degraded: Vec<DegradedSecurity>,
}

impl SignalReport {
    pub fn buys(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.is_buy())
    }

    pub fn sells(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.is_sell())
    }
}

struct LoadedUniverse {
    analyses: Vec<SecurityAnalysis>,
    timeline: Vec<NaiveDate>,
    degraded: Vec<DegradedSecurity>,
}

pub struct SignalEngine<'a> {
    data_port: &'a dyn DataPort,
    config: &'a StrategyConfig,
    codes: Vec<String>,
    warmup_days: i64,
    risk_free_rate: f64,
}

impl<'a> SignalEngine<'a> {
    pub fn new(data_port: &'a dyn DataPort, config: &'a StrategyConfig, codes: Vec<String>) -> Self {
        SignalEngine {
            data_port,
            config,
            codes,
            warmup_days: 120,
            risk_free_rate: 0.0,
        }
    }

    /// Calendar days of history fetched before the first evaluated date.
    pub fn with_warmup_days(mut self, days: i64) -> Self {
        self.warmup_days = days.max(0);
        self
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Live mode: signals on `date`, price-filtered and ordered by grade.
    pub fn generate_signals(&self, date: NaiveDate) -> Result<SignalReport, TraderError> {
        let universe = self.load(DateRange::single(date), Some(date))?;

        let signals: Vec<Signal> = universe
            .analyses
            .iter()
            .filter_map(|a| a.signal_on(date).cloned())
            .collect();
        let raw = signals.len();
        let signals = filter_and_rank(signals, &self.config.filter);

        info!(
            %date,
            raw,
            kept = signals.len(),
            degraded = universe.degraded.len(),
            "signals generated"
        );

        Ok(SignalReport {
            date,
            signals,
            degraded: universe.degraded,
        })
    }

    pub fn run_backtest(
        &self,
        range: DateRange,
        initial_capital: f64,
    ) -> Result<BacktestResult, TraderError> {
        let universe = self.load(range, None)?;
        info!(
            securities = universe.analyses.len(),
            degraded = universe.degraded.len(),
            start = %range.start,
            end = %range.end,
            "running backtest"
        );

        let config = BacktestConfig {
            start_date: range.start,
            end_date: range.end,
            initial_capital,
            risk_free_rate: self.risk_free_rate,
        };
        let mut result = backtest::run_backtest(
            &universe.analyses,
            &universe.timeline,
            &config,
            &self.config.trading,
        );
        result.degraded = universe.degraded;
        Ok(result)
    }

    /// Fetches every code sequentially, drops faulty securities, and analyzes
    /// the rest in parallel. With `evaluated` set, a security lacking a bar on
    /// that date is faulty too.
    fn load(
        &self,
        range: DateRange,
        evaluated: Option<NaiveDate>,
    ) -> Result<LoadedUniverse, TraderError> {
        let fetch_start = range.start - Duration::days(self.warmup_days);
        let mut degraded = Vec::new();
        let mut securities = Vec::with_capacity(self.codes.len());

        for code in &self.codes {
            let loaded = self
                .data_port
                .fetch_bars(code, fetch_start, range.end)
                .and_then(|bars| SecurityData::new(code.clone(), bars));
            match loaded {
                Ok(data) => securities.push(data),
                Err(TraderError::Database { reason }) => {
                    return Err(TraderError::Database { reason });
                }
                Err(e) => {
                    warn!(code = %code, error = %e, "security degraded");
                    degraded.push(DegradedSecurity::from_error(code, &e));
                }
            }
        }

        let timeline = build_unified_timeline(&securities);
        let (covered, gaps): (Vec<_>, Vec<_>) = securities
            .into_iter()
            .map(|sd| {
                let check = check_coverage(&sd, &timeline).and_then(|()| match evaluated {
                    Some(date) => require_bar(&sd, date),
                    None => Ok(()),
                });
                (sd, check)
            })
            .partition(|(_, check)| check.is_ok());

        for (sd, check) in gaps {
            if let Err(e) = check {
                warn!(code = %sd.code, error = %e, "security degraded");
                degraded.push(DegradedSecurity::from_error(&sd.code, &e));
            }
        }
        degraded.sort_by(|a, b| a.code.cmp(&b.code));

        let securities: Vec<SecurityData> = covered.into_iter().map(|(sd, _)| sd).collect();
        let analyses = analyze_universe(securities, self.config);

        Ok(LoadedUniverse {
            analyses,
            timeline,
            degraded,
        })
    }
}
