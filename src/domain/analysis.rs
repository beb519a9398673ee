//! Per-security analysis: indicators, anomalies and classification for every
//! bar of one security.
//!
//! Securities are independent, so the universe is analyzed in parallel. Each
//! security's work is a pure function of its own bars.

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::domain::anomaly::AnomalyMetrics;
use crate::domain::classifier::{self, ClassifierInput};
use crate::domain::config::StrategyConfig;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::security_data::SecurityData;
use crate::domain::signal::Signal;

#[derive(Debug, Clone)]
pub struct SecurityAnalysis {
    pub data: SecurityData,
    /// Aligned with `data.bars`.
    pub signals: Vec<Option<Signal>>,
}

impl SecurityAnalysis {
    pub fn code(&self) -> &str {
        &self.data.code
    }

    pub fn signal_on(&self, date: NaiveDate) -> Option<&Signal> {
        self.data
            .get_bar_index(date)
            .and_then(|i| self.signals[i].as_ref())
    }

    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.data.get_bar(date).map(|b| b.close)
    }

    pub fn signal_count(&self) -> usize {
        self.signals.iter().flatten().count()
    }
}

pub fn analyze_security(data: SecurityData, config: &StrategyConfig) -> SecurityAnalysis {
    let series = IndicatorSeries::compute(&data.closes(), &config.indicators);

    let signals = data
        .bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let prev = i.checked_sub(1).map(|p| &data.bars[p]);
            let metrics = AnomalyMetrics::compute(prev, bar);
            let input = ClassifierInput {
                close: bar.close,
                indicators: series.snapshot_at(i)?,
                metrics,
                flags: metrics.flags(&config.anomaly),
                price_change: series.price_change_at(i),
            };
            let grade = classifier::classify(&input, &config.grading)?;
            Some(classifier::build_signal(
                &data.code,
                bar.date,
                &input,
                grade,
                &config.trading,
            ))
        })
        .collect();

    SecurityAnalysis { data, signals }
}

/// Analyzes every security in parallel; the result is ordered by code.
pub fn analyze_universe(
    mut securities: Vec<SecurityData>,
    config: &StrategyConfig,
) -> Vec<SecurityAnalysis> {
    securities.sort_by(|a, b| a.code.cmp(&b.code));
    securities
        .into_par_iter()
        .map(|data| analyze_security(data, config))
        .collect()
}
