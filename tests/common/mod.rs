#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use margintrader::domain::bar::Bar;
use margintrader::domain::error::TraderError;
use margintrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

#[derive(Clone, Copy)]
pub enum Fault {
    Integrity,
    Outage,
}

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, (Fault, String)>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, fault: Fault, reason: &str) -> Self {
        self.errors
            .insert(code.to_string(), (fault, reason.to_string()));
        self
    }

    fn fail(&self, code: &str) -> Option<TraderError> {
        self.errors.get(code).map(|(fault, reason)| match fault {
            Fault::Integrity => TraderError::DataIntegrity {
                code: code.to_string(),
                reason: reason.clone(),
            },
            Fault::Outage => TraderError::Database {
                reason: reason.clone(),
            },
        })
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, TraderError> {
        if let Some(err) = self.fail(code) {
            return Err(err);
        }
        match self.data.get(code) {
            Some(bars) => Ok(bars
                .iter()
                .filter(|b| b.date >= start_date && b.date <= end_date)
                .cloned()
                .collect()),
            None => Err(TraderError::NoData {
                code: code.to_string(),
            }),
        }
    }

    fn list_symbols(&self) -> Result<Vec<String>, TraderError> {
        let mut codes: Vec<String> = self.data.keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TraderError> {
        if let Some(err) = self.fail(code) {
            return Err(err);
        }
        match self.data.get(code) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

/// 2024-01-01 plus `offset` calendar days.
pub fn d(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
}

pub fn make_bar(code: &str, offset: i64, close: f64, margin: f64) -> Bar {
    Bar {
        code: code.to_string(),
        date: d(offset),
        close,
        volume: 1_000,
        margin_balance: margin,
        margin_limit: 100_000.0,
        short_balance: 100.0,
    }
}

pub fn flat_bars(code: &str, days: i64, close: f64) -> Vec<Bar> {
    (0..days).map(|i| make_bar(code, i, close, 10_000.0)).collect()
}

/// 30 flat bars at `base`, a 1.5% daily slide for 10 bars and a 20% margin
/// jump on the last one. Grades S on d(39) under default settings.
pub fn selloff_bars(code: &str, base: f64) -> Vec<Bar> {
    let mut bars = flat_bars(code, 30, base);
    let mut close = base;
    for i in 30..40 {
        close *= 0.985;
        bars.push(make_bar(code, i, close, 10_000.0));
    }
    if let Some(last) = bars.last_mut() {
        last.margin_balance = 12_000.0;
    }
    bars
}

/// The selloff followed by one bar per entry of `after`, margin held flat.
pub fn selloff_then(code: &str, base: f64, after: &[f64]) -> Vec<Bar> {
    let mut bars = selloff_bars(code, base);
    for (i, close) in after.iter().enumerate() {
        bars.push(make_bar(code, 40 + i as i64, *close, 12_000.0));
    }
    bars
}

pub fn write_csv(dir: &Path, code: &str, bars: &[Bar]) {
    let mut content = String::from("date,close,volume,margin_balance,margin_limit,short_balance\n");
    for b in bars {
        writeln!(
            content,
            "{},{},{},{},{},{}",
            b.date, b.close, b.volume, b.margin_balance, b.margin_limit, b.short_balance
        )
        .unwrap();
    }
    std::fs::write(dir.join(format!("{}.csv", code)), content).unwrap();
}
