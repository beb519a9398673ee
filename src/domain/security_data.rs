//! Validated per-security bar history and the unified timeline.

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone)]
pub struct SecurityData {
    pub code: String,
    pub bars: Vec<Bar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl SecurityData {
    /// Validates `bars` and indexes them by date.
    pub fn new(code: impl Into<String>, bars: Vec<Bar>) -> Result<Self, TraderError> {
        let code = code.into();
        validate_bars(&code, &bars)?;
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Ok(Self {
            code,
            bars,
            date_index,
        })
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&Bar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn get_bar_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Rejects empty, malformed, unordered or duplicated bar series.
pub fn validate_bars(code: &str, bars: &[Bar]) -> Result<(), TraderError> {
    if bars.is_empty() {
        return Err(TraderError::NoData {
            code: code.to_string(),
        });
    }

    let fault = |reason: String| TraderError::DataIntegrity {
        code: code.to_string(),
        reason,
    };

    for bar in bars {
        if bar.code != code {
            return Err(fault(format!("bar on {} belongs to {}", bar.date, bar.code)));
        }
        if !bar.is_well_formed() {
            return Err(fault(format!("malformed bar on {}", bar.date)));
        }
    }

    for pair in bars.windows(2) {
        let (prev, next) = (pair[0].date, pair[1].date);
        if next == prev {
            return Err(fault(format!("duplicate bar on {}", next)));
        }
        if next < prev {
            return Err(fault(format!("bar on {} follows {}", next, prev)));
        }
    }

    Ok(())
}

pub fn build_unified_timeline(securities: &[SecurityData]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = securities
        .iter()
        .flat_map(|sd| sd.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}

/// A security must have a bar on every timeline date from its first bar
/// onward. Dates before its first bar are not gaps; a series that stops
/// before the end of the timeline is.
pub fn check_coverage(data: &SecurityData, timeline: &[NaiveDate]) -> Result<(), TraderError> {
    let Some(first) = data.first_date() else {
        return Err(TraderError::NoData {
            code: data.code.clone(),
        });
    };

    match timeline
        .iter()
        .filter(|d| **d > first)
        .find(|d| !data.date_index.contains_key(d))
    {
        Some(missing) => Err(missing_bar(&data.code, *missing)),
        None => Ok(()),
    }
}

/// Fails unless `data` has a bar on `date`.
pub fn require_bar(data: &SecurityData, date: NaiveDate) -> Result<(), TraderError> {
    if data.date_index.contains_key(&date) {
        Ok(())
    } else {
        Err(missing_bar(&data.code, date))
    }
}

fn missing_bar(code: &str, date: NaiveDate) -> TraderError {
    TraderError::DataIntegrity {
        code: code.to_string(),
        reason: format!("missing bar on {}", date),
    }
}

/// A security removed from a run, with the fault that removed it.
#[derive(Debug, Clone, PartialEq)]
pub struct DegradedSecurity {
    pub code: String,
    pub reason: String,
}

impl DegradedSecurity {
    pub fn from_error(code: &str, err: &TraderError) -> Self {
        let reason = match err {
            TraderError::DataIntegrity { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        DegradedSecurity {
            code: code.to_string(),
            reason,
        }
    }
}

impl fmt::Display for DegradedSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.reason)
    }
}
