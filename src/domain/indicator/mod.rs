//! Technical indicators computed from a close-price history.
//!
//! - `IndicatorParams`: window lengths
//! - `IndicatorSeries`: every indicator for one security, aligned with its bars
//! - `IndicatorSnapshot`: the values at a single bar; `None` means undefined

pub mod rsi;
pub mod sma;

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub ma_short: usize,
    pub ma_medium: usize,
    pub ma_long: usize,
    /// Bars back to the reference close used for price rising/falling.
    pub trend_lookback: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            rsi_period: 14,
            ma_short: 5,
            ma_medium: 20,
            ma_long: 60,
            trend_lookback: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub ma_short: Option<f64>,
    pub ma_medium: Option<f64>,
    pub ma_long: Option<f64>,
}

impl fmt::Display for IndicatorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |x| format!("{:.2}", x));
        write!(
            f,
            "RSI={} MA_S={} MA_M={} MA_L={}",
            show(self.rsi),
            show(self.ma_short),
            show(self.ma_medium),
            show(self.ma_long)
        )
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub closes: Vec<f64>,
    pub rsi: Vec<Option<f64>>,
    pub ma_short: Vec<Option<f64>>,
    pub ma_medium: Vec<Option<f64>>,
    pub ma_long: Vec<Option<f64>>,
    trend_lookback: usize,
}

impl IndicatorSeries {
    pub fn compute(closes: &[f64], params: &IndicatorParams) -> Self {
        IndicatorSeries {
            closes: closes.to_vec(),
            rsi: rsi::calculate_rsi(closes, params.rsi_period),
            ma_short: sma::calculate_sma(closes, params.ma_short),
            ma_medium: sma::calculate_sma(closes, params.ma_medium),
            ma_long: sma::calculate_sma(closes, params.ma_long),
            trend_lookback: params.trend_lookback,
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn snapshot_at(&self, index: usize) -> Option<IndicatorSnapshot> {
        if index >= self.len() {
            return None;
        }
        Some(IndicatorSnapshot {
            rsi: self.rsi[index],
            ma_short: self.ma_short[index],
            ma_medium: self.ma_medium[index],
            ma_long: self.ma_long[index],
        })
    }

    /// Change of close at `index` relative to `trend_lookback` bars earlier.
    pub fn price_change_at(&self, index: usize) -> Option<f64> {
        price_change(&self.closes, index, self.trend_lookback)
    }
}

/// close[i] / close[i - lookback] - 1, undefined without enough history.
pub fn price_change(closes: &[f64], index: usize, lookback: usize) -> Option<f64> {
    if lookback == 0 || index >= closes.len() || index < lookback {
        return None;
    }
    let reference = closes[index - lookback];
    if reference <= 0.0 {
        return None;
    }
    Some(closes[index] / reference - 1.0)
}
