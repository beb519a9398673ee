//! Margin and short-balance anomaly detection.
//!
//! Ratios are `None` whenever their denominator is zero or there is no previous
//! bar. Undefined ratios never raise a flag.

use super::bar::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyThresholds {
    pub margin_increase: f64,
    pub margin_usage: f64,
    pub short_increase: f64,
    pub short_to_margin: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        AnomalyThresholds {
            margin_increase: 0.10,
            margin_usage: 0.80,
            short_increase: 0.10,
            short_to_margin: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnomalyMetrics {
    pub margin_increase_pct: Option<f64>,
    pub margin_usage_ratio: Option<f64>,
    pub short_increase_pct: Option<f64>,
    pub short_to_margin_ratio: Option<f64>,
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

fn increase(today: f64, prev: f64) -> Option<f64> {
    ratio(today - prev, prev)
}

impl AnomalyMetrics {
    pub fn compute(prev: Option<&Bar>, today: &Bar) -> Self {
        AnomalyMetrics {
            margin_increase_pct: prev.and_then(|p| increase(today.margin_balance, p.margin_balance)),
            margin_usage_ratio: ratio(today.margin_balance, today.margin_limit),
            short_increase_pct: prev.and_then(|p| increase(today.short_balance, p.short_balance)),
            short_to_margin_ratio: ratio(today.short_balance, today.margin_balance),
        }
    }

    pub fn flags(&self, thresholds: &AnomalyThresholds) -> AnomalyFlags {
        let exceeds = |v: Option<f64>, t: f64| v.is_some_and(|x| x > t);
        AnomalyFlags {
            margin_increase: exceeds(self.margin_increase_pct, thresholds.margin_increase),
            margin_usage: exceeds(self.margin_usage_ratio, thresholds.margin_usage),
            short_increase: exceeds(self.short_increase_pct, thresholds.short_increase),
            short_to_margin: exceeds(self.short_to_margin_ratio, thresholds.short_to_margin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnomalyFlags {
    pub margin_increase: bool,
    pub margin_usage: bool,
    pub short_increase: bool,
    pub short_to_margin: bool,
}

impl AnomalyFlags {
    pub fn margin_anomaly(&self) -> bool {
        self.margin_increase || self.margin_usage
    }

    pub fn short_anomaly(&self) -> bool {
        self.short_increase || self.short_to_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn bar(margin: f64, limit: f64, short: f64) -> Bar {
        Bar {
            code: "2603".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            close: 50.0,
            volume: 1000,
            margin_balance: margin,
            margin_limit: limit,
            short_balance: short,
        }
    }

    #[test]
    fn computes_all_ratios() {
        let prev = bar(1000.0, 2000.0, 100.0);
        let today = bar(1150.0, 2000.0, 130.0);
        let m = AnomalyMetrics::compute(Some(&prev), &today);

        assert_abs_diff_eq!(m.margin_increase_pct.unwrap(), 0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(m.margin_usage_ratio.unwrap(), 0.575, epsilon = 1e-12);
        assert_abs_diff_eq!(m.short_increase_pct.unwrap(), 0.30, epsilon = 1e-12);
        assert_abs_diff_eq!(m.short_to_margin_ratio.unwrap(), 130.0 / 1150.0, epsilon = 1e-12);
    }

    #[test]
    fn no_previous_bar_leaves_increases_undefined() {
        let m = AnomalyMetrics::compute(None, &bar(1000.0, 2000.0, 100.0));
        assert!(m.margin_increase_pct.is_none());
        assert!(m.short_increase_pct.is_none());
        assert!(m.margin_usage_ratio.is_some());
    }

    #[test]
    fn zero_denominators_are_undefined() {
        let prev = bar(0.0, 0.0, 0.0);
        let today = bar(0.0, 0.0, 50.0);
        let m = AnomalyMetrics::compute(Some(&prev), &today);
        assert_eq!(m, AnomalyMetrics::default());
    }

    #[test]
    fn undefined_metrics_never_flag() {
        let flags = AnomalyMetrics::default().flags(&AnomalyThresholds::default());
        assert_eq!(flags, AnomalyFlags::default());
        assert!(!flags.margin_anomaly());
        assert!(!flags.short_anomaly());
    }

    #[test]
    fn thresholds_are_strict() {
        let m = AnomalyMetrics {
            margin_increase_pct: Some(0.10),
            margin_usage_ratio: Some(0.81),
            short_increase_pct: Some(0.11),
            short_to_margin_ratio: Some(0.5),
        };
        let flags = m.flags(&AnomalyThresholds::default());
        assert!(!flags.margin_increase);
        assert!(flags.margin_usage);
        assert!(flags.short_increase);
        assert!(!flags.short_to_margin);
    }

    #[test]
    fn composite_flags() {
        let margin_only = AnomalyFlags {
            margin_usage: true,
            ..Default::default()
        };
        assert!(margin_only.margin_anomaly());
        assert!(!margin_only.short_anomaly());

        let short_only = AnomalyFlags {
            short_to_margin: true,
            ..Default::default()
        };
        assert!(short_only.short_anomaly());
        assert!(!short_only.margin_anomaly());
    }
}
