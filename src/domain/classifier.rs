//! Signal grading.
//!
//! Grades are an ordered table of (grade, predicate) pairs evaluated top-down;
//! the first matching rule wins. A security without a defined RSI or medium MA
//! is not evaluated at all.

use chrono::NaiveDate;

use super::anomaly::{AnomalyFlags, AnomalyMetrics};
use super::indicator::IndicatorSnapshot;
use super::signal::{BuyGrade, Direction, Grade, SellGrade, Signal};
use super::simulator::TradingParams;

#[derive(Debug, Clone, PartialEq)]
pub struct GradeThresholds {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub s_margin_increase: f64,
    pub s_rsi: f64,
    /// Minimum move over the trend lookback for S (decline) grades.
    pub strong_move_pct: f64,
    pub a_margin_increase: f64,
    pub urgent_short_increase: f64,
    pub urgent_rsi: f64,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        GradeThresholds {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            s_margin_increase: 0.15,
            s_rsi: 25.0,
            strong_move_pct: 0.05,
            a_margin_increase: 0.10,
            urgent_short_increase: 0.15,
            urgent_rsi: 75.0,
        }
    }
}

/// Everything known about one security on one date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierInput {
    pub close: f64,
    pub indicators: IndicatorSnapshot,
    pub metrics: AnomalyMetrics,
    pub flags: AnomalyFlags,
    /// Close relative to the close `trend_lookback` bars earlier.
    pub price_change: Option<f64>,
}

/// Input with the mandatory indicators resolved.
#[derive(Debug, Clone, Copy)]
pub struct Evaluation<'a> {
    pub close: f64,
    pub rsi: f64,
    pub ma_medium: f64,
    pub input: &'a ClassifierInput,
}

impl<'a> Evaluation<'a> {
    pub fn new(input: &'a ClassifierInput) -> Option<Self> {
        Some(Evaluation {
            close: input.close,
            rsi: input.indicators.rsi?,
            ma_medium: input.indicators.ma_medium?,
            input,
        })
    }

    fn margin_increase_above(&self, threshold: f64) -> bool {
        self.input
            .metrics
            .margin_increase_pct
            .is_some_and(|v| v > threshold)
    }

    fn short_increase_above(&self, threshold: f64) -> bool {
        self.input
            .metrics
            .short_increase_pct
            .is_some_and(|v| v > threshold)
    }

    fn change_below(&self, threshold: f64) -> bool {
        self.input.price_change.is_some_and(|c| c < threshold)
    }

    fn change_above(&self, threshold: f64) -> bool {
        self.input.price_change.is_some_and(|c| c > threshold)
    }
}

pub type Predicate = fn(&Evaluation<'_>, &GradeThresholds) -> bool;

pub struct GradeRule {
    pub grade: Grade,
    pub predicate: Predicate,
}

pub fn is_grade_s(e: &Evaluation<'_>, t: &GradeThresholds) -> bool {
    e.input.flags.margin_anomaly()
        && e.margin_increase_above(t.s_margin_increase)
        && e.rsi < t.s_rsi
        && e.change_below(-t.strong_move_pct)
        && e.close < e.ma_medium
}

pub fn is_grade_a(e: &Evaluation<'_>, t: &GradeThresholds) -> bool {
    e.input.flags.margin_anomaly()
        && e.margin_increase_above(t.a_margin_increase)
        && e.rsi < t.rsi_oversold
        && e.change_below(0.0)
        && e.close < e.ma_medium
}

pub fn is_grade_b(e: &Evaluation<'_>, t: &GradeThresholds) -> bool {
    e.input.flags.margin_anomaly() && e.rsi < t.rsi_oversold && e.close < e.ma_medium
}

pub fn is_grade_urgent(e: &Evaluation<'_>, t: &GradeThresholds) -> bool {
    e.input.flags.short_anomaly()
        && e.short_increase_above(t.urgent_short_increase)
        && e.rsi > t.urgent_rsi
        && e.change_above(0.0)
        && e.close > e.ma_medium
}

pub fn is_grade_high(e: &Evaluation<'_>, t: &GradeThresholds) -> bool {
    e.input.flags.short_anomaly() && e.rsi > t.rsi_overbought && e.close > e.ma_medium
}

pub const GRADE_RULES: [GradeRule; 5] = [
    GradeRule {
        grade: Grade::Buy(BuyGrade::S),
        predicate: is_grade_s,
    },
    GradeRule {
        grade: Grade::Buy(BuyGrade::A),
        predicate: is_grade_a,
    },
    GradeRule {
        grade: Grade::Buy(BuyGrade::B),
        predicate: is_grade_b,
    },
    GradeRule {
        grade: Grade::Sell(SellGrade::Urgent),
        predicate: is_grade_urgent,
    },
    GradeRule {
        grade: Grade::Sell(SellGrade::High),
        predicate: is_grade_high,
    },
];

/// First matching grade, or `None`.
///
/// Every rule is evaluated so that a BUY and a SELL match on the same input is
/// caught; buy rules require close < MA and sell rules close > MA, so this
/// cannot happen for any thresholds.
pub fn classify(input: &ClassifierInput, thresholds: &GradeThresholds) -> Option<Grade> {
    let eval = Evaluation::new(input)?;

    let matched: Vec<Grade> = GRADE_RULES
        .iter()
        .filter(|rule| (rule.predicate)(&eval, thresholds))
        .map(|rule| rule.grade)
        .collect();

    let has_buy = matched.iter().any(|g| g.direction() == Direction::Buy);
    let has_sell = matched.iter().any(|g| g.direction() == Direction::Sell);
    assert!(
        !(has_buy && has_sell),
        "conflicting BUY and SELL grades for one input: {:?}",
        matched
    );

    matched.first().copied()
}

/// Attaches exit levels to a classification. Sell levels mirror buy levels.
pub fn build_signal(
    code: &str,
    date: NaiveDate,
    input: &ClassifierInput,
    grade: Grade,
    trading: &TradingParams,
) -> Signal {
    let close = input.close;
    let (stop_loss, take_profit) = match grade.direction() {
        Direction::Buy => (
            close * (1.0 + trading.stop_loss_pct),
            close * (1.0 + trading.take_profit_pct),
        ),
        Direction::Sell => (
            close * (1.0 - trading.stop_loss_pct),
            close * (1.0 - trading.take_profit_pct),
        ),
    };

    Signal {
        code: code.to_string(),
        date,
        grade,
        reference_price: close,
        stop_loss,
        take_profit,
        indicators: input.indicators,
        metrics: input.metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anomaly::AnomalyThresholds;
    use approx::assert_abs_diff_eq;

    fn input(
        close: f64,
        rsi: f64,
        ma_medium: f64,
        margin_increase: Option<f64>,
        short_increase: Option<f64>,
        price_change: Option<f64>,
    ) -> ClassifierInput {
        let metrics = AnomalyMetrics {
            margin_increase_pct: margin_increase,
            margin_usage_ratio: Some(0.5),
            short_increase_pct: short_increase,
            short_to_margin_ratio: Some(0.1),
        };
        ClassifierInput {
            close,
            indicators: IndicatorSnapshot {
                rsi: Some(rsi),
                ma_short: None,
                ma_medium: Some(ma_medium),
                ma_long: None,
            },
            metrics,
            flags: metrics.flags(&AnomalyThresholds::default()),
            price_change,
        }
    }

    fn t() -> GradeThresholds {
        GradeThresholds::default()
    }

    #[test]
    fn example_grade_s() {
        let i = input(94.0, 20.0, 100.0, Some(0.16), None, Some(-0.06));
        assert_eq!(classify(&i, &t()), Some(Grade::Buy(BuyGrade::S)));
    }

    #[test]
    fn example_grade_a() {
        let i = input(94.0, 28.0, 100.0, Some(0.11), None, Some(-0.01));
        assert_eq!(classify(&i, &t()), Some(Grade::Buy(BuyGrade::A)));
    }

    #[test]
    fn example_grade_urgent() {
        let i = input(110.0, 80.0, 100.0, None, Some(0.20), Some(0.03));
        assert_eq!(classify(&i, &t()), Some(Grade::Sell(SellGrade::Urgent)));
    }

    #[test]
    fn s_wins_when_a_also_matches() {
        let i = input(94.0, 20.0, 100.0, Some(0.16), None, Some(-0.06));
        let e = Evaluation::new(&i).unwrap();
        assert!(is_grade_s(&e, &t()));
        assert!(is_grade_a(&e, &t()));
        assert!(is_grade_b(&e, &t()));
        assert_eq!(classify(&i, &t()), Some(Grade::Buy(BuyGrade::S)));
    }

    #[test]
    fn grade_b_without_trend() {
        let metrics = AnomalyMetrics {
            margin_usage_ratio: Some(0.9),
            ..Default::default()
        };
        let i = ClassifierInput {
            close: 90.0,
            indicators: IndicatorSnapshot {
                rsi: Some(29.0),
                ma_medium: Some(100.0),
                ..Default::default()
            },
            metrics,
            flags: metrics.flags(&AnomalyThresholds::default()),
            price_change: None,
        };
        assert_eq!(classify(&i, &t()), Some(Grade::Buy(BuyGrade::B)));
    }

    #[test]
    fn grade_high() {
        let i = input(110.0, 72.0, 100.0, None, Some(0.12), Some(0.01));
        assert_eq!(classify(&i, &t()), Some(Grade::Sell(SellGrade::High)));
    }

    #[test]
    fn s_requires_strong_decline() {
        let i = input(94.0, 20.0, 100.0, Some(0.16), None, Some(-0.04));
        let e = Evaluation::new(&i).unwrap();
        assert!(!is_grade_s(&e, &t()));
        assert_eq!(classify(&i, &t()), Some(Grade::Buy(BuyGrade::A)));
    }

    #[test]
    fn a_requires_falling_price() {
        let i = input(94.0, 28.0, 100.0, Some(0.11), None, Some(0.02));
        let e = Evaluation::new(&i).unwrap();
        assert!(!is_grade_a(&e, &t()));
        assert_eq!(classify(&i, &t()), Some(Grade::Buy(BuyGrade::B)));
    }

    #[test]
    fn urgent_requires_rising_price() {
        let i = input(110.0, 80.0, 100.0, None, Some(0.20), Some(-0.01));
        let e = Evaluation::new(&i).unwrap();
        assert!(!is_grade_urgent(&e, &t()));
        assert!(is_grade_high(&e, &t()));
    }

    #[test]
    fn no_anomaly_no_signal() {
        let i = input(94.0, 20.0, 100.0, Some(0.02), Some(0.01), Some(-0.10));
        assert_eq!(classify(&i, &t()), None);
    }

    #[test]
    fn price_above_ma_blocks_buy() {
        let i = input(101.0, 20.0, 100.0, Some(0.16), None, Some(-0.06));
        assert_eq!(classify(&i, &t()), None);
    }

    #[test]
    fn undefined_rsi_excludes_security() {
        let mut i = input(94.0, 20.0, 100.0, Some(0.16), None, Some(-0.06));
        i.indicators.rsi = None;
        assert!(Evaluation::new(&i).is_none());
        assert_eq!(classify(&i, &t()), None);
    }

    #[test]
    fn undefined_ma_excludes_security() {
        let mut i = input(94.0, 20.0, 100.0, Some(0.16), None, Some(-0.06));
        i.indicators.ma_medium = None;
        assert_eq!(classify(&i, &t()), None);
    }

    #[test]
    fn classify_is_pure() {
        let i = input(94.0, 20.0, 100.0, Some(0.16), Some(0.3), Some(-0.06));
        let first = classify(&i, &t());
        for _ in 0..10 {
            assert_eq!(classify(&i, &t()), first);
        }
    }

    #[test]
    fn both_anomalies_still_one_direction() {
        // margin and short anomalies together; price below MA → only buy rules apply
        let i = input(94.0, 20.0, 100.0, Some(0.16), Some(0.30), Some(-0.06));
        assert_eq!(classify(&i, &t()), Some(Grade::Buy(BuyGrade::S)));
    }

    #[test]
    fn rule_table_order() {
        let grades: Vec<Grade> = GRADE_RULES.iter().map(|r| r.grade).collect();
        assert_eq!(
            grades,
            vec![
                Grade::Buy(BuyGrade::S),
                Grade::Buy(BuyGrade::A),
                Grade::Buy(BuyGrade::B),
                Grade::Sell(SellGrade::Urgent),
                Grade::Sell(SellGrade::High),
            ]
        );
    }

    #[test]
    fn build_buy_signal_levels() {
        let i = input(100.0, 20.0, 110.0, Some(0.16), None, Some(-0.06));
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let s = build_signal("2330", date, &i, Grade::Buy(BuyGrade::S), &TradingParams::default());
        assert_eq!(s.code, "2330");
        assert_eq!(s.direction(), Direction::Buy);
        assert_abs_diff_eq!(s.stop_loss, 92.0, epsilon = 1e-9);
        assert_abs_diff_eq!(s.take_profit, 115.0, epsilon = 1e-9);
    }

    #[test]
    fn build_sell_signal_levels_mirror() {
        let i = input(100.0, 80.0, 90.0, None, Some(0.2), Some(0.05));
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let s = build_signal(
            "2330",
            date,
            &i,
            Grade::Sell(SellGrade::Urgent),
            &TradingParams::default(),
        );
        assert_abs_diff_eq!(s.stop_loss, 108.0, epsilon = 1e-9);
        assert_abs_diff_eq!(s.take_profit, 85.0, epsilon = 1e-9);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_both_directions(
                close in 1.0f64..500.0,
                ma in 1.0f64..500.0,
                rsi in 0.0f64..=100.0,
                margin_inc in proptest::option::of(-0.5f64..0.5),
                short_inc in proptest::option::of(-0.5f64..0.5),
                change in proptest::option::of(-0.3f64..0.3),
            ) {
                let i = input(close, rsi, ma, margin_inc, short_inc, change);
                // classify panics on a conflict; a returned grade has one direction
                if let Some(g) = classify(&i, &t()) {
                    match g.direction() {
                        Direction::Buy => prop_assert!(close < ma),
                        Direction::Sell => prop_assert!(close > ma),
                    }
                }
            }
        }
    }
}
