//! Graded trading signals.

use chrono::NaiveDate;
use std::fmt;

use super::anomaly::AnomalyMetrics;
use super::indicator::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuyGrade {
    S,
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SellGrade {
    Urgent,
    High,
}

/// A grade is tied to its direction, so a BUY can never carry a SELL tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
    Buy(BuyGrade),
    Sell(SellGrade),
}

impl Grade {
    pub fn direction(&self) -> Direction {
        match self {
            Grade::Buy(_) => Direction::Buy,
            Grade::Sell(_) => Direction::Sell,
        }
    }

    /// S, A, B, URGENT, HIGH → 0..=4.
    pub fn rank(&self) -> u8 {
        match self {
            Grade::Buy(BuyGrade::S) => 0,
            Grade::Buy(BuyGrade::A) => 1,
            Grade::Buy(BuyGrade::B) => 2,
            Grade::Sell(SellGrade::Urgent) => 3,
            Grade::Sell(SellGrade::High) => 4,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

impl fmt::Display for BuyGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuyGrade::S => write!(f, "S"),
            BuyGrade::A => write!(f, "A"),
            BuyGrade::B => write!(f, "B"),
        }
    }
}

impl fmt::Display for SellGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SellGrade::Urgent => write!(f, "URGENT"),
            SellGrade::High => write!(f, "HIGH"),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Buy(g) => g.fmt(f),
            Grade::Sell(g) => g.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub code: String,
    pub date: NaiveDate,
    pub grade: Grade,
    pub reference_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub indicators: IndicatorSnapshot,
    pub metrics: AnomalyMetrics,
}

impl Signal {
    pub fn direction(&self) -> Direction {
        self.grade.direction()
    }

    pub fn buy_grade(&self) -> Option<BuyGrade> {
        match self.grade {
            Grade::Buy(g) => Some(g),
            Grade::Sell(_) => None,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.direction() == Direction::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.direction() == Direction::Sell
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceFilter {
    pub min_price: f64,
    pub max_price: f64,
}

impl Default for PriceFilter {
    fn default() -> Self {
        PriceFilter {
            min_price: 10.0,
            max_price: 500.0,
        }
    }
}

impl PriceFilter {
    pub fn accepts(&self, price: f64) -> bool {
        price >= self.min_price && price <= self.max_price
    }
}

/// Drops signals priced outside the filter band and orders the rest by grade
/// rank, then code.
pub fn filter_and_rank(mut signals: Vec<Signal>, filter: &PriceFilter) -> Vec<Signal> {
    signals.retain(|s| filter.accepts(s.reference_price));
    signals.sort_by(|a, b| {
        a.grade
            .rank()
            .cmp(&b.grade.rank())
            .then_with(|| a.code.cmp(&b.code))
    });
    signals
}
