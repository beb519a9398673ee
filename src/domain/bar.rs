//! Daily bar combining price and financing balances.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub code: String,
    pub date: NaiveDate,
    pub close: f64,
    pub volume: i64,
    pub margin_balance: f64,
    pub margin_limit: f64,
    pub short_balance: f64,
}

impl Bar {
    /// close > 0 and every balance finite and non-negative.
    pub fn is_well_formed(&self) -> bool {
        self.close.is_finite()
            && self.close > 0.0
            && [self.margin_balance, self.margin_limit, self.short_balance]
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0)
    }
}
