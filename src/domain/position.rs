//! Simulated positions and closed trades.

use chrono::NaiveDate;
use std::fmt;

use super::signal::BuyGrade;

/// Exit reasons, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    HoldingExpired,
    ReverseSignal,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "STOP_LOSS"),
            CloseReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            CloseReason::HoldingExpired => write!(f, "HOLDING_EXPIRED"),
            CloseReason::ReverseSignal => write!(f, "REVERSE_SIGNAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub code: String,
    pub grade: BuyGrade,
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    /// Fraction of portfolio equity committed at entry.
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub deadline: NaiveDate,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.entry_price)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        price <= self.stop_loss
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        price >= self.take_profit
    }

    pub fn holding_expired(&self, date: NaiveDate) -> bool {
        date >= self.deadline
    }

    /// At most one reason, checked as stop-loss, take-profit, deadline, reverse signal.
    pub fn exit_reason(
        &self,
        price: f64,
        date: NaiveDate,
        reverse_signal: bool,
    ) -> Option<CloseReason> {
        if self.should_stop_loss(price) {
            Some(CloseReason::StopLoss)
        } else if self.should_take_profit(price) {
            Some(CloseReason::TakeProfit)
        } else if self.holding_expired(date) {
            Some(CloseReason::HoldingExpired)
        } else if reverse_signal {
            Some(CloseReason::ReverseSignal)
        } else {
            None
        }
    }

    /// Consumes the open position and produces its trade record.
    pub fn close(self, exit_price: f64, exit_date: NaiveDate, reason: CloseReason) -> ClosedTrade {
        ClosedTrade {
            pnl: self.unrealized_pnl(exit_price),
            code: self.code,
            grade: self.grade,
            quantity: self.quantity,
            entry_price: self.entry_price,
            exit_price,
            entry_date: self.entry_date,
            exit_date,
            return_pct: exit_price / self.entry_price - 1.0,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub code: String,
    pub grade: BuyGrade,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub pnl: f64,
    pub return_pct: f64,
    pub reason: CloseReason,
}

impl ClosedTrade {
    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }

    pub fn is_win(&self) -> bool {
        self.return_pct > 0.0
    }
}
