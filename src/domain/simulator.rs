//! Position simulation for backtests.
//!
//! One call to [`PositionSimulator::step`] is one trading day:
//! 1. Exit pass over open positions (ascending code)
//! 2. Entry pass over the day's BUY signals (grade S, A, B, then code)
//! 3. Equity recorded at the day's closes
//!
//! Signals that cannot be filled are recorded as dropped, never carried over.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use super::portfolio::Portfolio;
use super::position::{ClosedTrade, Position};
use super::signal::{BuyGrade, Signal};

#[derive(Debug, Clone, PartialEq)]
pub struct TradingParams {
    /// Calendar days after entry at which a position is force-closed.
    pub holding_days: i64,
    /// Negative fraction, e.g. -0.08.
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_holdings: usize,
    /// Largest fraction of equity one position may take at entry.
    pub max_position_size: f64,
    /// Largest fraction of equity invested across all positions.
    pub total_position_limit: f64,
}

impl Default for TradingParams {
    fn default() -> Self {
        TradingParams {
            holding_days: 5,
            stop_loss_pct: -0.08,
            take_profit_pct: 0.15,
            max_holdings: 10,
            max_position_size: 0.10,
            total_position_limit: 0.80,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MaxHoldings,
    InsufficientCapital,
    AlreadyHeld,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedSignal {
    pub code: String,
    pub date: NaiveDate,
    pub grade: BuyGrade,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaySummary {
    pub exits: Vec<ClosedTrade>,
    pub entries: Vec<String>,
    pub dropped: usize,
}

pub struct PositionSimulator {
    params: TradingParams,
    portfolio: Portfolio,
    last_prices: HashMap<String, f64>,
    dropped: Vec<DroppedSignal>,
    last_date: Option<NaiveDate>,
}

impl PositionSimulator {
    pub fn new(initial_capital: f64, params: TradingParams) -> Self {
        PositionSimulator {
            params,
            portfolio: Portfolio::new(initial_capital),
            last_prices: HashMap::new(),
            dropped: Vec::new(),
            last_date: None,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn dropped(&self) -> &[DroppedSignal] {
        &self.dropped
    }

    /// Simulates one day. Days must be supplied in strictly ascending order;
    /// a repeated or earlier date is ignored.
    pub fn step(
        &mut self,
        date: NaiveDate,
        prices: &HashMap<String, f64>,
        signals: &[Signal],
    ) -> DaySummary {
        if self.last_date.is_some_and(|last| date <= last) {
            debug!(%date, "ignoring out-of-order simulation day");
            return DaySummary::default();
        }
        self.last_date = Some(date);

        for (code, price) in prices {
            self.last_prices.insert(code.clone(), *price);
        }

        let mut summary = DaySummary {
            exits: self.exit_pass(date, prices, signals),
            ..Default::default()
        };
        let dropped_before = self.dropped.len();
        summary.entries = self.entry_pass(date, prices, signals);
        summary.dropped = self.dropped.len() - dropped_before;

        let equity = self.portfolio.total_equity(&self.last_prices);
        self.portfolio.record_equity(date, equity);
        summary
    }

    fn exit_pass(
        &mut self,
        date: NaiveDate,
        prices: &HashMap<String, f64>,
        signals: &[Signal],
    ) -> Vec<ClosedTrade> {
        let exits: Vec<(String, f64, _)> = self
            .portfolio
            .positions
            .values()
            .filter_map(|pos| {
                let price = *prices.get(&pos.code)?;
                let reverse = signals.iter().any(|s| s.code == pos.code && s.is_sell());
                pos.exit_reason(price, date, reverse)
                    .map(|reason| (pos.code.clone(), price, reason))
            })
            .collect();

        let mut closed = Vec::with_capacity(exits.len());
        for (code, price, reason) in exits {
            let Some(position) = self.portfolio.remove_position(&code) else {
                continue;
            };
            let trade = position.close(price, date, reason);
            self.portfolio.cash += trade.quantity as f64 * trade.exit_price;
            debug!(
                code = %trade.code,
                %date,
                reason = %trade.reason,
                return_pct = trade.return_pct,
                "position closed"
            );
            self.portfolio.record_trade(trade.clone());
            closed.push(trade);
        }
        closed
    }

    fn entry_pass(
        &mut self,
        date: NaiveDate,
        prices: &HashMap<String, f64>,
        signals: &[Signal],
    ) -> Vec<String> {
        let mut buys: Vec<(BuyGrade, &Signal)> = signals
            .iter()
            .filter_map(|s| s.buy_grade().map(|g| (g, s)))
            .collect();
        buys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.code.cmp(&b.1.code)));

        let equity = self.portfolio.total_equity(&self.last_prices);
        let mut invested = self.portfolio.invested_value(&self.last_prices);
        let mut entered = Vec::new();

        for (grade, signal) in buys {
            let reason = if self.portfolio.has_position(&signal.code) {
                Some(DropReason::AlreadyHeld)
            } else if self.portfolio.position_count() >= self.params.max_holdings {
                Some(DropReason::MaxHoldings)
            } else {
                None
            };
            if let Some(reason) = reason {
                self.drop_signal(signal, grade, date, reason);
                continue;
            }

            let price = prices
                .get(&signal.code)
                .copied()
                .unwrap_or(signal.reference_price);
            let room = self.params.total_position_limit * equity - invested;
            let notional = (self.params.max_position_size * equity)
                .min(self.portfolio.cash)
                .min(room);
            let quantity = if notional > 0.0 && price > 0.0 {
                (notional / price).floor() as i64
            } else {
                0
            };
            if quantity <= 0 {
                self.drop_signal(signal, grade, date, DropReason::InsufficientCapital);
                continue;
            }

            let cost = quantity as f64 * price;
            self.portfolio.cash -= cost;
            invested += cost;

            let position = Position {
                code: signal.code.clone(),
                grade,
                quantity,
                entry_price: price,
                entry_date: date,
                size: cost / equity,
                stop_loss: price * (1.0 + self.params.stop_loss_pct),
                take_profit: price * (1.0 + self.params.take_profit_pct),
                deadline: date + chrono::Duration::days(self.params.holding_days),
            };
            debug!(code = %position.code, %date, %grade, quantity, price, "position opened");
            entered.push(position.code.clone());
            self.portfolio.add_position(position);
        }

        entered
    }

    fn drop_signal(&mut self, signal: &Signal, grade: BuyGrade, date: NaiveDate, reason: DropReason) {
        debug!(code = %signal.code, %date, %grade, ?reason, "signal dropped");
        self.dropped.push(DroppedSignal {
            code: signal.code.clone(),
            date,
            grade,
            reason,
        });
    }

    pub fn finish(self) -> (Portfolio, Vec<DroppedSignal>) {
        (self.portfolio, self.dropped)
    }
}
