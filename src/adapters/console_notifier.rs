//! Console notification adapter.
//!
//! Renders the day's signals as prioritized text messages (buy summary, buy
//! details for S and A grades, sell alert, daily summary) and writes them to
//! any `Write` sink, stdout by default.

use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

use chrono::NaiveDate;
use tracing::info;

use crate::domain::error::TraderError;
use crate::domain::signal::{BuyGrade, Grade, SellGrade, Signal};
use crate::ports::notification_port::NotificationPort;

/// Longest message body delivered in one piece.
pub const MAX_MESSAGE_LEN: usize = 4000;
const TRUNCATION_NOTE: &str = "\n... message truncated, see the full report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal,
    High,
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Normal => write!(f, "NORMAL"),
            Priority::High => write!(f, "HIGH"),
            Priority::Urgent => write!(f, "URGENT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub priority: Priority,
    pub text: String,
}

impl Message {
    fn new(priority: Priority, text: String) -> Self {
        Message {
            priority,
            text: truncate_message(&text, MAX_MESSAGE_LEN),
        }
    }
}

/// Cuts `text` to at most `limit` characters, appending a note when cut.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(TRUNCATION_NOTE.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_NOTE);
    out
}

fn pct(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{:+.1}%", x * 100.0))
}

fn rsi(s: &Signal) -> String {
    s.indicators
        .rsi
        .map_or_else(|| "n/a".to_string(), |r| format!("{:.1}", r))
}

fn count_grade(signals: &[&Signal], grade: Grade) -> usize {
    signals.iter().filter(|s| s.grade == grade).count()
}

/// Summary of the day's BUY signals plus, when any exist, details of the S
/// and A grades.
pub fn buy_messages(date: NaiveDate, signals: &[Signal], holding_days: i64) -> Vec<Message> {
    let buys: Vec<&Signal> = signals.iter().filter(|s| s.is_buy()).collect();
    if buys.is_empty() {
        return Vec::new();
    }

    let mut summary = String::new();
    summary.push_str(&format!("Margin momentum BUY signals for {}\n", date));
    summary.push_str(&format!("Found: {}\n", buys.len()));
    summary.push_str(&format!(
        "S grade: {}\n",
        count_grade(&buys, Grade::Buy(BuyGrade::S))
    ));
    summary.push_str(&format!(
        "A grade: {}\n",
        count_grade(&buys, Grade::Buy(BuyGrade::A))
    ));
    summary.push_str(&format!(
        "B grade: {}",
        count_grade(&buys, Grade::Buy(BuyGrade::B))
    ));
    let mut messages = vec![Message::new(Priority::Normal, summary)];

    let top: Vec<&&Signal> = buys
        .iter()
        .filter(|s| matches!(s.grade, Grade::Buy(BuyGrade::S | BuyGrade::A)))
        .collect();
    if !top.is_empty() {
        let mut detail = String::from("High-priority BUY details\n");
        for s in top {
            detail.push_str(&format!("\n[{}] {}\n", s.grade, s.code));
            detail.push_str(&format!("  close: {:.2}\n", s.reference_price));
            detail.push_str(&format!("  RSI: {}\n", rsi(s)));
            detail.push_str(&format!(
                "  margin increase: {}\n",
                pct(s.metrics.margin_increase_pct)
            ));
            detail.push_str(&format!("  take profit: {:.2}\n", s.take_profit));
            detail.push_str(&format!("  stop loss: {:.2}\n", s.stop_loss));
            detail.push_str(&format!("  hold: {} days\n", holding_days));
        }
        messages.push(Message::new(Priority::High, detail.trim_end().to_string()));
    }

    messages
}

pub fn sell_message(signals: &[Signal]) -> Option<Message> {
    let sells: Vec<&Signal> = signals.iter().filter(|s| s.is_sell()).collect();
    if sells.is_empty() {
        return None;
    }
    let urgent: Vec<&&Signal> = sells
        .iter()
        .filter(|s| s.grade == Grade::Sell(SellGrade::Urgent))
        .collect();

    let mut text = String::from("Short-balance anomaly: SELL alert\n");
    text.push_str(&format!(
        "{} SELL signals, {} URGENT\n",
        sells.len(),
        urgent.len()
    ));
    for s in urgent {
        text.push_str(&format!(
            "\n{}  RSI {}  close {:.2}  short increase {}\n",
            s.code,
            rsi(s),
            s.reference_price,
            pct(s.metrics.short_increase_pct)
        ));
    }
    Some(Message::new(Priority::Urgent, text.trim_end().to_string()))
}

pub fn daily_summary(date: NaiveDate, signals: &[Signal]) -> Message {
    let buys = signals.iter().filter(|s| s.is_buy()).count();
    let sells = signals.len() - buys;

    let mut text = String::new();
    text.push_str(&format!("Margin momentum daily report {}\n", date));
    text.push_str(&format!("BUY: {}\n", buys));
    text.push_str(&format!("SELL: {}\n", sells));
    text.push_str(&format!("Total: {}\n", signals.len()));

    let top: Vec<&Signal> = signals
        .iter()
        .filter(|s| s.grade == Grade::Buy(BuyGrade::S))
        .take(3)
        .collect();
    if !top.is_empty() {
        text.push_str("\nTop S-grade opportunities\n");
        for s in top {
            text.push_str(&format!(
                "  {}: {:.2} (target {:.2})\n",
                s.code, s.reference_price, s.take_profit
            ));
        }
    }
    text.push_str("\nRespect the stop-loss.");
    Message::new(Priority::Normal, text)
}

/// Every message for one day, in delivery order.
pub fn render(date: NaiveDate, signals: &[Signal], holding_days: i64) -> Vec<Message> {
    let mut messages = buy_messages(date, signals, holding_days);
    messages.extend(sell_message(signals));
    messages.push(daily_summary(date, signals));
    messages
}

pub struct ConsoleNotifier<W: Write> {
    out: Mutex<W>,
    holding_days: i64,
}

impl ConsoleNotifier<io::Stdout> {
    pub fn stdout(holding_days: i64) -> Self {
        Self::new(io::stdout(), holding_days)
    }
}

impl<W: Write> ConsoleNotifier<W> {
    pub fn new(out: W, holding_days: i64) -> Self {
        Self {
            out: Mutex::new(out),
            holding_days,
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write> NotificationPort for ConsoleNotifier<W> {
    fn notify(&self, date: NaiveDate, signals: &[Signal]) -> Result<(), TraderError> {
        let messages = render(date, signals, self.holding_days);
        let mut out = self.out.lock().map_err(|_| TraderError::Notification {
            reason: "output lock poisoned".into(),
        })?;

        let delivery = |out: &mut W| -> io::Result<()> {
            for message in &messages {
                match message.priority {
                    Priority::Normal => writeln!(out, "{}", message.text)?,
                    p => writeln!(out, "[{}] {}", p, message.text)?,
                }
                writeln!(out)?;
            }
            out.flush()
        };
        delivery(&mut out).map_err(|e| TraderError::Notification {
            reason: e.to_string(),
        })?;

        info!(%date, messages = messages.len(), signals = signals.len(), "notifications delivered");
        Ok(())
    }
}
