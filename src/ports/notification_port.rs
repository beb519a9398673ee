//! Signal delivery port trait.

use crate::domain::error::TraderError;
use crate::domain::signal::Signal;
use chrono::NaiveDate;

pub trait NotificationPort {
    /// Delivers the signals generated for `date`, already filtered and ranked.
    fn notify(&self, date: NaiveDate, signals: &[Signal]) -> Result<(), TraderError>;
}
