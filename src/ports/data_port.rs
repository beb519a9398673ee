//! Data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use chrono::NaiveDate;

/// Source of daily bars. Bars are returned in storage order; the engine
/// validates ordering itself.
pub trait DataPort {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, TraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, TraderError>;

    /// First date, last date and bar count, or `None` if the code has no data.
    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TraderError>;
}
