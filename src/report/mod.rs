pub mod toggl;

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// One detailed-report entry exactly as the reporting service returned it.
pub type RawEntry = Map<String, Value>;

/// Source of raw time entries for a list of calendar dates.
pub trait ReportSource {
    /// Entries for every date in `dates`, concatenated in date order.
    fn detailed_report(&self, dates: &[NaiveDate]) -> Result<Vec<RawEntry>>;
}

impl<T: ReportSource + ?Sized> ReportSource for &T {
    fn detailed_report(&self, dates: &[NaiveDate]) -> Result<Vec<RawEntry>> {
        (**self).detailed_report(dates)
    }
}
