pub mod bigquery;
pub mod schema;
pub mod sqlite;

use crate::config::{Config, WarehouseBackend};
use crate::formatter::TimeEntryRow;
use crate::warehouse::bigquery::BigQueryWarehouse;
use crate::warehouse::sqlite::SqliteWarehouse;
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::info;

/// Zone the replace-window bounds are interpreted in.
pub const WAREHOUSE_TIME_ZONE: &str = "Asia/Tokyo";
/// Asia/Tokyo has no daylight saving, so a fixed offset is exact.
const WAREHOUSE_UTC_OFFSET_SECONDS: i32 = 9 * 3600;
const BOUND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Created,
    AlreadyExists,
}

/// Closed interval of wall-clock times in [`WAREHOUSE_TIME_ZONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimestampRange {
    /// `start_date 00:00:00` through `end_date 23:59:59`.
    pub fn for_dates(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        Ok(Self {
            start: start_date
                .and_hms_opt(0, 0, 0)
                .context("Failed to build range start")?,
            end: end_date
                .and_hms_opt(23, 59, 59)
                .context("Failed to build range end")?,
        })
    }

    pub fn start_text(&self) -> String {
        self.start.format(BOUND_FORMAT).to_string()
    }

    pub fn end_text(&self) -> String {
        self.end.format(BOUND_FORMAT).to_string()
    }

    pub fn utc_bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let zone = warehouse_offset()?;
        let to_utc = |naive: &NaiveDateTime| {
            zone.from_local_datetime(naive)
                .single()
                .map(|local| local.with_timezone(&Utc))
                .with_context(|| format!("Failed to convert {naive} to UTC"))
        };

        Ok((to_utc(&self.start)?, to_utc(&self.end)?))
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> Result<bool> {
        let (start, end) = self.utc_bounds()?;
        Ok(start <= *timestamp && *timestamp <= end)
    }
}

fn warehouse_offset() -> Result<FixedOffset> {
    FixedOffset::east_opt(WAREHOUSE_UTC_OFFSET_SECONDS).context("Invalid warehouse UTC offset")
}

/// One warehouse table: lazy creation, ranged delete, append-only load.
pub trait Warehouse {
    fn ensure_table(&self) -> Result<TableStatus>;

    /// Deletes rows whose `column` lies in `range`; returns the count when known.
    fn delete_rows(&self, range: &TimestampRange, column: &str) -> Result<u64>;

    fn append_rows(&self, rows: &[TimeEntryRow]) -> Result<u64>;
}

impl<T: Warehouse + ?Sized> Warehouse for &T {
    fn ensure_table(&self) -> Result<TableStatus> {
        (**self).ensure_table()
    }

    fn delete_rows(&self, range: &TimestampRange, column: &str) -> Result<u64> {
        (**self).delete_rows(range, column)
    }

    fn append_rows(&self, rows: &[TimeEntryRow]) -> Result<u64> {
        (**self).append_rows(rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceOutcome {
    pub deleted: u64,
    pub inserted: u64,
}

/// Replaces every row of a timestamp window with a new set of rows.
pub trait WindowReplacer {
    fn replace_window(
        &self,
        rows: &[TimeEntryRow],
        range: &TimestampRange,
        column: &str,
    ) -> Result<ReplaceOutcome>;
}

impl<T: WindowReplacer + ?Sized> WindowReplacer for &T {
    fn replace_window(
        &self,
        rows: &[TimeEntryRow],
        range: &TimestampRange,
        column: &str,
    ) -> Result<ReplaceOutcome> {
        (**self).replace_window(rows, range, column)
    }
}

/// Delete followed by append. Not atomic: a crash in between leaves the window empty.
pub struct DeleteThenAppend<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse + ?Sized> DeleteThenAppend<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }
}

impl<W: Warehouse + ?Sized> WindowReplacer for DeleteThenAppend<'_, W> {
    fn replace_window(
        &self,
        rows: &[TimeEntryRow],
        range: &TimestampRange,
        column: &str,
    ) -> Result<ReplaceOutcome> {
        let deleted = self.warehouse.delete_rows(range, column)?;
        info!(
            from = %range.start_text(),
            to = %range.end_text(),
            deleted,
            "deleted existing rows"
        );

        let inserted = self.warehouse.append_rows(rows)?;
        info!(inserted, "inserted updated rows");

        Ok(ReplaceOutcome { deleted, inserted })
    }
}

/// The configured warehouse backend.
pub enum Gateway {
    BigQuery(BigQueryWarehouse),
    Sqlite(SqliteWarehouse),
}

impl Gateway {
    pub fn open(config: &Config) -> Result<Self> {
        match config.warehouse_backend {
            WarehouseBackend::BigQuery => Ok(Self::BigQuery(BigQueryWarehouse::new(config)?)),
            WarehouseBackend::Sqlite => Ok(Self::Sqlite(SqliteWarehouse::open(
                &config.sqlite_path,
                &config.sqlite_table_name(),
                config.table_spec(),
            )?)),
        }
    }
}

impl Warehouse for Gateway {
    fn ensure_table(&self) -> Result<TableStatus> {
        match self {
            Self::BigQuery(warehouse) => warehouse.ensure_table(),
            Self::Sqlite(warehouse) => warehouse.ensure_table(),
        }
    }

    fn delete_rows(&self, range: &TimestampRange, column: &str) -> Result<u64> {
        match self {
            Self::BigQuery(warehouse) => warehouse.delete_rows(range, column),
            Self::Sqlite(warehouse) => warehouse.delete_rows(range, column),
        }
    }

    fn append_rows(&self, rows: &[TimeEntryRow]) -> Result<u64> {
        match self {
            Self::BigQuery(warehouse) => warehouse.append_rows(rows),
            Self::Sqlite(warehouse) => warehouse.append_rows(rows),
        }
    }
}

impl WindowReplacer for Gateway {
    fn replace_window(
        &self,
        rows: &[TimeEntryRow],
        range: &TimestampRange,
        column: &str,
    ) -> Result<ReplaceOutcome> {
        match self {
            Self::BigQuery(warehouse) => {
                DeleteThenAppend::new(warehouse).replace_window(rows, range, column)
            }
            Self::Sqlite(warehouse) => warehouse.replace_window(rows, range, column),
        }
    }
}
