use crate::config::Config;
use crate::error::{JobError, PipelineError, Stage};
use crate::formatter::{self, TimeEntryRow};
use crate::notifier::Notifier;
use crate::report::ReportSource;
use crate::warehouse::{TableStatus, TimestampRange, Warehouse, WindowReplacer};
use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{error, info, warn};

const MESSAGE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Trailing calendar dates ending at "today", oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    dates: Vec<NaiveDate>,
}

impl DateWindow {
    pub fn trailing(today: NaiveDate, days: u32) -> Result<Self> {
        if days == 0 {
            bail!("rolling window needs at least one day");
        }

        let dates = (0..i64::from(days))
            .rev()
            .map(|offset| {
                today
                    .checked_sub_signed(Duration::days(offset))
                    .with_context(|| format!("Date out of range: {today} - {offset} days"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { dates })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn start_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn end_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    pub fn timestamp_range(&self) -> Result<TimestampRange> {
        TimestampRange::for_dates(self.start_date(), self.end_date())
    }
}

#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub window: DateWindow,
    pub fetched: usize,
    pub formatted: usize,
    pub dropped: usize,
    pub table_status: TableStatus,
    pub deleted: u64,
    pub inserted: u64,
}

/// INIT → FETCH → FORMAT → ENSURE_TABLE → REPLACE_WINDOW.
///
/// Any error stops the run and is returned tagged with the stage it came from.
/// `connect` runs inside FETCH, so a failed workspace lookup is a fetch failure.
pub fn run_sync<C, S, G>(
    config: &Config,
    today: NaiveDate,
    connect: C,
    gateway: &G,
) -> Result<SyncSummary, PipelineError>
where
    C: FnOnce() -> Result<S>,
    S: ReportSource,
    G: Warehouse + WindowReplacer + ?Sized,
{
    let window = DateWindow::trailing(today, config.rollback_days)
        .map_err(|error| PipelineError::new(Stage::Init, error))?;
    let range = window
        .timestamp_range()
        .map_err(|error| PipelineError::new(Stage::Init, error))?;

    info!(
        from = %window.start_date(),
        to = %window.end_date(),
        days = window.dates().len(),
        "starting sync"
    );

    let raw = connect()
        .and_then(|source| source.detailed_report(window.dates()))
        .map_err(|error| PipelineError::new(Stage::Fetch, error))?;

    let formatted =
        formatter::format_entries(&raw).map_err(|error| PipelineError::new(Stage::Format, error))?;
    let formatted_count = formatted.len();
    let rows = rows_within(formatted, &range, config.timestamp_column())
        .map_err(|error| PipelineError::new(Stage::Format, error))?;
    let dropped = formatted_count - rows.len();

    if dropped > 0 {
        warn!(
            dropped,
            column = config.timestamp_column(),
            "dropped rows outside the sync window"
        );
    }

    let table_status = gateway
        .ensure_table()
        .map_err(|error| PipelineError::new(Stage::EnsureTable, error))?;

    let outcome = gateway
        .replace_window(&rows, &range, config.timestamp_column())
        .map_err(|error| PipelineError::new(Stage::ReplaceWindow, error))?;

    Ok(SyncSummary {
        window,
        fetched: raw.len(),
        formatted: formatted_count,
        dropped,
        table_status,
        deleted: outcome.deleted,
        inserted: outcome.inserted,
    })
}

fn rows_within(
    rows: Vec<TimeEntryRow>,
    range: &TimestampRange,
    column: &str,
) -> Result<Vec<TimeEntryRow>> {
    rows.into_iter()
        .map(|row| -> Result<Option<TimeEntryRow>> {
            let timestamp = row
                .timestamp(column)
                .with_context(|| format!("`{column}` is not a timestamp column of the row"))?;
            Ok(range.contains(&timestamp)?.then_some(row))
        })
        .filter_map(|row| row.transpose())
        .collect()
}

pub fn failure_message(now: NaiveDateTime, error: &PipelineError) -> String {
    format!(
        "{} {}",
        now.format(MESSAGE_TIMESTAMP_FORMAT),
        error.summary()
    )
}

/// Sync, and on failure post exactly one message to the failure channel.
pub fn run_job<Clock, C, S, G, O>(
    config: &Config,
    clock: Clock,
    notifier: &dyn Notifier,
    connect: C,
    open_gateway: O,
) -> Result<SyncSummary, JobError>
where
    Clock: Fn() -> NaiveDateTime,
    C: FnOnce() -> Result<S>,
    S: ReportSource,
    O: FnOnce() -> Result<G>,
    G: Warehouse + WindowReplacer,
{
    let today = clock().date();
    let result = open_gateway()
        .map_err(|error| PipelineError::new(Stage::Init, error))
        .and_then(|gateway| run_sync(config, today, connect, &gateway));

    let sync_error = match result {
        Ok(summary) => return Ok(summary),
        Err(sync_error) => sync_error,
    };

    error!(stage = %sync_error.stage, error = %sync_error.summary(), "sync failed");

    let message = failure_message(clock(), &sync_error);
    match notifier.send_message(&config.failure_channel, &message) {
        Ok(()) => Err(JobError::Sync(sync_error)),
        Err(notify) => Err(JobError::Notify {
            sync: sync_error,
            notify,
        }),
    }
}
