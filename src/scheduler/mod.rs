use anyhow::{Context, Result};
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone};
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// First local instant at `time` strictly after `now`.
///
/// A wall-clock time skipped by a DST jump resolves to the following day.
pub fn next_run_after(now: DateTime<Local>, time: NaiveTime) -> Result<DateTime<Local>> {
    let today = now.date_naive();

    (0..=2u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|day| Local.from_local_datetime(&day.and_time(time)).earliest())
        .find(|candidate| *candidate > now)
        .with_context(|| format!("No upcoming sync time found for {time}"))
}

/// Runs `job` once a day at the time `sync_time` yields.
///
/// `sync_time` is consulted on every poll so a changed config applies without a restart.
/// A failed job is logged and the loop keeps going.
pub async fn run_daily<S, F, Fut>(mut sync_time: S, mut job: F) -> Result<()>
where
    S: FnMut() -> Result<NaiveTime>,
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut announced: Option<DateTime<Local>> = None;

    loop {
        let next = match sync_time().and_then(|time| next_run_after(Local::now(), time)) {
            Ok(next) => next,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "could not determine next sync time");
                sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        if announced != Some(next) {
            info!(at = %next.format("%Y-%m-%d %H:%M"), "next sync scheduled");
            announced = Some(next);
        }

        let wait = (next - Local::now()).to_std().unwrap_or_default();
        if wait > POLL_INTERVAL {
            sleep(POLL_INTERVAL).await;
            continue;
        }

        sleep(wait).await;

        let date = next.date_naive();
        info!(date = %date, "scheduled sync starting");
        if let Err(error) = job(date).await {
            error!(error = %format!("{error:#}"), date = %date, "scheduled sync failed");
        }
    }
}
