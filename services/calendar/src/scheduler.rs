//! Hourly trigger for the finalization job.
use crate::ledger::FinalizationJob;
use chrono::{NaiveDateTime, Timelike};
use std::time::Duration;
use tokio::task::JoinHandle;

const HOUR: Duration = Duration::from_secs(3600);

/// Time from `now` until the next `hh:minute:00`, strictly in the future.
pub fn delay_until_next_run(now: NaiveDateTime, minute: u32) -> Duration {
    let into_hour = Duration::new(
        u64::from(now.minute() * 60 + now.second()),
        now.nanosecond() % 1_000_000_000,
    );
    let target = Duration::from_secs(u64::from(minute.min(59)) * 60);
    if into_hour < target {
        target - into_hour
    } else {
        HOUR - into_hour + target
    }
}

/// Runs `job` at `minute` past every hour, local time, until aborted.
pub fn spawn_finalization_task(job: FinalizationJob, minute: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delay = delay_until_next_run(chrono::Local::now().naive_local(), minute);
            tracing::debug!(delay_secs = delay.as_secs(), "next finalization scheduled");
            tokio::time::sleep(delay).await;
            if let Err(err) = job.run(chrono::Local::now().naive_local()).await {
                tracing::error!(error = %err, "finalization pass failed");
            }
        }
    })
}
