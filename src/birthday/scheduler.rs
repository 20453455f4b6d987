use std::sync::Arc;

use chrono::{Local, NaiveTime, Timelike};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use super::BirthdayNotifier;

/// Starts the daily birthday job.
///
/// The job ticks every minute and triggers a run when birthday messages are enabled and
/// the configured `HH:MM` equals the current local time. The returned scheduler must be
/// kept alive for the job to keep firing.
pub async fn start_scheduler(
    notifier: Arc<BirthdayNotifier>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let notifier = notifier.clone();

        Box::pin(async move {
            run_if_due(&notifier, Local::now().naive_local()).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!("Birthday scheduler started");

    Ok(scheduler)
}

async fn run_if_due(notifier: &BirthdayNotifier, now: chrono::NaiveDateTime) {
    let config = match notifier.notification_config().await {
        Ok(Some(config)) => config,
        Ok(None) => return,
        Err(e) => {
            tracing::error!("Failed to load notification settings: {}", e);
            return;
        }
    };

    if !config.enabled {
        return;
    }

    let Some(raw_time) = config.scheduled_time.as_deref() else {
        return;
    };
    let Some(scheduled) = parse_time_of_day(raw_time) else {
        tracing::warn!(time = raw_time, "Ignoring invalid birthday message time");
        return;
    };

    if !is_due(scheduled, now.time()) {
        return;
    }

    match notifier.process_birthdays(now.date()).await {
        Ok(sent) => tracing::info!(sent, "Scheduled birthday run completed"),
        Err(e) => tracing::error!("Scheduled birthday run failed: {}", e),
    }
}

/// Parse `HH:MM` (seconds are accepted and ignored).
fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn is_due(scheduled: NaiveTime, now: NaiveTime) -> bool {
    scheduled.hour() == now.hour() && scheduled.minute() == now.minute()
}
