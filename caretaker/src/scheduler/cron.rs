use anyhow::{anyhow, Result};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};

use super::{FireEvent, Trigger};

/// Converts cron firings into [`FireEvent`]s
pub struct CronTrigger {
    scheduler: JobScheduler,
    timezone: Tz,
    events: mpsc::Sender<FireEvent>,
    scheduled_count: usize,
}

impl CronTrigger {
    pub async fn new(timezone: Tz, events: mpsc::Sender<FireEvent>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        Ok(Self {
            scheduler,
            timezone,
            events,
            scheduled_count: 0,
        })
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled_count
    }

    #[instrument(skip(self))]
    pub async fn schedule(&mut self, task_id: &str, schedule: &str) -> Result<()> {
        validate_6_field_cron(schedule)
            .map_err(|e| anyhow!("Invalid 6-field cron schedule '{}': {}", schedule, e))?;

        let events = self.events.clone();
        let task_id_owned = task_id.to_string();

        let job = Job::new_async_tz(schedule, self.timezone, move |_uuid, _scheduler| {
            let events = events.clone();
            let task_id = task_id_owned.clone();

            Box::pin(async move {
                info!("Schedule fired for {}", task_id);
                if let Err(e) = events.send(FireEvent::new(task_id.clone(), Trigger::Schedule)).await {
                    error!("Engine is not receiving events, dropped firing of {}: {}", task_id, e);
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create job for '{}': {}", schedule, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add job for {} to scheduler: {}", task_id, e))?;

        self.scheduled_count += 1;
        info!("Scheduled {}: {} ({})", task_id, schedule, self.timezone);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        if self.scheduled_count == 0 {
            warn!("No scheduled jobs configured - cron trigger not started");
            return Ok(());
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;
        info!("Cron trigger started with {} jobs", self.scheduled_count);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| anyhow!("Failed to stop scheduler: {}", e))
    }
}

/// tokio-cron-scheduler expects `sec min hour day month dow`
pub fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();

    if parts.len() != 6 {
        return Err(anyhow!(
            "expected 6 fields (second minute hour day month dayofweek), got {} in '{}'",
            parts.len(),
            schedule
        ));
    }

    validate_cron_field(parts[0], "second", 0, 59, &[])?;
    validate_cron_field(parts[1], "minute", 0, 59, &[])?;
    validate_cron_field(parts[2], "hour", 0, 23, &[])?;
    validate_cron_field(parts[3], "day", 1, 31, &[])?;
    validate_cron_field(parts[4], "month", 1, 12, MONTH_NAMES)?;
    validate_cron_field(parts[5], "dayofweek", 0, 7, WEEKDAY_NAMES)?;

    Ok(())
}

const MONTH_NAMES: &[(&str, u32)] = &[
    ("JAN", 1),
    ("FEB", 2),
    ("MAR", 3),
    ("APR", 4),
    ("MAY", 5),
    ("JUN", 6),
    ("JUL", 7),
    ("AUG", 8),
    ("SEP", 9),
    ("OCT", 10),
    ("NOV", 11),
    ("DEC", 12),
];

const WEEKDAY_NAMES: &[(&str, u32)] = &[
    ("SUN", 0),
    ("MON", 1),
    ("TUE", 2),
    ("WED", 3),
    ("THU", 4),
    ("FRI", 5),
    ("SAT", 6),
];

/// Accepts `*`, `?`, values, names, `a-b` ranges and `/step` on any of
/// `*`, a range or a single start value, comma separated
fn validate_cron_field(
    field: &str,
    name: &str,
    min: u32,
    max: u32,
    names: &[(&str, u32)],
) -> Result<()> {
    for part in field.split(',') {
        let (base, step) = match part.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (part, None),
        };

        if let Some(step) = step {
            let step = step
                .parse::<u32>()
                .map_err(|_| anyhow!("Invalid {} step value: {}", name, step))?;
            if step == 0 {
                return Err(anyhow!("{} step value cannot be 0", name));
            }
        }

        if base == "*" || base == "?" {
            continue;
        }

        if let Some((start, end)) = base.split_once('-') {
            let start = cron_value(start, name, names)?;
            let end = cron_value(end, name, names)?;
            if start < min || end > max || start > end {
                return Err(anyhow!(
                    "{} range {}-{} is outside valid range {}-{}",
                    name, start, end, min, max
                ));
            }
            continue;
        }

        let value = cron_value(base, name, names)?;
        if value < min || value > max {
            return Err(anyhow!(
                "{} value {} is outside valid range {}-{}",
                name, value, min, max
            ));
        }
    }

    Ok(())
}

fn cron_value(token: &str, name: &str, names: &[(&str, u32)]) -> Result<u32> {
    if let Ok(value) = token.parse::<u32>() {
        return Ok(value);
    }
    names
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(token))
        .map(|(_, value)| *value)
        .ok_or_else(|| anyhow!("Invalid {} value: {}", name, token))
}
