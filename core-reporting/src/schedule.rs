// =====================================================================================
// File: core-reporting/src/schedule.rs
// Description: Cron-driven report and digest schedules
// =====================================================================================

use crate::notification::NotificationService;
use crate::weekly::WeeklyReportService;
use crate::{ReportingError, ReportingResult};
use chrono::{DateTime, FixedOffset, Utc};
use core_utils::Validate;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A named cron schedule with its timezone, the first-class counterpart of
/// the per-feed cadence carried by `ThreatFeed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSchedule {
    pub id: Uuid,
    pub name: String,
    pub cron_expression: String,
    pub timezone_offset: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportSchedule {
    pub fn create(name: &str, cron_expression: &str, timezone_offset: &str) -> ReportingResult<Self> {
        Validate::not_empty(name, "name")?;
        Schedule::from_str(cron_expression)
            .map_err(|e| ReportingError::Schedule(format!("cron '{}': {}", cron_expression, e)))?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            cron_expression: cron_expression.to_string(),
            timezone_offset: timezone_offset.to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Next fire time after `now` in the schedule's timezone.
    pub fn next_fire(&self, now: DateTime<Utc>, tz: FixedOffset) -> ReportingResult<DateTime<Utc>> {
        let schedule = Schedule::from_str(&self.cron_expression)
            .map_err(|e| ReportingError::Schedule(e.to_string()))?;
        schedule
            .after(&now.with_timezone(&tz))
            .next()
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| ReportingError::Schedule("no upcoming fire time".to_string()))
    }
}

/// Installs the weekly-report and daily-digest timers.
pub struct ReportScheduleService {
    weekly: Arc<WeeklyReportService>,
    notifications: Arc<NotificationService>,
    weekly_schedule: ReportSchedule,
    digest_schedule: ReportSchedule,
    timezone: FixedOffset,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl ReportScheduleService {
    pub fn new(
        weekly: Arc<WeeklyReportService>,
        notifications: Arc<NotificationService>,
        weekly_cron: &str,
        digest_send_time: &str,
        timezone_offset: &str,
        timezone: FixedOffset,
    ) -> ReportingResult<Self> {
        let weekly_schedule =
            ReportSchedule::create("ciso-weekly-report", weekly_cron, timezone_offset)?;
        let digest_schedule = ReportSchedule::create(
            "high-risk-daily-digest",
            &digest_cron(digest_send_time)?,
            timezone_offset,
        )?;

        Ok(Self {
            weekly,
            notifications,
            weekly_schedule,
            digest_schedule,
            timezone,
            jobs: Mutex::new(Vec::new()),
        })
    }

    /// Spawn both timer loops.
    pub async fn start(&self) {
        let mut jobs = self.jobs.lock().await;

        let weekly = Arc::clone(&self.weekly);
        let weekly_schedule = self.weekly_schedule.clone();
        let tz = self.timezone;
        jobs.push(tokio::spawn(async move {
            run_schedule(weekly_schedule, tz, move || {
                let weekly = Arc::clone(&weekly);
                async move {
                    if let Err(e) = weekly.generate(Utc::now()).await {
                        error!(error = %e, "Weekly report generation failed");
                    }
                }
            })
            .await;
        }));

        let notifications = Arc::clone(&self.notifications);
        let digest_schedule = self.digest_schedule.clone();
        jobs.push(tokio::spawn(async move {
            run_schedule(digest_schedule, tz, move || {
                let notifications = Arc::clone(&notifications);
                async move {
                    let today = Utc::now().with_timezone(&tz).date_naive();
                    if let Err(e) = notifications.send_daily_digest(today).await {
                        error!(error = %e, "Daily digest dispatch failed");
                    }
                }
            })
            .await;
        }));

        info!(
            weekly_cron = %self.weekly_schedule.cron_expression,
            digest_cron = %self.digest_schedule.cron_expression,
            "Report schedules installed"
        );
    }

    /// Abort the timer loops.
    pub async fn stop(&self) {
        let mut jobs = self.jobs.lock().await;
        for job in jobs.drain(..) {
            job.abort();
        }
        info!("Report schedules stopped");
    }
}

/// Generic cron loop: sleep until the next fire, run the callback, repeat.
async fn run_schedule<F, Fut>(schedule: ReportSchedule, tz: FixedOffset, mut callback: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        let next = match schedule.next_fire(Utc::now(), tz) {
            Ok(next) => next,
            Err(e) => {
                error!(schedule = %schedule.name, error = %e, "Schedule computation failed");
                return;
            }
        };

        let wait = match (next - Utc::now()).to_std() {
            Ok(wait) => wait,
            Err(_) => std::time::Duration::from_secs(1),
        };
        info!(schedule = %schedule.name, next = %next, "Next fire computed");
        tokio::time::sleep(wait).await;

        if !schedule.enabled {
            warn!(schedule = %schedule.name, "Schedule disabled, loop exiting");
            return;
        }
        callback().await;
    }
}

/// Translate "HH:MM" into a daily cron expression.
fn digest_cron(send_time: &str) -> ReportingResult<String> {
    let (hours, minutes) = send_time
        .split_once(':')
        .ok_or_else(|| ReportingError::Schedule(format!("bad send time '{}'", send_time)))?;
    let hours: u8 = hours
        .parse()
        .map_err(|_| ReportingError::Schedule(format!("bad hour in '{}'", send_time)))?;
    let minutes: u8 = minutes
        .parse()
        .map_err(|_| ReportingError::Schedule(format!("bad minute in '{}'", send_time)))?;
    if hours > 23 || minutes > 59 {
        return Err(ReportingError::Schedule(format!(
            "send time out of range: '{}'",
            send_time
        )));
    }
    Ok(format!("0 {} {} * * *", minutes, hours))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_rejects_bad_cron() {
        assert!(ReportSchedule::create("weekly", "not a cron", "+00:00").is_err());
        assert!(ReportSchedule::create("weekly", "0 0 9 * * Mon", "+00:00").is_ok());
    }

    #[test]
    fn test_digest_cron_translation() {
        assert_eq!(digest_cron("08:00").unwrap(), "0 0 8 * * *");
        assert_eq!(digest_cron("17:45").unwrap(), "0 45 17 * * *");
        assert!(digest_cron("25:00").is_err());
        assert!(digest_cron("bogus").is_err());
    }

    #[test]
    fn test_next_fire_is_monday_morning() {
        let schedule = ReportSchedule::create("weekly", "0 0 9 * * Mon", "+00:00").unwrap();
        let tz = FixedOffset::east_opt(0).unwrap();
        // Wednesday 2024-03-13.
        let now = DateTime::parse_from_rfc3339("2024-03-13T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let next = schedule.next_fire(now, tz).unwrap();
        assert_eq!(
            next,
            DateTime::parse_from_rfc3339("2024-03-18T09:00:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn test_next_fire_respects_timezone() {
        let schedule = ReportSchedule::create("weekly", "0 0 9 * * Mon", "+08:00").unwrap();
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = DateTime::parse_from_rfc3339("2024-03-13T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        // Monday 09:00 in +08:00 is 01:00 UTC.
        let next = schedule.next_fire(now, tz).unwrap();
        assert_eq!(
            next,
            DateTime::parse_from_rfc3339("2024-03-18T01:00:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }
}
