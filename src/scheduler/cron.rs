use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

use super::SchedulerError;

/// The report's trigger: a validated cron expression evaluated in UTC.
#[derive(Debug, Clone)]
pub struct ReportSchedule {
    expr: String,
    schedule: CronSchedule,
}

impl ReportSchedule {
    /// Parse a six-field (seconds-first) cron expression.
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let schedule = CronSchedule::from_str(expr).map_err(|e| SchedulerError::InvalidSchedule {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            expr: expr.to_string(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(now).next()
    }

    /// Fire times between `now` and `now + hours`.
    /// This is strictly a dry-run preview, not the execution loop.
    pub fn preview(&self, now: &DateTime<Utc>, hours: u64) -> Vec<DateTime<Utc>> {
        let end = *now + chrono::Duration::hours(hours.min(24 * 366) as i64);
        self.schedule
            .after(now)
            .take_while(|next| *next <= end)
            .collect()
    }
}
