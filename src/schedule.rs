//! Preview of the external run cadence.
//!
//! The scheduler that invokes `teetime book` lives outside this crate; this
//! module only validates its cron expression and lists upcoming fire times.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

/// Parse a cron expression (seconds-first, 6 or 7 fields).
pub fn parse(expr: &str) -> Result<CronSchedule> {
    CronSchedule::from_str(expr).map_err(|e| anyhow!("Invalid cron expression '{}': {}", expr, e))
}

/// The next `count` fire times strictly after `after`.
pub fn upcoming(expr: &str, after: DateTime<Utc>, count: usize) -> Result<Vec<DateTime<Utc>>> {
    let schedule = parse(expr)?;
    Ok(schedule.after(&after).take(count).collect())
}
