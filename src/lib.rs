//! teetime -- unattended tee-time booking for a members' golf portal.
//!
//! This crate provides the booking workflow, the browser session driver,
//! the persisted outcome log, and the read-only dashboard over that log.

pub mod advice;
pub mod config;
pub mod dashboard;
pub mod driver;
pub mod error;
pub mod outcome;
pub mod schedule;
pub mod workflow;

use anyhow::Result;

use crate::config::{RunConfig, Settings};
use crate::driver::webdriver::WebDriverSession;
use crate::error::BookingError;
use crate::outcome::OutcomeLog;
use crate::workflow::RunReport;

/// Run one booking against a live WebDriver session.
///
/// Every path, including missing credentials and a browser that will not
/// start, appends exactly one entry to the outcome log.
pub async fn book(settings: Settings) -> Result<RunReport> {
    let log = OutcomeLog::new(&settings.log_path);

    // 1. Credentials and settings
    let config = match RunConfig::from_env(settings) {
        Ok(config) => config,
        Err(e) => return workflow::record_fatal(&log, BookingError::Config(e)),
    };

    // 2. Browser session
    let driver = match WebDriverSession::start(&config.settings.driver).await {
        Ok(driver) => driver,
        Err(e) => return workflow::record_fatal(&log, BookingError::SessionStart(e)),
    };

    // 3. Workflow; the session is released inside
    let today = chrono::Local::now().date_naive();
    workflow::execute(&config, driver, &log, today).await
}
