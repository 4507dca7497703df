//! The booking run: navigate, authenticate, scan courses, book, record.
//!
//! ```text
//! Start -> Navigated -> Authenticated -> CourseScan(c) -> SlotFound -> Booked
//!                                            |  (next course on miss/error)
//!                                            +-> Exhausted
//! ```
//!
//! Navigation and authentication failures are fatal. A failure while
//! scanning one course is a warning and the next course is tried.

pub mod date;
pub mod slot;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::{Credentials, RunConfig, TimeWindow};
use crate::driver::{
    DriverError, ElementHandle, OpenOptions, SessionDriver, WaitOptions, WaitState, WaitUntil,
};
use crate::error::{BookingError, CourseScanError};
use crate::outcome::{LogEntry, LogStatus, OutcomeLog};

use self::date::format_date;
use self::slot::TeeSlot;

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Start,
    Navigated,
    Authenticated,
    CourseScan(String),
    SlotFound(TeeSlot),
    Booked(Booking),
    Exhausted,
}

/// A confirmed booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub slot: TeeSlot,
    pub date: NaiveDate,
}

/// Terminal outcome of a run that completed normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Booked(Booking),
    NoSlotInWindow { date: NaiveDate, window: TimeWindow },
}

impl Verdict {
    pub fn status(&self) -> LogStatus {
        match self {
            Verdict::Booked(_) => LogStatus::Success,
            Verdict::NoSlotInWindow { .. } => LogStatus::Failed,
        }
    }

    pub fn details(&self) -> String {
        match self {
            Verdict::Booked(booking) => format!(
                "Booked {} on {} for {}",
                booking.slot.display_time,
                booking.slot.course,
                format_date(booking.date)
            ),
            Verdict::NoSlotInWindow { date, window } => format!(
                "No available slots found between {} on {}",
                window,
                format_date(*date)
            ),
        }
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug)]
pub struct RunReport {
    /// The single entry appended to the outcome log.
    pub entry: LogEntry,
    /// `None` when the run was aborted.
    pub verdict: Option<Verdict>,
    pub fatal: Option<BookingError>,
    pub warnings: Vec<CourseScanError>,
}

impl RunReport {
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}

pub struct BookingWorkflow<'a, D: SessionDriver + ?Sized> {
    config: &'a RunConfig,
    driver: &'a D,
    target_date: NaiveDate,
    state: RunState,
    warnings: Vec<CourseScanError>,
}

impl<'a, D: SessionDriver + ?Sized> BookingWorkflow<'a, D> {
    pub fn new(config: &'a RunConfig, driver: &'a D, today: NaiveDate) -> Self {
        Self {
            config,
            driver,
            target_date: config.settings.target_date.target_date(today),
            state: RunState::Start,
            warnings: Vec::new(),
        }
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn warnings(&self) -> &[CourseScanError] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<CourseScanError> {
        self.warnings
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    /// Run the state machine to a verdict, or to the first fatal condition.
    /// Does not close the session; see [`execute`].
    pub async fn run(&mut self) -> Result<Verdict, BookingError> {
        let result = self.drive().await;
        if result.is_err() {
            self.transition(RunState::Exhausted);
        }
        result
    }

    async fn drive(&mut self) -> Result<Verdict, BookingError> {
        info!(target_date = %format_date(self.target_date), "starting booking run");

        self.navigate().await?;
        self.transition(RunState::Navigated);

        self.authenticate().await?;
        self.transition(RunState::Authenticated);

        Ok(self.scan_courses().await)
    }

    // -----------------------------------------------------------------------
    // Navigate
    // -----------------------------------------------------------------------

    async fn navigate(&self) -> Result<(), BookingError> {
        let settings = &self.config.settings;
        let opts = OpenOptions {
            wait_until: WaitUntil::NetworkIdle,
            timeout: settings.timeouts.navigation(),
        };
        self.driver
            .open(&settings.target_site, opts)
            .await
            .map_err(|source| BookingError::NavigationFailed {
                url: settings.target_site.clone(),
                source,
            })?;
        info!(url = %settings.target_site, "portal loaded");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Authenticate
    // -----------------------------------------------------------------------

    async fn authenticate(&self) -> Result<(), BookingError> {
        let settings = &self.config.settings;
        let login_form = self
            .driver
            .probe(&settings.selectors.username, WaitState::Visible, settings.timeouts.login_probe())
            .await?;

        match login_form {
            Some(_) => self.submit_login(&self.config.credentials).await?,
            None => info!("no login form shown, assuming an authenticated session"),
        }

        self.verify_interface().await
    }

    async fn submit_login(&self, credentials: &Credentials) -> Result<(), BookingError> {
        let settings = &self.config.settings;
        let selectors = &settings.selectors;
        let timeout = settings.timeouts.post_login();

        self.driver.fill(&selectors.username, &credentials.username).await?;
        self.driver.fill(&selectors.password, credentials.password()).await?;
        self.driver.click(&selectors.login_button).await?;
        debug!(username = %credentials.username, "credentials submitted");

        let rejected = self.driver.wait_for_element(
            &selectors.login_error,
            WaitOptions { state: WaitState::Visible, timeout },
        );
        let settled = self.driver.wait_for_navigation(WaitUntil::NetworkIdle, timeout);

        // First signal wins; the other wait is dropped.
        tokio::select! {
            biased;
            Ok(indicator) = rejected => {
                return Err(BookingError::LoginRejected(self.indicator_text(&indicator).await));
            }
            Ok(()) = settled => {
                info!("login submitted, page settled");
            }
            else => {
                warn!(?timeout, "no post-login signal observed, checking booking interface");
            }
        }
        Ok(())
    }

    async fn verify_interface(&self) -> Result<(), BookingError> {
        let settings = &self.config.settings;
        let selectors = &settings.selectors;

        let control = self
            .driver
            .probe(&selectors.course_select, WaitState::Attached, settings.timeouts.interface_probe())
            .await?;
        if control.is_some() {
            return Ok(());
        }

        let indicator = self
            .driver
            .probe(&selectors.login_error, WaitState::Visible, settings.timeouts.login_probe())
            .await?;
        if let Some(indicator) = indicator {
            return Err(BookingError::LoginRejected(self.indicator_text(&indicator).await));
        }

        let url = match self.driver.current_url().await {
            Ok(url) => url,
            Err(e) => format!("<unknown: {e}>"),
        };
        Err(BookingError::InterfaceUnreachable { url })
    }

    async fn indicator_text(&self, indicator: &ElementHandle) -> String {
        match self.driver.text_of(indicator).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => "login error shown without a message".to_string(),
            Err(e) => format!("login error shown, text unreadable: {e}"),
        }
    }

    // -----------------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------------

    async fn scan_courses(&mut self) -> Verdict {
        let config = self.config;
        let date = self.target_date;

        for course in &config.settings.courses {
            self.transition(RunState::CourseScan(course.clone()));
            info!(%course, date = %format_date(date), "checking course");

            match self.scan_course(course).await {
                Ok(Some(booking)) => {
                    info!(
                        course = %booking.slot.course,
                        time = %booking.slot.display_time,
                        date = %format_date(date),
                        "booking confirmed"
                    );
                    self.transition(RunState::Booked(booking.clone()));
                    return Verdict::Booked(booking);
                }
                Ok(None) => info!(%course, window = %config.settings.time_window, "no slot in window"),
                Err(source) => {
                    let err = CourseScanError { course: course.clone(), source };
                    warn!(error = %err, "course scan failed, moving to next course");
                    self.warnings.push(err);
                }
            }
        }

        self.transition(RunState::Exhausted);
        Verdict::NoSlotInWindow { date, window: config.settings.time_window }
    }

    async fn scan_course(&mut self, course: &str) -> Result<Option<Booking>, DriverError> {
        let config = self.config;
        let driver = self.driver;
        let settings = &config.settings;
        let selectors = &settings.selectors;
        let control = WaitOptions { state: WaitState::Visible, timeout: settings.timeouts.control() };

        driver.wait_for_element(&selectors.course_select, control).await?;
        driver.select_option(&selectors.course_select, course).await?;
        driver.fill(&selectors.date_input, &format_date(self.target_date)).await?;
        driver.click(&selectors.search_button).await?;

        // The results grid has no load-complete signal.
        tokio::time::sleep(settings.settle()).await;

        let slots = driver.find_all(&selectors.available_slot).await?;
        debug!(%course, available = slots.len(), "listed available slots");

        for handle in slots {
            let text = driver.text_of(&handle).await?;
            let Some(slot) = TeeSlot::parse(&text, course) else {
                debug!(%course, text = %text.trim(), "skipping slot without a readable time");
                continue;
            };
            if !slot.in_window(&settings.time_window) {
                continue;
            }

            info!(%course, time = %slot.display_time, "found slot, booking");
            self.transition(RunState::SlotFound(slot.clone()));
            self.book_slot(&handle).await?;
            return Ok(Some(Booking { slot, date: self.target_date }));
        }

        Ok(None)
    }

    async fn book_slot(&self, slot: &ElementHandle) -> Result<(), DriverError> {
        let settings = &self.config.settings;
        let selectors = &settings.selectors;

        self.driver.click_element(slot).await?;

        for (idx, player) in settings.players.iter().enumerate() {
            let field = selectors.player(idx + 1);
            match self
                .driver
                .probe(&field, WaitState::Visible, settings.timeouts.player_field())
                .await?
            {
                Some(_) => self.driver.fill(&field, player).await?,
                None => warn!(%field, %player, "player field not on form, skipping"),
            }
        }

        let control = WaitOptions { state: WaitState::Visible, timeout: settings.timeouts.control() };
        self.driver.wait_for_element(&selectors.confirm_button, control).await?;
        self.driver.click(&selectors.confirm_button).await
    }
}

/// One complete run: workflow, session release, exactly one log entry.
///
/// Takes the session by value; it is closed on every path before the
/// outcome is written. Only a failure to write the log is returned as `Err`.
pub async fn execute<D: SessionDriver>(
    config: &RunConfig,
    driver: D,
    log: &OutcomeLog,
    today: NaiveDate,
) -> anyhow::Result<RunReport> {
    let mut workflow = BookingWorkflow::new(config, &driver, today);
    let result = workflow.run().await;
    let warnings = workflow.into_warnings();

    if let Err(e) = driver.close().await {
        warn!(error = %e, "failed to close browser session");
    }
    drop(driver);

    match result {
        Ok(verdict) => {
            let entry = log.append(verdict.status(), verdict.details())?;
            Ok(RunReport { entry, verdict: Some(verdict), fatal: None, warnings })
        }
        Err(fatal) => {
            let mut report = record_fatal(log, fatal)?;
            report.warnings = warnings;
            Ok(report)
        }
    }
}

/// Record a fatal condition, including ones raised before a session existed.
pub fn record_fatal(log: &OutcomeLog, fatal: BookingError) -> anyhow::Result<RunReport> {
    warn!(error = %fatal, "booking run aborted");
    let entry = log.append(LogStatus::Failed, format!("Critical Error: {fatal}"))?;
    Ok(RunReport { entry, verdict: None, fatal: Some(fatal), warnings: Vec::new() })
}
