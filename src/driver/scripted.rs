//! In-memory model of the tee sheet page.
//!
//! Resolves the configured selectors against a small scripted page state:
//! login form, error banner, course dropdown, per-course result grids and
//! the booking form. Every wait resolves immediately, so workflow tests run
//! without a browser and without sleeping.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{
    DriverError, DriverResult, ElementHandle, OpenOptions, SessionDriver, WaitOptions, WaitUntil,
};
use crate::config::Selectors;

/// Side effects the workflow had on the page, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Open(String),
    Fill { selector: String, text: String },
    Click(String),
    Select { selector: String, value: String },
    ClickSlot { course: String, time: String },
    Close,
}

#[derive(Debug, Clone)]
enum Sheet {
    Slots(Vec<String>),
    /// The dropdown never offers this course.
    Broken,
}

#[derive(Debug, Default)]
struct Page {
    unreachable: bool,
    reused_session: bool,
    rejection: Option<String>,
    /// The rejection banner only renders once the post-login page settled.
    rejection_late: bool,
    /// Submitting credentials produces neither a banner nor a settled page.
    login_silent: bool,
    interface_missing: bool,
    banner: Option<String>,
    sheets: HashMap<String, Sheet>,
    player_fields: usize,
    url: String,

    login_submitted: bool,
    settled: bool,
    authenticated: bool,
    course: Option<String>,
    searched: bool,
    slot_clicked: Option<usize>,
    actions: Vec<Action>,
    closed: bool,
}

pub struct ScriptedDriver {
    selectors: Selectors,
    page: Mutex<Page>,
}

impl ScriptedDriver {
    /// A reachable portal with a login form, no courses and three player fields.
    pub fn new(selectors: &Selectors) -> Self {
        Self {
            selectors: selectors.clone(),
            page: Mutex::new(Page { player_fields: 3, ..Page::default() }),
        }
    }

    /// Navigation to the portal fails.
    pub fn unreachable(self) -> Self {
        self.page().unreachable = true;
        self
    }

    /// No login form is shown; the session is already signed in.
    pub fn reused_session(self) -> Self {
        {
            let mut page = self.page();
            page.reused_session = true;
            page.authenticated = true;
        }
        self
    }

    /// Submitting credentials shows the site's error banner with `message`.
    pub fn rejecting_login(self, message: &str) -> Self {
        self.page().rejection = Some(message.to_string());
        self
    }

    /// Like [`rejecting_login`](Self::rejecting_login), but the banner shows
    /// up only after the page has settled.
    pub fn late_rejection(self, message: &str) -> Self {
        {
            let mut page = self.page();
            page.rejection = Some(message.to_string());
            page.rejection_late = true;
        }
        self
    }

    /// The login is accepted, but no post-login signal ever fires.
    pub fn silent_login(self) -> Self {
        self.page().login_silent = true;
        self
    }

    /// The course dropdown never appears.
    pub fn without_interface(self) -> Self {
        self.page().interface_missing = true;
        self
    }

    /// An error banner is visible regardless of login.
    pub fn with_banner(self, message: &str) -> Self {
        self.page().banner = Some(message.to_string());
        self
    }

    /// Results grid for `course`, in display order.
    pub fn course(self, course: &str, times: &[&str]) -> Self {
        let times = times.iter().map(|t| t.to_string()).collect();
        self.page().sheets.insert(course.to_string(), Sheet::Slots(times));
        self
    }

    /// Selecting `course` times out.
    pub fn broken_course(self, course: &str) -> Self {
        self.page().sheets.insert(course.to_string(), Sheet::Broken);
        self
    }

    /// Number of `#player_{n}` fields on the booking form.
    pub fn player_fields(self, count: usize) -> Self {
        self.page().player_fields = count;
        self
    }

    pub fn actions(&self) -> Vec<Action> {
        self.page().actions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.page().closed
    }

    /// `(course, time)` of the slot whose booking was confirmed, if any.
    pub fn confirmed_booking(&self) -> Option<(String, String)> {
        let page = self.page();
        let mut pending = None;
        let mut confirmed = None;
        for action in &page.actions {
            match action {
                Action::ClickSlot { course, time } => pending = Some((course.clone(), time.clone())),
                Action::Click(sel) if *sel == self.selectors.confirm_button => confirmed = pending.clone(),
                _ => {}
            }
        }
        confirmed
    }

    fn page(&self) -> MutexGuard<'_, Page> {
        self.page.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, page: &Page, selector: &str) -> Option<ElementHandle> {
        let s = &self.selectors;
        let login_form = !page.reused_session && !page.login_submitted;
        let interface = page.authenticated && !page.interface_missing;

        let id = if selector == s.username || selector == s.password || selector == s.login_button {
            login_form.then_some("login")
        } else if selector == s.login_error {
            let rejected = page.login_submitted
                && page.rejection.is_some()
                && (!page.rejection_late || page.settled);
            (rejected || page.banner.is_some()).then_some("error")
        } else if selector == s.course_select || selector == s.date_input || selector == s.search_button {
            interface.then_some("control")
        } else if selector == s.confirm_button {
            page.slot_clicked.is_some().then_some("confirm")
        } else {
            let is_player = (1..=page.player_fields).any(|n| selector == s.player(n));
            (is_player && page.slot_clicked.is_some()).then_some("player")
        };

        id.map(|id| ElementHandle::new(format!("{id}:{selector}")))
    }

    fn require(&self, page: &Page, selector: &str) -> DriverResult<ElementHandle> {
        self.lookup(page, selector)
            .ok_or_else(|| DriverError::ElementNotFound { selector: selector.to_string() })
    }

    fn check_open(page: &Page) -> DriverResult<()> {
        if page.closed {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    fn slot_times(page: &Page) -> Vec<String> {
        match page.course.as_ref().and_then(|c| page.sheets.get(c)) {
            Some(Sheet::Slots(times)) if page.searched => times.clone(),
            _ => Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl SessionDriver for ScriptedDriver {
    async fn open(&self, url: &str, opts: OpenOptions) -> DriverResult<()> {
        let mut page = self.page();
        Self::check_open(&page)?;
        page.actions.push(Action::Open(url.to_string()));
        if page.unreachable {
            return Err(DriverError::Timeout { what: format!("page load of {url}"), timeout: opts.timeout });
        }
        page.url = url.to_string();
        Ok(())
    }

    async fn wait_for_element(&self, selector: &str, opts: WaitOptions) -> DriverResult<ElementHandle> {
        let page = self.page();
        Self::check_open(&page)?;
        self.lookup(&page, selector).ok_or_else(|| DriverError::Timeout {
            what: format!("{selector} ({:?})", opts.state),
            timeout: opts.timeout,
        })
    }

    async fn wait_for_navigation(&self, wait_until: WaitUntil, timeout: Duration) -> DriverResult<()> {
        let mut page = self.page();
        Self::check_open(&page)?;
        let stuck = page.login_silent || (page.rejection.is_some() && !page.rejection_late);
        if page.login_submitted && stuck {
            return Err(DriverError::Timeout { what: format!("navigation ({wait_until:?})"), timeout });
        }
        page.settled = true;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> DriverResult<()> {
        let mut page = self.page();
        Self::check_open(&page)?;
        self.require(&page, selector)?;
        page.actions.push(Action::Fill { selector: selector.to_string(), text: text.to_string() });
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        let mut page = self.page();
        Self::check_open(&page)?;
        self.require(&page, selector)?;
        page.actions.push(Action::Click(selector.to_string()));

        let s = &self.selectors;
        if selector == s.login_button {
            page.login_submitted = true;
            page.authenticated = page.rejection.is_none();
            if page.authenticated {
                page.url = format!("{}#booking", page.url);
            }
        } else if selector == s.search_button {
            page.searched = page.course.is_some();
        }
        Ok(())
    }

    async fn click_element(&self, element: &ElementHandle) -> DriverResult<()> {
        let mut page = self.page();
        Self::check_open(&page)?;

        if let Some(idx) = element.id().strip_prefix("slot:").and_then(|i| i.parse::<usize>().ok()) {
            let time = Self::slot_times(&page)
                .get(idx)
                .cloned()
                .ok_or_else(|| DriverError::ElementNotFound { selector: element.id().to_string() })?;
            let course = page.course.clone().unwrap_or_default();
            page.slot_clicked = Some(idx);
            page.actions.push(Action::ClickSlot { course, time });
        } else {
            page.actions.push(Action::Click(element.id().to_string()));
        }
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        let mut page = self.page();
        Self::check_open(&page)?;
        self.require(&page, selector)?;

        match page.sheets.get(value) {
            Some(Sheet::Slots(_)) => {}
            Some(Sheet::Broken) => {
                return Err(DriverError::Timeout {
                    what: format!("{selector} option '{value}'"),
                    timeout: Duration::from_secs(10),
                });
            }
            None => {
                return Err(DriverError::ElementNotFound { selector: format!("{selector} option '{value}'") });
            }
        }

        page.course = Some(value.to_string());
        page.searched = false;
        page.slot_clicked = None;
        page.actions.push(Action::Select { selector: selector.to_string(), value: value.to_string() });
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        let page = self.page();
        Self::check_open(&page)?;

        if selector == self.selectors.available_slot {
            let count = Self::slot_times(&page).len();
            return Ok((0..count).map(|i| ElementHandle::new(format!("slot:{i}"))).collect());
        }
        Ok(self.lookup(&page, selector).into_iter().collect())
    }

    async fn text_of(&self, element: &ElementHandle) -> DriverResult<String> {
        let page = self.page();
        Self::check_open(&page)?;

        if element.id().starts_with("error:") {
            let message = match (&page.rejection, page.login_submitted) {
                (Some(rejection), true) => Some(rejection.clone()),
                _ => page.banner.clone(),
            };
            return Ok(message.unwrap_or_default());
        }
        if let Some(idx) = element.id().strip_prefix("slot:").and_then(|i| i.parse::<usize>().ok()) {
            return Self::slot_times(&page)
                .get(idx)
                .cloned()
                .ok_or_else(|| DriverError::ElementNotFound { selector: element.id().to_string() });
        }
        Ok(String::new())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let page = self.page();
        Self::check_open(&page)?;
        Ok(page.url.clone())
    }

    async fn close(&self) -> DriverResult<()> {
        let mut page = self.page();
        if !page.closed {
            page.closed = true;
            page.actions.push(Action::Close);
        }
        Ok(())
    }
}
