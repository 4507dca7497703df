//! Browser session capability used by the booking workflow.
//!
//! The workflow only ever talks to a [`SessionDriver`]. The production
//! implementation speaks W3C WebDriver to a local chromedriver/geckodriver
//! ([`webdriver::WebDriverSession`]); tests use the in-memory
//! `scripted::ScriptedDriver` (behind the `scripted` feature).

use std::time::Duration;

use thiserror::Error;

#[cfg(any(test, feature = "scripted"))]
pub mod scripted;
pub mod webdriver;

/// Failure conditions surfaced by any driver operation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("webdriver error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("webdriver transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("session already closed")]
    Closed,
}

impl DriverError {
    /// True for the conditions a caller may treat as "the element is not there".
    pub fn is_absence(&self) -> bool {
        matches!(self, DriverError::Timeout { .. } | DriverError::ElementNotFound { .. })
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Page load milestone to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    /// WebDriver has no network-idle event; implementations approximate it.
    NetworkIdle,
}

/// Element condition to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Present in the DOM.
    Attached,
    /// Present and rendered.
    Visible,
}

#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub state: WaitState,
    pub timeout: Duration,
}

/// Opaque reference to an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Browser-like automation session.
///
/// Every method may fail with [`DriverError::Timeout`] or
/// [`DriverError::ElementNotFound`]; how that is handled is the caller's call.
#[async_trait::async_trait]
pub trait SessionDriver: Send + Sync {
    /// Navigate to `url` and wait for the requested load milestone.
    async fn open(&self, url: &str, opts: OpenOptions) -> DriverResult<()>;

    /// Wait until `selector` matches an element in the requested state.
    async fn wait_for_element(&self, selector: &str, opts: WaitOptions)
        -> DriverResult<ElementHandle>;

    /// Wait for the page to settle after an action that navigates.
    async fn wait_for_navigation(&self, wait_until: WaitUntil, timeout: Duration)
        -> DriverResult<()>;

    /// Clear the field matched by `selector` and type `text` into it.
    async fn fill(&self, selector: &str, text: &str) -> DriverResult<()>;

    async fn click(&self, selector: &str) -> DriverResult<()>;

    async fn click_element(&self, element: &ElementHandle) -> DriverResult<()>;

    /// Choose the option of a `<select>` whose value or label equals `value`.
    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()>;

    /// All elements currently matching `selector`, in document order.
    async fn find_all(&self, selector: &str) -> DriverResult<Vec<ElementHandle>>;

    async fn text_of(&self, element: &ElementHandle) -> DriverResult<String>;

    async fn current_url(&self) -> DriverResult<String>;

    /// Release the session. Safe to call more than once.
    async fn close(&self) -> DriverResult<()>;

    /// Bounded presence check. Absence is `Ok(None)`; anything else that
    /// goes wrong is still an error.
    async fn probe(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> DriverResult<Option<ElementHandle>> {
        match self.wait_for_element(selector, WaitOptions { state, timeout }).await {
            Ok(handle) => Ok(Some(handle)),
            Err(e) if e.is_absence() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Lets a caller keep ownership of a session it hands to the workflow.
#[async_trait::async_trait]
impl<'a, T: SessionDriver + ?Sized> SessionDriver for &'a T {
    async fn open(&self, url: &str, opts: OpenOptions) -> DriverResult<()> {
        (**self).open(url, opts).await
    }

    async fn wait_for_element(&self, selector: &str, opts: WaitOptions)
        -> DriverResult<ElementHandle> {
        (**self).wait_for_element(selector, opts).await
    }

    async fn wait_for_navigation(&self, wait_until: WaitUntil, timeout: Duration)
        -> DriverResult<()> {
        (**self).wait_for_navigation(wait_until, timeout).await
    }

    async fn fill(&self, selector: &str, text: &str) -> DriverResult<()> {
        (**self).fill(selector, text).await
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        (**self).click(selector).await
    }

    async fn click_element(&self, element: &ElementHandle) -> DriverResult<()> {
        (**self).click_element(element).await
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        (**self).select_option(selector, value).await
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        (**self).find_all(selector).await
    }

    async fn text_of(&self, element: &ElementHandle) -> DriverResult<String> {
        (**self).text_of(element).await
    }

    async fn current_url(&self) -> DriverResult<String> {
        (**self).current_url().await
    }

    async fn close(&self) -> DriverResult<()> {
        (**self).close().await
    }
}
