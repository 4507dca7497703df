//! W3C WebDriver implementation of [`SessionDriver`].
//!
//! Talks JSON over HTTP to a locally running chromedriver or geckodriver.
//! The driver process itself is managed outside this crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{
    DriverError, DriverResult, ElementHandle, OpenOptions, SessionDriver, WaitOptions, WaitState,
    WaitUntil,
};
use crate::config::DriverConfig;

/// Key under which W3C WebDriver serializes element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_SETTLE: Duration = Duration::from_millis(500);

pub struct WebDriverSession {
    client: Client,
    session_url: String,
    session_id: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    /// Create a new browser session on the WebDriver endpoint.
    pub async fn start(cfg: &DriverConfig) -> DriverResult<Self> {
        let client = Client::builder().timeout(cfg.command_timeout()).build()?;
        let endpoint = cfg.webdriver_url.trim_end_matches('/').to_string();

        let value = send(
            &client,
            Method::POST,
            &format!("{endpoint}/session"),
            Some(capabilities(cfg)),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol {
                error: "session not created".to_string(),
                message: format!("response carried no sessionId: {value}"),
            })?
            .to_string();

        info!(%endpoint, browser = %cfg.browser, headless = cfg.headless, %session_id, "webdriver session started");

        Ok(Self {
            client,
            session_url: format!("{endpoint}/session/{session_id}"),
            session_id,
            closed: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        send(&self.client, method, &format!("{}{}", self.session_url, path), body).await
    }

    async fn find(&self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(parse_elements(&value))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> DriverResult<bool> {
        let value = self
            .command(Method::GET, &format!("/element/{}/displayed", element.id()), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn first_match(&self, selector: &str, state: WaitState) -> DriverResult<Option<ElementHandle>> {
        for element in self.find(selector).await? {
            match state {
                WaitState::Attached => return Ok(Some(element)),
                WaitState::Visible => {
                    // The element can go stale between find and check; keep looking.
                    match self.is_displayed(&element).await {
                        Ok(true) => return Ok(Some(element)),
                        Ok(false) => {}
                        Err(DriverError::Protocol { ref error, .. }) if error == "stale element reference" => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(None)
    }

    async fn require(&self, selector: &str) -> DriverResult<ElementHandle> {
        self.find(selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::ElementNotFound { selector: selector.to_string() })
    }

    async fn ready_state(&self) -> DriverResult<String> {
        let value = self
            .command(
                Method::POST,
                "/execute/sync",
                Some(json!({ "script": "return document.readyState;", "args": [] })),
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn settle(&self, wait_until: WaitUntil) -> DriverResult<()> {
        let mut stable = 0;
        loop {
            let state = self.ready_state().await?;
            let reached = match wait_until {
                WaitUntil::DomContentLoaded => state == "interactive" || state == "complete",
                WaitUntil::Load | WaitUntil::NetworkIdle => state == "complete",
            };
            if reached {
                stable += 1;
                // Network idle: "complete" must hold across two polls.
                if wait_until != WaitUntil::NetworkIdle || stable >= 2 {
                    return Ok(());
                }
                tokio::time::sleep(IDLE_SETTLE).await;
            } else {
                stable = 0;
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

#[async_trait::async_trait]
impl SessionDriver for WebDriverSession {
    async fn open(&self, url: &str, opts: OpenOptions) -> DriverResult<()> {
        debug!(%url, wait_until = ?opts.wait_until, timeout = ?opts.timeout, "open");
        self.command(
            Method::POST,
            "/timeouts",
            Some(json!({ "pageLoad": opts.timeout.as_millis() as u64 })),
        )
        .await?;

        let navigate = async {
            self.command(Method::POST, "/url", Some(json!({ "url": url }))).await?;
            self.settle(opts.wait_until).await
        };
        match tokio::time::timeout(opts.timeout, navigate).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout { what: format!("page load of {url}"), timeout: opts.timeout }),
        }
    }

    async fn wait_for_element(&self, selector: &str, opts: WaitOptions) -> DriverResult<ElementHandle> {
        // The deadline covers in-flight requests too, not just the gaps between polls.
        let poll = async {
            loop {
                match self.first_match(selector, opts.state).await {
                    Ok(Some(element)) => return Ok(element),
                    Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                    Err(e) => return Err(e),
                }
            }
        };
        match tokio::time::timeout(opts.timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout {
                what: format!("{selector} ({:?})", opts.state),
                timeout: opts.timeout,
            }),
        }
    }

    /// Waits for `wait_until` on whatever document is current.
    ///
    /// Nothing ties the check to the document the click produced: if the
    /// old page still reports `complete` when polled, this resolves early.
    /// The workflow follows it with the booking-interface probe, which
    /// catches a login page that never went away.
    async fn wait_for_navigation(&self, wait_until: WaitUntil, timeout: Duration) -> DriverResult<()> {
        // A submit click returns before the next document starts loading.
        tokio::time::sleep(POLL_INTERVAL).await;
        match tokio::time::timeout(timeout, self.settle(wait_until)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout { what: format!("navigation ({wait_until:?})"), timeout }),
        }
    }

    async fn fill(&self, selector: &str, text: &str) -> DriverResult<()> {
        let element = self.require(selector).await?;
        self.command(Method::POST, &format!("/element/{}/clear", element.id()), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.id()),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        let element = self.require(selector).await?;
        self.click_element(&element).await
    }

    async fn click_element(&self, element: &ElementHandle) -> DriverResult<()> {
        self.command(Method::POST, &format!("/element/{}/click", element.id()), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        let select = self.require(selector).await?;
        let options = self
            .command(
                Method::POST,
                &format!("/element/{}/elements", select.id()),
                Some(json!({ "using": "css selector", "value": "option" })),
            )
            .await?;

        for option in parse_elements(&options) {
            let option_value = self
                .command(Method::GET, &format!("/element/{}/property/value", option.id()), None)
                .await?;
            let label = self.text_of(&option).await?;
            if option_value.as_str() == Some(value) || label.trim() == value {
                return self.click_element(&option).await;
            }
        }

        Err(DriverError::ElementNotFound { selector: format!("{selector} option '{value}'") })
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        self.find(selector).await
    }

    async fn text_of(&self, element: &ElementHandle) -> DriverResult<String> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element.id()), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        send(&self.client, Method::DELETE, &self.session_url, None).await?;
        info!(session_id = %self.session_id, "webdriver session closed");
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!(session_id = %self.session_id, "webdriver session dropped without close; browser may be leaked");
        }
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

async fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> DriverResult<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    unwrap_value(status.is_success(), payload)
}

/// Extract the `value` member of a WebDriver response, mapping error objects.
fn unwrap_value(success: bool, payload: Value) -> DriverResult<Value> {
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    let error = value.get("error").and_then(Value::as_str).map(str::to_string);

    match error {
        Some(error) => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Err(match error.as_str() {
                "no such element" => DriverError::ElementNotFound { selector: message },
                "timeout" | "script timeout" => DriverError::Timeout { what: message, timeout: Duration::ZERO },
                _ => DriverError::Protocol { error, message },
            })
        }
        None if !success => Err(DriverError::Protocol {
            error: "unknown error".to_string(),
            message: payload.to_string(),
        }),
        None => Ok(value),
    }
}

fn parse_elements(value: &Value) -> Vec<ElementHandle> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                .map(ElementHandle::new)
                .collect()
        })
        .unwrap_or_default()
}

fn capabilities(cfg: &DriverConfig) -> Value {
    let mut always_match = json!({
        "browserName": cfg.browser,
        "pageLoadStrategy": "normal",
    });
    if cfg.headless {
        let (key, args) = match cfg.browser.as_str() {
            "firefox" => ("moz:firefoxOptions", json!({ "args": ["-headless"] })),
            _ => ("goog:chromeOptions", json!({ "args": ["--headless=new", "--disable-gpu"] })),
        };
        always_match[key] = args;
    }
    json!({ "capabilities": { "alwaysMatch": always_match } })
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::Uri;
    use axum::{Json, Router};

    use super::*;

    /// Just enough of a WebDriver endpoint to exercise the session.
    #[derive(Default)]
    struct Browser {
        /// Selector -> matching element ids.
        elements: HashMap<String, Vec<String>>,
        hidden: HashSet<String>,
        /// `(id, value, label)` of the options under any `<select>`.
        options: Vec<(String, String, String)>,
        /// readyState answers in order; the last one repeats.
        ready_states: VecDeque<String>,
        ready_polls: usize,
        clicks: Vec<String>,
        /// Element lookups are accepted but never answered.
        hang_find: bool,
    }

    type Shared = Arc<Mutex<Browser>>;

    fn refs<'a>(ids: impl IntoIterator<Item = &'a String>) -> Value {
        Value::Array(ids.into_iter().map(|id| json!({ ELEMENT_KEY: id })).collect())
    }

    async fn endpoint(State(browser): State<Shared>, method: Method, uri: Uri, body: Bytes) -> Json<Value> {
        let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        let path = uri.path().to_string();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let hang = browser.lock().unwrap().hang_find;
        if hang && segments.len() == 3 && segments[2] == "elements" {
            std::future::pending::<()>().await;
        }

        let value = match (method.as_str(), segments.as_slice()) {
            ("POST", ["session"]) => json!({ "sessionId": "s1", "capabilities": {} }),
            ("POST", ["session", _, "elements"]) => {
                let selector = body["value"].as_str().unwrap_or_default();
                let b = browser.lock().unwrap();
                refs(b.elements.get(selector).into_iter().flatten())
            }
            ("POST", ["session", _, "element", _, "elements"]) => {
                let b = browser.lock().unwrap();
                refs(b.options.iter().map(|(id, _, _)| id))
            }
            ("GET", ["session", _, "element", id, "displayed"]) => {
                json!(!browser.lock().unwrap().hidden.contains(*id))
            }
            ("GET", ["session", _, "element", id, "property", "value"]) => {
                let b = browser.lock().unwrap();
                json!(b.options.iter().find(|(o, _, _)| o == id).map(|(_, v, _)| v.clone()))
            }
            ("GET", ["session", _, "element", id, "text"]) => {
                let b = browser.lock().unwrap();
                json!(b.options.iter().find(|(o, _, _)| o == id).map(|(_, _, l)| l.clone()))
            }
            ("POST", ["session", _, "element", id, "click"]) => {
                browser.lock().unwrap().clicks.push(id.to_string());
                Value::Null
            }
            ("POST", ["session", _, "execute", "sync"]) => {
                let mut b = browser.lock().unwrap();
                b.ready_polls += 1;
                let state = if b.ready_states.len() > 1 {
                    b.ready_states.pop_front()
                } else {
                    b.ready_states.front().cloned()
                };
                json!(state.unwrap_or_else(|| "complete".to_string()))
            }
            _ => Value::Null,
        };
        Json(json!({ "value": value }))
    }

    async fn session(browser: Browser) -> (WebDriverSession, Shared) {
        let shared = Arc::new(Mutex::new(browser));
        let app = Router::new().fallback(endpoint).with_state(shared.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let cfg = DriverConfig { webdriver_url: format!("http://{addr}"), ..DriverConfig::default() };
        let session = WebDriverSession::start(&cfg).await.unwrap();
        assert_eq!(session.session_id(), "s1");
        (session, shared)
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_wait_times_out_when_selector_never_matches() {
        let (session, _) = session(Browser::default()).await;
        let opts = WaitOptions { state: WaitState::Attached, timeout: Duration::from_millis(300) };

        let err = session.wait_for_element("#ddlCourse", opts).await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout { timeout, .. } if timeout == Duration::from_millis(300)));
        assert!(session.probe("#ddlCourse", WaitState::Attached, opts.timeout).await.unwrap().is_none());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_visible_wait_skips_hidden_elements() {
        let mut browser = Browser::default();
        browser.elements.insert("#lblError".to_string(), ids(&["hidden", "shown"]));
        browser.hidden.insert("hidden".to_string());
        let (session, _) = session(browser).await;

        let visible = WaitOptions { state: WaitState::Visible, timeout: Duration::from_secs(2) };
        let attached = WaitOptions { state: WaitState::Attached, ..visible };
        assert_eq!(session.wait_for_element("#lblError", visible).await.unwrap().id(), "shown");
        assert_eq!(session.wait_for_element("#lblError", attached).await.unwrap().id(), "hidden");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_bound_holds_while_a_request_hangs() {
        let browser = Browser { hang_find: true, ..Browser::default() };
        let (session, _) = session(browser).await;
        let opts = WaitOptions { state: WaitState::Visible, timeout: Duration::from_millis(200) };

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            session.wait_for_element("#txtUsername", opts),
        )
        .await
        .expect("wait must give up at its own deadline");
        assert!(matches!(outcome, Err(DriverError::Timeout { .. })));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_select_option_matches_value_or_label() {
        let mut browser = Browser::default();
        browser.elements.insert("#ddlCourse".to_string(), ids(&["course"]));
        browser.options = vec![
            ("o1".to_string(), "WM".to_string(), "Woodmead".to_string()),
            ("o2".to_string(), "RL".to_string(), "Rocklands".to_string()),
        ];
        let (session, browser) = session(browser).await;

        session.select_option("#ddlCourse", "Rocklands").await.unwrap();
        session.select_option("#ddlCourse", "WM").await.unwrap();
        assert_eq!(browser.lock().unwrap().clicks, ids(&["o2", "o1"]));

        let err = session.select_option("#ddlCourse", "Nowhere").await.unwrap_err();
        assert!(matches!(err, DriverError::ElementNotFound { selector } if selector.contains("Nowhere")));
        assert_eq!(browser.lock().unwrap().clicks.len(), 2);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_network_idle_needs_complete_on_two_polls_in_a_row() {
        let browser = Browser {
            ready_states: ids(&["complete", "loading", "complete", "complete"]).into(),
            ..Browser::default()
        };
        let (session, browser) = session(browser).await;

        session.wait_for_navigation(WaitUntil::NetworkIdle, Duration::from_secs(10)).await.unwrap();
        assert_eq!(browser.lock().unwrap().ready_polls, 4);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_accepts_the_first_complete() {
        let browser = Browser {
            ready_states: ids(&["loading", "complete", "loading"]).into(),
            ..Browser::default()
        };
        let (session, browser) = session(browser).await;

        session.wait_for_navigation(WaitUntil::Load, Duration::from_secs(10)).await.unwrap();
        assert_eq!(browser.lock().unwrap().ready_polls, 2);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_navigation_wait_is_bounded() {
        let browser = Browser { ready_states: ids(&["loading"]).into(), ..Browser::default() };
        let (session, _) = session(browser).await;

        let err = session
            .wait_for_navigation(WaitUntil::NetworkIdle, Duration::from_millis(400))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout { .. }));
        session.close().await.unwrap();
    }

    #[test]
    fn test_parse_elements_reads_w3c_references() {
        let value = json!([
            { ELEMENT_KEY: "a-1" },
            { "unrelated": "x" },
            { ELEMENT_KEY: "a-2" },
        ]);
        let elements = parse_elements(&value);
        assert_eq!(elements, vec![ElementHandle::new("a-1"), ElementHandle::new("a-2")]);
        assert!(parse_elements(&Value::Null).is_empty());
    }

    #[test]
    fn test_unwrap_value_maps_error_objects() {
        let not_found = json!({ "value": { "error": "no such element", "message": "#ddlCourse" } });
        assert!(matches!(
            unwrap_value(false, not_found),
            Err(DriverError::ElementNotFound { selector }) if selector == "#ddlCourse"
        ));

        let other = json!({ "value": { "error": "invalid session id", "message": "gone" } });
        match unwrap_value(false, other) {
            Err(DriverError::Protocol { error, message }) => {
                assert_eq!(error, "invalid session id");
                assert_eq!(message, "gone");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let ok = json!({ "value": "https://example.test/" });
        assert_eq!(unwrap_value(true, ok).unwrap(), json!("https://example.test/"));
    }

    #[test]
    fn test_capabilities_headless_chrome() {
        let cfg = DriverConfig::default();
        let caps = capabilities(&cfg);
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "chrome");
        assert_eq!(always["goog:chromeOptions"]["args"][0], "--headless=new");
    }

    #[test]
    fn test_capabilities_headed_firefox() {
        let cfg = DriverConfig {
            browser: "firefox".to_string(),
            headless: false,
            ..DriverConfig::default()
        };
        let caps = capabilities(&cfg);
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "firefox");
        assert!(always.get("moz:firefoxOptions").is_none());
    }
}
