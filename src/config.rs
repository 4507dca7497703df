//! Run configuration for a single booking run.
//!
//! Layering: compiled-in defaults, optionally overridden by a TOML file, with
//! credentials always taken from the environment. The resulting
//! [`RunConfig`] is immutable and passed by reference through the workflow.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::workflow::date::{TargetDateRule, MAX_OFFSET_DAYS};

/// Environment variable holding the portal username.
pub const USERNAME_VAR: &str = "CCJ_USER";
/// Environment variable holding the portal password.
pub const PASSWORD_VAR: &str = "CCJ_PASS";
/// Environment variable overriding the config file location.
pub const CONFIG_PATH_VAR: &str = "TEETIME_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "teetime.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid booking window {start}:00-{end}:00 (need start < end <= 24)")]
    InvalidWindow { start: u32, end: u32 },

    #[error("no courses configured")]
    NoCourses,

    #[error("target date offset of {days} days exceeds the {max}-day limit")]
    TargetDateTooFar { days: u32, max: u32 },

    #[error("{0:#}")]
    File(anyhow::Error),
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Portal login. The password is wiped from memory on drop.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Read both values from the environment; no fallbacks.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let username = required_env(USERNAME_VAR)?;
        let password = required_env(PASSWORD_VAR)?;
        Ok(Self::new(username, password))
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn required_env(var: &'static str) -> std::result::Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingCredential(var)),
    }
}

// ---------------------------------------------------------------------------
// File-backed settings
// ---------------------------------------------------------------------------

/// Everything except credentials; this is what the TOML file can override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub target_site: String,
    pub courses: Vec<String>,
    pub players: Vec<String>,
    pub time_window: TimeWindow,
    pub target_date: TargetDateRule,
    /// Fixed wait after triggering a search; the results grid gives no
    /// reliable load-complete signal.
    pub settle_ms: u64,
    pub log_path: PathBuf,
    /// Cadence of the external scheduler (6/7-field cron, seconds first).
    pub schedule: String,
    pub notify_email: Option<String>,
    pub selectors: Selectors,
    pub timeouts: Timeouts,
    pub driver: DriverConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_site: "https://members.thecountryclub.co.za/TeeTimes/TeeSheet.aspx".to_string(),
            courses: vec!["Woodmead".to_string(), "Rocklands".to_string()],
            players: vec![
                "MR GRANT TORLAGE".to_string(),
                "MR ROSCOE DEKKER".to_string(),
                "MR DANIEL KLEYNHANS".to_string(),
            ],
            time_window: TimeWindow::default(),
            target_date: TargetDateRule::default(),
            settle_ms: 3_000,
            log_path: PathBuf::from("logs.json"),
            schedule: "0 0 6 * * Thu".to_string(),
            notify_email: None,
            selectors: Selectors::default(),
            timeouts: Timeouts::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(settings)
    }

    /// Resolve settings from, in order:
    /// 1. An explicit path (the `--config` flag).
    /// 2. The `TEETIME_CONFIG` environment variable.
    /// 3. `./teetime.toml`.
    /// 4. Compiled-in defaults.
    ///
    /// A file named by 1 or 2 must load; errors are returned, never skipped.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));
        if let Some(path) = named {
            return Self::load(&path);
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.courses.is_empty() {
            return Err(ConfigError::NoCourses);
        }
        let days = self.target_date.offset_days();
        if days > MAX_OFFSET_DAYS {
            return Err(ConfigError::TargetDateTooFar { days, max: MAX_OFFSET_DAYS });
        }
        self.time_window.validate()
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Half-open hour range: `start_hour` inclusive, `end_hour` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self { start_hour: 7, end_hour: 8 }
    }
}

impl TimeWindow {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.start_hour < self.end_hour && self.end_hour <= 24 {
            Ok(())
        } else {
            Err(ConfigError::InvalidWindow { start: self.start_hour, end: self.end_hour })
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00 and {:02}:00", self.start_hour, self.end_hour)
    }
}

/// CSS selectors for the tee sheet page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub username: String,
    pub password: String,
    pub login_button: String,
    /// Any element the site uses to display a login/validation failure.
    pub login_error: String,
    pub course_select: String,
    pub date_input: String,
    pub search_button: String,
    pub available_slot: String,
    /// Player name field; `{n}` is replaced by the 1-based player position.
    pub player_field: String,
    pub confirm_button: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            username: "#txtUsername".to_string(),
            password: "#txtPassword".to_string(),
            login_button: "#btnLogin".to_string(),
            login_error: ".validation-summary-errors, .error-message, #lblError".to_string(),
            course_select: "#ddlCourse".to_string(),
            date_input: "#txtDate".to_string(),
            search_button: "#btnFindTeeTimes".to_string(),
            available_slot: ".tee-time-slot.available".to_string(),
            player_field: "#player_{n}".to_string(),
            confirm_button: "#btnConfirmBooking".to_string(),
        }
    }
}

impl Selectors {
    pub fn player(&self, position: usize) -> String {
        self.player_field.replace("{n}", &position.to_string())
    }
}

/// Bounded waits, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub navigation_ms: u64,
    pub login_probe_ms: u64,
    pub post_login_ms: u64,
    pub interface_probe_ms: u64,
    pub control_ms: u64,
    pub player_field_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 60_000,
            login_probe_ms: 5_000,
            post_login_ms: 20_000,
            interface_probe_ms: 10_000,
            control_ms: 10_000,
            player_field_ms: 2_000,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn login_probe(&self) -> Duration {
        Duration::from_millis(self.login_probe_ms)
    }

    pub fn post_login(&self) -> Duration {
        Duration::from_millis(self.post_login_ms)
    }

    pub fn interface_probe(&self) -> Duration {
        Duration::from_millis(self.interface_probe_ms)
    }

    pub fn control(&self) -> Duration {
        Duration::from_millis(self.control_ms)
    }

    pub fn player_field(&self) -> Duration {
        Duration::from_millis(self.player_field_ms)
    }
}

/// WebDriver endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub webdriver_url: String,
    /// `chrome` or `firefox`.
    pub browser: String,
    pub headless: bool,
    /// Upper bound on any single WebDriver request.
    pub command_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            browser: "chrome".to_string(),
            headless: true,
            command_timeout_ms: 90_000,
        }
    }
}

impl DriverConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Immutable configuration of one booking run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Credentials,
    pub settings: Settings,
}

impl RunConfig {
    pub fn new(credentials: Credentials, settings: Settings) -> std::result::Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { credentials, settings })
    }

    /// Settings plus credentials from `CCJ_USER` / `CCJ_PASS`.
    pub fn from_env(settings: Settings) -> std::result::Result<Self, ConfigError> {
        Self::new(Credentials::from_env()?, settings)
    }
}
