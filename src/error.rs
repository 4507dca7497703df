//! Failure taxonomy of a booking run.

use thiserror::Error;

use crate::config::ConfigError;
use crate::driver::DriverError;

/// Conditions that abort a run. Each is recorded as a FAILED outcome and
/// makes the process exit non-zero.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("could not load {url}: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: DriverError,
    },

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("booking interface not reachable (current page: {url})")]
    InterfaceUnreachable { url: String },

    #[error("failed to start browser session: {0}")]
    SessionStart(#[source] DriverError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("browser session failed: {0}")]
    Driver(#[from] DriverError),
}

/// A failure confined to one course; the scan moves on to the next course.
#[derive(Debug, Error)]
#[error("scan of {course} failed: {source}")]
pub struct CourseScanError {
    pub course: String,
    #[source]
    pub source: DriverError,
}
