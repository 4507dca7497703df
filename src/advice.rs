//! Short advisory texts from a remote text-generation service.
//!
//! Never fails past this boundary: a missing API key, a network error, a
//! quota response or an empty completion all degrade to a static string.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const ADVICE_UNCONFIGURED: &str = "Caddie is taking a break. (API Key not configured)";
pub const ADVICE_UNAVAILABLE: &str = "Caddie is currently unavailable, but focus on your short game!";

pub struct AdviceClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl AdviceClient {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Key from `API_KEY`, then `GEMINI_API_KEY`.
    pub fn from_env() -> Self {
        let key = std::env::var("API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .ok();
        if key.is_none() {
            debug!("API_KEY not set, advice will use static fallbacks");
        }
        Self::new(key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// A "caddie's note" for playing `course` on `day`.
    pub async fn caddie_advice(&self, course: &str, day: &str) -> String {
        let Some(key) = self.api_key.as_deref() else {
            return ADVICE_UNCONFIGURED.to_string();
        };

        let prompt = format!(
            "I am booking a tee time at {course} Golf Course for {day}.\n\
             Provide a short \"Caddie's Note\" including:\n\
             1. A brief strategic tip for {course}.\n\
             2. Expected typical weather patterns for that time of year in Johannesburg.\n\
             3. A motivational golf quote.\n\
             Keep it concise and professional."
        );

        match self.generate(key, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, %course, "advice request failed, using fallback");
                ADVICE_UNAVAILABLE.to_string()
            }
        }
    }

    /// Short notification body for a run outcome.
    pub async fn notification_text(&self, status: &str, details: &str) -> String {
        let fallback = format!("Booking status: {status}. {details}");
        let Some(key) = self.api_key.as_deref() else {
            return fallback;
        };

        let prompt = format!(
            "Generate a short notification email for a golf booking automation status.\n\
             Status: {status}\n\
             Details: {details}\n\
             Style: Brief, professional, yet sporty."
        );

        match self.generate(key, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "notification text request failed, using fallback");
                fallback
            }
        }
    }

    async fn generate(&self, key: &str, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", key)])
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": { "temperature": 0.7 }
            }))
            .send()
            .await
            .context("advice request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("advice service returned {status}");
        }

        let body: Value = response.json().await.context("advice response was not JSON")?;
        extract_text(&body).context("advice response carried no text")
    }
}

/// First non-empty text part of the first candidate.
fn extract_text(body: &Value) -> Option<String> {
    body.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_unconfigured_fallbacks() {
        let client = AdviceClient::new(None);
        assert!(!client.is_configured());
        assert_eq!(client.caddie_advice("Woodmead", "Saturday").await, ADVICE_UNCONFIGURED);
        assert_eq!(
            client.notification_text("FAILED", "No available slots").await,
            "Booking status: FAILED. No available slots"
        );
    }

    #[test]
    fn test_blank_key_counts_as_unconfigured() {
        assert!(!AdviceClient::new(Some("  ".to_string())).is_configured());
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let app = Router::new().fallback(|| async {
            Json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "  Aim left of the bunker.  " }] } }]
            }))
        });
        let base = serve(app).await;

        let client = AdviceClient::new(Some("test-key".to_string())).with_base_url(base);
        assert_eq!(client.caddie_advice("Woodmead", "Saturday").await, "Aim left of the bunker.");
    }

    #[tokio::test]
    async fn test_quota_error_falls_back() {
        let app = Router::new().fallback(|| async {
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": { "message": "quota" } })))
        });
        let base = serve(app).await;

        let client = AdviceClient::new(Some("test-key".to_string())).with_base_url(base);
        assert_eq!(client.caddie_advice("Rocklands", "Saturday").await, ADVICE_UNAVAILABLE);
        assert_eq!(
            client.notification_text("SUCCESS", "Booked 07:15").await,
            "Booking status: SUCCESS. Booked 07:15"
        );
    }

    #[test]
    fn test_extract_text_skips_empty_parts() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "" }, { "text": "Play it safe." }] } }]
        });
        assert_eq!(extract_text(&body).as_deref(), Some("Play it safe."));
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
    }
}
