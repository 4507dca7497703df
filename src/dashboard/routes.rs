//! Dashboard route definitions.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::DashboardState;
use crate::outcome;
use crate::workflow::date::format_date;

pub fn routes() -> Router<DashboardState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/logs", get(list_logs))
        .route("/api/logs/latest", get(latest_log))
        .route("/api/advice", get(advice))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    }))
}

async fn list_logs(State(state): State<DashboardState>) -> Json<Value> {
    let entries = outcome::read_entries(&state.log_path);
    Json(json!({ "data": entries, "meta": { "total": entries.len() } }))
}

async fn latest_log(State(state): State<DashboardState>) -> Json<Value> {
    Json(json!({ "data": outcome::latest(&state.log_path) }))
}

#[derive(Debug, Deserialize)]
struct AdviceQuery {
    course: Option<String>,
    date: Option<String>,
}

async fn advice(State(state): State<DashboardState>, Query(q): Query<AdviceQuery>) -> Json<Value> {
    let course = q
        .course
        .or_else(|| state.settings.courses.first().cloned())
        .unwrap_or_default();
    let date = q.date.unwrap_or_else(|| {
        let today = chrono::Local::now().date_naive();
        format_date(state.settings.target_date.target_date(today))
    });

    let text = state.advice.caddie_advice(&course, &date).await;
    Json(json!({ "data": { "course": course, "date": date, "text": text } }))
}
