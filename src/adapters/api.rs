use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, web};
use chrono::{Duration, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::app::services::{ReadingPoller, ServiceError, SqliteReadingService};
use crate::domain::daily::{previous_day_bounds, summarize_day};
use crate::domain::history::{display_string, render_csv};

#[derive(Clone)]
pub struct ApiState {
    pub poller: Arc<ReadingPoller>,
    pub history: SqliteReadingService,
    pub export_timezone: Tz,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub end: Option<String>,
    pub days: Option<i64>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(update_endpoint)
        .service(export_csv_endpoint)
        .service(daily_endpoint)
        .service(display_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/update")]
async fn update_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.poller.update().await {
        Ok(outcome) => HttpResponse::Ok().body(outcome.message()),
        Err(error) => {
            tracing::error!(error = %error, "update cycle failed");
            HttpResponse::InternalServerError().body("Server error!")
        }
    }
}

#[get("/log.csv")]
async fn export_csv_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<ExportQuery>,
) -> impl Responder {
    let window = match export_window(&query, state.export_timezone, Utc::now()) {
        Ok(window) => window,
        Err(message) => return HttpResponse::BadRequest().body(message),
    };

    let entries = match &window {
        Some((start, end)) => state.history.list_history_between(start, end),
        None => state.history.list_history(),
    };

    match entries {
        Ok(entries) => HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .body(render_csv(&entries, state.export_timezone)),
        Err(error) => service_error_response(error),
    }
}

#[get("/daily")]
async fn daily_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let (day_start, day_end) = previous_day_bounds(Utc::now(), state.export_timezone);
    let start = to_utc_rfc3339(day_start);
    let end = to_utc_rfc3339(day_end);

    match state.history.list_history_between_ascending(&start, &end) {
        Ok(entries) => match summarize_day(&entries, day_start) {
            Some(summary) => HttpResponse::Ok().json(summary),
            None => HttpResponse::NoContent().finish(),
        },
        Err(error) => service_error_response(error),
    }
}

#[get("/display")]
async fn display_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.history.get_latest_reading() {
        Ok(Some(reading)) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(display_string(&reading)),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "no readings recorded yet"
        })),
        Err(error) => service_error_response(error),
    }
}

// No params means the full history; either param narrows the export to a
// day window ending at the exclusive local midnight after `end` (or now),
// spanning `days` days (default 7).
fn export_window(
    query: &ExportQuery,
    timezone: Tz,
    now: chrono::DateTime<Utc>,
) -> Result<Option<(String, String)>, &'static str> {
    if query.end.is_none() && query.days.is_none() {
        return Ok(None);
    }

    let end = match query.end.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%m/%d/%Y")
            .ok()
            .and_then(|date| date.succ_opt())
            .and_then(|next_day| next_day.and_hms_opt(0, 0, 0))
            .and_then(|midnight| midnight.and_local_timezone(timezone).earliest())
            .map(|local| local.with_timezone(&Utc))
            .ok_or("Failed to parse end param")?,
        None => now,
    };

    let days = query.days.unwrap_or(7);
    let start = end - Duration::days(days);

    Ok(Some((
        start.to_rfc3339_opts(SecondsFormat::Millis, true),
        end.to_rfc3339_opts(SecondsFormat::Millis, true),
    )))
}

fn to_utc_rfc3339(value: chrono::DateTime<Tz>) -> String {
    value
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database lock poisoned"
            }))
        }
        ServiceError::Database(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("database query failed: {error}")
            }))
        }
    }
}
