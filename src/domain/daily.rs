use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::domain::models::HistoryEntry;

const MAX_GAP_SECONDS: f64 = 60.0 * 60.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub date: String,
    pub heater_minutes: i64,
    pub avg_air: i64,
    pub avg_pool: i64,
    pub error_minutes: i64,
    pub total_minutes: i64,
}

/// Summarizes one local day of history. `entries` must be ordered oldest
/// first and fall within the day starting at `day_start`.
///
/// Each entry represents the state from the previous entry's timestamp up
/// to its own. Gaps longer than an hour are treated as data loss and
/// skipped; entries with no telemetry count toward error time; the rest
/// accumulate heater-on time and time-weighted temperature averages.
pub fn summarize_day(entries: &[HistoryEntry], day_start: DateTime<Tz>) -> Option<DaySummary> {
    let mut heat_seconds = 0.0;
    let mut error_seconds = 0.0;
    let mut temp_seconds = 0.0;
    let mut air_degree_seconds = 0.0;
    let mut pool_degree_seconds = 0.0;

    let mut last_time = day_start.with_timezone(&Utc);
    for entry in entries {
        let Ok(recorded_at) = DateTime::parse_from_rfc3339(&entry.recorded_at) else {
            continue;
        };
        let recorded_at = recorded_at.with_timezone(&Utc);
        let seconds = (recorded_at - last_time).num_milliseconds() as f64 / 1000.0;
        last_time = recorded_at;

        if seconds > MAX_GAP_SECONDS {
            continue;
        }

        match (entry.reading.air, entry.reading.pool) {
            (Some(air), Some(pool)) => {
                if entry.reading.heater > 0 {
                    heat_seconds += seconds;
                }
                air_degree_seconds += air as f64 * seconds;
                pool_degree_seconds += pool as f64 * seconds;
                temp_seconds += seconds;
            }
            _ => error_seconds += seconds,
        }
    }

    if temp_seconds == 0.0 {
        return None;
    }

    Some(DaySummary {
        date: day_start.format("%Y-%m-%d").to_string(),
        heater_minutes: round(heat_seconds / 60.0),
        avg_air: round(air_degree_seconds / temp_seconds),
        avg_pool: round(pool_degree_seconds / temp_seconds),
        error_minutes: round(error_seconds / 60.0),
        total_minutes: round((temp_seconds + error_seconds) / 60.0),
    })
}

/// Bounds of the previous local day, for querying and summarizing.
pub fn previous_day_bounds(now: DateTime<Utc>, timezone: Tz) -> (DateTime<Tz>, DateTime<Tz>) {
    let today = now
        .with_timezone(&timezone)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(timezone).earliest())
        .unwrap_or_else(|| now.with_timezone(&timezone));

    (today - Duration::days(1), today)
}

fn round(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
