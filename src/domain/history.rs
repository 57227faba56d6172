use chrono::DateTime;
use chrono_tz::Tz;

use crate::domain::models::{HistoryEntry, Reading};

pub const CSV_HEADER: &str = "timestamp, air, pool, heater";

/// Renders history entries (already ordered newest first) as CSV.
/// Timestamps are formatted in the export timezone; commas that a
/// locale-style format could introduce are stripped so the column count
/// stays fixed without quoting. Missing temps render as empty cells.
pub fn render_csv(entries: &[HistoryEntry], timezone: Tz) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');

    for entry in entries {
        let local = match DateTime::parse_from_rfc3339(&entry.recorded_at) {
            Ok(ts) => ts
                .with_timezone(&timezone)
                .format("%-m/%-d/%Y %H:%M")
                .to_string(),
            Err(_) => entry.recorded_at.clone(),
        };
        let local = local.replace(',', "");

        csv.push_str(&format!(
            "{local}, {}, {}, {}\n",
            temp_cell(entry.reading.air),
            temp_cell(entry.reading.pool),
            entry.reading.heater
        ));
    }

    csv
}

fn temp_cell(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Compact rendering of the latest reading for a small wall display:
/// two 2-digit Celsius values plus a trailing dot while the heater runs,
/// or OFFLINE when there is no telemetry.
pub fn display_string(reading: &Reading) -> String {
    let (Some(air), Some(pool)) = (reading.air, reading.pool) else {
        return "OFFLINE".to_string();
    };

    let marker = if reading.heater > 0 { "." } else { "" };
    format!(
        "{:2}{:2}{marker}",
        fahrenheit_to_celsius(air),
        fahrenheit_to_celsius(pool)
    )
}

fn fahrenheit_to_celsius(degrees: i64) -> i64 {
    ((degrees - 32) as f64 * 5.0 / 9.0).round() as i64
}
