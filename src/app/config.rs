use chrono_tz::Tz;

use crate::app::AppError;
use crate::domain::models::Credentials;

const DEFAULT_API_KEY: &str = "EOOEMOW4YR6QNB07";
const DEFAULT_AUTH_BASE_URL: &str = "https://support.iaqualink.com";
const DEFAULT_STATUS_BASE_URL: &str = "https://iaqualink-api.realtime.io/v1/mobile";
const DEFAULT_EXPORT_TIMEZONE: &str = "Canada/Eastern";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub auth_base_url: String,
    pub status_base_url: String,
    pub db_path: String,
    pub http_bind: String,
    pub http_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub export_timezone: Tz,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let email = required(&lookup, "AQUALINK_EMAIL")?;
        let password = required(&lookup, "AQUALINK_PASSWORD")?;

        let export_timezone = lookup("EXPORT_TIMEZONE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_EXPORT_TIMEZONE.to_string())
            .parse::<Tz>()
            .map_err(|_| AppError::config("EXPORT_TIMEZONE must be a valid IANA timezone name"))?;

        Ok(Self {
            credentials: Credentials {
                api_key: trimmed_or(&lookup, "AQUALINK_API_KEY", DEFAULT_API_KEY),
                email,
                password,
            },
            auth_base_url: trimmed_or(&lookup, "AQUALINK_AUTH_BASE_URL", DEFAULT_AUTH_BASE_URL),
            status_base_url: trimmed_or(
                &lookup,
                "AQUALINK_STATUS_BASE_URL",
                DEFAULT_STATUS_BASE_URL,
            ),
            db_path: trimmed_or(&lookup, "DB_PATH", "/var/lib/aqualink/temps.db"),
            http_bind: trimmed_or(&lookup, "HTTP_BIND", "0.0.0.0:8080"),
            http_timeout_ms: parse_or_default(&lookup, "HTTP_TIMEOUT_MS", 10_000_u64)?,
            poll_interval_ms: parse_or_default(&lookup, "POLL_INTERVAL_MS", 0_u64)?,
            export_timezone,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::config(format!("{key} is required")))
}

fn trimmed_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
