mod config;
mod error;
mod logging;
mod runtime;
pub mod services;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        http_timeout_ms = config.http_timeout_ms,
        poll_interval_ms = config.poll_interval_ms,
        export_timezone = %config.export_timezone,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
