use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use chrono::{DateTime, Utc};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::aqualink::AqualinkHttpClient;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::services::{Clock, ReadingPoller, SqliteReadingService};

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let mut connection =
        crate::adapters::db::open_connection(&config.db_path).map_err(AppError::database_init)?;
    crate::adapters::db::run_migrations(&mut connection).map_err(AppError::database_init)?;

    let store = SqliteReadingService::new(Arc::new(Mutex::new(connection)));

    let client = AqualinkHttpClient::new(
        &config.auth_base_url,
        &config.status_base_url,
        Duration::from_millis(config.http_timeout_ms),
    )
    .map_err(AppError::runtime)?;

    let poller = Arc::new(ReadingPoller::new(
        Arc::new(client),
        Arc::new(SystemClock),
        store.clone(),
        config.credentials.clone(),
    ));

    let api_state = ApiState {
        poller: Arc::clone(&poller),
        history: store,
        export_timezone: config.export_timezone,
    };

    let poll_interval = (config.poll_interval_ms > 0)
        .then(|| Duration::from_millis(config.poll_interval_ms));

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        if let Some(interval) = poll_interval {
            let ticker_poller = Arc::clone(&poller);
            actix_web::rt::spawn(async move {
                loop {
                    actix_web::rt::time::sleep(interval).await;
                    match ticker_poller.update().await {
                        Ok(outcome) => {
                            tracing::info!(outcome = %outcome.message(), "scheduled update finished");
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "scheduled update failed");
                        }
                    }
                }
            });
        }

        HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    server_result.map_err(AppError::runtime)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::adapters::aqualink::AqualinkHttpClient;
    use crate::app::services::{ReadingPoller, SqliteReadingService, UpdateOutcome};
    use crate::test_support::{
        StepClock, http_response, open_test_connection, spawn_http_responder, test_credentials,
    };

    // The full poll cycle against a scripted upstream: first boot with an
    // empty store signs in, resolves the device, fetches the home screen,
    // and records the reading.
    #[actix_web::test]
    async fn first_update_signs_in_and_records_reading() {
        let (port, responder) = spawn_http_responder(vec![
            http_response(
                200,
                "application/json",
                r#"{"session_id": "sess-9", "id": 12345, "authentication_token": "tok"}"#,
            ),
            http_response(
                200,
                "application/json",
                r#"[{"serial_number": "SERIAL09"}]"#,
            ),
            http_response(
                200,
                "application/json",
                r#"{"home_screen": [
                    {"status": "Online"},
                    {"spa_heater": "1"},
                    {"spa_set_point": "95"},
                    {"pool_heater": "0"},
                    {"air_temp": "78"},
                    {"pool_temp": "81"}
                ]}"#,
            ),
        ]);

        let base = format!("http://127.0.0.1:{port}");
        let client = AqualinkHttpClient::new(&base, &base, Duration::from_secs(2))
            .expect("client should build");

        let store = SqliteReadingService::new(Arc::new(Mutex::new(open_test_connection())));
        let clock = StepClock::from_rfc3339(&["2026-08-01T12:00:00.000Z"]);
        let poller = ReadingPoller::new(
            Arc::new(client),
            Arc::new(clock),
            store.clone(),
            test_credentials(),
        );

        let outcome = poller.update().await.expect("update should succeed");

        match outcome {
            UpdateOutcome::Added { reading, .. } => {
                assert_eq!(reading.air, Some(78));
                assert_eq!(reading.pool, Some(81));
                assert_eq!(reading.heater, 95);
            }
            other => panic!("expected Added outcome, got {other:?}"),
        }

        let session = store
            .get_session()
            .expect("session query should succeed")
            .expect("session should be persisted");
        assert_eq!(session.id, "sess-9");
        assert_eq!(session.device_serial, "SERIAL09");

        let history = store.list_history().expect("history query should succeed");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].recorded_at, "2026-08-01T12:00:00.000Z");

        let requests = responder.join().expect("responder should finish");
        assert!(requests[0].starts_with("POST /users/sign_in.json"));
        assert!(requests[1].starts_with("GET /devices.json?"));
        assert!(requests[2].starts_with("GET /session.json?"));
        assert!(requests[2].contains("serial=SERIAL09"));
        assert!(requests[2].contains("sessionID=sess-9"));
    }

    // Expired cached session: the status endpoint answers 200 with an
    // empty body, the poller renews the session once and retries.
    #[actix_web::test]
    async fn expired_session_is_renewed_transparently() {
        let (port, responder) = spawn_http_responder(vec![
            http_response(200, "application/json", ""),
            http_response(
                200,
                "application/json",
                r#"{"session_id": "sess-new", "id": 12345, "authentication_token": "tok2"}"#,
            ),
            http_response(
                200,
                "application/json",
                r#"[{"serial_number": "SERIAL09"}]"#,
            ),
            http_response(
                200,
                "application/json",
                r#"{"home_screen": [
                    {"status": "Online"},
                    {"spa_heater": "0"},
                    {"pool_heater": "0"},
                    {"air_temp": "78"},
                    {"pool_temp": "81"}
                ]}"#,
            ),
        ]);

        let base = format!("http://127.0.0.1:{port}");
        let client = AqualinkHttpClient::new(&base, &base, Duration::from_secs(2))
            .expect("client should build");

        let store = SqliteReadingService::new(Arc::new(Mutex::new(open_test_connection())));
        store
            .upsert_session(&crate::domain::models::Session {
                id: "sess-old".to_string(),
                user_id: "12345".to_string(),
                authentication_token: "tok1".to_string(),
                device_serial: "SERIAL09".to_string(),
            })
            .expect("session seed should succeed");

        let clock = StepClock::from_rfc3339(&["2026-08-01T12:00:00.000Z"]);
        let poller = ReadingPoller::new(
            Arc::new(client),
            Arc::new(clock),
            store.clone(),
            test_credentials(),
        );

        let outcome = poller.update().await.expect("update should succeed");
        assert!(matches!(outcome, UpdateOutcome::Added { .. }));

        let session = store
            .get_session()
            .expect("session query should succeed")
            .expect("session should be persisted");
        assert_eq!(session.id, "sess-new");

        let requests = responder.join().expect("responder should finish");
        assert!(requests[0].contains("sessionID=sess-old"));
        assert!(requests[3].contains("sessionID=sess-new"));
    }
}
