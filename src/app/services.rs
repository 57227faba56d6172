use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::adapters::aqualink::{AqualinkClient, AqualinkClientError};
use crate::adapters::db::{self, DbError};
use crate::domain::home_screen::{self, ParseError};
use crate::domain::models::{Credentials, HistoryEntry, Reading, Session};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone)]
pub struct SqliteReadingService {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteReadingService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }

    pub fn get_session(&self) -> Result<Option<Session>, ServiceError> {
        self.with_connection(db::get_session)
    }

    pub fn upsert_session(&self, session: &Session) -> Result<(), ServiceError> {
        self.with_connection(|connection| db::upsert_session(connection, session))
    }

    pub fn get_latest_reading(&self) -> Result<Option<Reading>, ServiceError> {
        self.with_connection(db::get_latest_reading)
    }

    pub fn upsert_latest_reading(&self, reading: &Reading) -> Result<(), ServiceError> {
        self.with_connection(|connection| db::upsert_latest_reading(connection, reading))
    }

    pub fn append_history(&self, entry: &HistoryEntry) -> Result<(), ServiceError> {
        self.with_connection(|connection| db::insert_reading(connection, entry))
    }

    pub fn list_history(&self) -> Result<Vec<HistoryEntry>, ServiceError> {
        self.with_connection(db::list_readings_desc)
    }

    pub fn list_history_between(
        &self,
        start_inclusive: &str,
        end_exclusive: &str,
    ) -> Result<Vec<HistoryEntry>, ServiceError> {
        self.with_connection(|connection| {
            db::list_readings_in_range_desc(connection, start_inclusive, end_exclusive)
        })
    }

    pub fn list_history_between_ascending(
        &self,
        start_inclusive: &str,
        end_exclusive: &str,
    ) -> Result<Vec<HistoryEntry>, ServiceError> {
        self.with_connection(|connection| {
            db::list_readings_in_range_asc(connection, start_inclusive, end_exclusive)
        })
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("upstream request failed: {0}")]
    Client(#[from] AqualinkClientError),
    #[error("status endpoint returned an empty body twice; session renewal did not help")]
    RepeatedEmptySession,
    #[error("failed to interpret home screen payload: {0}")]
    Parse(#[from] ParseError),
    #[error("store access failed: {0}")]
    Store(#[from] ServiceError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    NoChange(Reading),
    Added {
        reading: Reading,
        recorded_at: String,
    },
}

impl UpdateOutcome {
    pub fn message(&self) -> String {
        match self {
            UpdateOutcome::NoChange(reading) => {
                format!("No change: {}", reading_json(reading, None))
            }
            UpdateOutcome::Added {
                reading,
                recorded_at,
            } => format!(
                "Added entry: {}",
                reading_json(reading, Some(recorded_at.as_str()))
            ),
        }
    }
}

fn reading_json(reading: &Reading, recorded_at: Option<&str>) -> String {
    let mut value = serde_json::json!({
        "air": reading.air,
        "pool": reading.pool,
        "heater": reading.heater,
    });
    if let Some(timestamp) = recorded_at {
        value["timestamp"] = serde_json::Value::String(timestamp.to_string());
    }
    value.to_string()
}

/// Drives one poll cycle against the upstream API: obtain a session,
/// fetch the live status, normalize it, and record it if it changed.
///
/// The cached session is trusted without an upfront validation call; the
/// only expiry signal is an HTTP 200 status response with an empty body,
/// answered by one unconditional re-login and a single retry.
pub struct ReadingPoller {
    client: Arc<dyn AqualinkClient>,
    clock: Arc<dyn Clock>,
    store: SqliteReadingService,
    credentials: Credentials,
    update_guard: tokio::sync::Mutex<()>,
}

impl ReadingPoller {
    pub fn new(
        client: Arc<dyn AqualinkClient>,
        clock: Arc<dyn Clock>,
        store: SqliteReadingService,
        credentials: Credentials,
    ) -> Self {
        Self {
            client,
            clock,
            store,
            credentials,
            update_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn update(&self) -> Result<UpdateOutcome, PollError> {
        // The session row and the latest pointer are read-modify-write;
        // overlapping triggers serialize here instead of racing them.
        let _flight = self.update_guard.lock().await;

        let session = self.session().await?;
        let body = self.fetch_home(session).await?;
        let reading = home_screen::parse_home_screen(&body)?;
        self.record(reading)
    }

    async fn session(&self) -> Result<Session, PollError> {
        // A cached session may have expired; fetch_home finds that out.
        if let Some(session) = self.store.get_session()? {
            return Ok(session);
        }

        self.login().await
    }

    async fn login(&self) -> Result<Session, PollError> {
        let mut session = self.client.sign_in(&self.credentials).await?;
        session.device_serial = self
            .client
            .first_device_serial(&self.credentials, &session)
            .await?;
        self.store.upsert_session(&session)?;

        tracing::info!(
            session_id = %session.id,
            device_serial = %session.device_serial,
            "signed in to upstream api"
        );

        Ok(session)
    }

    async fn fetch_home(&self, mut session: Session) -> Result<String, PollError> {
        for attempt in 0..2 {
            let body = self.client.fetch_home_status(&session).await?;
            if !body.is_empty() {
                return Ok(body);
            }

            if attempt == 0 {
                tracing::warn!(
                    session_id = %session.id,
                    "status endpoint returned an empty body; assuming an expired session and renewing it"
                );
                session = self.login().await?;
            }
        }

        Err(PollError::RepeatedEmptySession)
    }

    fn record(&self, reading: Reading) -> Result<UpdateOutcome, PollError> {
        if let Some(latest) = self.store.get_latest_reading()?
            && latest == reading
        {
            return Ok(UpdateOutcome::NoChange(reading));
        }

        self.store.upsert_latest_reading(&reading)?;

        let recorded_at = self
            .clock
            .now()
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            reading,
            recorded_at: recorded_at.clone(),
        };
        self.store.append_history(&entry)?;

        tracing::info!(
            air = ?reading.air,
            pool = ?reading.pool,
            heater = reading.heater,
            recorded_at = %recorded_at,
            "recorded reading change"
        );

        Ok(UpdateOutcome::Added {
            reading,
            recorded_at,
        })
    }
}
