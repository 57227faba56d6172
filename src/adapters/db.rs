use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::domain::models::{HistoryEntry, Reading, Session};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

// Fixed logical keys for the two singleton rows.
const SESSION_KEY: &str = "default";
const LATEST_READING_KEY: &str = "latest";

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS remote_sessions (
    key TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    authentication_token TEXT NOT NULL,
    device_serial TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS latest_reading (
    key TEXT PRIMARY KEY,
    air INTEGER,
    pool INTEGER,
    heater INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS readings (
    id TEXT PRIMARY KEY,
    air INTEGER,
    pool INTEGER,
    heater INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_readings_recorded_at_desc
ON readings (recorded_at DESC);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn get_session(connection: &Connection) -> Result<Option<Session>, DbError> {
    connection
        .query_row(
            "SELECT session_id, user_id, authentication_token, device_serial
             FROM remote_sessions
             WHERE key = ?1",
            params![SESSION_KEY],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    authentication_token: row.get(2)?,
                    device_serial: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(DbError::from)
}

pub fn upsert_session(connection: &Connection, session: &Session) -> Result<(), DbError> {
    connection.execute(
        "INSERT INTO remote_sessions (key, session_id, user_id, authentication_token, device_serial)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(key) DO UPDATE SET
             session_id = excluded.session_id,
             user_id = excluded.user_id,
             authentication_token = excluded.authentication_token,
             device_serial = excluded.device_serial",
        params![
            SESSION_KEY,
            session.id,
            session.user_id,
            session.authentication_token,
            session.device_serial,
        ],
    )?;

    Ok(())
}

pub fn get_latest_reading(connection: &Connection) -> Result<Option<Reading>, DbError> {
    connection
        .query_row(
            "SELECT air, pool, heater FROM latest_reading WHERE key = ?1",
            params![LATEST_READING_KEY],
            |row| {
                Ok(Reading {
                    air: row.get(0)?,
                    pool: row.get(1)?,
                    heater: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(DbError::from)
}

pub fn upsert_latest_reading(connection: &Connection, reading: &Reading) -> Result<(), DbError> {
    connection.execute(
        "INSERT INTO latest_reading (key, air, pool, heater)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(key) DO UPDATE SET
             air = excluded.air,
             pool = excluded.pool,
             heater = excluded.heater",
        params![LATEST_READING_KEY, reading.air, reading.pool, reading.heater],
    )?;

    Ok(())
}

pub fn insert_reading(connection: &Connection, entry: &HistoryEntry) -> Result<(), DbError> {
    connection.execute(
        "INSERT INTO readings (id, air, pool, heater, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.id,
            entry.reading.air,
            entry.reading.pool,
            entry.reading.heater,
            entry.recorded_at,
        ],
    )?;

    Ok(())
}

pub fn list_readings_desc(connection: &Connection) -> Result<Vec<HistoryEntry>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, air, pool, heater, recorded_at
         FROM readings
         ORDER BY recorded_at DESC, id DESC",
    )?;

    let rows = statement.query_map([], row_to_entry)?;
    collect_entries(rows)
}

// Range filters compare RFC3339 UTC strings; a fixed format makes the
// lexicographic order match chronological order.
pub fn list_readings_in_range_desc(
    connection: &Connection,
    start_inclusive: &str,
    end_exclusive: &str,
) -> Result<Vec<HistoryEntry>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, air, pool, heater, recorded_at
         FROM readings
         WHERE recorded_at >= ?1 AND recorded_at < ?2
         ORDER BY recorded_at DESC, id DESC",
    )?;

    let rows = statement.query_map(params![start_inclusive, end_exclusive], row_to_entry)?;
    collect_entries(rows)
}

pub fn list_readings_in_range_asc(
    connection: &Connection,
    start_inclusive: &str,
    end_exclusive: &str,
) -> Result<Vec<HistoryEntry>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, air, pool, heater, recorded_at
         FROM readings
         WHERE recorded_at >= ?1 AND recorded_at < ?2
         ORDER BY recorded_at ASC, id ASC",
    )?;

    let rows = statement.query_map(params![start_inclusive, end_exclusive], row_to_entry)?;
    collect_entries(rows)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<HistoryEntry, rusqlite::Error> {
    Ok(HistoryEntry {
        id: row.get(0)?,
        reading: Reading {
            air: row.get(1)?,
            pool: row.get(2)?,
            heater: row.get(3)?,
        },
        recorded_at: row.get(4)?,
    })
}

fn collect_entries<I>(rows: I) -> Result<Vec<HistoryEntry>, DbError>
where
    I: Iterator<Item = Result<HistoryEntry, rusqlite::Error>>,
{
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }

    Ok(entries)
}
