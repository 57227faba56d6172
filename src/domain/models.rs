/// Credential bundle for the upstream cloud API, loaded from configuration.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub email: String,
    pub password: String,
}

/// Short-lived session issued by the upstream API. Replaced whole on
/// renewal, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub authentication_token: String,
    pub device_serial: String,
}

/// A normalized temperature reading. `air`/`pool` are `None` when the
/// upstream reported no value, which is distinct from 0 degrees.
/// `heater` is 0 when off, otherwise the active set-point temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub air: Option<i64>,
    pub pool: Option<i64>,
    pub heater: i64,
}

impl Reading {
    /// The reading recorded while the device reports a non-Online status.
    pub fn offline() -> Self {
        Self {
            air: None,
            pool: None,
            heater: 0,
        }
    }
}

/// One appended history row. `recorded_at` is an RFC3339 UTC timestamp of
/// the recording time; the upstream provides no reading-time field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: String,
    pub reading: Reading,
    pub recorded_at: String,
}
