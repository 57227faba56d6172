use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::models::{Credentials, Session};

#[derive(Debug, Error)]
pub enum AqualinkClientError {
    #[error("sign-in rejected with status {status}")]
    Auth { status: u16 },
    #[error("sign-in response is missing session fields")]
    AuthResponse,
    #[error("device list rejected with status {status}")]
    Device { status: u16 },
    #[error("device list has no usable serial number")]
    DeviceResponse,
    #[error("status fetch rejected with status {status}")]
    StatusFetch { status: u16 },
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// The three operations the upstream cloud API offers. Object-safe so the
/// poll core can be exercised against a scripted fake.
#[async_trait]
pub trait AqualinkClient: Send + Sync + 'static {
    /// Signs in with account credentials. The returned session has an
    /// empty `device_serial`; resolving it is a separate call.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AqualinkClientError>;

    /// Resolves the serial number of the account's first device.
    async fn first_device_serial(
        &self,
        credentials: &Credentials,
        session: &Session,
    ) -> Result<String, AqualinkClientError>;

    /// Fetches the raw live-status body. An HTTP 200 with an empty body is
    /// returned as an empty string: it is the upstream's way of saying the
    /// session is no longer valid, and the caller owns that decision.
    async fn fetch_home_status(&self, session: &Session) -> Result<String, AqualinkClientError>;
}

#[derive(Debug, Clone)]
pub struct AqualinkHttpClient {
    http: reqwest::Client,
    auth_base_url: String,
    status_base_url: String,
}

impl AqualinkHttpClient {
    pub fn new(
        auth_base_url: &str,
        status_base_url: &str,
        timeout: Duration,
    ) -> Result<Self, AqualinkClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            auth_base_url: auth_base_url.trim_end_matches('/').to_string(),
            status_base_url: status_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AqualinkClient for AqualinkHttpClient {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AqualinkClientError> {
        let response = self
            .http
            .post(format!("{}/users/sign_in.json", self.auth_base_url))
            .json(&serde_json::json!({
                "api_key": credentials.api_key,
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(AqualinkClientError::Auth { status });
        }

        let body: Value = serde_json::from_str(&response.text().await?)
            .map_err(|_| AqualinkClientError::AuthResponse)?;

        let session_id = non_empty_str(body.get("session_id"));
        let user_id = id_string(body.get("id"));
        let authentication_token = non_empty_str(body.get("authentication_token"));

        match (session_id, user_id, authentication_token) {
            (Some(id), Some(user_id), Some(authentication_token)) => Ok(Session {
                id: id.to_string(),
                user_id,
                authentication_token: authentication_token.to_string(),
                device_serial: String::new(),
            }),
            _ => Err(AqualinkClientError::AuthResponse),
        }
    }

    async fn first_device_serial(
        &self,
        credentials: &Credentials,
        session: &Session,
    ) -> Result<String, AqualinkClientError> {
        let response = self
            .http
            .get(format!("{}/devices.json", self.auth_base_url))
            .query(&[
                ("api_key", credentials.api_key.as_str()),
                (
                    "authentication_token",
                    session.authentication_token.as_str(),
                ),
                ("user_id", session.user_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(AqualinkClientError::Device { status });
        }

        let body: Value = serde_json::from_str(&response.text().await?)
            .map_err(|_| AqualinkClientError::DeviceResponse)?;

        body.get(0)
            .and_then(|device| device.get("serial_number"))
            .and_then(Value::as_str)
            .filter(|serial| !serial.is_empty())
            .map(ToString::to_string)
            .ok_or(AqualinkClientError::DeviceResponse)
    }

    async fn fetch_home_status(&self, session: &Session) -> Result<String, AqualinkClientError> {
        let response = self
            .http
            .get(format!("{}/session.json", self.status_base_url))
            .query(&[
                ("actionID", "command"),
                ("command", "get_home"),
                ("serial", session.device_serial.as_str()),
                ("sessionID", session.id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(AqualinkClientError::StatusFetch { status });
        }

        Ok(response.text().await?)
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|text| !text.is_empty())
}

// The upstream reports the user id as a JSON number; older firmware
// returns it as a string. Either way it is opaque to us.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}
