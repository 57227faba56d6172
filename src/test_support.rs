use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::adapters::aqualink::{AqualinkClient, AqualinkClientError};
use crate::adapters::db::run_migrations;
use crate::app::services::Clock;
use crate::domain::models::{Credentials, Session};

pub fn open_test_connection() -> rusqlite::Connection {
    let mut connection =
        rusqlite::Connection::open_in_memory().expect("in-memory db should open");
    run_migrations(&mut connection).expect("migrations should succeed");
    connection
}

pub fn test_credentials() -> Credentials {
    Credentials {
        api_key: "APIKEY".to_string(),
        email: "pool@example.com".to_string(),
        password: "hunter2".to_string(),
    }
}

/// Scripted stand-in for the upstream API: sign-ins mint sequentially
/// numbered sessions, status fetches pop pre-seeded bodies.
pub struct ScriptedClient {
    sign_in_calls: AtomicUsize,
    status_calls: AtomicUsize,
    fail_sign_in: bool,
    status_bodies: Mutex<VecDeque<String>>,
}

impl ScriptedClient {
    pub fn with_status_bodies(bodies: &[&str]) -> Self {
        Self {
            sign_in_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            fail_sign_in: false,
            status_bodies: Mutex::new(bodies.iter().map(ToString::to_string).collect()),
        }
    }

    pub fn failing_sign_in() -> Self {
        Self {
            sign_in_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            fail_sign_in: true,
            status_bodies: Mutex::new(VecDeque::new()),
        }
    }

    pub fn sign_in_count(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AqualinkClient for ScriptedClient {
    async fn sign_in(&self, _credentials: &Credentials) -> Result<Session, AqualinkClientError> {
        if self.fail_sign_in {
            return Err(AqualinkClientError::Auth { status: 401 });
        }

        let n = self.sign_in_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session {
            id: format!("session-{n}"),
            user_id: "12345".to_string(),
            authentication_token: format!("token-{n}"),
            device_serial: String::new(),
        })
    }

    async fn first_device_serial(
        &self,
        _credentials: &Credentials,
        _session: &Session,
    ) -> Result<String, AqualinkClientError> {
        Ok("SERIAL01".to_string())
    }

    async fn fetch_home_status(&self, _session: &Session) -> Result<String, AqualinkClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .status_bodies
            .lock()
            .expect("status bodies lock should be available")
            .pop_front()
            .expect("no scripted status body left"))
    }
}

/// Clock yielding a fixed sequence of instants; the last one repeats.
pub struct StepClock {
    values: Vec<DateTime<Utc>>,
    index: AtomicUsize,
}

impl StepClock {
    pub fn from_rfc3339(values: &[&str]) -> Self {
        Self {
            values: values
                .iter()
                .map(|value| {
                    DateTime::parse_from_rfc3339(value)
                        .expect("step clock value should parse")
                        .with_timezone(&Utc)
                })
                .collect(),
            index: AtomicUsize::new(0),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let index = self.index.fetch_add(1, Ordering::SeqCst);
        self.values
            .get(index)
            .copied()
            .unwrap_or_else(|| *self.values.last().expect("step clock needs a value"))
    }
}

pub fn http_response(status: u16, content_type: &str, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        502 => "Bad Gateway",
        _ => "Error",
    };
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serves one canned response per connection, in order, then exits and
/// returns the raw requests it saw.
pub fn spawn_http_responder(responses: Vec<String>) -> (u16, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("responder should bind");
    let port = listener
        .local_addr()
        .expect("responder addr should be available")
        .port();

    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().expect("responder should accept");
            stream
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("read timeout should be configurable");
            requests.push(read_http_request(&mut stream));
            stream
                .write_all(response.as_bytes())
                .expect("responder write should succeed");
        }
        requests
    });

    (port, handle)
}

fn read_http_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buffer = [0_u8; 1024];

    loop {
        let size = stream
            .read(&mut buffer)
            .expect("responder read should succeed");
        raw.extend_from_slice(&buffer[..size]);
        if size == 0 || request_complete(&raw) {
            break;
        }
    }

    String::from_utf8_lossy(&raw).into_owned()
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };

    let content_length = text
        .lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    text.len() >= header_end + 4 + content_length
}
