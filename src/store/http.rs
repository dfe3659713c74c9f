//! HTTP client for the record store API.
//!
//! Responses are accepted either bare or wrapped in an envelope of the form
//! `{"success": bool, "message": "...", "data": ...}`.

use crate::config::ApiConfig;
use crate::models::{AttendanceFilter, AttendanceRecord, NewAttendanceRecord, NewStudent, Student};
use crate::store::{RecordStore, StoreError, StoreResult, UNKNOWN_ERROR};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Response envelope some store endpoints wrap their payload in.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Record store reached over HTTP with JSON bodies.
pub struct HttpRecordStore {
    base_url: Url,
    token: Option<String>,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl HttpRecordStore {
    /// Create a client for the API described by `config`.
    pub fn new(config: &ApiConfig) -> StoreResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            StoreError::Request(format!("Invalid API URL {}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Request(format!(
                "Invalid API URL {}: not a base URL",
                config.base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StoreError::Request(format!("Failed to create HTTP client: {}", e)))?;

        info!("Using record store at {}", base_url);

        Ok(Self {
            base_url,
            token: config.token.clone(),
            timeout_seconds: config.timeout_seconds,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Build `{base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Request(format!("Invalid API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and unwrap the response body.
    async fn execute(&self, builder: RequestBuilder) -> StoreResult<Option<Value>> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout {
                    seconds: self.timeout_seconds,
                }
            } else if e.is_connect() {
                StoreError::Connect {
                    url: self.base_url.to_string(),
                }
            } else {
                StoreError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        debug!("Record store answered {} ({} bytes)", status, body.len());

        decode_body(status, &body)
    }
}

/// Turn a status and raw body into the payload, or the store's error message.
fn decode_body(status: StatusCode, body: &str) -> StoreResult<Option<Value>> {
    let trimmed = body.trim();

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(trimmed)
            .ok()
            .and_then(|v| error_message(&v))
            .or_else(|| (!trimmed.is_empty()).then(|| trimmed.to_string()))
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| StoreError::Decode(e.to_string()))?;

    if value.get("success").is_none() {
        return Ok(Some(value));
    }

    let envelope: Envelope =
        serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))?;

    if !envelope.success {
        let message = envelope
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    Ok(envelope.data.filter(|d| !d.is_null()))
}

fn error_message(value: &Value) -> Option<String> {
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
}

fn parse_data<T: DeserializeOwned>(value: Value, what: &str) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode(format!("invalid {}: {}", what, e)))
}

/// A created item, or `None` when the store did not echo it back.
fn parse_optional<T: DeserializeOwned>(data: Option<Value>, what: &str) -> StoreResult<Option<T>> {
    data.map(|value| parse_data(value, what)).transpose()
}

/// A missing payload is an empty list.
fn parse_list<T: DeserializeOwned>(data: Option<Value>, what: &str) -> StoreResult<Vec<T>> {
    parse_data(data.unwrap_or_else(|| Value::Array(Vec::new())), what)
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn list_students(&self) -> StoreResult<Vec<Student>> {
        let url = self.endpoint(&["students"])?;
        let data = self.execute(self.request(Method::GET, url)).await?;
        parse_list(data, "students")
    }

    async fn create_student(&self, student: &NewStudent) -> StoreResult<Option<Student>> {
        let url = self.endpoint(&["students"])?;
        let data = self
            .execute(self.request(Method::POST, url).json(student))
            .await?;
        parse_optional(data, "student")
    }

    async fn delete_student(&self, student_id: &str) -> StoreResult<()> {
        let url = self.endpoint(&["students", student_id])?;
        self.execute(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>> {
        let url = self.endpoint(&["attendance"])?;
        let mut request = self.request(Method::GET, url);
        if !filter.is_empty() {
            debug!("Listing attendance with {:?}", filter);
            request = request.query(&filter.query_pairs());
        }
        let data = self.execute(request).await?;
        parse_list(data, "attendance records")
    }

    async fn create_attendance(
        &self,
        record: &NewAttendanceRecord,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let url = self.endpoint(&["attendance"])?;
        let data = self
            .execute(self.request(Method::POST, url).json(record))
            .await?;
        parse_optional(data, "attendance record")
    }

    async fn delete_attendance(&self, attendance_id: &str) -> StoreResult<()> {
        let url = self.endpoint(&["attendance", attendance_id])?;
        self.execute(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
