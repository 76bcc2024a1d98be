//! Model — persisted request/response records.
//!
//! Bodies are raw bytes; they travel as base64 inside the JSON records so
//! arbitrary payloads survive the store round-trip.

use std::collections::HashMap;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A client request persisted before forwarding, under
/// `agent:<agentID>:requests:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRequest {
    pub id: String,
    pub agent_id: String,
    pub method: String,
    /// Agent-relative path (prefix already stripped), including query string.
    pub path: String,
    /// First value per header key.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(with = "base64_bytes", default)]
    pub body: Vec<u8>,
    pub status: RequestStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub response: Option<StoredResponse>,
    pub error: Option<String>,
}

impl StoredRequest {
    pub fn new(
        agent_id: &str,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        body: Vec<u8>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: format!("req-{}", Uuid::new_v4()),
            agent_id: agent_id.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            headers: first_header_values(headers),
            body,
            status: RequestStatus::Pending,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            processed_at: None,
            response: None,
            error: None,
        }
    }

    /// Whether the replay worker should attempt this request.
    pub fn replayable(&self) -> bool {
        self.status != RequestStatus::Processing
            && self.status != RequestStatus::Completed
            && self.retry_count < self.max_retries
    }
}

/// The response captured when a forward succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(with = "base64_bytes", default)]
    pub body: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// First value per key, header names lowercased.
pub fn first_header_values(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for key in headers.keys() {
        if let Some(value) = headers.get(key).and_then(|v| v.to_str().ok()) {
            map.entry(key.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    map
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
