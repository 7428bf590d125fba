use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Key of the screen resolution entry inside the fingerprint inputs map.
pub const SCREEN_RESOLUTION_KEY: &str = "sr";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("url is required")]
    MissingUrl,
    #[error("url must be an absolute http(s) URL")]
    InvalidUrl,
    #[error("session id is required")]
    MissingSessionId,
    #[error("client ip could not be determined")]
    MissingIp,
}

/// Tracking beacon as posted by the browser script.
///
/// Field names follow the compact wire format (`t`, `sid`, `ts`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectRequest {
    #[serde(rename = "t", default)]
    pub event_type: String,
    #[serde(rename = "sid", default)]
    pub session_id: String,
    #[serde(rename = "ts", default)]
    pub timestamp: i64,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "ref", default)]
    pub referrer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(rename = "ua", default)]
    pub user_agent: String,
    #[serde(rename = "fp", default)]
    pub fingerprint_inputs: HashMap<String, String>,
    #[serde(rename = "d", default)]
    pub payload: Map<String, Value>,
}

impl CollectRequest {
    /// Reject payloads that must never reach the queue.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingUrl);
        }

        let parsed = url::Url::parse(&self.url).map_err(|_| ValidationError::InvalidUrl)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidUrl);
        }

        if self.session_id.trim().is_empty() {
            return Err(ValidationError::MissingSessionId);
        }

        Ok(())
    }
}

/// Validated ingress record. Built once per ingestion call and never mutated;
/// the `ip` field already holds the hashed value when privacy mode applied.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: String,
    pub session_id: String,
    pub timestamp: i64,
    pub url: String,
    pub referrer: String,
    pub ip: String,
    pub user_agent: String,
    pub fingerprint_inputs: HashMap<String, String>,
    pub payload: Map<String, Value>,
    /// Server receive time (unix seconds); all stored timestamps derive from it
    pub received_at: i64,
}

impl Event {
    pub fn from_request(request: CollectRequest, ip: String, received_at: i64) -> Self {
        Self {
            event_type: request.event_type,
            session_id: request.session_id,
            timestamp: request.timestamp,
            url: request.url,
            referrer: request.referrer,
            ip,
            user_agent: request.user_agent,
            fingerprint_inputs: request.fingerprint_inputs,
            payload: request.payload,
            received_at,
        }
    }

    pub fn screen_resolution(&self) -> &str {
        self.fingerprint_inputs
            .get(SCREEN_RESOLUTION_KEY)
            .map(String::as_str)
            .unwrap_or("")
    }
}
