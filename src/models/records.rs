use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Visitor {
    pub id: i64,
    pub fingerprint: String,
    pub ip_hash: String,
    pub user_agent: String,
    pub screen_resolution: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub company_name: Option<String>,
    pub company_domain: Option<String>,
    pub is_isp: bool,
    pub first_seen: i64,
    pub last_seen: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    pub session_id: String,
    pub fingerprint: String,
    pub started_at: i64,
    pub last_activity: i64,
    pub page_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: i64,
    pub company_name: String,
    pub domain: Option<String>,
    pub first_seen: i64,
    pub last_seen: i64,
    pub visit_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredEvent {
    pub id: i64,
    pub session_id: String,
    pub event_type: String,
    pub url: String,
    pub referrer: String,
    /// JSON text: client data under `d`, client timestamp under `ts`,
    /// enrichment under `enrichment`
    pub payload: String,
    pub created_at: i64,
}

/// Values written by the visitor upsert
#[derive(Debug, Clone)]
pub struct VisitorUpsert {
    pub fingerprint: String,
    pub ip_hash: String,
    pub user_agent: String,
    pub screen_resolution: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub company_name: Option<String>,
    pub company_domain: Option<String>,
    pub is_isp: bool,
    pub seen_at: i64,
}

/// Values written by the event insert
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub session_id: String,
    pub event_type: String,
    pub url: String,
    pub referrer: String,
    pub payload: String,
    pub created_at: i64,
}

/// Rows removed by a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub sessions: u64,
    pub events: u64,
}
