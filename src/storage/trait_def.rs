use crate::models::{Lead, NewEvent, PruneReport, Session, StoredEvent, Visitor, VisitorUpsert};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Row counts across the ingestion tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub visitors: i64,
    pub sessions: i64,
    pub events: i64,
    pub leads: i64,
}

/// Persistence for visitors, sessions, events and leads.
///
/// Every write is a single idempotent statement; nothing here opens a
/// transaction spanning several tables.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Insert a visitor, or refresh `last_seen` and company attribution
    async fn upsert_visitor(&self, visitor: &VisitorUpsert) -> Result<()>;

    /// Insert a lead with `visit_count = 1`, or increment it
    async fn upsert_lead(&self, company_name: &str, domain: Option<&str>, seen_at: i64)
        -> Result<()>;

    /// Insert a session with `page_count = 1`, or atomically increment it
    async fn upsert_session(&self, session_id: &str, fingerprint: &str, seen_at: i64)
        -> Result<()>;

    /// Append an event, returning its id
    async fn insert_event(&self, event: &NewEvent) -> Result<i64>;

    async fn get_visitor(&self, fingerprint: &str) -> Result<Option<Visitor>>;

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    async fn get_lead(&self, company_name: &str) -> Result<Option<Lead>>;

    /// Leads ordered by most recent activity
    async fn list_leads(&self, limit: i64) -> Result<Vec<Lead>>;

    /// Events of one session in insertion order
    async fn list_session_events(&self, session_id: &str) -> Result<Vec<StoredEvent>>;

    async fn table_counts(&self) -> Result<TableCounts>;

    async fn get_setting(&self, name: &str) -> Result<Option<String>>;

    async fn set_setting(&self, name: &str, value: &str) -> Result<()>;

    /// Delete events created, and sessions last active, before `cutoff`
    async fn prune_before(&self, cutoff: i64) -> Result<PruneReport>;
}
