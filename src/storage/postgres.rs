use crate::models::{Lead, NewEvent, PruneReport, Session, StoredEvent, Visitor, VisitorUpsert};
use crate::storage::{Storage, TableCounts};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visitors (
                id BIGSERIAL PRIMARY KEY,
                fingerprint TEXT NOT NULL UNIQUE,
                ip_hash TEXT NOT NULL,
                user_agent TEXT NOT NULL DEFAULT '',
                screen_resolution TEXT NOT NULL DEFAULT '',
                country TEXT,
                city TEXT,
                company_name TEXT,
                company_domain TEXT,
                is_isp BOOLEAN NOT NULL DEFAULT FALSE,
                first_seen BIGINT NOT NULL,
                last_seen BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id BIGSERIAL PRIMARY KEY,
                session_id TEXT NOT NULL UNIQUE,
                fingerprint TEXT NOT NULL,
                started_at BIGINT NOT NULL,
                last_activity BIGINT NOT NULL,
                page_count BIGINT NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_fingerprint ON sessions(fingerprint)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_last_activity ON sessions(last_activity)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id BIGSERIAL PRIMARY KEY,
                session_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                url TEXT NOT NULL,
                referrer TEXT NOT NULL DEFAULT '',
                payload TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_session_id ON events(session_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leads (
                id BIGSERIAL PRIMARY KEY,
                company_name TEXT NOT NULL UNIQUE,
                domain TEXT,
                first_seen BIGINT NOT NULL,
                last_seen BIGINT NOT NULL,
                visit_count BIGINT NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn upsert_visitor(&self, visitor: &VisitorUpsert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO visitors (
                fingerprint, ip_hash, user_agent, screen_resolution, country, city,
                company_name, company_domain, is_isp, first_seen, last_seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            ON CONFLICT (fingerprint) DO UPDATE SET
                last_seen = GREATEST(visitors.last_seen, EXCLUDED.last_seen),
                company_name = EXCLUDED.company_name,
                company_domain = EXCLUDED.company_domain,
                is_isp = EXCLUDED.is_isp
            "#,
        )
        .bind(&visitor.fingerprint)
        .bind(&visitor.ip_hash)
        .bind(&visitor.user_agent)
        .bind(&visitor.screen_resolution)
        .bind(&visitor.country)
        .bind(&visitor.city)
        .bind(&visitor.company_name)
        .bind(&visitor.company_domain)
        .bind(visitor.is_isp)
        .bind(visitor.seen_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn upsert_lead(
        &self,
        company_name: &str,
        domain: Option<&str>,
        seen_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leads (company_name, domain, first_seen, last_seen, visit_count)
            VALUES ($1, $2, $3, $3, 1)
            ON CONFLICT (company_name) DO UPDATE SET
                domain = COALESCE(EXCLUDED.domain, leads.domain),
                last_seen = GREATEST(leads.last_seen, EXCLUDED.last_seen),
                visit_count = leads.visit_count + 1
            "#,
        )
        .bind(company_name)
        .bind(domain)
        .bind(seen_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn upsert_session(
        &self,
        session_id: &str,
        fingerprint: &str,
        seen_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, fingerprint, started_at, last_activity, page_count)
            VALUES ($1, $2, $3, $3, 1)
            ON CONFLICT (session_id) DO UPDATE SET
                last_activity = GREATEST(sessions.last_activity, EXCLUDED.last_activity),
                page_count = sessions.page_count + 1
            "#,
        )
        .bind(session_id)
        .bind(fingerprint)
        .bind(seen_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO events (session_id, event_type, url, referrer, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&event.session_id)
        .bind(&event.event_type)
        .bind(&event.url)
        .bind(&event.referrer)
        .bind(&event.payload)
        .bind(event.created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    async fn get_visitor(&self, fingerprint: &str) -> Result<Option<Visitor>> {
        let visitor = sqlx::query_as::<_, Visitor>(
            r#"
            SELECT id, fingerprint, ip_hash, user_agent, screen_resolution, country, city,
                   company_name, company_domain, is_isp, first_seen, last_seen
            FROM visitors
            WHERE fingerprint = $1
            "#,
        )
        .bind(fingerprint)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(visitor)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, session_id, fingerprint, started_at, last_activity, page_count
            FROM sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    async fn get_lead(&self, company_name: &str) -> Result<Option<Lead>> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            SELECT id, company_name, domain, first_seen, last_seen, visit_count
            FROM leads
            WHERE company_name = $1
            "#,
        )
        .bind(company_name)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(lead)
    }

    async fn list_leads(&self, limit: i64) -> Result<Vec<Lead>> {
        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT id, company_name, domain, first_seen, last_seen, visit_count
            FROM leads
            ORDER BY last_seen DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(leads)
    }

    async fn list_session_events(&self, session_id: &str) -> Result<Vec<StoredEvent>> {
        let events = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT id, session_id, event_type, url, referrer, payload, created_at
            FROM events
            WHERE session_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }

    async fn table_counts(&self) -> Result<TableCounts> {
        let (visitors, sessions, events, leads) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM visitors),
                (SELECT COUNT(*) FROM sessions),
                (SELECT COUNT(*) FROM events),
                (SELECT COUNT(*) FROM leads)
            "#,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(TableCounts {
            visitors,
            sessions,
            events,
            leads,
        })
    }

    async fn get_setting(&self, name: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(value)
    }

    async fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO settings (name, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(name)
        .bind(value)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn prune_before(&self, cutoff: i64) -> Result<PruneReport> {
        let events = sqlx::query("DELETE FROM events WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?
            .rows_affected();

        let sessions = sqlx::query("DELETE FROM sessions WHERE last_activity < $1")
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?
            .rows_affected();

        Ok(PruneReport { sessions, events })
    }
}
