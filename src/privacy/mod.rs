//! Privacy mode and IP hashing with a daily-rotating salt
//!
//! When privacy mode is on, raw client IPs are replaced at the ingestion
//! boundary by `sha256(ip || secret || YYYY-MM-DD)`. The hash is stable for
//! a calendar day (same-day deduplication keeps working) and changes at the
//! date boundary, so visitors cannot be correlated by IP across days.

use anyhow::Result;
use async_trait::async_trait;
use base64::prelude::*;
use chrono::{NaiveDate, Utc};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PrivacyConfig;

/// Settings key holding the persisted privacy mode flag
pub const PRIVACY_MODE_SETTING: &str = "privacy_mode";

const CACHE_KEY: &str = "privacy_mode";

/// Backing store for the persisted privacy mode flag
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// `Ok(None)` when the setting has never been written
    async fn privacy_mode(&self) -> Result<Option<bool>>;
}

/// Interpret a persisted setting value
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "enabled"
    )
}

/// Use the configured secret or generate a per-process one.
///
/// A generated secret means hashes are not comparable across restarts.
pub fn resolve_secret(secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => {
            warn!("PRIVACY_SECRET not set, generating a random salt secret for this process");
            use rand::RngExt;
            let bytes: [u8; 32] = rand::rng().random();
            BASE64_URL_SAFE_NO_PAD.encode(bytes)
        }
    }
}

pub struct PrivacyGuard {
    source: Option<Arc<dyn SettingsSource>>,
    env_default: bool,
    secret: String,
    cache: Cache<&'static str, bool>,
}

impl PrivacyGuard {
    pub fn new(
        source: Option<Arc<dyn SettingsSource>>,
        secret: String,
        env_default: bool,
        cache_ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(cache_ttl)
            .build();

        Self {
            source,
            env_default,
            secret,
            cache,
        }
    }

    pub fn from_config(config: &PrivacyConfig, source: Option<Arc<dyn SettingsSource>>) -> Self {
        Self::new(
            source,
            resolve_secret(config.secret.as_deref()),
            config.env_default,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    /// Current privacy mode, re-read from the store at most once per TTL
    pub async fn is_enabled(&self) -> bool {
        self.cache
            .get_with(CACHE_KEY, async { self.read_setting().await })
            .await
    }

    async fn read_setting(&self) -> bool {
        let Some(source) = self.source.as_ref() else {
            return self.env_default;
        };

        match source.privacy_mode().await {
            Ok(Some(enabled)) => enabled,
            Ok(None) => self.env_default,
            Err(e) => {
                warn!(error = %e, "failed to read privacy mode setting, using environment default");
                self.env_default
            }
        }
    }

    /// Force the next `is_enabled` call to consult the store
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate(CACHE_KEY).await;
    }

    /// Hash with today's (UTC) salt
    pub fn hash_ip(&self, ip: &str) -> String {
        self.hash_ip_for_date(ip, Utc::now().date_naive())
    }

    pub fn hash_ip_for_date(&self, ip: &str, date: NaiveDate) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(self.secret.as_bytes());
        hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Hash when privacy mode is on. `force` comes from the per-request trust
    /// header and can only turn hashing on.
    pub async fn hash_if_enabled(&self, ip: &str, force: bool) -> String {
        if force || self.is_enabled().await {
            debug!("privacy mode active, hashing client ip");
            self.hash_ip(ip)
        } else {
            ip.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        value: Option<bool>,
        reads: AtomicUsize,
    }

    impl CountingSource {
        fn new(value: Option<bool>) -> Arc<Self> {
            Arc::new(Self {
                value,
                reads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SettingsSource for CountingSource {
        async fn privacy_mode(&self) -> Result<Option<bool>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.value)
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SettingsSource for FailingSource {
        async fn privacy_mode(&self) -> Result<Option<bool>> {
            Err(anyhow::anyhow!("settings table unavailable"))
        }
    }

    fn guard(source: Option<Arc<dyn SettingsSource>>, env_default: bool) -> PrivacyGuard {
        PrivacyGuard::new(
            source,
            "test-secret".to_string(),
            env_default,
            Duration::from_secs(300),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_hash_stable_within_a_day() {
        let guard = guard(None, false);
        let day = date(2024, 3, 14);
        assert_eq!(
            guard.hash_ip_for_date("1.2.3.4", day),
            guard.hash_ip_for_date("1.2.3.4", day)
        );
        assert_eq!(guard.hash_ip("1.2.3.4").len(), 64);
    }

    #[test]
    fn test_hash_rotates_across_date_boundary() {
        let guard = guard(None, false);
        assert_ne!(
            guard.hash_ip_for_date("1.2.3.4", date(2024, 3, 14)),
            guard.hash_ip_for_date("1.2.3.4", date(2024, 3, 15))
        );
    }

    #[test]
    fn test_hash_depends_on_secret() {
        let a = guard(None, false);
        let b = PrivacyGuard::new(None, "other".to_string(), false, Duration::from_secs(1));
        let day = date(2024, 3, 14);
        assert_ne!(
            a.hash_ip_for_date("1.2.3.4", day),
            b.hash_ip_for_date("1.2.3.4", day)
        );
    }

    #[tokio::test]
    async fn test_setting_is_cached_within_ttl() {
        let source = CountingSource::new(Some(true));
        let guard = guard(Some(source.clone()), false);

        assert!(guard.is_enabled().await);
        assert!(guard.is_enabled().await);
        assert!(guard.is_enabled().await);
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_setting_reread_after_ttl() {
        let source = CountingSource::new(Some(true));
        let guard = PrivacyGuard::new(
            Some(source.clone()),
            "s".to_string(),
            false,
            Duration::from_millis(50),
        );

        assert!(guard.is_enabled().await);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(guard.is_enabled().await);
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reread() {
        let source = CountingSource::new(Some(false));
        let guard = guard(Some(source.clone()), true);

        assert!(!guard.is_enabled().await);
        guard.invalidate_cache().await;
        assert!(!guard.is_enabled().await);
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_setting_uses_env_default() {
        let guard = guard(Some(CountingSource::new(None)), true);
        assert!(guard.is_enabled().await);
    }

    #[tokio::test]
    async fn test_store_failure_uses_env_default() {
        assert!(guard(Some(Arc::new(FailingSource)), true).is_enabled().await);
        assert!(!guard(Some(Arc::new(FailingSource)), false).is_enabled().await);
    }

    #[tokio::test]
    async fn test_hash_if_enabled_respects_setting() {
        let off = guard(Some(CountingSource::new(Some(false))), false);
        assert_eq!(off.hash_if_enabled("1.2.3.4", false).await, "1.2.3.4");

        let on = guard(Some(CountingSource::new(Some(true))), false);
        let hashed = on.hash_if_enabled("1.2.3.4", false).await;
        assert_ne!(hashed, "1.2.3.4");
        assert_eq!(hashed, on.hash_ip("1.2.3.4"));
    }

    #[tokio::test]
    async fn test_request_override_can_only_force_hashing_on() {
        let off = guard(Some(CountingSource::new(Some(false))), false);
        assert_ne!(off.hash_if_enabled("1.2.3.4", true).await, "1.2.3.4");

        // There is no way to ask for the raw IP while the global flag is on
        let on = guard(Some(CountingSource::new(Some(true))), false);
        assert_ne!(on.hash_if_enabled("1.2.3.4", false).await, "1.2.3.4");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("true"));
        assert!(parse_flag("Enabled"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret(Some("abc")), "abc");
        let generated = resolve_secret(None);
        assert!(!generated.is_empty());
        assert_ne!(generated, resolve_secret(None));
    }
}
