//! Network intelligence: who owns the visitor's IP?
//!
//! Three stages, cheapest first:
//! 1. ASN organization lookup (offline dataset, sentinel table without it)
//! 2. ISP classification against a substring blacklist
//! 3. Reverse DNS + root domain extraction, only for organizations that are
//!    neither ISPs nor unknown. Residential traffic is the bulk of the volume
//!    and never pays for a DNS round trip.
//!
//! Every stage degrades to a partial result; `identify` cannot fail.

pub mod asn;
pub mod isp_filter;
pub mod resolver;

use anyhow::Result;
use parking_lot::RwLock;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EnrichmentConfig;
use crate::models::{is_unknown_organization, NetworkProfile};

pub use asn::AsnLookup;
pub use isp_filter::IspFilter;
pub use resolver::{DisabledResolver, DnsReverseResolver, ReverseResolver};

pub struct NetworkIntelligence {
    asn: AsnLookup,
    isp_filter: RwLock<IspFilter>,
    blacklist_path: Option<PathBuf>,
    resolver: Arc<dyn ReverseResolver>,
}

impl NetworkIntelligence {
    pub fn new(asn: AsnLookup, isp_filter: IspFilter, resolver: Arc<dyn ReverseResolver>) -> Self {
        Self {
            asn,
            isp_filter: RwLock::new(isp_filter),
            blacklist_path: None,
            resolver,
        }
    }

    /// Never fails: an unusable ASN dataset degrades to the sentinel table.
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        let asn = AsnLookup::open(&config.asn_db_path).unwrap_or_else(|e| {
            warn!("ASN lookups degraded to sentinel organizations: {:#}", e);
            AsnLookup::sentinel()
        });
        let isp_filter = IspFilter::load(&config.isp_blacklist_path);

        let resolver: Arc<dyn ReverseResolver> = if config.reverse_dns_enabled {
            Arc::new(DnsReverseResolver::new())
        } else {
            info!("Reverse DNS company resolution disabled");
            Arc::new(DisabledResolver)
        };

        Self {
            asn,
            isp_filter: RwLock::new(isp_filter),
            blacklist_path: Some(PathBuf::from(&config.isp_blacklist_path)),
            resolver,
        }
    }

    pub fn with_blacklist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blacklist_path = Some(path.into());
        self
    }

    /// Re-read the ISP blacklist file, returning the number of terms loaded.
    ///
    /// A missing or unparsable file leaves the current filter in place.
    pub fn reload_isp_filter(&self) -> Result<usize> {
        let Some(path) = self.blacklist_path.as_ref() else {
            return Ok(self.isp_filter.read().len());
        };

        let filter = IspFilter::try_load(path)?;
        let count = filter.len();
        *self.isp_filter.write() = filter;
        Ok(count)
    }

    pub fn is_isp(&self, organization: &str) -> bool {
        self.isp_filter.read().is_isp(organization)
    }

    pub async fn identify(&self, ip: &str) -> NetworkProfile {
        let organization = self.asn.organization(ip);
        let is_isp = self.is_isp(&organization);

        let mut profile = NetworkProfile {
            ip: ip.to_string(),
            organization,
            is_isp,
            hostname: None,
            company_domain: None,
        };

        if profile.is_isp || is_unknown_organization(&profile.organization) {
            return profile;
        }

        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            return profile;
        };

        if let Some(hostname) = self.resolver.reverse_lookup(addr).await {
            debug!(organization = %profile.organization, %hostname, "resolved company hostname");
            profile.company_domain = extract_domain(&hostname);
            profile.hostname = Some(hostname);
        }

        profile
    }
}

/// Root domain as the last two labels of `hostname`.
///
/// `gw.tesla.com` gives `tesla.com`. Multi-label public suffixes are not
/// handled: `foo.co.uk` gives `co.uk`.
pub fn extract_domain(hostname: &str) -> Option<String> {
    let labels: Vec<&str> = hostname.trim_end_matches('.').split('.').collect();
    if labels.len() < 2 {
        return None;
    }

    Some(labels[labels.len() - 2..].join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeResolver {
        hostname: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeResolver {
        fn new(hostname: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                hostname: hostname.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReverseResolver for FakeResolver {
        async fn reverse_lookup(&self, _ip: IpAddr) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hostname.clone()
        }
    }

    fn intelligence(resolver: Arc<FakeResolver>) -> NetworkIntelligence {
        NetworkIntelligence::new(
            AsnLookup::sentinel(),
            IspFilter::from_terms(["comcast", "cloudflare"]),
            resolver,
        )
    }

    #[tokio::test]
    async fn test_company_resolved_via_reverse_dns() {
        let resolver = FakeResolver::new(Some("gw.hq.tesla.com"));
        let profile = intelligence(resolver.clone()).identify("12.34.56.78").await;

        assert_eq!(profile.organization, "Tesla Motors Inc");
        assert!(!profile.is_isp);
        assert_eq!(profile.hostname.as_deref(), Some("gw.hq.tesla.com"));
        assert_eq!(profile.company_domain.as_deref(), Some("tesla.com"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_isp_skips_reverse_dns() {
        let resolver = FakeResolver::new(Some("c-99-99-99-99.hsd1.comcast.net"));
        let profile = intelligence(resolver.clone()).identify("99.99.99.99").await;

        assert_eq!(profile.organization, "Comcast Cable Communications");
        assert!(profile.is_isp);
        assert_eq!(profile.hostname, None);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_skips_reverse_dns() {
        let resolver = FakeResolver::new(Some("host.example.com"));
        let profile = intelligence(resolver.clone()).identify("203.0.113.7").await;

        assert_eq!(profile.organization, "Unknown ISP");
        assert!(!profile.is_known_company());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dns_failure_keeps_organization() {
        let resolver = FakeResolver::new(None);
        let profile = intelligence(resolver).identify("8.8.8.8").await;

        assert_eq!(profile.organization, "GOOGLE");
        assert_eq!(profile.hostname, None);
        assert_eq!(profile.company_domain, None);
    }

    #[tokio::test]
    async fn test_reload_isp_filter() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["comcast"]"#).unwrap();

        let intel = NetworkIntelligence::new(
            AsnLookup::sentinel(),
            IspFilter::default(),
            Arc::new(DisabledResolver),
        )
        .with_blacklist_path(file.path());

        assert!(!intel.is_isp("Comcast Cable Communications"));
        assert_eq!(intel.reload_isp_filter().unwrap(), 1);
        assert!(intel.is_isp("Comcast Cable Communications"));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_filter() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["comcast"]"#).unwrap();

        let intel = NetworkIntelligence::new(
            AsnLookup::sentinel(),
            IspFilter::load(file.path()),
            Arc::new(DisabledResolver),
        )
        .with_blacklist_path(file.path());
        assert!(intel.is_isp("Comcast Cable Communications"));

        // Half-written rewrite
        std::fs::write(file.path(), "{broken").unwrap();
        assert!(intel.reload_isp_filter().is_err());
        assert!(intel.is_isp("Comcast Cable Communications"));

        let profile = intel.identify("99.99.99.99").await;
        assert!(profile.is_isp);
        assert!(!profile.is_known_company());

        // File briefly missing
        let path = file.path().to_path_buf();
        drop(file);
        let intel = intel.with_blacklist_path(path);
        assert!(intel.reload_isp_filter().is_err());
        assert!(intel.is_isp("Comcast Cable Communications"));
    }

    #[tokio::test]
    async fn test_corrupt_asn_dataset_degrades_to_sentinels() {
        let asn_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(asn_file.path(), b"not an mmdb file").unwrap();

        let config = EnrichmentConfig {
            asn_db_path: asn_file.path().to_string_lossy().into_owned(),
            geoip_city_db_path: None,
            isp_blacklist_path: "/nonexistent/isp_blacklist.json".to_string(),
            isp_blacklist_refresh_secs: 0,
            reverse_dns_enabled: false,
        };

        let intel = NetworkIntelligence::from_config(&config);
        let profile = intel.identify("8.8.8.8").await;
        assert_eq!(profile.organization, "GOOGLE");
        assert_eq!(intel.identify("203.0.113.7").await.organization, "Unknown ISP");
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("gw.tesla.com").as_deref(), Some("tesla.com"));
        assert_eq!(
            extract_domain("vpn.us.coca-cola.com.").as_deref(),
            Some("coca-cola.com")
        );
        assert_eq!(extract_domain("localhost"), None);
    }

    #[test]
    fn test_extract_domain_naive_for_public_suffixes() {
        assert_eq!(extract_domain("foo.co.uk").as_deref(), Some("co.uk"));
    }
}
