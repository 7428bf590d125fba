//! IP → owning organization via a MaxMind ASN database

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{UNKNOWN_ISP, UNKNOWN_ORGANIZATION};

/// Well-known addresses answered without a dataset, so enrichment stays
/// deterministic in development and tests.
const SENTINEL_ORGANIZATIONS: &[(&str, &str)] = &[
    ("8.8.8.8", "GOOGLE"),
    ("1.1.1.1", "CLOUDFLARENET"),
    ("12.34.56.78", "Tesla Motors Inc"),
    ("99.99.99.99", "Comcast Cable Communications"),
];

#[derive(Clone)]
pub struct AsnLookup {
    reader: Option<Arc<Reader<Mmap>>>,
}

impl AsnLookup {
    /// Open the ASN database at `path`.
    ///
    /// A missing file is not an error: the lookup runs against the sentinel
    /// table instead. A file that exists but cannot be opened is.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "ASN database not found at {}, using sentinel organizations",
                path.display()
            );
            return Ok(Self::sentinel());
        }

        let reader = unsafe { Reader::open_mmap(path) }
            .with_context(|| format!("Failed to open ASN database at {}", path.display()))?;
        info!("Loaded ASN database from {}", path.display());

        Ok(Self {
            reader: Some(Arc::new(reader)),
        })
    }

    /// Lookup backed only by the sentinel table
    pub fn sentinel() -> Self {
        Self { reader: None }
    }

    pub fn has_dataset(&self) -> bool {
        self.reader.is_some()
    }

    /// Best-effort organization name; never fails.
    pub fn organization(&self, ip: &str) -> String {
        let ip = ip.trim();

        let Some(reader) = self.reader.as_ref() else {
            return SENTINEL_ORGANIZATIONS
                .iter()
                .find(|(sentinel, _)| *sentinel == ip)
                .map(|(_, org)| org.to_string())
                .unwrap_or_else(|| UNKNOWN_ISP.to_string());
        };

        let Ok(addr) = ip.parse::<IpAddr>() else {
            // Hashed IPs land here when privacy mode is on
            debug!("skipping ASN lookup for non-IP value");
            return UNKNOWN_ORGANIZATION.to_string();
        };

        let organization = reader
            .lookup(addr)
            .ok()
            .and_then(|result| result.decode::<geoip2::Asn>().ok().flatten())
            .and_then(|asn| asn.autonomous_system_organization.map(|s| s.to_string()))
            .filter(|org| !org.trim().is_empty());

        organization.unwrap_or_else(|| UNKNOWN_ORGANIZATION.to_string())
    }
}
