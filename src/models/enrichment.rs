use serde::{Deserialize, Serialize};

/// Organization label used when the ASN lookup produced nothing usable.
pub const UNKNOWN_ORGANIZATION: &str = "Unknown";

/// Organization label reported by the sentinel table for unlisted IPs.
pub const UNKNOWN_ISP: &str = "Unknown ISP";

/// Geographic location derived from the City dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country_code: Option<String>,

    /// City name (English)
    pub city: Option<String>,
}

/// Outcome of the network intelligence stages for a single IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub ip: String,
    pub organization: String,
    pub is_isp: bool,
    pub hostname: Option<String>,
    pub company_domain: Option<String>,
}

impl NetworkProfile {
    pub fn unknown(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            organization: UNKNOWN_ORGANIZATION.to_string(),
            is_isp: false,
            hostname: None,
            company_domain: None,
        }
    }

    /// True when the organization carries no information about the visitor.
    pub fn is_unknown(&self) -> bool {
        is_unknown_organization(&self.organization)
    }

    /// A named, non-ISP organization: the only kind that produces a lead.
    pub fn is_known_company(&self) -> bool {
        !self.is_isp && !self.is_unknown()
    }
}

pub fn is_unknown_organization(organization: &str) -> bool {
    let trimmed = organization.trim();
    trimmed.is_empty() || trimmed == UNKNOWN_ORGANIZATION || trimmed == UNKNOWN_ISP
}

/// Everything the worker attaches to an event before persisting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub geo: GeoLocation,
    pub network: NetworkProfile,
}

impl Enrichment {
    pub fn unknown(ip: &str) -> Self {
        Self {
            geo: GeoLocation::default(),
            network: NetworkProfile::unknown(ip),
        }
    }
}
