use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Substring blacklist of residential / hosting ISP names
#[derive(Debug, Clone, Default)]
pub struct IspFilter {
    terms: Vec<String>,
}

impl IspFilter {
    /// Startup loader: a missing or malformed file yields an empty filter.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        match Self::try_load(path) {
            Ok(filter) => {
                info!("Loaded {} ISP filters", filter.len());
                filter
            }
            Err(e) => {
                warn!("ISP blacklist unavailable, classifying no ISPs: {:#}", e);
                Self::default()
            }
        }
    }

    /// Read a JSON array of substrings, failing on a missing or unparsable file
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ISP blacklist at {}", path.display()))?;
        let terms = serde_json::from_str::<Vec<String>>(&data)
            .with_context(|| format!("Failed to parse ISP blacklist at {}", path.display()))?;

        Ok(Self::from_terms(terms))
    }

    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            // an empty term would match every organization
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    pub fn is_isp(&self, organization: &str) -> bool {
        let organization = organization.to_lowercase();
        self.terms.iter().any(|term| organization.contains(term))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
