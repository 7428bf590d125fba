use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub enrichment: EnrichmentConfig,
    pub privacy: PrivacyConfig,
    pub network: NetworkConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Bounded queue size; events beyond it are shed
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            workers: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub asn_db_path: String,
    pub geoip_city_db_path: Option<String>,
    /// JSON array of lowercase ISP name substrings
    pub isp_blacklist_path: String,
    /// 0 disables periodic reloads
    pub isp_blacklist_refresh_secs: u64,
    pub reverse_dns_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Used when the persisted setting is missing or unreadable
    pub env_default: bool,
    pub secret: Option<String>,
    pub cache_ttl_secs: u64,
    /// Trust-boundary header that forces hashing for a single request
    pub override_header: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address only
    None,
    /// Forwarded / X-Forwarded-For with trust validation
    Standard,
    /// CF-Connecting-IP
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: vec![],
            num_trusted_proxies: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// 0 disables pruning
    pub days: u32,
    pub interval_secs: u64,
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {name}: '{v}'")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./beacon.db".to_string());
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("PORT", 8080u16)?;

        let defaults = IngestConfig::default();
        let ingest = IngestConfig {
            queue_capacity: env_parse("INGEST_QUEUE_CAPACITY", defaults.queue_capacity)?.max(1),
            workers: env_parse("INGEST_WORKERS", defaults.workers)?.max(1),
        };

        let enrichment = EnrichmentConfig {
            asn_db_path: std::env::var("ASN_DB_PATH")
                .unwrap_or_else(|_| "data/GeoLite2-ASN.mmdb".to_string()),
            geoip_city_db_path: std::env::var("GEOIP_CITY_DB_PATH").ok(),
            isp_blacklist_path: std::env::var("ISP_BLACKLIST_PATH")
                .unwrap_or_else(|_| "data/isp_blacklist.json".to_string()),
            isp_blacklist_refresh_secs: env_parse("ISP_BLACKLIST_REFRESH_SECS", 0u64)?,
            reverse_dns_enabled: env_flag("REVERSE_DNS_ENABLED", true),
        };

        let privacy = PrivacyConfig {
            env_default: env_flag("PRIVACY_MODE", false),
            secret: std::env::var("PRIVACY_SECRET").ok().filter(|s| !s.is_empty()),
            cache_ttl_secs: env_parse("PRIVACY_CACHE_TTL_SECS", 300u64)?,
            override_header: std::env::var("PRIVACY_HEADER")
                .unwrap_or_else(|_| "x-beacon-privacy".to_string())
                .to_lowercase(),
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<IpNet>()
                    .or_else(|_| s.parse::<std::net::IpAddr>().map(IpNet::from))
                    .with_context(|| format!("Invalid TRUSTED_PROXIES entry '{s}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok());

        let retention = RetentionConfig {
            days: env_parse("RETENTION_DAYS", 0u32)?,
            interval_secs: env_parse("RETENTION_INTERVAL_SECS", 3600u64)?.max(1),
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            ingest,
            enrichment,
            privacy,
            network: NetworkConfig {
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            retention,
        })
    }
}
