use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use tracing::{debug, warn};

/// Reverse DNS seam. Returns the first PTR hostname without the trailing dot.
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    async fn reverse_lookup(&self, ip: IpAddr) -> Option<String>;
}

/// PTR lookups through hickory.
///
/// No deadline is layered on top of the resolver's own per-query timeout, so
/// a slow DNS server holds the calling worker for the whole lookup.
pub struct DnsReverseResolver {
    resolver: TokioAsyncResolver,
}

impl DnsReverseResolver {
    /// Use the host's resolv.conf, falling back to Cloudflare's servers
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            warn!(error = %e, "failed to read system DNS config, using Cloudflare resolvers");
            TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), ResolverOpts::default())
        });

        Self { resolver }
    }
}

impl Default for DnsReverseResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReverseResolver for DnsReverseResolver {
    async fn reverse_lookup(&self, ip: IpAddr) -> Option<String> {
        match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .filter(|name| !name.is_empty()),
            Err(e) => {
                debug!(%ip, error = %e, "reverse DNS lookup failed");
                None
            }
        }
    }
}

/// Used when reverse DNS is switched off in configuration
pub struct DisabledResolver;

#[async_trait]
impl ReverseResolver for DisabledResolver {
    async fn reverse_lookup(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}
