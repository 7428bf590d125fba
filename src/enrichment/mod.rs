//! Per-event enrichment run by the workers: geolocation plus network
//! intelligence. The event's `ip` may already be a privacy hash, in which
//! case both lookups degrade to empty / `Unknown` results.

pub mod geoip;

use std::net::IpAddr;
use std::sync::Arc;

use crate::models::{Enrichment, Event, GeoLocation};
use crate::network::NetworkIntelligence;

pub use geoip::GeoIpService;

pub struct EnrichmentPipeline {
    geoip: GeoIpService,
    network: Arc<NetworkIntelligence>,
}

impl EnrichmentPipeline {
    pub fn new(geoip: GeoIpService, network: Arc<NetworkIntelligence>) -> Self {
        Self { geoip, network }
    }

    pub fn network(&self) -> &Arc<NetworkIntelligence> {
        &self.network
    }

    pub async fn enrich(&self, event: &Event) -> Enrichment {
        let geo = match event.ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.geoip.lookup(addr),
            Err(_) => GeoLocation::default(),
        };

        let network = self.network.identify(&event.ip).await;

        Enrichment { geo, network }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollectRequest;
    use crate::network::{AsnLookup, DisabledResolver, IspFilter};

    fn pipeline() -> EnrichmentPipeline {
        let network = NetworkIntelligence::new(
            AsnLookup::sentinel(),
            IspFilter::from_terms(["comcast"]),
            Arc::new(DisabledResolver),
        );
        EnrichmentPipeline::new(GeoIpService::default(), Arc::new(network))
    }

    fn event(ip: &str) -> Event {
        let request = CollectRequest {
            event_type: "pageview".into(),
            session_id: "s-1".into(),
            url: "https://example.com".into(),
            ..Default::default()
        };
        Event::from_request(request, ip.to_string(), 1_700_000_000)
    }

    #[tokio::test]
    async fn test_enrich_known_company() {
        let enrichment = pipeline().enrich(&event("12.34.56.78")).await;
        assert_eq!(enrichment.network.organization, "Tesla Motors Inc");
        assert!(enrichment.network.is_known_company());
        assert_eq!(enrichment.geo, GeoLocation::default());
    }

    #[tokio::test]
    async fn test_enrich_isp() {
        let enrichment = pipeline().enrich(&event("99.99.99.99")).await;
        assert!(enrichment.network.is_isp);
    }

    #[tokio::test]
    async fn test_enrich_hashed_ip_degrades_to_unknown() {
        let hashed = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        let enrichment = pipeline().enrich(&event(hashed)).await;
        assert!(!enrichment.network.is_known_company());
        assert_eq!(enrichment.geo, GeoLocation::default());
    }
}
