//! GeoIP lookup service using MaxMind GeoLite2/GeoIP2 City MMDB
//!
//! Thread-safe, memory-mapped, and optional: without a database every lookup
//! returns an empty location.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::models::GeoLocation;

#[derive(Clone, Default)]
pub struct GeoIpService {
    city_reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    /// Open the City database, if one is configured
    pub fn new(city_path: Option<&str>) -> Result<Self> {
        let city_reader = if let Some(path) = city_path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        Ok(Self { city_reader })
    }

    pub fn lookup(&self, ip: IpAddr) -> GeoLocation {
        let mut geo_location = GeoLocation::default();

        let Some(ref reader) = self.city_reader else {
            return geo_location;
        };

        if let Ok(result) = reader.lookup(ip) {
            if let Ok(Some(city)) = result.decode::<geoip2::City>() {
                geo_location.country_code = city.country.iso_code.map(|s| s.to_string());
                geo_location.city = city.city.names.english.map(|s| s.to_string());
                return geo_location;
            }

            // The City database is a superset of Country data
            if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
                geo_location.country_code = country.country.iso_code.map(|s| s.to_string());
            }
        }

        geo_location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geoip_service_creation_invalid_path() {
        let result = GeoIpService::new(Some("/nonexistent/path.mmdb"));
        assert!(result.is_err());
    }

    #[test]
    fn test_lookup_without_database_is_empty() {
        let service = GeoIpService::new(None).unwrap();
        let geo = service.lookup("8.8.8.8".parse().unwrap());
        assert_eq!(geo, GeoLocation::default());
    }
}
