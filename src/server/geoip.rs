// In-process IP → geo lookups with private-range bypass

use std::net::IpAddr;
use std::path::Path;

use maxminddb::geoip2;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize)]
pub struct GeoInfo {
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoInfo {
    fn local() -> Self {
        Self {
            country: "Local".into(),
            country_code: "XX".into(),
            region: "Local".into(),
            city: "Local".into(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

/// Process-scoped resolver. A missing or unreadable database is non-fatal:
/// lookups return empty records and ingestion continues.
pub struct GeoIpResolver {
    reader: Option<maxminddb::Reader<Vec<u8>>>,
}

impl GeoIpResolver {
    pub fn open(db_path: &Path) -> Self {
        match maxminddb::Reader::open_readfile(db_path) {
            Ok(reader) => Self {
                reader: Some(reader),
            },
            Err(e) => {
                warn!(
                    "GeoIP database unavailable at {} ({}); geo fields will be empty",
                    db_path.display(),
                    e
                );
                Self { reader: None }
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.reader.is_some()
    }

    pub fn lookup(&self, ip_str: &str) -> GeoInfo {
        let Ok(ip) = ip_str.parse::<IpAddr>() else {
            return GeoInfo::default();
        };
        if is_private(&ip) {
            return GeoInfo::local();
        }
        let Some(reader) = &self.reader else {
            return GeoInfo::default();
        };
        let Ok(city) = reader.lookup::<geoip2::City>(ip) else {
            return GeoInfo::default();
        };

        let mut info = GeoInfo::default();
        if let Some(country) = city.country {
            info.country = country
                .names
                .as_ref()
                .and_then(|n| n.get("en"))
                .map(|s| s.to_string())
                .unwrap_or_default();
            info.country_code = country.iso_code.map(|s| s.to_string()).unwrap_or_default();
        }
        if let Some(subdivisions) = city.subdivisions
            && let Some(first) = subdivisions.first()
        {
            info.region = first
                .names
                .as_ref()
                .and_then(|n| n.get("en"))
                .map(|s| s.to_string())
                .unwrap_or_default();
        }
        if let Some(c) = city.city {
            info.city = c
                .names
                .as_ref()
                .and_then(|n| n.get("en"))
                .map(|s| s.to_string())
                .unwrap_or_default();
        }
        if let Some(location) = city.location {
            info.latitude = location.latitude.unwrap_or(0.0);
            info.longitude = location.longitude.unwrap_or(0.0);
        }
        info
    }
}

/// Loopback, link-local, RFC1918 and fc00::/7 never hit the database.
fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_link_local() || v4.is_private() || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                // fc00::/7 unique-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges_bypass_the_database() {
        let resolver = GeoIpResolver::open(Path::new("/nonexistent/GeoLite2-City.mmdb"));
        assert!(!resolver.is_loaded());
        for ip in ["127.0.0.1", "10.1.2.3", "172.16.0.9", "192.168.1.1", "::1", "fe80::1", "fd00::1"] {
            let info = resolver.lookup(ip);
            assert_eq!(info.country, "Local", "{ip} should be local");
            assert_eq!(info.country_code, "XX");
        }
    }

    #[test]
    fn missing_database_yields_empty_records_for_public_ips() {
        let resolver = GeoIpResolver::open(Path::new("/nonexistent/GeoLite2-City.mmdb"));
        let info = resolver.lookup("8.8.8.8");
        assert_eq!(info.country, "");
        assert_eq!(info.city, "");
    }

    #[test]
    fn garbage_input_yields_empty_record() {
        let resolver = GeoIpResolver::open(Path::new("/nonexistent/GeoLite2-City.mmdb"));
        assert_eq!(resolver.lookup("not-an-ip").country, "");
    }
}
