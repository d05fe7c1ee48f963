//! GeoIP/ASN host enrichment.
//!
//! Mutates a [`Host`] in place with autonomous-system data, location, and
//! labels. Individual lookup misses leave the field absent; only an invalid
//! or non-IPv4 address fails the enrichment.

use std::net::IpAddr;

use crate::error_handling::EnrichError;
use crate::geoip::GeoIpReaders;
use crate::models::{AsnInfo, Host, Location};

/// Label attached to hosts whose GeoIP traits flag an anonymizing proxy.
const ANONYMOUS_PROXY_LABEL: &str = "anonymous-proxy";

pub struct Enricher {
    readers: GeoIpReaders,
}

impl Enricher {
    pub fn new(readers: GeoIpReaders) -> Self {
        Enricher { readers }
    }

    /// Converts a dotted-quad IPv4 string to its big-endian integer form.
    pub fn ip_to_int(ip: &str) -> Result<u64, EnrichError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| EnrichError::InvalidIp(ip.to_string()))?;
        match addr {
            IpAddr::V4(v4) => Ok(u64::from(u32::from(v4))),
            IpAddr::V6(_) => Err(EnrichError::NotIpv4(ip.to_string())),
        }
    }

    /// Enriches `host` from the GeoIP databases.
    ///
    /// Sets `asn`, `location`, the satellite-provider flag, the
    /// anonymous-proxy label, and always `ip_int`.
    pub fn enrich(&self, host: &mut Host) -> Result<(), EnrichError> {
        let addr: IpAddr = host
            .ip
            .parse()
            .map_err(|_| EnrichError::InvalidIp(host.ip.clone()))?;
        let IpAddr::V4(v4) = addr else {
            return Err(EnrichError::NotIpv4(host.ip.clone()));
        };

        if let Some(reader) = &self.readers.asn {
            if let Ok(lookup) = reader.lookup(addr) {
                if lookup.has_data() {
                    if let Ok(Some(record)) = lookup.decode::<maxminddb::geoip2::Asn>() {
                        let asn = host.asn.get_or_insert_with(AsnInfo::default);
                        asn.number = record.autonomous_system_number.unwrap_or_default();
                        asn.organization = record
                            .autonomous_system_organization
                            .map(|s| s.to_string());
                    }
                }
            }
        }

        if let Some(reader) = &self.readers.city {
            if let Ok(lookup) = reader.lookup(addr) {
                if lookup.has_data() {
                    if let Ok(Some(record)) = lookup.decode::<maxminddb::geoip2::City>() {
                        host.location = Some(Location {
                            coordinates: [
                                record.location.longitude.unwrap_or_default(),
                                record.location.latitude.unwrap_or_default(),
                            ],
                            city: record.city.names.english.map(|s| s.to_string()),
                            timezone: record.location.time_zone.map(|s| s.to_string()),
                            country_code: record.country.iso_code.map(|s| s.to_string()),
                            country_name: record.country.names.english.map(|s| s.to_string()),
                        });

                        // The satellite flag lives on the ASN record. When
                        // the ASN lookup missed, materialize a default record
                        // instead of assuming it exists.
                        let asn = host.asn.get_or_insert_with(AsnInfo::default);
                        asn.is_satellite_provider = record.traits.is_satellite_provider;

                        if record.traits.is_anonymous_proxy
                            && !host.labels.iter().any(|l| l == ANONYMOUS_PROXY_LABEL)
                        {
                            host.labels.push(ANONYMOUS_PROXY_LABEL.to_string());
                        }
                    }
                }
            }
        }

        host.ip_int = u64::from(u32::from(v4));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enricher_without_databases() -> Enricher {
        Enricher::new(GeoIpReaders::empty())
    }

    #[test]
    fn ip_int_is_big_endian_encoding() {
        assert_eq!(Enricher::ip_to_int("1.2.3.4").unwrap(), 16_909_060);
        assert_eq!(Enricher::ip_to_int("0.0.0.0").unwrap(), 0);
        assert_eq!(Enricher::ip_to_int("255.255.255.255").unwrap(), 4_294_967_295);
    }

    #[test]
    fn ip_to_int_rejects_bad_input() {
        assert!(matches!(
            Enricher::ip_to_int("not.an.ip"),
            Err(EnrichError::InvalidIp(_))
        ));
        assert!(matches!(
            Enricher::ip_to_int("2001:db8::1"),
            Err(EnrichError::NotIpv4(_))
        ));
    }

    #[test]
    fn enrich_sets_ip_int_without_databases() {
        let mut host = Host {
            ip: "1.2.3.4".into(),
            ..Default::default()
        };
        enricher_without_databases().enrich(&mut host).unwrap();
        assert_eq!(host.ip_int, 16_909_060);
        assert!(host.asn.is_none());
        assert!(host.location.is_none());
        assert!(host.labels.is_empty());
    }

    #[test]
    fn enrich_fails_on_invalid_address() {
        let mut host = Host {
            ip: "garbage".into(),
            ..Default::default()
        };
        assert!(matches!(
            enricher_without_databases().enrich(&mut host),
            Err(EnrichError::InvalidIp(_))
        ));
    }

    #[test]
    fn enrich_fails_on_ipv6_address() {
        let mut host = Host {
            ip: "2001:db8::1".into(),
            ..Default::default()
        };
        assert!(matches!(
            enricher_without_databases().enrich(&mut host),
            Err(EnrichError::NotIpv4(_))
        ));
    }
}
