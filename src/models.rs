//! Core domain types shared across the scanning and persistence pipelines.
//!
//! A [`Service`] is a single fingerprinted observation of an open port. A
//! [`Host`] is the persisted aggregate of everything known about one IPv4
//! address. Services travel over the message bus as JSON; hosts live in the
//! data store.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport layer protocol of a discovered port.
///
/// Serialized lowercase (`"tcp"` / `"udp"`), which makes the lowercase
/// normalization invariant structural rather than a convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Stream transport, probed over `TcpStream` (optionally TLS-wrapped).
    Tcp,
    /// Datagram transport, probed over `UdpSocket`.
    Udp,
}

impl Transport {
    /// Lowercase wire form of the transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// HTTP response details captured by the HTTP/HTTPS probes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpInfo {
    /// Numeric status code of the probe response.
    pub status: u16,
    /// Response headers, lowercased names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// `<title>` text when the response carried an HTML body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// SSH identification string and optional advertised algorithms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshInfo {
    /// The `SSH-2.0-...` identification banner, trimmed.
    pub banner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithms: Option<Vec<String>>,
}

/// Single-line greeting banner (FTP, SMTP).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerInfo {
    pub banner: String,
}

/// Redis server details extracted from the handshake reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// SNMP system description (sysDescr.0).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnmpInfo {
    pub sys_descr: String,
}

/// DNS server details from a `version.bind` CHAOS query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Catch-all payload for protocols without a structured variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInfo {
    /// Lossy-decoded bytes captured from the wire.
    pub raw: String,
}

/// Protocol-specific payload of a [`Service`], keyed by protocol.
///
/// Modeled as a closed sum type: anything the probes cannot structure falls
/// into [`ServiceDetails::Other`] with the raw bytes preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceDetails {
    Http(HttpInfo),
    Https(HttpInfo),
    Ssh(SshInfo),
    Ftp(BannerInfo),
    Smtp(BannerInfo),
    Redis(RedisInfo),
    Snmp(SnmpInfo),
    Dns(DnsInfo),
    Other(RawInfo),
}

impl ServiceDetails {
    /// Lowercase protocol label matching the serde tag of the variant.
    pub fn protocol(&self) -> &'static str {
        match self {
            ServiceDetails::Http(_) => "http",
            ServiceDetails::Https(_) => "https",
            ServiceDetails::Ssh(_) => "ssh",
            ServiceDetails::Ftp(_) => "ftp",
            ServiceDetails::Smtp(_) => "smtp",
            ServiceDetails::Redis(_) => "redis",
            ServiceDetails::Snmp(_) => "snmp",
            ServiceDetails::Dns(_) => "dns",
            ServiceDetails::Other(_) => "other",
        }
    }
}

/// A fingerprinted application-protocol observation on one `(ip, port)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub ip: String,
    pub port: u16,
    pub transport: Transport,
    /// Lowercase, trimmed protocol label; always matches `details`.
    pub protocol: String,
    pub tls: bool,
    /// Scan timestamp; `None` means "not yet stamped" and is filled by the
    /// persistence worker on receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<DateTime<Utc>>,
    pub details: ServiceDetails,
    /// Optional raw banner bytes (lossy UTF-8) kept for inspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Service {
    /// Builds a service observation, deriving the protocol label from the
    /// payload variant (HTTPS when the HTTP probe ran over TLS).
    pub fn identified(
        ip: String,
        port: u16,
        transport: Transport,
        tls: bool,
        details: ServiceDetails,
    ) -> Self {
        let protocol = details.protocol().to_string();
        Service {
            ip,
            port,
            transport,
            protocol,
            tls,
            last_scan: Some(Utc::now()),
            details,
            raw: None,
        }
    }
}

/// Autonomous-system metadata resolved from the ASN database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsnInfo {
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default)]
    pub is_satellite_provider: bool,
}

/// Geographic location resolved from the City database.
///
/// Coordinate order is `[longitude, latitude]` (GeoJSON order), not the
/// conventional lat/lon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
}

/// Persisted per-host aggregate, keyed uniquely by `ip`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Storage row id; `0` for hosts not yet persisted.
    #[serde(default)]
    pub id: i64,
    pub ip: String,
    /// Big-endian 32-bit integer encoding of the IPv4 address.
    #[serde(default)]
    pub ip_int: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<AsnInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}
