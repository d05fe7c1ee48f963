//! Host repository: the source of truth for per-host state.
//!
//! The repository contract is defined here as a trait; [`sqlite`] provides
//! the backing implementation. Upserts classify changes so the persistence
//! worker can decide whether an observation is news.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error_handling::RepositoryError;
use crate::models::{Host, Service, ServiceDetails};

pub use sqlite::SqliteHostRepository;

/// Result of [`HostRepository::upsert_service`], driving notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Nothing new: the service existed and only insignificant fields moved.
    None,
    NewHost,
    NewService,
    /// The service existed and a significant field changed.
    UpdatedService,
}

/// Typed host search filter. All present fields must match.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Host exposes at least one service with this protocol.
    pub protocol: Option<String>,
    pub country_code: Option<String>,
    pub asn_number: Option<u32>,
    pub label: Option<String>,
}

/// One page of search results with a forward cursor.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub hosts: Vec<Host>,
    /// Id of the last returned host; `None` when the result set is
    /// exhausted.
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFacet {
    pub protocol: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryFacet {
    pub code: String,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsnFacet {
    pub number: u32,
    pub organization: String,
    pub count: i64,
}

/// Aggregated counts over a filtered host set, each list sorted descending
/// by count.
#[derive(Debug, Clone, Default)]
pub struct FacetCounts {
    /// Count per protocol across all service entries.
    pub services: Vec<ServiceFacet>,
    pub countries: Vec<CountryFacet>,
    pub asns: Vec<AsnFacet>,
}

/// Storage interface for host records.
#[async_trait]
pub trait HostRepository: Send + Sync {
    /// Ensures a host row exists for `ip`. Idempotent: the first call
    /// creates the host with `first_seen = now`; every call advances
    /// `last_seen`.
    async fn ensure_host(&self, ip: &str, now: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Sets whichever of asn/location/labels/ip_int are non-default on
    /// `host`, plus `last_seen`. Never creates a host.
    async fn update_host(&self, host: &Host) -> Result<(), RepositoryError>;

    /// Stores or replaces a single service under its host, keyed by port.
    async fn upsert_service(&self, svc: &Service) -> Result<UpsertOutcome, RepositoryError>;

    /// Fetches one host with its services.
    async fn get_by_ip(&self, ip: &str) -> Result<Host, RepositoryError>;

    /// Cursor-paginated host search ordered by id ascending.
    async fn search(
        &self,
        filter: &SearchFilter,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<SearchPage, RepositoryError>;

    /// Facet aggregation over the filtered host set.
    async fn facets(&self, filter: &SearchFilter) -> Result<FacetCounts, RepositoryError>;
}

/// Whether replacing `existing` with `incoming` is a significant update:
/// identity/security fields (protocol, transport, TLS) or visible protocol
/// state (HTTP/HTTPS status, SSH banner) changed.
pub(crate) fn significant_change(existing: &Service, incoming: &Service) -> bool {
    if existing.protocol != incoming.protocol
        || existing.transport != incoming.transport
        || existing.tls != incoming.tls
    {
        return true;
    }
    match (&existing.details, &incoming.details) {
        (ServiceDetails::Http(old), ServiceDetails::Http(new)) => old.status != new.status,
        (ServiceDetails::Https(old), ServiceDetails::Https(new)) => old.status != new.status,
        (ServiceDetails::Ssh(old), ServiceDetails::Ssh(new)) => old.banner != new.banner,
        // Equal protocol labels with mismatched variants cannot happen for
        // services built through the plugin layer.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpInfo, SshInfo, Transport};

    fn ssh_service(banner: &str) -> Service {
        Service {
            ip: "1.2.3.4".into(),
            port: 22,
            transport: Transport::Tcp,
            protocol: "ssh".into(),
            tls: false,
            last_scan: None,
            details: ServiceDetails::Ssh(SshInfo {
                banner: banner.into(),
                algorithms: None,
            }),
            raw: None,
        }
    }

    #[test]
    fn identical_services_are_insignificant() {
        let a = ssh_service("SSH-2.0-OpenSSH_8.9");
        assert!(!significant_change(&a, &a.clone()));
    }

    #[test]
    fn last_scan_drift_alone_is_insignificant() {
        let a = ssh_service("SSH-2.0-OpenSSH_8.9");
        let mut b = a.clone();
        b.last_scan = Some(Utc::now());
        assert!(!significant_change(&a, &b));
    }

    #[test]
    fn banner_protocol_tls_and_status_changes_are_significant() {
        let a = ssh_service("SSH-2.0-OpenSSH_8.9");
        let mut banner = a.clone();
        banner.details = ServiceDetails::Ssh(SshInfo {
            banner: "SSH-2.0-OpenSSH_9.0".into(),
            algorithms: None,
        });
        assert!(significant_change(&a, &banner));

        let mut tls = a.clone();
        tls.tls = true;
        assert!(significant_change(&a, &tls));

        let mut protocol = a.clone();
        protocol.protocol = "http".into();
        protocol.details = ServiceDetails::Http(HttpInfo::default());
        assert!(significant_change(&a, &protocol));

        let http_old = Service {
            protocol: "http".into(),
            details: ServiceDetails::Http(HttpInfo {
                status: 200,
                ..Default::default()
            }),
            ..ssh_service("")
        };
        let mut http_new = http_old.clone();
        http_new.details = ServiceDetails::Http(HttpInfo {
            status: 503,
            ..Default::default()
        });
        assert!(significant_change(&http_old, &http_new));
    }
}
