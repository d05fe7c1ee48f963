//! SQLite-backed host repository.
//!
//! Hosts live in one table keyed by a unique `ip`; services live in a child
//! table with a `(host_ip, port)` unique index, which enforces the
//! one-service-per-port invariant at the storage layer. Every operation is
//! bounded by the configured database timeout.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::DEFAULT_DB_TIMEOUT;
use crate::error_handling::RepositoryError;
use crate::models::{AsnInfo, Host, Location, Service};

use super::{
    significant_change, AsnFacet, CountryFacet, FacetCounts, HostRepository, SearchFilter,
    SearchPage, ServiceFacet, UpsertOutcome,
};

const CREATE_HOSTS: &str = "\
CREATE TABLE IF NOT EXISTS hosts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip TEXT NOT NULL UNIQUE,
    ip_int INTEGER NOT NULL DEFAULT 0,
    asn_number INTEGER,
    asn_organization TEXT,
    asn_satellite INTEGER NOT NULL DEFAULT 0,
    longitude REAL,
    latitude REAL,
    city TEXT,
    timezone TEXT,
    country_code TEXT,
    country_name TEXT,
    labels TEXT NOT NULL DEFAULT '[]',
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL
)";

const CREATE_SERVICES: &str = "\
CREATE TABLE IF NOT EXISTS services (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host_ip TEXT NOT NULL REFERENCES hosts(ip) ON DELETE CASCADE,
    port INTEGER NOT NULL,
    protocol TEXT NOT NULL,
    transport TEXT NOT NULL,
    tls INTEGER NOT NULL DEFAULT 0,
    last_scan TEXT NOT NULL,
    details TEXT NOT NULL,
    raw TEXT,
    UNIQUE(host_ip, port)
)";

const CREATE_LOOKUP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS services_lookup ON services(host_ip, port, protocol, transport)";

fn corrupt<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::Corrupt(e.to_string())
}

/// Host repository on a SQLite pool.
pub struct SqliteHostRepository {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteHostRepository {
    /// Opens (creating if needed) a database file and prepares the schema.
    pub async fn connect(db_path: &Path, timeout: Duration) -> Result<Self, RepositoryError> {
        let db_path_str = db_path.to_string_lossy().to_string();
        match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&db_path_str)
        {
            Ok(_) => info!("Database file created."),
            Err(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                info!("Database file already exists.")
            }
            Err(e) => {
                error!("Failed to create database file: {e}");
                return Err(RepositoryError::Database(sqlx::Error::Io(e)));
            }
        }

        let pool = SqlitePool::connect(&format!("sqlite:{db_path_str}")).await?;
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        Self::from_pool(pool, timeout).await
    }

    /// Repository over a private in-memory database. Used by tests and
    /// throwaway runs.
    pub async fn in_memory() -> Result<Self, RepositoryError> {
        // A single connection keeps the in-memory database alive and visible
        // to every operation on the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool, DEFAULT_DB_TIMEOUT).await
    }

    /// Prepares the schema on an existing pool.
    pub async fn from_pool(pool: SqlitePool, timeout: Duration) -> Result<Self, RepositoryError> {
        sqlx::query(CREATE_HOSTS).execute(&pool).await?;
        sqlx::query(CREATE_SERVICES).execute(&pool).await?;
        sqlx::query(CREATE_LOOKUP_INDEX).execute(&pool).await?;
        Ok(SqliteHostRepository { pool, timeout })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>> + Send,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| RepositoryError::Timeout)?
    }

    async fn load_services(&self, ip: &str) -> Result<Vec<Service>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT host_ip, port, protocol, transport, tls, last_scan, details, raw \
             FROM services WHERE host_ip = ? ORDER BY port",
        )
        .bind(ip)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(service_from_row).collect()
    }

    async fn fetch_host(&self, ip: &str) -> Result<Host, RepositoryError> {
        let row = sqlx::query("SELECT * FROM hosts WHERE ip = ?")
            .bind(ip)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::HostNotFound(ip.to_string()))?;
        let mut host = host_from_row(&row)?;
        host.services = self.load_services(ip).await?;
        Ok(host)
    }
}

fn service_from_row(row: &SqliteRow) -> Result<Service, RepositoryError> {
    let transport: String = row.try_get("transport")?;
    let details: String = row.try_get("details")?;
    Ok(Service {
        ip: row.try_get("host_ip")?,
        port: row.try_get::<i64, _>("port")? as u16,
        transport: transport.parse().map_err(corrupt)?,
        protocol: row.try_get("protocol")?,
        tls: row.try_get("tls")?,
        last_scan: Some(row.try_get("last_scan")?),
        details: serde_json::from_str(&details).map_err(corrupt)?,
        raw: row.try_get("raw")?,
    })
}

fn host_from_row(row: &SqliteRow) -> Result<Host, RepositoryError> {
    let asn_number: Option<i64> = row.try_get("asn_number")?;
    let asn = asn_number.map(|number| {
        Ok::<_, RepositoryError>(AsnInfo {
            number: number as u32,
            organization: row.try_get("asn_organization")?,
            is_satellite_provider: row.try_get("asn_satellite")?,
        })
    });
    let asn = asn.transpose()?;

    let longitude: Option<f64> = row.try_get("longitude")?;
    let location = longitude
        .map(|lon| {
            Ok::<_, RepositoryError>(Location {
                coordinates: [lon, row.try_get::<Option<f64>, _>("latitude")?.unwrap_or(0.0)],
                city: row.try_get("city")?,
                timezone: row.try_get("timezone")?,
                country_code: row.try_get("country_code")?,
                country_name: row.try_get("country_name")?,
            })
        })
        .transpose()?;

    let labels: String = row.try_get("labels")?;
    Ok(Host {
        id: row.try_get("id")?,
        ip: row.try_get("ip")?,
        ip_int: row.try_get::<i64, _>("ip_int")? as u64,
        asn,
        location,
        first_seen: Some(row.try_get("first_seen")?),
        last_seen: Some(row.try_get("last_seen")?),
        services: Vec::new(),
        labels: serde_json::from_str(&labels).map_err(corrupt)?,
    })
}

/// Appends the filter's `AND` clauses; the caller opens with `WHERE 1=1`.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SearchFilter) {
    if let Some(protocol) = &filter.protocol {
        qb.push(
            " AND EXISTS (SELECT 1 FROM services sf WHERE sf.host_ip = hosts.ip AND sf.protocol = ",
        );
        qb.push_bind(protocol.clone());
        qb.push(")");
    }
    if let Some(code) = &filter.country_code {
        qb.push(" AND hosts.country_code = ");
        qb.push_bind(code.clone());
    }
    if let Some(asn) = filter.asn_number {
        qb.push(" AND hosts.asn_number = ");
        qb.push_bind(asn as i64);
    }
    if let Some(label) = &filter.label {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(hosts.labels) WHERE json_each.value = ");
        qb.push_bind(label.clone());
        qb.push(")");
    }
}

#[async_trait]
impl HostRepository for SqliteHostRepository {
    async fn ensure_host(&self, ip: &str, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let ip = ip.trim().to_string();
        self.bounded(async {
            sqlx::query(
                "INSERT INTO hosts (ip, first_seen, last_seen) VALUES (?, ?, ?) \
                 ON CONFLICT(ip) DO UPDATE SET last_seen = excluded.last_seen",
            )
            .bind(&ip)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn update_host(&self, host: &Host) -> Result<(), RepositoryError> {
        let now = Utc::now();
        self.bounded(async {
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE hosts SET last_seen = ");
            qb.push_bind(now);
            if let Some(asn) = &host.asn {
                qb.push(", asn_number = ");
                qb.push_bind(asn.number as i64);
                qb.push(", asn_organization = ");
                qb.push_bind(asn.organization.clone());
                qb.push(", asn_satellite = ");
                qb.push_bind(asn.is_satellite_provider);
            }
            if let Some(location) = &host.location {
                qb.push(", longitude = ");
                qb.push_bind(location.coordinates[0]);
                qb.push(", latitude = ");
                qb.push_bind(location.coordinates[1]);
                qb.push(", city = ");
                qb.push_bind(location.city.clone());
                qb.push(", timezone = ");
                qb.push_bind(location.timezone.clone());
                qb.push(", country_code = ");
                qb.push_bind(location.country_code.clone());
                qb.push(", country_name = ");
                qb.push_bind(location.country_name.clone());
            }
            if !host.labels.is_empty() {
                qb.push(", labels = ");
                qb.push_bind(serde_json::to_string(&host.labels).map_err(corrupt)?);
            }
            if host.ip_int != 0 {
                qb.push(", ip_int = ");
                qb.push_bind(host.ip_int as i64);
            }
            qb.push(" WHERE ip = ");
            qb.push_bind(host.ip.clone());
            qb.build().execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn upsert_service(&self, svc: &Service) -> Result<UpsertOutcome, RepositoryError> {
        let mut svc = svc.clone();
        svc.ip = svc.ip.trim().to_string();
        svc.protocol = svc.protocol.trim().to_ascii_lowercase();
        let now = svc.last_scan.unwrap_or_else(Utc::now);
        svc.last_scan = Some(now);

        self.bounded(async {
            let host_exists = sqlx::query("SELECT id FROM hosts WHERE ip = ?")
                .bind(&svc.ip)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if !host_exists {
                return Err(RepositoryError::HostNotFound(svc.ip.clone()));
            }

            let existing = sqlx::query(
                "SELECT host_ip, port, protocol, transport, tls, last_scan, details, raw \
                 FROM services WHERE host_ip = ? AND port = ?",
            )
            .bind(&svc.ip)
            .bind(svc.port as i64)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(service_from_row)
            .transpose()?;

            let outcome = match &existing {
                None => UpsertOutcome::NewService,
                Some(existing) if significant_change(existing, &svc) => {
                    UpsertOutcome::UpdatedService
                }
                Some(_) => UpsertOutcome::None,
            };

            sqlx::query(
                "INSERT INTO services (host_ip, port, protocol, transport, tls, last_scan, details, raw) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(host_ip, port) DO UPDATE SET \
                   protocol = excluded.protocol, transport = excluded.transport, \
                   tls = excluded.tls, last_scan = excluded.last_scan, \
                   details = excluded.details, raw = excluded.raw",
            )
            .bind(&svc.ip)
            .bind(svc.port as i64)
            .bind(&svc.protocol)
            .bind(svc.transport.as_str())
            .bind(svc.tls)
            .bind(now)
            .bind(serde_json::to_string(&svc.details).map_err(corrupt)?)
            .bind(svc.raw.clone())
            .execute(&self.pool)
            .await?;

            sqlx::query("UPDATE hosts SET last_seen = ? WHERE ip = ?")
                .bind(now)
                .bind(&svc.ip)
                .execute(&self.pool)
                .await?;

            Ok(outcome)
        })
        .await
    }

    async fn get_by_ip(&self, ip: &str) -> Result<Host, RepositoryError> {
        let ip = ip.trim().to_string();
        self.bounded(self.fetch_host(&ip)).await
    }

    async fn search(
        &self,
        filter: &SearchFilter,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<SearchPage, RepositoryError> {
        self.bounded(async {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM hosts WHERE 1=1");
            push_filter(&mut qb, filter);
            if let Some(last_id) = last_id {
                qb.push(" AND hosts.id > ");
                qb.push_bind(last_id);
            }
            qb.push(" ORDER BY hosts.id ASC LIMIT ");
            // One extra row detects whether another page exists.
            qb.push_bind(limit as i64 + 1);

            let rows = qb.build().fetch_all(&self.pool).await?;
            let mut hosts = rows
                .iter()
                .map(host_from_row)
                .collect::<Result<Vec<_>, _>>()?;

            let next_cursor = if hosts.len() > limit as usize {
                hosts.truncate(limit as usize);
                hosts.last().map(|h| h.id)
            } else {
                None
            };

            for host in &mut hosts {
                host.services = self.load_services(&host.ip).await?;
            }

            Ok(SearchPage { hosts, next_cursor })
        })
        .await
    }

    async fn facets(&self, filter: &SearchFilter) -> Result<FacetCounts, RepositoryError> {
        self.bounded(async {
            let mut services_qb = QueryBuilder::<Sqlite>::new(
                "SELECT sv.protocol AS protocol, COUNT(*) AS cnt FROM services sv \
                 JOIN hosts ON hosts.ip = sv.host_ip WHERE 1=1",
            );
            push_filter(&mut services_qb, filter);
            services_qb.push(" GROUP BY sv.protocol ORDER BY cnt DESC, protocol ASC");
            let services = services_qb
                .build()
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|row| {
                    Ok::<_, RepositoryError>(ServiceFacet {
                        protocol: row.try_get("protocol")?,
                        count: row.try_get("cnt")?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut countries_qb = QueryBuilder::<Sqlite>::new(
                "SELECT country_code, country_name, COUNT(*) AS cnt FROM hosts \
                 WHERE country_code IS NOT NULL",
            );
            push_filter(&mut countries_qb, filter);
            countries_qb
                .push(" GROUP BY country_code, country_name ORDER BY cnt DESC, country_code ASC");
            let countries = countries_qb
                .build()
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|row| {
                    Ok::<_, RepositoryError>(CountryFacet {
                        code: row.try_get("country_code")?,
                        name: row
                            .try_get::<Option<String>, _>("country_name")?
                            .unwrap_or_default(),
                        count: row.try_get("cnt")?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut asns_qb = QueryBuilder::<Sqlite>::new(
                "SELECT asn_number, asn_organization, COUNT(*) AS cnt FROM hosts \
                 WHERE asn_number IS NOT NULL",
            );
            push_filter(&mut asns_qb, filter);
            asns_qb.push(" GROUP BY asn_number, asn_organization ORDER BY cnt DESC, asn_number ASC");
            let asns = asns_qb
                .build()
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|row| {
                    Ok::<_, RepositoryError>(AsnFacet {
                        number: row.try_get::<i64, _>("asn_number")? as u32,
                        organization: row
                            .try_get::<Option<String>, _>("asn_organization")?
                            .unwrap_or_default(),
                        count: row.try_get("cnt")?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(FacetCounts {
                services,
                countries,
                asns,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpInfo, ServiceDetails, SshInfo, Transport};

    async fn repo() -> SqliteHostRepository {
        SqliteHostRepository::in_memory().await.unwrap()
    }

    fn ssh_service(ip: &str, port: u16, banner: &str) -> Service {
        Service {
            ip: ip.into(),
            port,
            transport: Transport::Tcp,
            protocol: "ssh".into(),
            tls: false,
            last_scan: Some(Utc::now()),
            details: ServiceDetails::Ssh(SshInfo {
                banner: banner.into(),
                algorithms: None,
            }),
            raw: None,
        }
    }

    fn http_service(ip: &str, port: u16, status: u16) -> Service {
        Service {
            ip: ip.into(),
            port,
            transport: Transport::Tcp,
            protocol: "http".into(),
            tls: false,
            last_scan: Some(Utc::now()),
            details: ServiceDetails::Http(HttpInfo {
                status,
                ..Default::default()
            }),
            raw: None,
        }
    }

    #[tokio::test]
    async fn ensure_host_is_idempotent_and_advances_last_seen() {
        let repo = repo().await;
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(60);

        repo.ensure_host("1.2.3.4", t1).await.unwrap();
        repo.ensure_host("1.2.3.4", t2).await.unwrap();

        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.first_seen, Some(t1));
        assert_eq!(host.last_seen, Some(t2));

        // Still a single host
        let page = repo.search(&SearchFilter::default(), None, 10).await.unwrap();
        assert_eq!(page.hosts.len(), 1);
    }

    #[tokio::test]
    async fn upsert_without_host_is_an_error() {
        let repo = repo().await;
        let err = repo
            .upsert_service(&ssh_service("9.9.9.9", 22, "SSH-2.0-X"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::HostNotFound(_)));
    }

    #[tokio::test]
    async fn upsert_twice_with_identical_service_is_new_then_none() {
        let repo = repo().await;
        repo.ensure_host("1.2.3.4", Utc::now()).await.unwrap();
        let svc = ssh_service("1.2.3.4", 22, "SSH-2.0-OpenSSH_8.9");

        assert_eq!(
            repo.upsert_service(&svc).await.unwrap(),
            UpsertOutcome::NewService
        );
        assert_eq!(repo.upsert_service(&svc).await.unwrap(), UpsertOutcome::None);

        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.services.len(), 1);
    }

    #[tokio::test]
    async fn classification_matrix() {
        let repo = repo().await;
        repo.ensure_host("1.2.3.4", Utc::now()).await.unwrap();
        let base = ssh_service("1.2.3.4", 22, "SSH-2.0-OpenSSH_8.9");
        repo.upsert_service(&base).await.unwrap();

        // Only last_scan differs -> None
        let mut rescan = base.clone();
        rescan.last_scan = Some(Utc::now() + chrono::Duration::seconds(5));
        assert_eq!(
            repo.upsert_service(&rescan).await.unwrap(),
            UpsertOutcome::None
        );

        // Banner drift -> UpdatedService
        let drift = ssh_service("1.2.3.4", 22, "SSH-2.0-OpenSSH_9.0");
        assert_eq!(
            repo.upsert_service(&drift).await.unwrap(),
            UpsertOutcome::UpdatedService
        );
        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        match &host.services[0].details {
            ServiceDetails::Ssh(info) => assert_eq!(info.banner, "SSH-2.0-OpenSSH_9.0"),
            other => panic!("expected ssh details, got {other:?}"),
        }

        // TLS flip -> UpdatedService
        let mut tls = drift.clone();
        tls.tls = true;
        assert_eq!(
            repo.upsert_service(&tls).await.unwrap(),
            UpsertOutcome::UpdatedService
        );

        // Protocol change -> UpdatedService
        let http = http_service("1.2.3.4", 22, 200);
        assert_eq!(
            repo.upsert_service(&http).await.unwrap(),
            UpsertOutcome::UpdatedService
        );

        // HTTP status change -> UpdatedService
        let http_down = http_service("1.2.3.4", 22, 503);
        assert_eq!(
            repo.upsert_service(&http_down).await.unwrap(),
            UpsertOutcome::UpdatedService
        );
    }

    #[tokio::test]
    async fn at_most_one_service_per_port() {
        let repo = repo().await;
        repo.ensure_host("1.2.3.4", Utc::now()).await.unwrap();
        for banner in ["a", "b", "c"] {
            repo.upsert_service(&ssh_service("1.2.3.4", 22, banner))
                .await
                .unwrap();
        }
        repo.upsert_service(&http_service("1.2.3.4", 80, 200))
            .await
            .unwrap();

        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.services.len(), 2);
        let ports: Vec<u16> = host.services.iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![22, 80]);
    }

    #[tokio::test]
    async fn upsert_normalizes_ip_and_protocol() {
        let repo = repo().await;
        repo.ensure_host("1.2.3.4", Utc::now()).await.unwrap();
        let mut svc = ssh_service("1.2.3.4", 22, "SSH-2.0-X");
        svc.ip = "  1.2.3.4 ".into();
        svc.protocol = " SSH ".into();
        repo.upsert_service(&svc).await.unwrap();

        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.services[0].protocol, "ssh");
        assert_eq!(host.services[0].ip, "1.2.3.4");
    }

    #[tokio::test]
    async fn update_host_sets_only_non_default_fields() {
        let repo = repo().await;
        let t0 = Utc::now();
        repo.ensure_host("1.2.3.4", t0).await.unwrap();

        let enriched = Host {
            ip: "1.2.3.4".into(),
            ip_int: 16_909_060,
            asn: Some(AsnInfo {
                number: 13335,
                organization: Some("CLOUDFLARENET".into()),
                is_satellite_provider: false,
            }),
            location: Some(Location {
                coordinates: [-97.822, 37.751],
                city: None,
                timezone: Some("America/Chicago".into()),
                country_code: Some("US".into()),
                country_name: Some("United States".into()),
            }),
            labels: vec!["anonymous-proxy".into()],
            ..Default::default()
        };
        repo.update_host(&enriched).await.unwrap();

        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.ip_int, 16_909_060);
        assert_eq!(host.asn.as_ref().unwrap().number, 13335);
        assert_eq!(
            host.location.as_ref().unwrap().coordinates,
            [-97.822, 37.751]
        );
        assert_eq!(host.labels, vec!["anonymous-proxy".to_string()]);
        assert_eq!(host.first_seen, Some(t0));
        assert!(host.last_seen.unwrap() >= t0);

        // A second update with defaults leaves enrichment intact
        repo.update_host(&Host {
            ip: "1.2.3.4".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.asn.as_ref().unwrap().number, 13335);
        assert_eq!(host.ip_int, 16_909_060);
    }

    #[tokio::test]
    async fn update_host_never_creates() {
        let repo = repo().await;
        repo.update_host(&Host {
            ip: "8.8.8.8".into(),
            ip_int: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(matches!(
            repo.get_by_ip("8.8.8.8").await,
            Err(RepositoryError::HostNotFound(_))
        ));
    }

    #[tokio::test]
    async fn search_paginates_with_forward_cursor() {
        let repo = repo().await;
        for i in 1..=5u8 {
            repo.ensure_host(&format!("10.0.0.{i}"), Utc::now())
                .await
                .unwrap();
        }

        let first = repo.search(&SearchFilter::default(), None, 2).await.unwrap();
        assert_eq!(first.hosts.len(), 2);
        let cursor = first.next_cursor.expect("more pages expected");

        let second = repo
            .search(&SearchFilter::default(), Some(cursor), 2)
            .await
            .unwrap();
        assert_eq!(second.hosts.len(), 2);
        let cursor = second.next_cursor.expect("more pages expected");

        let third = repo
            .search(&SearchFilter::default(), Some(cursor), 2)
            .await
            .unwrap();
        assert_eq!(third.hosts.len(), 1);
        assert!(third.next_cursor.is_none());

        // No overlap between pages
        let mut seen: Vec<String> = first
            .hosts
            .iter()
            .chain(&second.hosts)
            .chain(&third.hosts)
            .map(|h| h.ip.clone())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn search_filters_by_protocol_and_label() {
        let repo = repo().await;
        repo.ensure_host("10.0.0.1", Utc::now()).await.unwrap();
        repo.ensure_host("10.0.0.2", Utc::now()).await.unwrap();
        repo.upsert_service(&ssh_service("10.0.0.1", 22, "SSH-2.0-X"))
            .await
            .unwrap();
        repo.upsert_service(&http_service("10.0.0.2", 80, 200))
            .await
            .unwrap();
        repo.update_host(&Host {
            ip: "10.0.0.2".into(),
            labels: vec!["anonymous-proxy".into()],
            ..Default::default()
        })
        .await
        .unwrap();

        let ssh_only = repo
            .search(
                &SearchFilter {
                    protocol: Some("ssh".into()),
                    ..Default::default()
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(ssh_only.hosts.len(), 1);
        assert_eq!(ssh_only.hosts[0].ip, "10.0.0.1");

        let labeled = repo
            .search(
                &SearchFilter {
                    label: Some("anonymous-proxy".into()),
                    ..Default::default()
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(labeled.hosts.len(), 1);
        assert_eq!(labeled.hosts[0].ip, "10.0.0.2");
    }

    #[tokio::test]
    async fn facet_aggregation_counts_and_sorts() {
        let repo = repo().await;
        // 3 hosts: services [http, http, ssh], countries [US, US, DE]
        for (ip, country) in [("10.0.0.1", "US"), ("10.0.0.2", "US"), ("10.0.0.3", "DE")] {
            repo.ensure_host(ip, Utc::now()).await.unwrap();
            repo.update_host(&Host {
                ip: ip.into(),
                location: Some(Location {
                    coordinates: [0.0, 0.0],
                    country_code: Some(country.into()),
                    country_name: Some(
                        if country == "US" {
                            "United States"
                        } else {
                            "Germany"
                        }
                        .into(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        repo.upsert_service(&http_service("10.0.0.1", 80, 200))
            .await
            .unwrap();
        repo.upsert_service(&http_service("10.0.0.2", 80, 200))
            .await
            .unwrap();
        repo.upsert_service(&ssh_service("10.0.0.3", 22, "SSH-2.0-X"))
            .await
            .unwrap();

        let facets = repo.facets(&SearchFilter::default()).await.unwrap();
        assert_eq!(
            facets.services,
            vec![
                ServiceFacet {
                    protocol: "http".into(),
                    count: 2
                },
                ServiceFacet {
                    protocol: "ssh".into(),
                    count: 1
                },
            ]
        );
        assert_eq!(
            facets.countries,
            vec![
                CountryFacet {
                    code: "US".into(),
                    name: "United States".into(),
                    count: 2
                },
                CountryFacet {
                    code: "DE".into(),
                    name: "Germany".into(),
                    count: 1
                },
            ]
        );
        assert!(facets.asns.is_empty());
    }

    #[tokio::test]
    async fn facets_respect_filters() {
        let repo = repo().await;
        repo.ensure_host("10.0.0.1", Utc::now()).await.unwrap();
        repo.ensure_host("10.0.0.2", Utc::now()).await.unwrap();
        repo.upsert_service(&http_service("10.0.0.1", 80, 200))
            .await
            .unwrap();
        repo.upsert_service(&ssh_service("10.0.0.2", 22, "SSH-2.0-X"))
            .await
            .unwrap();

        let facets = repo
            .facets(&SearchFilter {
                protocol: Some("ssh".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        // Only host 10.0.0.2 matches; its single service is ssh
        assert_eq!(facets.services.len(), 1);
        assert_eq!(facets.services[0].protocol, "ssh");
    }
}
