//! Persistence worker: consumes service events, enriches, and upserts.
//!
//! Single-threaded consumer loop; horizontal scaling is one process per
//! partition. The producer side is tolerant of network noise, but this side
//! is strict: enrichment and repository errors terminate the loop so that
//! at-least-once redelivery can replay the message.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::enrich::Enricher;
use crate::error_handling::BusError;
use crate::messaging::Consumer;
use crate::models::{Host, Service};
use crate::notifications::{format_service_message, Notifier};
use crate::storage::{HostRepository, UpsertOutcome};

/// Wires a consumer, repository, enricher, and optional notifier into the
/// per-message handling loop.
pub struct App {
    consumer: Box<dyn Consumer<Service>>,
    repo: Arc<dyn HostRepository>,
    enricher: Enricher,
    notifier: Option<Arc<dyn Notifier>>,
}

impl App {
    pub fn new(
        consumer: Box<dyn Consumer<Service>>,
        repo: Arc<dyn HostRepository>,
        enricher: Enricher,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        App {
            consumer,
            repo,
            enricher,
            notifier,
        }
    }

    /// Blocks consuming messages until the stream ends or `cancel` fires.
    ///
    /// Fetch errors and per-message handler errors terminate the loop;
    /// [`BusError::Closed`] and cancellation are clean shutdown.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        info!("persistence: started consuming messages");
        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                fetched = self.consumer.fetch() => fetched,
            };

            let msg = match fetched {
                Ok(Some(msg)) => msg,
                Ok(None) => continue,
                Err(BusError::Closed) => {
                    info!("persistence: input stream closed, shutting down");
                    return Ok(());
                }
                Err(e) => return Err(e).context("persistence: fetch failed"),
            };

            self.handle_service(msg.value).await?;
        }
    }

    /// Processes one service observation end to end.
    pub async fn handle_service(&self, mut svc: Service) -> Result<()> {
        info!(
            "persistence: processing service {}:{} {}",
            svc.ip, svc.port, svc.protocol
        );

        let now = Utc::now();
        if svc.last_scan.is_none() {
            svc.last_scan = Some(now);
        }

        // 1. Ensure the host document exists (first observation only).
        self.repo
            .ensure_host(&svc.ip, now)
            .await
            .context("persistence: ensure host")?;

        // 2. Enrich a fresh host with GeoIP/ASN data.
        let mut host = Host {
            ip: svc.ip.clone(),
            last_seen: Some(now),
            ..Default::default()
        };
        self.enricher
            .enrich(&mut host)
            .context("persistence: enrich host")?;

        // 3. Persist the enrichment.
        self.repo
            .update_host(&host)
            .await
            .context("persistence: update host")?;

        // 4. Upsert the service under the host.
        let outcome = self
            .repo
            .upsert_service(&svc)
            .await
            .context("persistence: upsert service")?;

        // 5. Notify on newly discovered services only; updates are
        //    deliberately silent to keep the channel low-noise.
        if outcome == UpsertOutcome::NewService {
            if let Some(notifier) = &self.notifier {
                let message = format_service_message(&svc);
                if let Err(e) = notifier.notify(&message).await {
                    warn!("persistence: notification failed: {e}");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::error_handling::NotifyError;
    use crate::geoip::GeoIpReaders;
    use crate::messaging::memory::MemoryBus;
    use crate::messaging::Producer;
    use crate::models::{ServiceDetails, SshInfo, Transport};
    use crate::storage::SqliteHostRepository;

    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) -> Result<(), NotifyError> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn ssh_event(banner: &str) -> Service {
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

    async fn app_with_notifier() -> (App, Arc<dyn HostRepository>, Arc<RecordingNotifier>) {
        let repo: Arc<dyn HostRepository> =
            Arc::new(SqliteHostRepository::in_memory().await.unwrap());
        let notifier = Arc::new(RecordingNotifier {
            messages: Mutex::new(Vec::new()),
        });
        let bus = MemoryBus::new();
        let app = App::new(
            Box::new(bus.consumer::<Service>("t")),
            Arc::clone(&repo),
            Enricher::new(GeoIpReaders::empty()),
            Some(notifier.clone() as Arc<dyn Notifier>),
        );
        (app, repo, notifier)
    }

    #[tokio::test]
    async fn new_service_is_stored_enriched_and_notified_once() {
        let (app, repo, notifier) = app_with_notifier().await;
        app.handle_service(ssh_event("SSH-2.0-OpenSSH_8.9")).await.unwrap();

        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.ip_int, 16_909_060);
        assert_eq!(host.services.len(), 1);
        assert_eq!(host.services[0].protocol, "ssh");
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replayed_message_advances_last_seen_without_notifying() {
        let (app, repo, notifier) = app_with_notifier().await;
        app.handle_service(ssh_event("SSH-2.0-OpenSSH_8.9")).await.unwrap();
        let before = repo.get_by_ip("1.2.3.4").await.unwrap().last_seen.unwrap();

        app.handle_service(ssh_event("SSH-2.0-OpenSSH_8.9")).await.unwrap();
        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert!(host.last_seen.unwrap() >= before);
        assert_eq!(host.services.len(), 1);
        // Still exactly one notification
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn banner_drift_replaces_service_without_notifying() {
        let (app, repo, notifier) = app_with_notifier().await;
        app.handle_service(ssh_event("SSH-2.0-OpenSSH_8.9")).await.unwrap();
        app.handle_service(ssh_event("SSH-2.0-OpenSSH_9.0")).await.unwrap();

        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.services.len(), 1);
        match &host.services[0].details {
            ServiceDetails::Ssh(info) => assert_eq!(info.banner, "SSH-2.0-OpenSSH_9.0"),
            other => panic!("expected ssh details, got {other:?}"),
        }
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_ip_terminates_the_message() {
        let (app, _repo, notifier) = app_with_notifier().await;
        let mut svc = ssh_event("SSH-2.0-X");
        svc.ip = "not-an-ip".into();
        assert!(app.handle_service(svc).await.is_err());
        assert!(notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_drains_the_bus_until_closed() {
        let repo: Arc<dyn HostRepository> =
            Arc::new(SqliteHostRepository::in_memory().await.unwrap());
        let bus = MemoryBus::new();
        let producer = bus.producer::<Service>("t");
        producer
            .publish(b"1.2.3.4", &ssh_event("SSH-2.0-OpenSSH_8.9"))
            .await
            .unwrap();
        bus.close_topic("t");

        let mut app = App::new(
            Box::new(bus.consumer::<Service>("t")),
            Arc::clone(&repo),
            Enricher::new(GeoIpReaders::empty()),
            None,
        );
        app.run(&CancellationToken::new()).await.unwrap();

        let host = repo.get_by_ip("1.2.3.4").await.unwrap();
        assert_eq!(host.services.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let repo: Arc<dyn HostRepository> =
            Arc::new(SqliteHostRepository::in_memory().await.unwrap());
        let bus = MemoryBus::new();
        let mut app = App::new(
            Box::new(bus.consumer::<Service>("t")),
            repo,
            Enricher::new(GeoIpReaders::empty()),
            None,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        app.run(&cancel).await.unwrap();
    }
}
