//! Built-in TCP connect discovery engine.
//!
//! Probes every `(address, port)` pair with a bounded number of concurrent
//! connection attempts and a global packets-per-second pacer. Open ports are
//! delivered serially to the caller's callback, which preserves the
//! single-producer shape the scan orchestrator relies on.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error_handling::ScanError;
use crate::models::Transport;

use super::{expand_targets, resolve_port_set, DiscoveryConfig, DiscoveryResult, Discoverer,
    OnDiscovery, ScanType};

/// Concurrent connection attempts, matching the engine thread count the
/// original discovery tool runs with.
const CONNECT_CONCURRENCY: usize = 100;

/// Per-attempt connect deadline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Token-bucket pacer fed by a background refill task.
///
/// Permits are added in 10ms slices so high rates do not need sub-millisecond
/// timers; the bucket is capped at one second of budget to bound bursts.
struct RatePacer {
    sem: Arc<Semaphore>,
}

impl RatePacer {
    fn start(rate: u32, cancel: CancellationToken) -> Self {
        let rate = rate.max(1);
        let sem = Arc::new(Semaphore::new(0));
        let refill = Arc::clone(&sem);
        tokio::spawn(async move {
            let slice = ((rate as usize) / 100).max(1);
            let mut tick = tokio::time::interval(Duration::from_millis(10));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if refill.available_permits() < rate as usize {
                            refill.add_permits(slice);
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
        RatePacer { sem }
    }

    async fn acquire(&self) {
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }
}

/// Rate-limited TCP connect scanner implementing [`Discoverer`].
pub struct ConnectDiscoverer;

impl ConnectDiscoverer {
    async fn check_port(
        addr: SocketAddrV4,
        retries: u32,
        pacer: Arc<RatePacer>,
        limit: Arc<Semaphore>,
    ) -> Option<DiscoveryResult> {
        let _permit = limit.acquire_owned().await.ok()?;
        for _ in 0..=retries {
            pacer.acquire().await;
            if let Ok(Ok(_stream)) = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
                return Some(DiscoveryResult {
                    host: addr.ip().to_string(),
                    port: addr.port(),
                    transport: Transport::Tcp,
                });
            }
        }
        None
    }
}

#[async_trait]
impl Discoverer for ConnectDiscoverer {
    async fn discover(
        &self,
        cancel: &CancellationToken,
        targets: &[String],
        cfg: &DiscoveryConfig,
        on_result: OnDiscovery<'_>,
    ) -> Result<(), ScanError> {
        let addrs = expand_targets(targets)?;
        let ports = resolve_port_set(cfg)?;

        if cfg.scan_type == ScanType::Syn {
            log::warn!("SYN scan requires raw sockets; falling back to connect scan");
        }

        let pacer_cancel = cancel.child_token();
        let pacer = Arc::new(RatePacer::start(cfg.rate, pacer_cancel.clone()));
        let limit = Arc::new(Semaphore::new(CONNECT_CONCURRENCY));

        let mut checks = FuturesUnordered::new();
        for &addr in &addrs {
            for &port in &ports {
                checks.push(Self::check_port(
                    SocketAddrV4::new(addr, port),
                    cfg.retries,
                    Arc::clone(&pacer),
                    Arc::clone(&limit),
                ));
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    pacer_cancel.cancel();
                    return Err(ScanError::Cancelled);
                }
                next = checks.next() => match next {
                    Some(Some(result)) => on_result(result).await,
                    Some(None) => {}
                    None => break,
                },
            }
        }

        pacer_cancel.cancel();
        Ok(())
    }
}
