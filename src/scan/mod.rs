//! Scan orchestrator: bridges discovery and fingerprinting.
//!
//! Topology: a single discoverer task feeds a bounded queue of
//! [`PORT_QUEUE_CAPACITY`] results; a fixed pool of [`FINGERPRINT_WORKERS`]
//! workers drains it and emits identified services through the caller's
//! callback.
//!
//! Backpressure is never-drop: when the queue is full the discoverer probes
//! the result inline on its own task instead of blocking or dropping. The
//! discovery engine drives its own packet pump and cannot tolerate arbitrary
//! stalls, so blocking the producer here would be incorrect. The trade-off is
//! that inline probes can push concurrency past the worker-pool bound during
//! bursts; `ScanReport::inlined` makes that observable.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::app::{log_progress, shutdown_gracefully};
use crate::config::{FINGERPRINT_WORKERS, LOGGING_INTERVAL, PORT_QUEUE_CAPACITY};
use crate::discovery::{DiscoveryConfig, DiscoveryResult, Discoverer};
use crate::error_handling::{ErrorType, ScanError, ScanStats};
use crate::fingerprint::FingerprintEngine;
use crate::models::Service;
use crate::plugins::Target;

/// Callback receiving every identified service, awaited by the emitting
/// worker. Invoked concurrently from up to [`FINGERPRINT_WORKERS`] workers
/// plus the discoverer task, so implementations must be thread-safe.
pub type OnEvent = Arc<dyn Fn(Service) -> BoxFuture<'static, ()> + Send + Sync>;

/// Summary of a completed scan run.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Open ports delivered by the discoverer (after the IPv6 filter).
    pub discovered: usize,
    /// Services identified and emitted.
    pub identified: usize,
    /// Probes executed inline on the discoverer task under backpressure.
    pub inlined: usize,
    pub elapsed_seconds: f64,
}

async fn probe_and_emit(
    engine: &FingerprintEngine,
    stats: &ScanStats,
    on_event: &OnEvent,
    result: DiscoveryResult,
) {
    let Ok(ip) = result.host.parse::<Ipv4Addr>() else {
        stats.increment_error(ErrorType::MalformedResult);
        return;
    };
    let target = Target::new(ip, result.port);
    if let Some(service) = engine.fingerprint(&target, result.transport).await {
        stats.record_identified();
        on_event(service).await;
    }
}

/// Runs discovery and fingerprinting as one streaming pipeline, invoking
/// `on_event` as soon as each service is identified.
///
/// Returns the discoverer's error after the workers drain; cancellation
/// surfaces as [`ScanError::Cancelled`]. In-flight probes run to their
/// individual timeouts before the pipeline terminates.
pub async fn scan_with_discovery_stream(
    discoverer: Arc<dyn Discoverer>,
    cancel: CancellationToken,
    targets: Vec<String>,
    discovery_cfg: DiscoveryConfig,
    engine: Arc<FingerprintEngine>,
    on_event: OnEvent,
) -> Result<ScanReport, ScanError> {
    if targets.iter().all(|t| t.trim().is_empty()) {
        return Err(ScanError::InvalidInput("target is empty".into()));
    }

    let stats = Arc::new(ScanStats::new());
    let start_time = Instant::now();

    let (tx, rx) = mpsc::channel::<DiscoveryResult>(PORT_QUEUE_CAPACITY);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = FuturesUnordered::new();
    for _ in 0..FINGERPRINT_WORKERS {
        let rx = Arc::clone(&rx);
        let engine = Arc::clone(&engine);
        let stats = Arc::clone(&stats);
        let on_event = Arc::clone(&on_event);
        workers.push(tokio::spawn(async move {
            loop {
                // Hold the lock only for the receive so other workers can
                // pull items while this one probes.
                let item = rx.lock().await.recv().await;
                match item {
                    Some(result) => probe_and_emit(&engine, &stats, &on_event, result).await,
                    None => break,
                }
            }
        }));
    }

    let progress_cancel = CancellationToken::new();
    let progress_child = progress_cancel.child_token();
    let progress_stats = Arc::clone(&stats);
    let logging_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOGGING_INTERVAL);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = interval.tick() => log_progress(start_time, &progress_stats),
                _ = progress_child.cancelled() => break,
            }
        }
    });

    let discovery_result = {
        let engine = Arc::clone(&engine);
        let stats = Arc::clone(&stats);
        let on_event = Arc::clone(&on_event);
        let on_open = move |result: DiscoveryResult| -> BoxFuture<'static, ()> {
            let tx = tx.clone();
            let engine = Arc::clone(&engine);
            let stats = Arc::clone(&stats);
            let on_event = Arc::clone(&on_event);
            Box::pin(async move {
                // Discard IPv6 results; some engines emit them unasked.
                if result.host.contains(':') {
                    return;
                }
                stats.record_discovered();
                match tx.try_send(result) {
                    Ok(()) => {}
                    Err(TrySendError::Full(result)) => {
                        // Queue full: probe inline rather than block the
                        // engine's callback or drop the port.
                        stats.record_inlined();
                        probe_and_emit(&engine, &stats, &on_event, result).await;
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            })
        };

        discoverer
            .discover(&cancel, &targets, &discovery_cfg, &on_open)
            .await
        // on_open (and with it the queue sender) drops here, closing the
        // queue so workers drain and exit.
    };

    while let Some(joined) = workers.next().await {
        if let Err(join_error) = joined {
            log::warn!("fingerprint worker panicked: {join_error:?}");
        }
    }

    shutdown_gracefully(progress_cancel, Some(logging_task)).await;
    log_progress(start_time, &stats);
    stats.log_error_summary();

    let report = ScanReport {
        discovered: stats.discovered(),
        identified: stats.identified(),
        inlined: stats.inlined(),
        elapsed_seconds: start_time.elapsed().as_secs_f64(),
    };
    discovery_result.map(|()| report)
}
