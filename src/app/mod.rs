//! Shared application helpers: progress logging and graceful shutdown.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error_handling::ScanStats;

/// Logs a one-line progress summary for a running scan.
pub fn log_progress(start_time: Instant, stats: &Arc<ScanStats>) {
    let elapsed = start_time.elapsed().as_secs_f64();
    let discovered = stats.discovered();
    let identified = stats.identified();
    log::info!(
        "Discovered {} open ports, identified {} services in {:.2}s (~{:.2} ports/sec)",
        discovered,
        identified,
        elapsed,
        discovered as f64 / elapsed.max(f64::EPSILON)
    );
}

/// Stops the periodic progress logging task and waits for it to exit.
pub async fn shutdown_gracefully(
    cancel: CancellationToken,
    logging_task: Option<tokio::task::JoinHandle<()>>,
) {
    cancel.cancel();
    if let Some(logging_task) = logging_task {
        let _ = logging_task.await;
    }
}
