//! Pipeline constants.

use std::time::Duration;

/// Capacity of the discovery → fingerprint queue. When the queue is full the
/// discoverer probes inline on its own task instead of blocking or dropping.
pub const PORT_QUEUE_CAPACITY: usize = 100;

/// Number of concurrent fingerprint workers consuming the port queue.
pub const FINGERPRINT_WORKERS: usize = 20;

/// Default per-probe deadline in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;

/// Default bound for a single repository operation.
pub const DEFAULT_DB_TIMEOUT: Duration = Duration::from_secs(10);

/// Default topic/stream name for scanned service events.
pub const SERVICES_TOPIC: &str = "scanned-services";

/// Maximum banner length included in a notification before truncation.
pub const NOTIFY_BANNER_LIMIT: usize = 100;

/// Maximum bytes read from a probed socket in one exchange.
pub const PROBE_READ_LIMIT: usize = 8192;

/// Interval between progress log lines during a scan.
pub const LOGGING_INTERVAL: Duration = Duration::from_secs(10);

/// Poll backoff used by the in-process consumer when its queue is empty.
pub const CONSUMER_POLL_INTERVAL: Duration = Duration::from_millis(100);
