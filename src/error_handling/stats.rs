//! Scan statistics tracking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use strum::IntoEnumIterator;

use super::types::ErrorType;

/// Thread-safe counters for one scan run.
///
/// `discovered`, `identified`, and `inlined` track pipeline throughput;
/// error counters are keyed by [`ErrorType`]. Shared across tasks via `Arc`.
pub struct ScanStats {
    discovered: AtomicUsize,
    identified: AtomicUsize,
    inlined: AtomicUsize,
    errors: HashMap<ErrorType, AtomicUsize>,
}

impl ScanStats {
    pub fn new() -> Self {
        let mut errors = HashMap::new();
        for error in ErrorType::iter() {
            errors.insert(error, AtomicUsize::new(0));
        }
        ScanStats {
            discovered: AtomicUsize::new(0),
            identified: AtomicUsize::new(0),
            inlined: AtomicUsize::new(0),
            errors,
        }
    }

    pub fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_identified(&self) {
        self.identified.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a probe that ran inline on the discoverer task because the
    /// port queue was full.
    pub fn record_inlined(&self) {
        self.inlined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_error(&self, error: ErrorType) {
        if let Some(counter) = self.errors.get(&error) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn discovered(&self) -> usize {
        self.discovered.load(Ordering::Relaxed)
    }

    pub fn identified(&self) -> usize {
        self.identified.load(Ordering::Relaxed)
    }

    pub fn inlined(&self) -> usize {
        self.inlined.load(Ordering::Relaxed)
    }

    pub fn error_count(&self, error: ErrorType) -> usize {
        self.errors
            .get(&error)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Logs non-zero error counters at the end of a run.
    pub fn log_error_summary(&self) {
        let mut any = false;
        for error in ErrorType::iter() {
            let count = self.error_count(error);
            if count > 0 {
                if !any {
                    log::info!("Error counts:");
                    any = true;
                }
                log::info!("   {}: {}", error.as_str(), count);
            }
        }
    }
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}
