//! Fingerprint engine: dispatches a target to candidate plugins.
//!
//! Candidate selection is driven entirely by the registry: plugins hinted at
//! the target port come first in registration order, followed by
//! port-agnostic plugins of the same transport (skipped in fast mode). The
//! first plugin returning `Some` wins; the rest are not probed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::DEFAULT_PROBE_TIMEOUT_MS;
use crate::models::{Service, Transport};
use crate::plugins::{net, PluginRegistry, ProbeSession, Target};

/// Tunables for one fingerprinting run.
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    /// Per-probe deadline.
    pub default_timeout: Duration,
    /// Probe only plugins hinted at the exact target port.
    pub fast_mode: bool,
    /// Run UDP plugins. Off by default; UDP probing usually needs elevated
    /// privileges and is slow against filtered hosts.
    pub udp: bool,
    /// Log every candidate probe attempt.
    pub verbose: bool,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        FingerprintConfig {
            default_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            fast_mode: false,
            udp: false,
            verbose: false,
        }
    }
}

/// Probes targets against the plugin registry.
///
/// Read-only after construction; share with `Arc` across workers.
pub struct FingerprintEngine {
    registry: Arc<PluginRegistry>,
    config: FingerprintConfig,
}

impl FingerprintEngine {
    pub fn new(registry: Arc<PluginRegistry>, config: FingerprintConfig) -> Self {
        FingerprintEngine { registry, config }
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Identifies the service behind `target`, or `None` when nothing
    /// matches. Probe failures never surface as errors.
    pub async fn fingerprint(&self, target: &Target, transport: Transport) -> Option<Service> {
        if transport == Transport::Udp && !self.config.udp {
            return None;
        }

        let candidates =
            self.registry
                .candidates(transport, target.port(), self.config.fast_mode);
        if candidates.is_empty() {
            return None;
        }

        // Opportunistic TLS classification, once per TCP target. Plugins get
        // a decrypted stream when the handshake succeeded.
        let tls = transport == Transport::Tcp
            && net::detect_tls(target, self.config.default_timeout).await;

        let session = ProbeSession {
            timeout: self.config.default_timeout,
            tls,
        };

        for plugin in candidates {
            if self.config.verbose {
                log::debug!(
                    "probing {}:{}/{} with {}",
                    target.ip(),
                    target.port(),
                    transport,
                    plugin.name()
                );
            }
            // The engine enforces the deadline even if a plugin misbehaves.
            let result = timeout(self.config.default_timeout * 2, plugin.probe(target, &session))
                .await
                .ok()
                .flatten();
            if let Some(service) = result {
                return Some(service);
            }
        }
        None
    }
}
