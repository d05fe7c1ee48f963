//! Protocol plugin registry and probe primitives.
//!
//! Each plugin knows how to identify one application protocol behind an open
//! `(ip, port, transport)` triple: it opens a single connection, performs its
//! protocol-specific handshake within the session deadline, and returns
//! `Some(Service)` on identification or `None` on any failure. Probe failures
//! are value-level; plugins never return errors and never retry.
//!
//! The registry maps `(transport, port)` to the ordered list of plugins
//! hinted at that port, followed by port-agnostic plugins of the same
//! transport. Order is registration order and is deterministic. The registry
//! is built explicitly at startup and read-only afterwards.

pub mod net;

mod dns;
mod ftp;
mod http;
mod redis;
mod smtp;
mod snmp;
mod ssh;

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Service, Transport};

pub use dns::DnsPlugin;
pub use ftp::FtpPlugin;
pub use http::HttpPlugin;
pub use redis::RedisPlugin;
pub use smtp::SmtpPlugin;
pub use snmp::SnmpPlugin;
pub use ssh::SshPlugin;

/// A scanning input: a resolved IPv4 socket address, plus the source
/// hostname when the input was resolved from a name.
#[derive(Debug, Clone)]
pub struct Target {
    pub addr: SocketAddrV4,
    pub host: Option<String>,
}

impl Target {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Target {
            addr: SocketAddrV4::new(ip, port),
            host: None,
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Per-probe parameters handed to a plugin by the fingerprint engine.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSession {
    /// Deadline for the whole probe exchange.
    pub timeout: Duration,
    /// Whether the target answered an opportunistic TLS handshake; when set,
    /// [`net::open_stream`] hands the plugin a decrypted stream.
    pub tls: bool,
}

/// The probe contract every protocol plugin implements.
#[async_trait]
pub trait ServicePlugin: Send + Sync {
    /// Unique plugin name, used for registry dedup and logging.
    fn name(&self) -> &'static str;

    fn transport(&self) -> Transport;

    /// Conventional default ports this plugin is prioritized on.
    fn port_hints(&self) -> &'static [u16];

    /// Whether the plugin also runs as a fallback on unhinted ports.
    fn port_agnostic(&self) -> bool {
        false
    }

    /// Probes the target. `None` on connect error, timeout, or mismatch.
    async fn probe(&self, target: &Target, session: &ProbeSession) -> Option<Service>;
}

/// Ordered lookup table from `(transport, port)` to candidate plugins.
pub struct PluginRegistry {
    hinted: HashMap<(Transport, u16), Vec<Arc<dyn ServicePlugin>>>,
    agnostic: HashMap<Transport, Vec<Arc<dyn ServicePlugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry {
            hinted: HashMap::new(),
            agnostic: HashMap::new(),
        }
    }

    /// Registry with all built-in plugins in canonical order.
    pub fn with_defaults() -> Self {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(SshPlugin));
        registry.register(Arc::new(HttpPlugin));
        registry.register(Arc::new(FtpPlugin));
        registry.register(Arc::new(SmtpPlugin));
        registry.register(Arc::new(RedisPlugin));
        registry.register(Arc::new(SnmpPlugin));
        registry.register(Arc::new(DnsPlugin));
        registry
    }

    /// Registers a plugin. Priority within a port bucket is registration
    /// order.
    pub fn register(&mut self, plugin: Arc<dyn ServicePlugin>) {
        for &port in plugin.port_hints() {
            self.hinted
                .entry((plugin.transport(), port))
                .or_default()
                .push(Arc::clone(&plugin));
        }
        if plugin.port_agnostic() {
            self.agnostic
                .entry(plugin.transport())
                .or_default()
                .push(plugin);
        }
    }

    /// Candidate plugins for a target port: hinted plugins first, then
    /// port-agnostic plugins of the same transport. In fast mode the list is
    /// truncated to the hinted plugins only.
    pub fn candidates(
        &self,
        transport: Transport,
        port: u16,
        fast_mode: bool,
    ) -> Vec<Arc<dyn ServicePlugin>> {
        let mut out: Vec<Arc<dyn ServicePlugin>> = self
            .hinted
            .get(&(transport, port))
            .map(|v| v.to_vec())
            .unwrap_or_default();
        if !fast_mode {
            if let Some(agnostic) = self.agnostic.get(&transport) {
                for plugin in agnostic {
                    if out.iter().all(|p| p.name() != plugin.name()) {
                        out.push(Arc::clone(plugin));
                    }
                }
            }
        }
        out
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
