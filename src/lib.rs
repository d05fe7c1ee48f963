//! hostscan library: streaming internet host scanning.
//!
//! The scanning pipeline discovers open TCP/UDP ports on IPv4 targets,
//! fingerprints the application protocol behind each one, and streams
//! [`models::Service`] observations to downstream consumers. The persistence
//! side consumes those observations, enriches them with GeoIP/ASN data, and
//! upserts host aggregates with new-versus-updated classification.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! use hostscan::discovery::{connect::ConnectDiscoverer, DiscoveryConfig};
//! use hostscan::fingerprint::{FingerprintConfig, FingerprintEngine};
//! use hostscan::plugins::PluginRegistry;
//! use hostscan::scan::{scan_with_discovery_stream, OnEvent};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(FingerprintEngine::new(
//!     Arc::new(PluginRegistry::with_defaults()),
//!     FingerprintConfig::default(),
//! ));
//! let on_event: OnEvent = Arc::new(|service| {
//!     Box::pin(async move {
//!         println!("{}", serde_json::to_string(&service).unwrap());
//!     })
//! });
//! let report = scan_with_discovery_stream(
//!     Arc::new(ConnectDiscoverer),
//!     CancellationToken::new(),
//!     vec!["192.168.1.0/24".into()],
//!     DiscoveryConfig::default(),
//!     engine,
//!     on_event,
//! )
//! .await?;
//! println!("identified {} services", report.identified);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod discovery;
pub mod enrich;
pub mod error_handling;
pub mod fingerprint;
pub mod geoip;
pub mod initialization;
pub mod messaging;
pub mod models;
pub mod notifications;
pub mod persistence;
pub mod plugins;
pub mod scan;
pub mod storage;

pub use models::{Host, Service, Transport};
pub use scan::{scan_with_discovery_stream, OnEvent, ScanReport};
