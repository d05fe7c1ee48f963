//! Port discovery: the `Discoverer` contract plus target/port-set parsing.
//!
//! The discovery engine is an external collaborator behind the [`Discoverer`]
//! trait; [`connect::ConnectDiscoverer`] is the built-in rate-limited TCP
//! connect implementation. Adapters must honor cancellation promptly, emit
//! each `(host, port, transport)` triple at most once, and never emit IPv6
//! results.

pub mod connect;

use std::net::Ipv4Addr;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error_handling::ScanError;
use crate::models::Transport;

/// A single open-port observation produced by the discovery engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
}

/// Discovery scan technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    /// Full TCP connect scan.
    Connect,
    /// Half-open SYN scan. Accepted for interface compatibility; the built-in
    /// engine falls back to connect mode since raw sockets are out of scope.
    Syn,
}

impl std::str::FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(ScanType::Connect),
            "s" => Ok(ScanType::Syn),
            other => Err(format!("unknown scan type: {other} (expected c or s)")),
        }
    }
}

/// Tunables for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub scan_type: ScanType,
    /// Explicit port list (e.g. `"80,443,8000-8100"`); overrides `top_ports`.
    pub ports: Option<String>,
    /// Curated port selection: `"100"`, `"1000"`, or `"full"`.
    pub top_ports: String,
    /// Connect retries per port after the first attempt.
    pub retries: u32,
    /// Probe rate in packets (connection attempts) per second.
    pub rate: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            scan_type: ScanType::Connect,
            ports: None,
            top_ports: "1000".to_string(),
            retries: 1,
            rate: 50_000,
        }
    }
}

/// Callback invoked once per discovered open port. The returned future is
/// awaited by the discoverer before the next result is delivered, which is
/// what lets the scan orchestrator probe inline under backpressure.
pub type OnDiscovery<'a> = &'a (dyn Fn(DiscoveryResult) -> BoxFuture<'static, ()> + Send + Sync);

/// A port-discovery engine.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Runs discovery over `targets`, invoking `on_result` for every open
    /// port. Returns `ScanError::Cancelled` promptly when `cancel` fires,
    /// without waiting for the engine to drain.
    async fn discover(
        &self,
        cancel: &CancellationToken,
        targets: &[String],
        cfg: &DiscoveryConfig,
        on_result: OnDiscovery<'_>,
    ) -> Result<(), ScanError>;
}

/// Commonly exposed ports, most interesting first. The first 100 entries are
/// the `top-ports 100` selection.
const CURATED_PORTS: &[u16] = &[
    80, 443, 22, 21, 25, 53, 110, 143, 3306, 3389, 8080, 8443, 445, 139, 135, 23, 587, 993, 995,
    111, 465, 8000, 8888, 1723, 123, 5900, 1025, 389, 636, 8081, 5432, 6379, 27017, 11211, 9200,
    9300, 5601, 2049, 2375, 2376, 3000, 5000, 7001, 7002, 9000, 9092, 9418, 10000, 1080, 1194,
    1352, 1433, 1521, 2082, 2083, 2086, 2087, 2095, 2096, 3128, 3268, 4444, 4500, 500, 5060, 5061,
    5671, 5672, 5985, 5986, 6000, 6001, 6646, 7070, 8008, 8009, 8010, 8200, 8500, 8530, 8531,
    8834, 9001, 9090, 9100, 9999, 10050, 10051, 15672, 16992, 16993, 20000, 30000, 32768, 49152,
    49153, 49154, 50000, 55553, 61616, 64738,
];

/// Parses a comma-separated list of ports and ranges, e.g. `"22,80,1-1024"`.
pub fn parse_ports(spec: &str) -> Result<Vec<u16>, ScanError> {
    let mut ports = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let s: u16 = start
                .trim()
                .parse()
                .map_err(|_| ScanError::InvalidInput(format!("invalid port range: {part}")))?;
            let e: u16 = end
                .trim()
                .parse()
                .map_err(|_| ScanError::InvalidInput(format!("invalid port range: {part}")))?;
            if s == 0 || e == 0 || s > e {
                return Err(ScanError::InvalidInput(format!("invalid port range: {part}")));
            }
            ports.extend(s..=e);
        } else {
            let p: u16 = part
                .parse()
                .map_err(|_| ScanError::InvalidInput(format!("invalid port: {part}")))?;
            if p == 0 {
                return Err(ScanError::InvalidInput(format!("invalid port: {part}")));
            }
            ports.push(p);
        }
    }
    if ports.is_empty() {
        return Err(ScanError::InvalidInput("empty port specification".into()));
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Resolves the effective port set for a discovery run: an explicit `ports`
/// list wins over the `top_ports` selection.
pub fn resolve_port_set(cfg: &DiscoveryConfig) -> Result<Vec<u16>, ScanError> {
    if let Some(spec) = cfg.ports.as_deref() {
        return parse_ports(spec);
    }
    match cfg.top_ports.as_str() {
        "100" => Ok(CURATED_PORTS[..100.min(CURATED_PORTS.len())].to_vec()),
        "1000" => {
            let mut ports: Vec<u16> = (1..=1024).collect();
            ports.extend_from_slice(CURATED_PORTS);
            ports.sort_unstable();
            ports.dedup();
            Ok(ports)
        }
        "full" => Ok((1..=u16::MAX).collect()),
        other => Err(ScanError::InvalidInput(format!(
            "invalid top-ports selection: {other} (expected 100, 1000, or full)"
        ))),
    }
}

/// Expands target arguments (single IPv4 addresses or CIDR ranges) into the
/// concrete address list. IPv6 input is rejected.
pub fn expand_targets(targets: &[String]) -> Result<Vec<Ipv4Addr>, ScanError> {
    if targets.is_empty() {
        return Err(ScanError::InvalidInput("no targets specified".into()));
    }
    let mut addrs = Vec::new();
    for raw in targets {
        let target = raw.trim();
        if target.is_empty() {
            continue;
        }
        if target.contains(':') {
            return Err(ScanError::InvalidInput(format!(
                "IPv6 targets are not supported: {target}"
            )));
        }
        if let Ok(addr) = target.parse::<Ipv4Addr>() {
            addrs.push(addr);
        } else if let Ok(net) = target.parse::<ipnet::Ipv4Net>() {
            if net.prefix_len() >= 31 {
                addrs.extend([net.network(), net.broadcast()].into_iter().take(
                    if net.prefix_len() == 32 { 1 } else { 2 },
                ));
            } else {
                addrs.extend(net.hosts());
            }
        } else {
            return Err(ScanError::InvalidInput(format!(
                "not an IPv4 address or CIDR range: {target}"
            )));
        }
    }
    if addrs.is_empty() {
        return Err(ScanError::InvalidInput("no targets specified".into()));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ports_lists_and_ranges() {
        assert_eq!(parse_ports("22,80,443").unwrap(), vec![22, 80, 443]);
        assert_eq!(parse_ports("1-3,5,3").unwrap(), vec![1, 2, 3, 5]);
    }

    #[test]
    fn parse_ports_rejects_invalid() {
        assert!(parse_ports("0").is_err());
        assert!(parse_ports("10-5").is_err());
        assert!(parse_ports("http").is_err());
        assert!(parse_ports("").is_err());
    }

    #[test]
    fn top_port_selections() {
        let cfg = |top: &str| DiscoveryConfig {
            top_ports: top.to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_port_set(&cfg("100")).unwrap().len(), 100);
        let thousand = resolve_port_set(&cfg("1000")).unwrap();
        assert!(thousand.contains(&22));
        assert!(thousand.contains(&8443));
        assert!(thousand.len() >= 1000);
        assert_eq!(resolve_port_set(&cfg("full")).unwrap().len(), 65535);
        assert!(resolve_port_set(&cfg("9999")).is_err());
    }

    #[test]
    fn explicit_ports_override_top_ports() {
        let cfg = DiscoveryConfig {
            ports: Some("8080".into()),
            ..Default::default()
        };
        assert_eq!(resolve_port_set(&cfg).unwrap(), vec![8080]);
    }

    #[test]
    fn expand_single_addresses_and_cidr() {
        let addrs = expand_targets(&["10.0.0.1".into(), "192.168.1.0/30".into()]).unwrap();
        assert_eq!(addrs.len(), 3); // one single + two hosts in the /30
        assert!(addrs.contains(&Ipv4Addr::new(192, 168, 1, 1)));
        assert!(addrs.contains(&Ipv4Addr::new(192, 168, 1, 2)));
    }

    #[test]
    fn expand_host_prefixes() {
        assert_eq!(expand_targets(&["10.0.0.5/32".into()]).unwrap().len(), 1);
        assert_eq!(expand_targets(&["10.0.0.4/31".into()]).unwrap().len(), 2);
    }

    #[test]
    fn expand_rejects_bad_input() {
        assert!(expand_targets(&[]).is_err());
        assert!(expand_targets(&["2001:db8::1".into()]).is_err());
        assert!(expand_targets(&["nonsense".into()]).is_err());
        assert!(expand_targets(&["10.0.0.0/0/0".into()]).is_err());
    }

    #[test]
    fn scan_type_parses_short_flags() {
        assert_eq!("c".parse::<ScanType>().unwrap(), ScanType::Connect);
        assert_eq!("s".parse::<ScanType>().unwrap(), ScanType::Syn);
        assert!("x".parse::<ScanType>().is_err());
    }
}
