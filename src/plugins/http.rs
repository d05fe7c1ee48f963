//! HTTP/HTTPS probe.
//!
//! Sends a minimal `GET /` and parses the status line, headers, and (for
//! HTML bodies) the page title. Over a TLS session the same exchange yields
//! an `https` service.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::models::{HttpInfo, Service, ServiceDetails, Transport};

use super::net::{open_stream, read_response};
use super::{ProbeSession, ServicePlugin, Target};

/// Identifies HTTP servers; runs as the port-agnostic fallback for TCP.
pub struct HttpPlugin;

fn title_regex() -> &'static Regex {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"))
}

/// Parsed interesting parts of a raw HTTP response.
pub(crate) fn parse_response(raw: &str) -> Option<HttpInfo> {
    let mut lines = raw.lines();
    let status_line = lines.next()?;
    if !status_line.starts_with("HTTP/") {
        return None;
    }
    let status: u16 = status_line.split_whitespace().nth(1)?.parse().ok()?;

    let mut headers = BTreeMap::new();
    for line in lines {
        if line.is_empty() || line == "\r" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(
                name.trim().to_ascii_lowercase(),
                value.trim().to_string(),
            );
        }
    }

    let title = title_regex()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty());

    Some(HttpInfo {
        status,
        headers,
        title,
    })
}

#[async_trait]
impl ServicePlugin for HttpPlugin {
    fn name(&self) -> &'static str {
        "http"
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn port_hints(&self) -> &'static [u16] {
        &[80, 443, 8080, 8000, 8081, 8443, 3000]
    }

    fn port_agnostic(&self) -> bool {
        true
    }

    async fn probe(&self, target: &Target, session: &ProbeSession) -> Option<Service> {
        let mut stream = open_stream(target, session.tls, session.timeout).await.ok()?;

        let host = target
            .host
            .clone()
            .unwrap_or_else(|| target.ip().to_string());
        let request = format!(
            "GET / HTTP/1.1\r\nHost: {host}\r\nUser-Agent: hostscan/0.3\r\nAccept: */*\r\nConnection: close\r\n\r\n"
        );
        timeout(session.timeout, stream.write_all(request.as_bytes()))
            .await
            .ok()?
            .ok()?;

        let body = read_response(&mut stream, session.timeout).await;
        if body.is_empty() {
            return None;
        }
        let raw = String::from_utf8_lossy(&body).into_owned();
        let info = parse_response(&raw)?;

        let details = if session.tls {
            ServiceDetails::Https(info)
        } else {
            ServiceDetails::Http(info)
        };
        Some(Service::identified(
            target.ip().to_string(),
            target.port(),
            Transport::Tcp,
            session.tls,
            details,
        ))
    }
}
