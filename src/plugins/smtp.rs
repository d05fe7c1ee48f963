//! SMTP greeting + EHLO probe.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::models::{BannerInfo, Service, ServiceDetails, Transport};

use super::net::{open_stream, read_line};
use super::{ProbeSession, ServicePlugin, Target};

/// Identifies SMTP servers: `220` greeting followed by a `250` EHLO reply.
///
/// The EHLO round-trip distinguishes SMTP from FTP, which greets with the
/// same `220` code on a different port.
pub struct SmtpPlugin;

#[async_trait]
impl ServicePlugin for SmtpPlugin {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn port_hints(&self) -> &'static [u16] {
        &[25, 587]
    }

    async fn probe(&self, target: &Target, session: &ProbeSession) -> Option<Service> {
        let mut stream = open_stream(target, session.tls, session.timeout).await.ok()?;
        let greeting_line = read_line(&mut stream, session.timeout).await?;
        let greeting = greeting_line.trim();
        if !greeting.starts_with("220") {
            return None;
        }

        timeout(
            session.timeout,
            stream.write_all(b"EHLO hostscan.local\r\n"),
        )
        .await
        .ok()?
        .ok()?;
        let reply = read_line(&mut stream, session.timeout).await?;
        if !reply.trim_start().starts_with("250") {
            return None;
        }

        let mut svc = Service::identified(
            target.ip().to_string(),
            target.port(),
            Transport::Tcp,
            session.tls,
            ServiceDetails::Smtp(BannerInfo {
                banner: greeting.to_string(),
            }),
        );
        svc.raw = Some(greeting_line);
        Some(svc)
    }
}
