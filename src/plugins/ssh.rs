//! SSH identification-string probe.

use async_trait::async_trait;

use crate::models::{Service, ServiceDetails, SshInfo, Transport};

use super::net::{open_stream, read_line};
use super::{ProbeSession, ServicePlugin, Target};

/// Identifies SSH servers by their `SSH-` identification banner, which the
/// server sends immediately after the connection is established.
pub struct SshPlugin;

#[async_trait]
impl ServicePlugin for SshPlugin {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn port_hints(&self) -> &'static [u16] {
        &[22, 2222]
    }

    async fn probe(&self, target: &Target, session: &ProbeSession) -> Option<Service> {
        let mut stream = open_stream(target, session.tls, session.timeout).await.ok()?;
        let line = read_line(&mut stream, session.timeout).await?;
        let banner = line.trim();
        if !banner.starts_with("SSH-") {
            return None;
        }

        let mut svc = Service::identified(
            target.ip().to_string(),
            target.port(),
            Transport::Tcp,
            session.tls,
            ServiceDetails::Ssh(SshInfo {
                banner: banner.to_string(),
                algorithms: None,
            }),
        );
        svc.raw = Some(line);
        Some(svc)
    }
}
