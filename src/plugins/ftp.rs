//! FTP greeting probe.

use async_trait::async_trait;

use crate::models::{BannerInfo, Service, ServiceDetails, Transport};

use super::net::{open_stream, read_line};
use super::{ProbeSession, ServicePlugin, Target};

/// Identifies FTP servers by their `220` greeting line.
pub struct FtpPlugin;

#[async_trait]
impl ServicePlugin for FtpPlugin {
    fn name(&self) -> &'static str {
        "ftp"
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn port_hints(&self) -> &'static [u16] {
        &[21]
    }

    async fn probe(&self, target: &Target, session: &ProbeSession) -> Option<Service> {
        let mut stream = open_stream(target, session.tls, session.timeout).await.ok()?;
        let line = read_line(&mut stream, session.timeout).await?;
        let greeting = line.trim();
        if !greeting.starts_with("220") {
            return None;
        }

        let mut svc = Service::identified(
            target.ip().to_string(),
            target.port(),
            Transport::Tcp,
            session.tls,
            ServiceDetails::Ftp(BannerInfo {
                banner: greeting.to_string(),
            }),
        );
        svc.raw = Some(line);
        Some(svc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn identifies_ftp_greeting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let _ = sock.write_all(b"220 vsFTPd 3.0.5 ready.\r\n").await;
        });
        let target = Target::new(Ipv4Addr::LOCALHOST, port);
        let session = ProbeSession {
            timeout: Duration::from_secs(1),
            tls: false,
        };
        let svc = FtpPlugin.probe(&target, &session).await.unwrap();
        assert_eq!(svc.protocol, "ftp");
        assert_eq!(
            svc.details,
            ServiceDetails::Ftp(BannerInfo {
                banner: "220 vsFTPd 3.0.5 ready.".into()
            })
        );
    }

    #[tokio::test]
    async fn rejects_other_greeting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let _ = sock.write_all(b"421 go away\r\n").await;
        });
        let target = Target::new(Ipv4Addr::LOCALHOST, port);
        let session = ProbeSession {
            timeout: Duration::from_secs(1),
            tls: false,
        };
        assert!(FtpPlugin.probe(&target, &session).await.is_none());
    }
}
