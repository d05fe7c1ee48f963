//! Redis PING probe.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::models::{RedisInfo, Service, ServiceDetails, Transport};

use super::net::{open_stream, read_line, read_response};
use super::{ProbeSession, ServicePlugin, Target};

/// Identifies Redis servers via the inline `PING` command; a follow-up
/// `INFO server` extracts the version when the server allows it.
pub struct RedisPlugin;

pub(crate) fn parse_version(info_reply: &str) -> Option<String> {
    info_reply
        .lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl ServicePlugin for RedisPlugin {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn port_hints(&self) -> &'static [u16] {
        &[6379]
    }

    async fn probe(&self, target: &Target, session: &ProbeSession) -> Option<Service> {
        let mut stream = open_stream(target, session.tls, session.timeout).await.ok()?;

        timeout(session.timeout, stream.write_all(b"PING\r\n"))
            .await
            .ok()?
            .ok()?;
        let pong = read_line(&mut stream, session.timeout).await?;
        // Servers with requirepass answer -NOAUTH; that is still Redis.
        if !(pong.starts_with("+PONG") || pong.starts_with("-NOAUTH")) {
            return None;
        }

        let mut version = None;
        if pong.starts_with("+PONG")
            && timeout(session.timeout, stream.write_all(b"INFO server\r\n"))
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false)
        {
            let reply = read_response(&mut stream, session.timeout).await;
            version = parse_version(&String::from_utf8_lossy(&reply));
        }

        Some(Service::identified(
            target.ip().to_string(),
            target.port(),
            Transport::Tcp,
            session.tls,
            ServiceDetails::Redis(RedisInfo { version }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn session() -> ProbeSession {
        ProbeSession {
            timeout: Duration::from_secs(1),
            tls: false,
        }
    }

    #[tokio::test]
    async fn identifies_redis_and_extracts_version() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = sock.read(&mut buf).await;
            sock.write_all(b"+PONG\r\n").await.unwrap();
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"$52\r\n# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n")
                .await;
        });
        let target = Target::new(Ipv4Addr::LOCALHOST, port);
        let svc = RedisPlugin.probe(&target, &session()).await.unwrap();
        assert_eq!(svc.protocol, "redis");
        assert_eq!(
            svc.details,
            ServiceDetails::Redis(RedisInfo {
                version: Some("7.2.4".into())
            })
        );
    }

    #[tokio::test]
    async fn auth_protected_server_is_still_redis() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"-NOAUTH Authentication required.\r\n")
                .await;
        });
        let target = Target::new(Ipv4Addr::LOCALHOST, port);
        let svc = RedisPlugin.probe(&target, &session()).await.unwrap();
        assert_eq!(
            svc.details,
            ServiceDetails::Redis(RedisInfo { version: None })
        );
    }

    #[tokio::test]
    async fn non_redis_reply_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = sock.read(&mut buf).await;
            let _ = sock.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        });
        let target = Target::new(Ipv4Addr::LOCALHOST, port);
        assert!(RedisPlugin.probe(&target, &session()).await.is_none());
    }

    #[test]
    fn parse_version_finds_field() {
        assert_eq!(
            parse_version("# Server\r\nredis_version:6.0.16\r\n").as_deref(),
            Some("6.0.16")
        );
        assert!(parse_version("# Server\r\nredis_mode:standalone\r\n").is_none());
    }
}
