//! Connection primitives shared by all probes.
//!
//! This is the only module that speaks TLS: [`detect_tls`] performs the
//! opportunistic handshake used to classify a TCP port, and [`open_stream`]
//! hands plugins either a plain or a decrypted stream. SNI is taken from the
//! target hostname when present, otherwise from the IP address.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::config::PROBE_READ_LIMIT;

use super::Target;

/// A certificate verifier that always accepts certificates.
///
/// Scanning must identify services behind self-signed and expired
/// certificates; trust decisions are not this tool's job.
#[derive(Debug)]
struct AcceptAllVerifier;

impl ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}

/// Marker trait for the duplex byte streams handed to plugins.
pub trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

/// An established probe connection: plain TCP or a decrypted TLS stream.
pub type ProbeStream = Box<dyn Duplex>;

fn tls_client_config() -> ClientConfig {
    // Idempotent; keeps TLS probing usable from tests that skip the
    // binaries' startup path.
    crate::initialization::init_crypto_provider();
    ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier))
        .with_no_client_auth()
}

fn server_name(target: &Target) -> ServerName<'static> {
    match &target.host {
        Some(host) => ServerName::try_from(host.clone())
            .unwrap_or_else(|_| ServerName::IpAddress(IpAddr::V4(target.ip()).into())),
        None => ServerName::IpAddress(IpAddr::V4(target.ip()).into()),
    }
}

/// Opens a connection to the target within `deadline`, wrapping it in TLS
/// when `tls` is set.
pub async fn open_stream(
    target: &Target,
    tls: bool,
    deadline: Duration,
) -> std::io::Result<ProbeStream> {
    let sock = timeout(deadline, TcpStream::connect(target.addr))
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;

    if !tls {
        return Ok(Box::new(sock));
    }

    let connector = TlsConnector::from(Arc::new(tls_client_config()));
    let stream = timeout(deadline, connector.connect(server_name(target), sock))
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
    Ok(Box::new(stream))
}

/// Attempts an opportunistic TLS handshake against a TCP target.
///
/// Returns `true` when the handshake completes within the deadline. The
/// handshake connection is dropped; plugins open their own stream.
pub async fn detect_tls(target: &Target, deadline: Duration) -> bool {
    let Ok(Ok(sock)) = timeout(deadline, TcpStream::connect(target.addr)).await else {
        return false;
    };
    let connector = TlsConnector::from(Arc::new(tls_client_config()));
    matches!(
        timeout(deadline, connector.connect(server_name(target), sock)).await,
        Ok(Ok(_))
    )
}

/// Reads from the stream until EOF, the byte limit, or the deadline.
///
/// Partial data collected before the deadline is returned rather than
/// discarded; probed servers frequently never close their side.
pub async fn read_response(stream: &mut ProbeStream, deadline: Duration) -> Vec<u8> {
    let start = Instant::now();
    let mut collected = Vec::new();
    let mut buf = [0u8; 2048];
    while collected.len() < PROBE_READ_LIMIT {
        let remaining = match deadline.checked_sub(start.elapsed()) {
            Some(r) if !r.is_zero() => r,
            _ => break,
        };
        match timeout(remaining, stream.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => collected.extend_from_slice(&buf[..n]),
            Ok(Err(_)) | Err(_) => break,
        }
    }
    collected.truncate(PROBE_READ_LIMIT);
    collected
}

/// Sends one datagram to the target and waits for a single reply.
///
/// Returns `None` on bind/send failure or when no reply arrives within the
/// deadline.
pub async fn udp_exchange(
    target: &Target,
    payload: &[u8],
    deadline: Duration,
) -> Option<Vec<u8>> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect(target.addr).await.ok()?;
    timeout(deadline, socket.send(payload)).await.ok()?.ok()?;

    let mut buf = vec![0u8; PROBE_READ_LIMIT];
    let n = timeout(deadline, socket.recv(&mut buf)).await.ok()?.ok()?;
    buf.truncate(n);
    Some(buf)
}

/// Reads a single `\n`-terminated line within the deadline.
pub async fn read_line(stream: &mut ProbeStream, deadline: Duration) -> Option<String> {
    let start = Instant::now();
    let mut collected = Vec::new();
    let mut buf = [0u8; 256];
    while collected.len() < PROBE_READ_LIMIT {
        if collected.contains(&b'\n') {
            break;
        }
        let remaining = deadline.checked_sub(start.elapsed()).filter(|r| !r.is_zero())?;
        match timeout(remaining, stream.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => collected.extend_from_slice(&buf[..n]),
            Ok(Err(_)) | Err(_) => return None,
        }
    }
    let line_end = collected.iter().position(|&b| b == b'\n')?;
    Some(String::from_utf8_lossy(&collected[..=line_end]).into_owned())
}
