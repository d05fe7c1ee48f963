//! DNS probe (UDP): `version.bind` TXT query in the CHAOS class.
//!
//! Any well-formed response with our transaction id identifies a DNS server,
//! including REFUSED answers; the version string is extracted only when the
//! server volunteers it.

use async_trait::async_trait;

use crate::models::{DnsInfo, Service, ServiceDetails, Transport};

use super::net::udp_exchange;
use super::{ProbeSession, ServicePlugin, Target};

const TXID: [u8; 2] = [0x68, 0x73];

/// `version.bind. CH TXT` query.
const VERSION_BIND_QUERY: [u8; 30] = [
    0x68, 0x73, // transaction id
    0x00, 0x00, // flags: standard query
    0x00, 0x01, // QDCOUNT 1
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // AN/NS/AR counts
    0x07, b'v', b'e', b'r', b's', b'i', b'o', b'n', // "version"
    0x04, b'b', b'i', b'n', b'd', 0x00, // "bind", root
    0x00, 0x10, // QTYPE TXT
    0x00, 0x03, // QCLASS CH
];

fn skip_name(buf: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *buf.get(pos)? as usize;
        if len == 0 {
            return Some(pos + 1);
        }
        // Compressed name pointer terminates the sequence
        if len & 0xC0 == 0xC0 {
            return Some(pos + 2);
        }
        pos = pos.checked_add(1 + len)?;
    }
}

/// Extracts the first TXT string from the answer section, if any.
pub(crate) fn parse_version(resp: &[u8]) -> Option<String> {
    if resp.len() < 12 {
        return None;
    }
    let qdcount = u16::from_be_bytes([resp[4], resp[5]]) as usize;
    let ancount = u16::from_be_bytes([resp[6], resp[7]]) as usize;
    if ancount == 0 {
        return None;
    }

    let mut pos = 12;
    for _ in 0..qdcount {
        pos = skip_name(resp, pos)?;
        pos = pos.checked_add(4)?; // qtype + qclass
    }

    pos = skip_name(resp, pos)?;
    if pos + 10 > resp.len() {
        return None;
    }
    let rtype = u16::from_be_bytes([resp[pos], resp[pos + 1]]);
    let rdlength = u16::from_be_bytes([resp[pos + 8], resp[pos + 9]]) as usize;
    pos += 10;
    if rtype != 16 || rdlength == 0 || pos + rdlength > resp.len() {
        return None;
    }

    let txt_len = resp[pos] as usize;
    if txt_len + 1 > rdlength {
        return None;
    }
    let version = String::from_utf8_lossy(&resp[pos + 1..pos + 1 + txt_len]).into_owned();
    (!version.is_empty()).then_some(version)
}

/// Identifies DNS servers over UDP.
pub struct DnsPlugin;

#[async_trait]
impl ServicePlugin for DnsPlugin {
    fn name(&self) -> &'static str {
        "dns"
    }

    fn transport(&self) -> Transport {
        Transport::Udp
    }

    fn port_hints(&self) -> &'static [u16] {
        &[53]
    }

    async fn probe(&self, target: &Target, session: &ProbeSession) -> Option<Service> {
        let response = udp_exchange(target, &VERSION_BIND_QUERY, session.timeout).await?;
        // Must echo our transaction id and carry the response (QR) bit
        if response.len() < 12 || response[0..2] != TXID || response[2] & 0x80 == 0 {
            return None;
        }

        Some(Service::identified(
            target.ip().to_string(),
            target.port(),
            Transport::Udp,
            false,
            ServiceDetails::Dns(DnsInfo {
                version: parse_version(&response),
            }),
        ))
    }
}
