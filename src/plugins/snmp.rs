//! SNMP sysDescr probe (UDP).

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::models::{Service, ServiceDetails, SnmpInfo, Transport};

use super::net::udp_exchange;
use super::{ProbeSession, ServicePlugin, Target};

/// SNMPv2c GetRequest for sysDescr.0 (1.3.6.1.2.1.1.1.0) with community
/// "public", hand-built BER.
const SYS_DESCR_REQUEST: [u8; 43] = [
    0x30, 0x29, // SEQUENCE, len 41
    0x02, 0x01, 0x01, // INTEGER 1 (version 2c)
    0x04, 0x06, 0x70, 0x75, 0x62, 0x6c, 0x69, 0x63, // OCTET STRING "public"
    0xA0, 0x1C, // GetRequest-PDU, len 28
    0x02, 0x04, 0x68, 0x73, 0x63, 0x6E, // request-id
    0x02, 0x01, 0x00, // error-status 0
    0x02, 0x01, 0x00, // error-index 0
    0x30, 0x0E, // VarBindList, len 14
    0x30, 0x0C, // VarBind, len 12
    0x06, 0x08, 0x2B, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, // OID 1.3.6.1.2.1.1.1.0
    0x05, 0x00, // NULL
];

/// Identifies SNMP agents answering the public-community sysDescr request.
pub struct SnmpPlugin;

fn printable_run() -> &'static Regex {
    static RUN: OnceLock<Regex> = OnceLock::new();
    RUN.get_or_init(|| Regex::new(r"[a-zA-Z0-9\s\-\._:;,/()]{6,}").expect("static regex"))
}

/// Pulls the sysDescr string out of a response without a full BER decoder:
/// the longest printable run that is not the echoed community string.
pub(crate) fn extract_sys_descr(response: &[u8]) -> String {
    let text = String::from_utf8_lossy(response).replace("public", "");
    printable_run()
        .find_iter(&text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .max_by_key(|s| s.len())
        .unwrap_or("SNMP Device")
        .to_string()
}

#[async_trait]
impl ServicePlugin for SnmpPlugin {
    fn name(&self) -> &'static str {
        "snmp"
    }

    fn transport(&self) -> Transport {
        Transport::Udp
    }

    fn port_hints(&self) -> &'static [u16] {
        &[161]
    }

    async fn probe(&self, target: &Target, session: &ProbeSession) -> Option<Service> {
        let response = udp_exchange(target, &SYS_DESCR_REQUEST, session.timeout).await?;
        if response.is_empty() || response[0] != 0x30 {
            return None;
        }

        Some(Service::identified(
            target.ip().to_string(),
            target.port(),
            Transport::Udp,
            false,
            ServiceDetails::Snmp(SnmpInfo {
                sys_descr: extract_sys_descr(&response),
            }),
        ))
    }
}
