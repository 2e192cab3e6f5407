//! Minimal Nmap XML reader.
//!
//! Only the subset the normalizer needs is modeled: repeated `<host>`
//! elements carrying an address and per-port states. Everything else in the
//! document is ignored.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::{ScanHost, ScanPort};

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<XmlHost>,
}

#[derive(Debug, Deserialize)]
struct XmlHost {
    #[serde(rename = "address", default)]
    addresses: Vec<XmlAddress>,
    ports: Option<XmlPorts>,
}

#[derive(Debug, Deserialize)]
struct XmlAddress {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype", default)]
    addrtype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlPorts {
    #[serde(rename = "port", default)]
    ports: Vec<XmlPort>,
}

#[derive(Debug, Deserialize)]
struct XmlPort {
    #[serde(rename = "@portid")]
    portid: u16,
    state: Option<XmlState>,
}

#[derive(Debug, Deserialize)]
struct XmlState {
    #[serde(rename = "@state")]
    state: String,
}

/// Parse Nmap XML text into scan-host records.
///
/// Hosts without any address element are dropped; a host with no `<ports>`
/// block yields an empty port list (and so, downstream, no endpoints).
pub fn parse_scan_xml(xml: &str) -> Result<Vec<ScanHost>> {
    let run: NmapRun =
        quick_xml::de::from_str(xml).context("not a readable Nmap XML document")?;

    let mut hosts = Vec::with_capacity(run.hosts.len());
    for host in run.hosts {
        let Some(addr) = pick_address(&host.addresses) else {
            continue;
        };
        let ports = host
            .ports
            .map(|block| block.ports)
            .unwrap_or_default()
            .into_iter()
            .map(|port| ScanPort {
                port: port.portid,
                state: port.state.map(|s| s.state).unwrap_or_default(),
            })
            .collect();
        hosts.push(ScanHost {
            addr: addr.to_string(),
            ports,
        });
    }
    Ok(hosts)
}

/// Nmap can list several addresses per host (mac + ipv4); prefer the ipv4 one.
fn pick_address(addresses: &[XmlAddress]) -> Option<&str> {
    addresses
        .iter()
        .find(|a| a.addrtype.as_deref() == Some("ipv4"))
        .or_else(|| addresses.first())
        .map(|a| a.addr.as_str())
}
