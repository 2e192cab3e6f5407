use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::types::ScanHost;

/// Canonical endpoint set plus bookkeeping from one normalization pass.
///
/// `uris` holds deduplicated `scheme://host[:port]` strings; `skipped` counts
/// input lines that matched no target grammar and were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    pub uris: BTreeSet<String>,
    pub skipped: u64,
}

impl TargetSet {
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

/// Default HTTP(S) port filter.
pub fn default_ports() -> Vec<u16> {
    vec![80, 443]
}

static LINE_RE: OnceLock<Regex> = OnceLock::new();

/// Grammar for one list line: optional scheme, required host, optional port,
/// tolerating a trailing slash. Anything else is malformed.
fn line_re() -> &'static Regex {
    LINE_RE.get_or_init(|| {
        Regex::new(r"^(?:(https?)://)?([A-Za-z0-9._-]+)(?::(\d{1,5}))?/?$")
            .expect("target line pattern compiles")
    })
}

/// Scheme selection shared by both input paths: only port 443 implies https.
fn endpoint_for(host: &str, port: u16) -> String {
    if port == 443 {
        format!("https://{host}:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

/// Normalize raw list lines into the canonical endpoint set.
///
/// Expansion rules:
/// - scheme and port given: kept verbatim;
/// - `https://host`: kept verbatim (443 semantics without a literal port);
/// - `http://host`: one endpoint per filter port except 443 — an explicit
///   http URL never gains an https sibling;
/// - `host:port`: scheme chosen by the port;
/// - bare `host`: one endpoint per filter port, scheme chosen by each port.
///
/// Blank lines are ignored; malformed lines are counted in `skipped` and
/// logged, never silently dropped.
pub fn from_lines<'a, I>(lines: I, ports: &[u16]) -> TargetSet
where
    I: IntoIterator<Item = &'a str>,
{
    let re = line_re();
    let mut set = TargetSet::default();

    for raw in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = re.captures(line) else {
            warn!(line, "skipping line: not a host, host:port, or URL");
            set.skipped += 1;
            continue;
        };
        let scheme = caps.get(1).map(|m| m.as_str());
        let host = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let port = match caps.get(3) {
            Some(m) => match m.as_str().parse::<u16>() {
                Ok(p) if p > 0 => Some(p),
                _ => {
                    warn!(line, "skipping line: port out of range");
                    set.skipped += 1;
                    continue;
                }
            },
            None => None,
        };

        match (scheme, port) {
            (Some(scheme), Some(port)) => {
                set.uris.insert(format!("{scheme}://{host}:{port}"));
            }
            (Some("https"), None) => {
                set.uris.insert(format!("https://{host}"));
            }
            (Some(_), None) => {
                for &p in ports {
                    if p != 443 {
                        set.uris.insert(format!("http://{host}:{p}"));
                    }
                }
            }
            (None, Some(port)) => {
                set.uris.insert(endpoint_for(host, port));
            }
            (None, None) => {
                for &p in ports {
                    set.uris.insert(endpoint_for(host, p));
                }
            }
        }
    }

    set
}

/// Normalize scan-export records: every open port that passes the filter
/// becomes one endpoint, with the same 443-implies-https rule as list input.
pub fn from_scan_hosts(hosts: &[ScanHost], ports: &[u16]) -> TargetSet {
    let mut set = TargetSet::default();
    for host in hosts {
        for port in &host.ports {
            if port.is_open() && ports.contains(&port.port) {
                set.uris.insert(endpoint_for(&host.addr, port.port));
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScanPort;

    #[test]
    fn scheme_follows_port() {
        assert_eq!(endpoint_for("a", 443), "https://a:443");
        assert_eq!(endpoint_for("a", 8443), "http://a:8443");
        assert_eq!(endpoint_for("a", 80), "http://a:80");
    }

    #[test]
    fn malformed_lines_are_counted_not_fatal() {
        let set = from_lines(["good.host", "bad host with spaces", "a/b/c"], &[80]);
        assert_eq!(set.skipped, 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn out_of_range_port_is_skipped() {
        let set = from_lines(["host:70000"], &[80]);
        assert_eq!(set.skipped, 1);
        assert!(set.is_empty());
    }

    #[test]
    fn trailing_slash_tolerated() {
        let set = from_lines(["https://example.com/"], &[80, 443]);
        assert_eq!(set.uris, BTreeSet::from(["https://example.com".to_string()]));
    }

    #[test]
    fn scan_hosts_drop_closed_and_unfiltered_ports() {
        let hosts = vec![ScanHost {
            addr: "10.0.0.5".into(),
            ports: vec![
                ScanPort { port: 80, state: "open".into() },
                ScanPort { port: 443, state: "filtered".into() },
                ScanPort { port: 9999, state: "open".into() },
            ],
        }];
        let set = from_scan_hosts(&hosts, &[80, 443]);
        assert_eq!(set.uris, BTreeSet::from(["http://10.0.0.5:80".to_string()]));
    }
}
