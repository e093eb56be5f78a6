//! Concrete probes: a small fixed registry of port, banner, and DNS checks.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde_json::json;

use super::{Probe, ProbeOutcome};

/// Ports a "should be closed" localhost deserves a flag for: the same
/// telnet/ftp/rdp/vnc-flavored set the dynamic-scan dangerous-port list
/// uses, so the static and dynamic stories agree on what "risky" means.
const RISKY_PORTS: [u16; 8] = [21, 23, 445, 2323, 3389, 5900, 5901, 139];

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_millis(500);

fn connect(target: &str, port: u16) -> Option<TcpStream> {
    let addr = (target, port).to_socket_addrs().ok()?.next()?;
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).ok()
}

/// Connect-scans [`RISKY_PORTS`] on `target`, scoring by how many accept a
/// connection.
pub struct PortsProbe {
    target: String,
}

impl PortsProbe {
    pub fn new(target: String) -> Self {
        PortsProbe { target }
    }
}

impl Probe for PortsProbe {
    fn category(&self) -> &'static str {
        "ports"
    }

    fn scan(&self) -> ProbeOutcome {
        let open_ports: Vec<u16> = RISKY_PORTS
            .iter()
            .copied()
            .filter(|&port| connect(&self.target, port).is_some())
            .collect();

        ProbeOutcome {
            category: "ports".to_string(),
            score: open_ports.len() as u32,
            details: json!({ "target": self.target, "open_ports": open_ports }),
        }
    }
}

/// Connects to a single port and captures whatever greeting bytes the
/// service sends first, without shelling out to an external scanner.
pub struct OsBannerProbe {
    target: String,
    port: u16,
}

impl OsBannerProbe {
    pub fn new(target: String, port: u16) -> Self {
        OsBannerProbe { target, port }
    }
}

impl Probe for OsBannerProbe {
    fn category(&self) -> &'static str {
        "os_banner"
    }

    fn scan(&self) -> ProbeOutcome {
        let banner = connect(&self.target, self.port).and_then(|mut stream| {
            stream.set_read_timeout(Some(READ_TIMEOUT)).ok()?;
            let mut buf = [0u8; 128];
            let n = stream.read(&mut buf).ok()?;
            if n == 0 {
                return None;
            }
            let text: String = String::from_utf8_lossy(&buf[..n])
                .chars()
                .filter(|c| !c.is_control())
                .collect::<String>()
                .trim()
                .to_string();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        });

        ProbeOutcome {
            category: "os_banner".to_string(),
            score: banner.is_some() as u32,
            details: json!({ "target": self.target, "port": self.port, "banner": banner }),
        }
    }
}

/// Resolves a fixed canary hostname via the system resolver, flagging a
/// broken or hijacked resolver. `server` is recorded for reference only —
/// the standard resolver has no way to pin a specific DNS server.
pub struct DnsProbe {
    domain: String,
    server: String,
}

impl DnsProbe {
    pub fn new(domain: String, server: String) -> Self {
        DnsProbe { domain, server }
    }
}

impl Probe for DnsProbe {
    fn category(&self) -> &'static str {
        "dns"
    }

    fn scan(&self) -> ProbeOutcome {
        let answers = dns_lookup::lookup_host(&self.domain).unwrap_or_default();
        let answer_strings: Vec<String> = answers.iter().map(ToString::to_string).collect();

        ProbeOutcome {
            category: "dns".to_string(),
            score: answer_strings.len() as u32,
            details: json!({
                "domain": self.domain,
                "server": self.server,
                "answers": answer_strings,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_probe_against_unroutable_target_finds_nothing() {
        let probe = PortsProbe::new("192.0.2.1".to_string());
        let outcome = probe.scan();
        assert_eq!(outcome.category, "ports");
        assert_eq!(outcome.score, 0);
    }

    #[test]
    fn os_banner_probe_against_closed_port_has_zero_score() {
        let probe = OsBannerProbe::new("192.0.2.1".to_string(), 22);
        let outcome = probe.scan();
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.details["banner"], serde_json::Value::Null);
    }
}
