//! Identity of the machine the agent runs on.

use std::net::{IpAddr, Ipv4Addr};

use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ServerInfo {
    pub hostname: String,
    /// First non-loopback IPv4 address, or 127.0.0.1 when there is none
    #[schema(value_type = String)]
    pub ip: Ipv4Addr,
}

impl ServerInfo {
    pub fn collect() -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let interfaces = match local_ip_address::list_afinet_netifas() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                debug!(error = %e, "Failed to list network interfaces");
                Vec::new()
            }
        };

        Self {
            hostname,
            ip: external_ipv4(&interfaces),
        }
    }
}

fn external_ipv4(interfaces: &[(String, IpAddr)]) -> Ipv4Addr {
    interfaces
        .iter()
        .find_map(|(_, addr)| match addr {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(*v4),
            _ => None,
        })
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, addr: &str) -> (String, IpAddr) {
        (name.to_string(), addr.parse().unwrap())
    }

    #[test]
    fn test_skips_loopback_and_ipv6() {
        let interfaces = [
            iface("lo", "127.0.0.1"),
            iface("eth0", "fe80::1"),
            iface("eth0", "10.0.0.7"),
            iface("wlan0", "192.168.1.20"),
        ];
        assert_eq!(external_ipv4(&interfaces), Ipv4Addr::new(10, 0, 0, 7));
    }

    #[test]
    fn test_falls_back_to_localhost() {
        assert_eq!(external_ipv4(&[iface("lo", "127.0.0.1")]), Ipv4Addr::LOCALHOST);
        assert_eq!(external_ipv4(&[]), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_serializes_ip_as_string() {
        let info = ServerInfo {
            hostname: "pnode-1".to_string(),
            ip: Ipv4Addr::new(10, 0, 0, 7),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"hostname": "pnode-1", "ip": "10.0.0.7"}));
    }
}
