//! Cluster topology types: the shapes the node-services/pools payloads decode
//! into, and the fixed enumeration of services the core knows how to route to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A service kind a node may expose. Fixed enumeration; the core never
/// discovers new service kinds at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Management,
    Kv,
    Query,
    Search,
    Analytics,
    Gsi,
    Eventing,
    Views,
    Backup,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A plaintext/TLS port pair. Zero means "not running on this node".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    #[serde(default)]
    pub plain: u16,
    #[serde(default)]
    pub tls: u16,
}

impl PortPair {
    pub fn is_available(&self) -> bool {
        self.plain != 0 || self.tls != 0
    }

    pub fn port(&self, use_ssl: bool) -> u16 {
        if use_ssl { self.tls } else { self.plain }
    }
}

/// Per-node port mapping for every known service.
///
/// The wire payload represents this as flat `mgmt`/`mgmtSSL`, `kv`/`kvSSL`,
/// ... integer fields rather than nested pairs; `client.rs` does that
/// flattening when decoding a `nodeServices` response. `ServicePorts` itself
/// is the in-memory, already-paired representation used everywhere else in
/// the core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServicePorts {
    pub management: PortPair,
    pub kv: PortPair,
    pub query: PortPair,
    pub search: PortPair,
    pub analytics: PortPair,
    pub gsi: PortPair,
    pub eventing: PortPair,
    pub views: PortPair,
    pub backup: PortPair,
}

impl ServicePorts {
    pub fn get(&self, service: ServiceType) -> PortPair {
        match service {
            ServiceType::Management => self.management,
            ServiceType::Kv => self.kv,
            ServiceType::Query => self.query,
            ServiceType::Search => self.search,
            ServiceType::Analytics => self.analytics,
            ServiceType::Gsi => self.gsi,
            ServiceType::Eventing => self.eventing,
            // Views piggybacks on the kv node; if kv isn't running here the
            // views port must be reported as unavailable regardless of what
            // the wire payload said, forcing routing to a kv-capable node.
            ServiceType::Views => {
                if self.kv.is_available() {
                    self.views
                } else {
                    PortPair::default()
                }
            }
            ServiceType::Backup => self.backup,
        }
    }
}

/// External addressing for a node, used when the client sits outside the
/// cluster's internal network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlternateAddresses {
    pub external: Option<AlternateHost>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateHost {
    pub hostname: String,
    pub services: ServicePorts,
}

/// A single node as seen in the `nodeServices` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub hostname: String,
    pub services: ServicePorts,
    pub alternate_addresses: AlternateAddresses,
    /// Set on exactly the node the config payload was fetched from.
    pub bootstrap_node: bool,
}

impl Node {
    /// Hostname to route to for `service`, honoring `use_alt_addr`. `None` if
    /// the service isn't available on this node via the requested addressing.
    pub fn host_for(&self, service: ServiceType, use_alt_addr: bool) -> Option<(String, PortPair)> {
        if use_alt_addr {
            let alt = self.alternate_addresses.external.as_ref()?;
            let ports = alt.services.get(service);
            if ports.is_available() {
                Some((alt.hostname.clone(), ports))
            } else {
                None
            }
        } else {
            let ports = self.services.get(service);
            if ports.is_available() {
                Some((self.hostname.clone(), ports))
            } else {
                None
            }
        }
    }
}

/// The live topology snapshot. Revisions are monotonic; see
/// `cluster_config::ClusterConfigManager`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub revision: i64,
    pub nodes: Vec<Node>,
}

impl ClusterConfig {
    pub fn bootstrap_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.bootstrap_node)
    }

    /// Nodes running `service`, bootstrap node first, in config order
    /// otherwise.
    pub fn nodes_running(&self, service: ServiceType, use_alt_addr: bool) -> Vec<&Node> {
        let mut bootstrap = Vec::new();
        let mut rest = Vec::new();
        for node in &self.nodes {
            if node.host_for(service, use_alt_addr).is_some() {
                if node.bootstrap_node {
                    bootstrap.push(node);
                } else {
                    rest.push(node);
                }
            }
        }
        bootstrap.extend(rest);
        bootstrap
    }
}

/// Cluster identity, learned once at bootstrap via `GET /pools` and used to
/// validate that refresh candidates still belong to the same cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub uuid: String,
    #[serde(rename = "isEnterprise")]
    pub enterprise: bool,
    #[serde(rename = "isDeveloperPreview", default)]
    pub developer_preview: bool,
}

/// Wraps `::1` into `[::1]` the way the node-services payload's bare IPv6
/// hostnames must be stored; leaves an already-bracketed form untouched.
pub fn format_ipv6_host(hostname: &str) -> String {
    if hostname.starts_with('[') {
        return hostname.to_string();
    }
    if hostname.parse::<std::net::Ipv6Addr>().is_ok() {
        format!("[{hostname}]")
    } else {
        hostname.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_bare_ipv6() {
        assert_eq!(format_ipv6_host("::1"), "[::1]");
    }

    #[test]
    fn bracketed_ipv6_is_identity() {
        assert_eq!(format_ipv6_host("[::1]"), "[::1]");
    }

    #[test]
    fn hostnames_are_untouched() {
        assert_eq!(format_ipv6_host("node1.example.com"), "node1.example.com");
    }

    #[test]
    fn views_requires_kv() {
        let mut ports = ServicePorts::default();
        ports.management = PortPair { plain: 8091, tls: 18091 };
        ports.views = PortPair { plain: 8092, tls: 18092 };
        // No kv on this node: views must be unavailable.
        assert!(!ports.get(ServiceType::Views).is_available());

        ports.kv = PortPair { plain: 11210, tls: 11207 };
        assert!(ports.get(ServiceType::Views).is_available());
    }

    #[test]
    fn nodes_running_puts_bootstrap_first() {
        let mgmt = PortPair { plain: 8091, tls: 18091 };
        let a = Node {
            hostname: "a".into(),
            services: ServicePorts { management: mgmt, ..Default::default() },
            alternate_addresses: AlternateAddresses::default(),
            bootstrap_node: false,
        };
        let b = Node {
            hostname: "b".into(),
            services: ServicePorts { management: mgmt, ..Default::default() },
            alternate_addresses: AlternateAddresses::default(),
            bootstrap_node: true,
        };
        let cfg = ClusterConfig { revision: 1, nodes: vec![a, b] };
        let hosts: Vec<&str> = cfg
            .nodes_running(ServiceType::Management, false)
            .into_iter()
            .map(|n| n.hostname.as_str())
            .collect();
        assert_eq!(hosts, vec!["b", "a"]);
    }
}
