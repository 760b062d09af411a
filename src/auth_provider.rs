//! Component C: turns a `(service, offset)` routing request into a concrete
//! URL, using the current cluster config and the alternate-addressing
//! heuristic. Also owns the bootstrap-candidate iterator the client walks
//! during initial connect and refresh.

use crate::cluster_config::ClusterConfigManager;
use crate::connection_string::{NetworkPreference, ResolvedConnectionString};
use crate::error::{Error, Result};
use crate::types::{ClusterConfig, ServiceType};
use std::sync::{Arc, RwLock};
use url::Url;

pub struct AuthProvider {
    resolved: ResolvedConnectionString,
    manager: Arc<ClusterConfigManager>,
    use_alt_addr: RwLock<bool>,
}

impl AuthProvider {
    pub fn new(resolved: ResolvedConnectionString, manager: Arc<ClusterConfigManager>) -> Result<Self> {
        let use_alt_addr = matches!(resolved.network_preference()?, NetworkPreference::External);
        Ok(Self { resolved, manager, use_alt_addr: RwLock::new(use_alt_addr) })
    }

    pub fn manager(&self) -> &Arc<ClusterConfigManager> {
        &self.manager
    }

    pub fn use_ssl(&self) -> bool {
        self.resolved.use_ssl
    }

    fn use_alt_addr(&self) -> bool {
        *self.use_alt_addr.read().expect("use_alt_addr lock poisoned")
    }

    /// Select a host running `service`, rotating through the candidate list
    /// by `offset` so repeated failed attempts shift to a different node.
    pub fn get_service_host(&self, service: ServiceType, offset: usize) -> Result<Url> {
        let hosts = self.get_all_service_hosts(service)?;
        let idx = offset % hosts.len();
        Ok(hosts[idx].clone())
    }

    pub fn get_all_service_hosts(&self, service: ServiceType) -> Result<Vec<Url>> {
        let config = self.manager.get_cluster_config().ok_or(Error::ServiceNotAvailable(service))?;
        let use_alt_addr = self.use_alt_addr();
        let nodes = config.nodes_running(service, use_alt_addr);
        if nodes.is_empty() {
            return Err(Error::ServiceNotAvailable(service));
        }

        let scheme = if self.resolved.use_ssl { "https" } else { "http" };
        nodes
            .into_iter()
            .map(|node| {
                let (hostname, ports) = node
                    .host_for(service, use_alt_addr)
                    .expect("nodes_running only returns nodes with host_for == Some");
                let port = ports.port(self.resolved.use_ssl);
                Url::parse(&format!("{scheme}://{hostname}:{port}"))
                    .map_err(|e| Error::InvalidConnectionString(e.to_string()))
            })
            .collect()
    }

    /// Accepts a freshly-fetched config, delegating revision ordering to the
    /// manager, and recomputes `use_alt_addr` on acceptance.
    pub fn set_cluster_config(&self, fetched_from_host: &str, config: ClusterConfig) -> Result<()> {
        self.manager.update(config)?;
        self.recompute_use_alt_addr(fetched_from_host)?;
        Ok(())
    }

    fn recompute_use_alt_addr(&self, fetched_from_host: &str) -> Result<()> {
        match self.resolved.network_preference()? {
            NetworkPreference::External => {
                *self.use_alt_addr.write().expect("use_alt_addr lock poisoned") = true;
            }
            NetworkPreference::Default | NetworkPreference::Auto => {
                let Some(config) = self.manager.get_cluster_config() else { return Ok(()) };
                let matches_primary = config.nodes.iter().any(|n| n.hostname == fetched_from_host);
                let matches_external = config
                    .nodes
                    .iter()
                    .any(|n| n.alternate_addresses.external.as_ref().is_some_and(|a| a.hostname == fetched_from_host));

                if matches_primary {
                    *self.use_alt_addr.write().expect("use_alt_addr lock poisoned") = false;
                } else if matches_external {
                    *self.use_alt_addr.write().expect("use_alt_addr lock poisoned") = true;
                }
                // Neither matched: leave the flag unchanged, per the heuristic.
            }
        }
        Ok(())
    }

    /// A stateful iterator over candidate bootstrap URLs, used by both
    /// initial bootstrap and `update_cc`'s node-by-node refresh attempts.
    pub fn bootstrap_host_iter(&self) -> BootstrapHostIter<'_> {
        BootstrapHostIter { provider: self, index: 0 }
    }
}

pub struct BootstrapHostIter<'a> {
    provider: &'a AuthProvider,
    index: usize,
}

impl Iterator for BootstrapHostIter<'_> {
    type Item = Url;

    fn next(&mut self) -> Option<Url> {
        let addr = self.provider.resolved.addresses.get(self.index)?;
        self.index += 1;
        let scheme = if self.provider.resolved.use_ssl { "https" } else { "http" };
        let port = addr.port.unwrap_or_else(|| self.provider.resolved.management_port(self.provider.resolved.use_ssl));
        Url::parse(&format!("{scheme}://{}:{port}", addr.host)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_string::HostPort;
    use crate::types::{AlternateAddresses, AlternateHost, Node, PortPair, ServicePorts};
    use std::collections::HashMap;
    use std::time::Duration;

    fn resolved(params: HashMap<String, Vec<String>>) -> ResolvedConnectionString {
        ResolvedConnectionString {
            addresses: vec![HostPort { host: "bootstrap-host".into(), port: Some(8091) }],
            use_ssl: false,
            params,
        }
    }

    fn management_node(hostname: &str, bootstrap: bool) -> Node {
        Node {
            hostname: hostname.into(),
            services: ServicePorts { management: PortPair { plain: 8091, tls: 18091 }, ..Default::default() },
            alternate_addresses: AlternateAddresses::default(),
            bootstrap_node: bootstrap,
        }
    }

    fn provider(params: HashMap<String, Vec<String>>) -> AuthProvider {
        let manager = Arc::new(ClusterConfigManager::with_max_age(Duration::from_secs(60)).unwrap());
        AuthProvider::new(resolved(params), manager).unwrap()
    }

    #[test]
    fn bootstrap_iter_yields_every_address_then_stops() {
        let provider = provider(HashMap::new());
        let urls: Vec<Url> = provider.bootstrap_host_iter().collect();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "http://bootstrap-host:8091/");
    }

    #[test]
    fn get_service_host_prioritizes_bootstrap_node() {
        let provider = provider(HashMap::new());
        provider
            .manager
            .update(ClusterConfig {
                revision: 1,
                nodes: vec![management_node("a", false), management_node("b", true)],
            })
            .unwrap();

        let url = provider.get_service_host(ServiceType::Management, 0).unwrap();
        assert_eq!(url.host_str(), Some("b"));
    }

    #[test]
    fn offset_rotates_through_hosts() {
        let provider = provider(HashMap::new());
        provider
            .manager
            .update(ClusterConfig { revision: 1, nodes: vec![management_node("a", true), management_node("b", false)] })
            .unwrap();

        assert_eq!(provider.get_service_host(ServiceType::Management, 0).unwrap().host_str(), Some("a"));
        assert_eq!(provider.get_service_host(ServiceType::Management, 1).unwrap().host_str(), Some("b"));
        assert_eq!(provider.get_service_host(ServiceType::Management, 2).unwrap().host_str(), Some("a"));
    }

    #[test]
    fn missing_service_is_an_error() {
        let provider = provider(HashMap::new());
        provider.manager.update(ClusterConfig { revision: 1, nodes: vec![management_node("a", true)] }).unwrap();
        assert!(matches!(
            provider.get_service_host(ServiceType::Query, 0),
            Err(Error::ServiceNotAvailable(ServiceType::Query))
        ));
    }

    #[test]
    fn network_external_forces_alt_addr_unconditionally() {
        let params = HashMap::from([("network".to_string(), vec!["external".to_string()])]);
        let provider = provider(params);
        assert!(provider.use_alt_addr());
    }

    #[test]
    fn default_network_flips_to_external_when_fetched_host_matches_alternate() {
        let provider = provider(HashMap::new());
        assert!(!provider.use_alt_addr());

        let mut node = management_node("internal-a", true);
        node.alternate_addresses.external =
            Some(AlternateHost { hostname: "ext-a".into(), services: node.services });

        provider.set_cluster_config("ext-a", ClusterConfig { revision: 1, nodes: vec![node] }).unwrap();
        assert!(provider.use_alt_addr());
    }

    #[test]
    fn default_network_flips_back_when_fetched_host_matches_primary() {
        let provider = provider(HashMap::new());
        let mut node = management_node("internal-a", true);
        node.alternate_addresses.external =
            Some(AlternateHost { hostname: "ext-a".into(), services: node.services });
        provider
            .set_cluster_config("ext-a", ClusterConfig { revision: 1, nodes: vec![node.clone()] })
            .unwrap();
        assert!(provider.use_alt_addr());

        provider.set_cluster_config("internal-a", ClusterConfig { revision: 2, nodes: vec![node] }).unwrap();
        assert!(!provider.use_alt_addr());
    }

    #[test]
    fn invalid_network_param_is_rejected_at_construction() {
        let params = HashMap::from([("network".to_string(), vec!["bogus".to_string()])]);
        let manager = Arc::new(ClusterConfigManager::with_max_age(Duration::from_secs(60)).unwrap());
        assert!(matches!(AuthProvider::new(resolved(params), manager), Err(Error::InvalidNetwork(_))));
    }
}
