//! Forced external addressing: with `network=external` on the connection
//! string, every routing decision targets the node's alternate hostname,
//! including the very first one after a config is installed.
//!
//! This exercises `AuthProvider` directly rather than through
//! `Client::new`: a real client would try to dial the alternate host while
//! fetching cluster identity, and `ext.example.com` isn't reachable from a
//! test environment. The routing decision itself doesn't need a live
//! server to verify.

use couchbase_rest_core::cluster_config::ClusterConfigManager;
use couchbase_rest_core::connection_string::ParsedConnectionString;
use couchbase_rest_core::types::{AlternateAddresses, AlternateHost, ClusterConfig, Node, PortPair, ServicePorts, ServiceType};
use std::sync::Arc;

fn node_with_alternate() -> Node {
    let mut services = ServicePorts::default();
    services.management = PortPair { plain: 8091, tls: 18091 };

    let mut alt_services = ServicePorts::default();
    alt_services.management = PortPair { plain: 19091, tls: 19092 };

    Node {
        hostname: "10.0.0.1".to_string(),
        services,
        alternate_addresses: AlternateAddresses {
            external: Some(AlternateHost { hostname: "ext.example.com".to_string(), services: alt_services }),
        },
        bootstrap_node: true,
    }
}

/// S5: `network=external` plus a node reporting an alternate hostname means
/// routing targets the alternate host rather than the primary one.
#[tokio::test]
async fn forced_external_addressing_routes_to_alternate_host() {
    let resolved = ParsedConnectionString::parse("couchbase://10.0.0.1?network=external").unwrap().resolve().await.unwrap();
    let manager = Arc::new(ClusterConfigManager::new().unwrap());
    manager.update(ClusterConfig { revision: 1, nodes: vec![node_with_alternate()] }).unwrap();

    let auth_provider =
        couchbase_rest_core::auth_provider::AuthProvider::new(resolved, manager).unwrap();

    let url = auth_provider.get_service_host(ServiceType::Management, 0).unwrap();
    assert_eq!(url.host_str(), Some("ext.example.com"));
    assert_eq!(url.port(), Some(19091));
}

/// Without `network=external`, the same node resolves to its primary host.
#[tokio::test]
async fn default_addressing_routes_to_primary_host() {
    let resolved = ParsedConnectionString::parse("couchbase://10.0.0.1").unwrap().resolve().await.unwrap();
    let manager = Arc::new(ClusterConfigManager::new().unwrap());
    manager.update(ClusterConfig { revision: 1, nodes: vec![node_with_alternate()] }).unwrap();

    let auth_provider =
        couchbase_rest_core::auth_provider::AuthProvider::new(resolved, manager).unwrap();

    let url = auth_provider.get_service_host(ServiceType::Management, 0).unwrap();
    assert_eq!(url.host_str(), Some("10.0.0.1"));
    assert_eq!(url.port(), Some(8091));
}
