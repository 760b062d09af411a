//! Pre-built fixtures for constructing `nodeServices`/`pools` mock bodies.
//!
//! All fixtures use the builder pattern.
//!
//! # Example
//!
//! ```
//! use couchbase_rest_core::testing::fixtures::NodeFixture;
//!
//! let node = NodeFixture::new("node1.example.com").bootstrap_node(true).build();
//! ```

use serde_json::{Value, json};

/// Builder for one `nodesExt` entry.
#[derive(Debug, Clone)]
pub struct NodeFixture {
    hostname: String,
    mgmt: u16,
    mgmt_ssl: u16,
    kv: u16,
    kv_ssl: u16,
    n1ql: u16,
    n1ql_ssl: u16,
    bootstrap_node: bool,
    alternate_hostname: Option<String>,
}

impl NodeFixture {
    /// A node with management, kv, and query ports, matching a freshly
    /// initialized single-node cluster.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            mgmt: 8091,
            mgmt_ssl: 18091,
            kv: 11210,
            kv_ssl: 11207,
            n1ql: 8093,
            n1ql_ssl: 18093,
            bootstrap_node: false,
            alternate_hostname: None,
        }
    }

    pub fn bootstrap_node(mut self, value: bool) -> Self {
        self.bootstrap_node = value;
        self
    }

    /// Override the plaintext management port, e.g. to match a mock
    /// server's real listening port rather than the default `8091`.
    pub fn mgmt_port(mut self, port: u16) -> Self {
        self.mgmt = port;
        self
    }

    /// Remove the kv ports, simulating a query/index-only node.
    pub fn without_kv(mut self) -> Self {
        self.kv = 0;
        self.kv_ssl = 0;
        self
    }

    pub fn alternate_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.alternate_hostname = Some(hostname.into());
        self
    }

    pub fn build(self) -> Value {
        let mut node = json!({
            "hostname": self.hostname,
            "thisNode": self.bootstrap_node,
            "services": {
                "mgmt": self.mgmt,
                "mgmtSSL": self.mgmt_ssl,
                "kv": self.kv,
                "kvSSL": self.kv_ssl,
                "n1ql": self.n1ql,
                "n1qlSSL": self.n1ql_ssl,
            },
        });

        if let Some(alt) = self.alternate_hostname {
            node["alternateAddresses"] = json!({
                "external": {
                    "hostname": alt,
                    "ports": {
                        "mgmt": self.mgmt,
                        "mgmtSSL": self.mgmt_ssl,
                    },
                },
            });
        }

        node
    }
}

/// Builder for a complete `nodeServices` body.
#[derive(Debug, Clone, Default)]
pub struct NodeServicesFixture {
    rev: i64,
    nodes: Vec<Value>,
}

impl NodeServicesFixture {
    pub fn new(rev: i64) -> Self {
        Self { rev, nodes: Vec::new() }
    }

    pub fn node(mut self, node: Value) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn build(self) -> Value {
        json!({ "rev": self.rev, "nodesExt": self.nodes })
    }
}

/// Builder for a `/pools` body.
#[derive(Debug, Clone)]
pub struct PoolsFixture {
    uuid: String,
    enterprise: bool,
    developer_preview: bool,
}

impl PoolsFixture {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into(), enterprise: true, developer_preview: false }
    }

    pub fn enterprise(mut self, value: bool) -> Self {
        self.enterprise = value;
        self
    }

    pub fn build(self) -> Value {
        json!({
            "uuid": self.uuid,
            "isEnterprise": self.enterprise,
            "isDeveloperPreview": self.developer_preview,
        })
    }
}
