//! Mock server wrapper for testing cluster-aware REST client consumers
//!
//! # Example
//!
//! ```ignore
//! use couchbase_rest_core::testing::MockClusterServer;
//! use couchbase_rest_core::testing::fixtures::{NodeFixture, NodeServicesFixture, PoolsFixture};
//!
//! #[tokio::test]
//! async fn test_my_app() {
//!     let server = MockClusterServer::start().await;
//!     server.mock_pools(PoolsFixture::new("cluster-uuid").build()).await;
//!     server
//!         .mock_node_services(NodeServicesFixture::new(1).node(
//!             NodeFixture::new(server.host()).mgmt_port(server.port()).bootstrap_node(true).build(),
//!         ))
//!         .await;
//!
//!     let client = server.client().await.unwrap();
//!     client.close().await;
//! }
//! ```

use crate::client::{Client, ClientOptionsBuilder};
use crate::credentials::StaticCredentialProvider;
use crate::error::Result;
use crate::testing::fixtures::NodeServicesFixture;
use serde_json::Value;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A wrapper around wiremock's `MockServer` configured for cluster REST
/// client testing: `/pools` and `/pools/default/nodeServices` are the two
/// endpoints a `Client` always hits during bootstrap.
pub struct MockClusterServer {
    server: MockServer,
}

impl MockClusterServer {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Bare host (no port), suitable as the `hostname` field of a node
    /// fixture so the fixture matches the host the client actually dialed.
    /// Pair with `port()` for the service port the fixture should advertise.
    pub fn host(&self) -> String {
        let url = url::Url::parse(&self.server.uri()).expect("mock server uri is a valid url");
        url.host_str().expect("mock server uri has a host").to_string()
    }

    /// The mock server's real listening port.
    pub fn port(&self) -> u16 {
        let url = url::Url::parse(&self.server.uri()).expect("mock server uri is a valid url");
        url.port().unwrap_or(80)
    }

    /// Builds a `Client` pointed at this server with a throwaway static
    /// credential, bootstrapping against whatever mocks are mounted.
    pub async fn client(&self) -> Result<Client> {
        let options = ClientOptionsBuilder::new(format!("http://{}:{}", self.host(), self.port()))
            .provider(Arc::new(StaticCredentialProvider::new("admin", "password", "test-agent/1.0")))
            .disable_ccp(true)
            .build()?;
        Client::new(options).await
    }

    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    pub async fn mock_pools(&self, pools: Value) {
        Mock::given(method("GET"))
            .and(path("/pools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pools))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_node_services(&self, fixture: NodeServicesFixture) {
        Mock::given(method("GET"))
            .and(path("/pools/default/nodeServices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixture.build()))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_unauthorized(&self) {
        Mock::given(method("GET"))
            .respond_with(super::responses::unauthorized())
            .mount(&self.server)
            .await;
    }

    /// Mount a custom mock on the server.
    pub async fn mount(&self, mock: Mock) {
        mock.mount(&self.server).await;
    }

    /// Mount a custom response template at a specific path.
    pub async fn mock_path(&self, http_method: &str, path_str: &str, response: ResponseTemplate) {
        Mock::given(method(http_method)).and(path(path_str)).respond_with(response).mount(&self.server).await;
    }
}
