//! Testing utilities for consumers of this cluster REST client
//!
//! - **Mock server**: a pre-configured wiremock server that answers `/pools`
//!   and `/pools/default/nodeServices` the way a real cluster would
//! - **Fixtures**: builder-pattern fixtures for node/pools response bodies
//! - **Response helpers**: convenience functions for common HTTP responses
//!
//! # Feature Flag
//!
//! This module is only available when the `test-support` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! couchbase-rest-core = { version = "0.1", features = ["test-support"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use couchbase_rest_core::testing::{MockClusterServer, fixtures};
//!
//! #[tokio::test]
//! async fn test_my_app() {
//!     let server = MockClusterServer::start().await;
//!     server.mock_pools(fixtures::PoolsFixture::new("cluster-uuid").build()).await;
//!     server
//!         .mock_node_services(
//!             fixtures::NodeServicesFixture::new(1)
//!                 .node(fixtures::NodeFixture::new(server.host()).bootstrap_node(true).build()),
//!         )
//!         .await;
//!
//!     let client = server.client().await.unwrap();
//!     assert!(client.cluster_info().is_some());
//!     client.close().await;
//! }
//! ```
//!
//! # Custom Mocking
//!
//! For advanced scenarios, access the underlying wiremock server directly:
//!
//! ```ignore
//! use couchbase_rest_core::BucketEndpoints;
//! use couchbase_rest_core::testing::MockClusterServer;
//! use wiremock::{Mock, matchers::{method, path}, ResponseTemplate};
//!
//! #[tokio::test]
//! async fn test_custom_scenario() {
//!     let server = MockClusterServer::start().await;
//!
//!     Mock::given(method("GET"))
//!         .and(path(BucketEndpoints::LIST))
//!         .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
//!         .mount(server.inner())
//!         .await;
//! }
//! ```

pub mod fixtures;
pub mod responses;
pub mod server;

pub use fixtures::{NodeFixture, NodeServicesFixture, PoolsFixture};
pub use server::MockClusterServer;

pub use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path, path_regex},
};
