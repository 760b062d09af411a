//! Cluster-aware REST client core
//!
//! A Rust library for talking to a Couchbase-style clustered REST API:
//! connection-string parsing and SRV resolution, a topology manager that
//! tracks the cluster's live node list, an alternate-addressing-aware
//! routing layer, and a client that bootstraps, refreshes topology in the
//! background, retries transient failures, and can stream large responses.
//!
//! # Quick Start
//!
//! Add to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! couchbase-rest-core = "0.1.0"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! # Environment Variables
//!
//! - `CB_REST_CC_MAX_AGE`: how long a cluster config is trusted before the
//!   background refresh task re-fetches it (humantime duration, default 15s)
//! - `CB_REST_CLIENT_NUM_RETRIES`: retry attempts after the first try
//!   (default 3)
//! - `CB_REST_CLIENT_TIMEOUT_SECS`: per-request HTTP timeout, either a bare
//!   integer number of seconds or a humantime duration (default 60s)
//! - `CB_REST_CLIENT_TRANSPORT_TIMEOUTS`: JSON object of sub-timeouts
//!   (connect, keep-alive, idle-conn, response-header) applied to the
//!   underlying `reqwest::ClientBuilder`
//! - `CB_REST_CLIENT_POLL_TIMEOUT`: how long `Client::wait_for_condition`
//!   polls before giving up, either a bare integer or a humantime duration
//!   (default 30s)
//!
//! # Module Organization
//!
//! - [`connection_string`]: parses `couchbase://host1,host2?params` strings
//!   and resolves a lone bare hostname via SRV lookup
//! - [`bucket_endpoints`]: URL templates for the bucket management endpoints
//! - [`cluster_config`]: the revision-gated topology snapshot and its waiters
//! - [`credentials`]: the pluggable credential-sourcing capability
//! - [`auth_provider`]: turns `(service, offset)` into a routable URL
//! - [`request`] / [`retry`]: request shape and the retry discipline
//! - [`client`]: bootstrap, background refresh, request execution, streaming
//! - [`types`]: the cluster topology data model
//! - [`error`]: the crate's error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use couchbase_rest_core::client::{Client, ClientOptionsBuilder};
//! use couchbase_rest_core::credentials::StaticCredentialProvider;
//! use couchbase_rest_core::request::Request;
//! use couchbase_rest_core::types::ServiceType;
//! use reqwest::Method;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClientOptionsBuilder::new("couchbase://node1.example.com")
//!     .provider(Arc::new(StaticCredentialProvider::new("admin", "password", "my-tool/1.0")))
//!     .build()?;
//!
//! let client = Client::new(options).await?;
//! let response = client
//!     .execute(Request::new(Method::GET, "/pools/default", ServiceType::Management))
//!     .await?;
//! println!("status: {}", response.status_code);
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod auth_provider;
pub mod bucket_endpoints;
pub mod client;
pub mod cluster_config;
pub mod connection_string;
pub mod credentials;
pub mod error;
pub mod request;
pub mod retry;
pub mod types;

#[cfg(feature = "test-support")]
pub mod testing;

pub use bucket_endpoints::BucketEndpoints;
pub use client::{Client, ClientOptions, ClientOptionsBuilder, ConnectionMode};
pub use cluster_config::ClusterConfigManager;
pub use connection_string::{ParsedConnectionString, ResolvedConnectionString};
pub use credentials::{CredentialProvider, Credentials, StaticCredentialProvider};
pub use error::{Error, Result};
pub use request::{Request, Response, StreamingResponse};
pub use types::{ClusterConfig, ClusterInfo, Node, ServiceType};
