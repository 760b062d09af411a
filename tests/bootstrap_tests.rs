//! Bootstrap and single-request execution against a single-node cluster.

use couchbase_rest_core::client::{Client, ClientOptionsBuilder};
use couchbase_rest_core::credentials::StaticCredentialProvider;
use couchbase_rest_core::request::Request;
use couchbase_rest_core::types::ServiceType;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn node_services_body(host: &str, port: u16, rev: i64) -> serde_json::Value {
    json!({
        "rev": rev,
        "nodesExt": [
            {
                "hostname": host,
                "thisNode": true,
                "services": {"mgmt": port, "mgmtSSL": 18091, "kv": 11210, "kvSSL": 11207}
            }
        ]
    })
}

async fn mount_single_node(server: &MockServer, host: &str, port: u16) {
    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": "cluster-uuid",
            "isEnterprise": true
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pools/default/nodeServices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(node_services_body(host, port, 1)))
        .mount(server)
        .await;
}

async fn test_client(server: &MockServer) -> Client {
    let (host, port) = mock_server_addr(server);
    let options = ClientOptionsBuilder::new(format!("http://{host}:{port}"))
        .provider(Arc::new(StaticCredentialProvider::new("admin", "password", "test/1.0")))
        .disable_ccp(true)
        .build()
        .unwrap();
    Client::new(options).await.unwrap()
}

/// S1: first request against a freshly bootstrapped single node succeeds in
/// exactly one attempt.
#[tokio::test]
async fn single_node_bootstrap_and_request() {
    let server = MockServer::start().await;
    let (host, port) = mock_server_addr(&server);
    mount_single_node(&server, &host, port).await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body"))
        .mount(&server)
        .await;

    let client = test_client(&server).await;
    let response = client
        .execute(Request::new(Method::GET, "/test", ServiceType::Management).expect_status(200))
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, b"body");
    assert_eq!(client.cluster_info().unwrap().uuid, "cluster-uuid");
    client.close().await;
}

#[tokio::test]
async fn bootstrap_fails_on_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pools/default/nodeServices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (host, port) = mock_server_addr(&server);
    let options = ClientOptionsBuilder::new(format!("http://{host}:{port}"))
        .provider(Arc::new(StaticCredentialProvider::new("admin", "wrong", "test/1.0")))
        .disable_ccp(true)
        .build()
        .unwrap();

    let err = Client::new(options).await.unwrap_err();
    assert!(matches!(err, couchbase_rest_core::Error::BootstrapFailure { .. }));
}

/// The mock server's bare host and real listening port, so a fixture can
/// advertise a `hostname`/service port pair the client can actually dial.
fn mock_server_addr(server: &MockServer) -> (String, u16) {
    let url = url::Url::parse(&server.uri()).unwrap();
    (url.host_str().unwrap().to_string(), url.port().unwrap_or(80))
}
