//! Streaming responses: newline-delimited payloads, clean remote close.

use couchbase_rest_core::client::{Client, ClientOptionsBuilder};
use couchbase_rest_core::credentials::StaticCredentialProvider;
use couchbase_rest_core::request::Request;
use couchbase_rest_core::types::ServiceType;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn test_client(server: &MockServer) -> Client {
    let (host, port) = mock_server_addr(server);
    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "cluster-uuid", "isEnterprise": true})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pools/default/nodeServices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rev": 1,
            "nodesExt": [{
                "hostname": host,
                "thisNode": true,
                "services": {"mgmt": port, "mgmtSSL": 18091, "kv": 11210, "kvSSL": 11207}
            }]
        })))
        .mount(server)
        .await;

    let options = ClientOptionsBuilder::new(format!("http://{host}:{port}"))
        .provider(Arc::new(StaticCredentialProvider::new("admin", "password", "test/1.0")))
        .disable_ccp(true)
        .build()
        .unwrap();
    Client::new(options).await.unwrap()
}

/// S7: five newline-framed payloads followed by a clean close yield exactly
/// five `StreamingResponse`s and no trailing error.
#[tokio::test]
async fn stream_closes_cleanly_after_five_frames() {
    let server = MockServer::start().await;
    let client = test_client(&server).await;

    let body = "payload\n\n\n\n".repeat(5);
    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut rx = client
        .execute_stream(Request::new(Method::GET, "/stream", ServiceType::Management).expect_status(200))
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Some(item) = rx.recv().await {
        received.push(item.unwrap());
    }

    assert_eq!(received.len(), 5);
    for item in &received {
        assert_eq!(item.payload, b"payload");
    }
    client.close().await;
}

#[tokio::test]
async fn stream_rejects_explicit_timeout() {
    let server = MockServer::start().await;
    let client = test_client(&server).await;

    let req = Request::new(Method::GET, "/stream", ServiceType::Management)
        .with_timeout(std::time::Duration::from_secs(5));
    let err = client.execute_stream(req).await.unwrap_err();
    assert!(matches!(err, couchbase_rest_core::Error::StreamWithTimeout));
    client.close().await;
}

/// The mock server's bare host and real listening port, so a fixture can
/// advertise a `hostname`/service port pair the client can actually dial.
fn mock_server_addr(server: &MockServer) -> (String, u16) {
    let url = url::Url::parse(&server.uri()).unwrap();
    (url.host_str().unwrap().to_string(), url.port().unwrap_or(80))
}
