//! Basic example of using the cluster-aware REST client
//!
//! Run with: cargo run --example basic_client

use couchbase_rest_core::client::{Client, ClientOptionsBuilder};
use couchbase_rest_core::credentials::StaticCredentialProvider;
use couchbase_rest_core::request::Request;
use couchbase_rest_core::types::ServiceType;
use reqwest::Method;
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let connection_string =
        env::var("CB_REST_CONNECTION_STRING").unwrap_or_else(|_| "couchbase://localhost".to_string());
    let username = env::var("CB_REST_USERNAME").unwrap_or_else(|_| "Administrator".to_string());
    let password = env::var("CB_REST_PASSWORD").expect("CB_REST_PASSWORD environment variable not set");

    let options = ClientOptionsBuilder::new(connection_string)
        .provider(Arc::new(StaticCredentialProvider::new(username, password, "couchbase-rest-core-demo/0.1")))
        .build()?;

    let client = Client::new(options).await?;

    println!("Fetching cluster information...");
    if let Some(info) = client.cluster_info() {
        println!("Cluster UUID: {}", info.uuid);
        println!("Enterprise: {}", info.enterprise);
    }
    println!();

    println!("Fetching pool summary...");
    let response = client
        .execute(Request::new(Method::GET, "/pools/default", ServiceType::Management).expect_status(200))
        .await?;
    println!("GET /pools/default -> {} ({} bytes)", response.status_code, response.body.len());

    client.close().await;
    Ok(())
}
