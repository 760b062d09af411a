//! Request/response value types shared by `execute` and `execute_stream`.

use crate::types::ServiceType;
use reqwest::Method;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A service call the client should route and retry per policy.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    pub service: ServiceType,
    /// Overrides routing entirely when set; used verbatim.
    pub host: Option<String>,
    pub headers: HashMap<String, String>,
    pub query_parameters: HashMap<String, String>,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
    pub expected_status_code: u16,
    pub retry_on_status_codes: HashSet<u16>,
    pub no_retry_on_status_codes: HashSet<u16>,
    /// `None` means disabled: never apply a per-request timeout narrower
    /// than the shared client's.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, endpoint: impl Into<String>, service: ServiceType) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            service,
            host: None,
            headers: HashMap::new(),
            query_parameters: HashMap::new(),
            content_type: None,
            body: None,
            expected_status_code: 200,
            retry_on_status_codes: HashSet::new(),
            no_retry_on_status_codes: HashSet::new(),
            timeout: None,
        }
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status_code = status;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = Some(body);
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// GET/HEAD/PUT/DELETE/OPTIONS/TRACE are idempotent; POST/PATCH are not.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
        )
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status_code: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct StreamingResponse {
    pub payload: Vec<u8>,
}
