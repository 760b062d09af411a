//! Error types shared by every component of the cluster-aware REST client.

use crate::types::ServiceType;
use std::time::Duration;
use thiserror::Error;

/// Best-effort decoded authorization failure body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    pub missing: Vec<String>,
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    // --- connection string (component A) ---
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("invalid port in connection string: {0}")]
    BadPort(String),

    #[error("no addresses parsed from connection string")]
    NoAddressesParsed,

    #[error("no addresses resolved for connection string")]
    NoAddressesResolved,

    #[error("invalid network query parameter: {0}")]
    InvalidNetwork(String),

    // --- configuration ---
    #[error("invalid configuration: {0}")]
    Configuration(String),

    // --- cluster config manager (component B) ---
    #[error("rejected cluster config update: revision is not newer than the current one")]
    OldClusterConfig,

    #[error("exhausted all known cluster nodes while refreshing topology")]
    ExhaustedClusterNodes,

    // --- auth provider (component C) ---
    #[error("no node is running the {0:?} service")]
    ServiceNotAvailable(ServiceType),

    // --- bootstrap / request execution (component D) ---
    #[error("bootstrap failed against every candidate node")]
    BootstrapFailure {
        last_authentication: Option<Box<Error>>,
        last_authorization: Option<Box<Error>>,
    },

    #[error("authentication failed")]
    Authentication,

    #[error("authorization failed")]
    Authorization(Permissions),

    #[error("endpoint not found")]
    EndpointNotFound,

    #[error("internal server error: {0}")]
    InternalServer(String),

    #[error("unexpected status code {status}: {body}")]
    UnexpectedStatusCode { status: u16, body: String },

    #[error("socket closed in flight during {method} {endpoint}")]
    SocketClosedInFlight { method: String, endpoint: String },

    #[error("server presented an unknown certificate authority")]
    UnknownAuthority,

    #[error("server presented an invalid x509 certificate: {0}")]
    UnknownX509(String),

    #[error("expected {expected} bytes in body, got {got}")]
    UnexpectedEndOfBody { expected: u64, got: u64 },

    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        cause: Box<Error>,
        last_body: Option<Vec<u8>>,
    },

    #[error("retry loop aborted after {attempts} attempts")]
    RetriesAborted { attempts: u32, cause: Box<Error> },

    #[error("streaming requests may not set a positive timeout")]
    StreamWithTimeout,

    #[error("condition not met after polling for {elapsed:?}")]
    PollTimeout { elapsed: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to parse response body: {0}")]
    ParseError(String),

    #[error("failed to serialize request body: {0}")]
    SerializationError(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Transport(format!("timed out: {err}"))
        } else if err.is_connect() {
            Error::Transport(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Error::ParseError(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidConnectionString(err.to_string())
    }
}

impl Error {
    /// Whether this is a "resource not found" condition regardless of how it
    /// was represented on the wire.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::EndpointNotFound)
            || matches!(self, Error::UnexpectedStatusCode { status, .. } if *status == 404)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Authentication)
            || matches!(self, Error::UnexpectedStatusCode { status, .. } if *status == 401)
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::InternalServer(_))
            || matches!(self, Error::UnexpectedStatusCode { status, .. } if *status >= 500)
    }

    /// Retry-After sleeps are capped at this ceiling regardless of header value.
    pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);
}

pub type Result<T> = std::result::Result<T, Error>;
