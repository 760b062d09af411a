//! Component D: the REST client itself. Bootstrap, periodic refresh,
//! request preparation, retry, and streaming all live here; everything else
//! in the crate exists to support this module.

use crate::auth_provider::AuthProvider;
use crate::cluster_config::ClusterConfigManager;
use crate::connection_string::ParsedConnectionString;
use crate::credentials::CredentialProvider;
use crate::error::{Error, Result};
use crate::request::{Request, Response, StreamingResponse};
use crate::retry::{self, max_retries};
use crate::types::{AlternateAddresses, AlternateHost, ClusterConfig, ClusterInfo, Node, PortPair, ServicePorts, ServiceType, format_ipv6_host};
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use std::error::Error as StdError;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CLIENT_TIMEOUT_ENV: &str = "CB_REST_CLIENT_TIMEOUT_SECS";
const TRANSPORT_TIMEOUTS_ENV: &str = "CB_REST_CLIENT_TRANSPORT_TIMEOUTS";
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_TIMEOUT_ENV: &str = "CB_REST_CLIENT_POLL_TIMEOUT";
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const NODE_SERVICES_PATH: &str = "/pools/default/nodeServices";
const POOLS_PATH: &str = "/pools";

/// `CB_REST_CLIENT_TRANSPORT_TIMEOUTS` payload: every field optional, in
/// seconds. Unset fields leave the corresponding `reqwest::ClientBuilder`
/// knob at its default. reqwest doesn't expose the TLS handshake or the
/// expect-continue wait as separate knobs from the connect phase, so
/// `tls_handshake_secs` widens `connect_timeout` to cover both and
/// `expect_continue_secs` has no builder hook to apply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransportTimeouts {
    connect_secs: Option<u64>,
    keep_alive_secs: Option<u64>,
    idle_conn_secs: Option<u64>,
    expect_continue_secs: Option<u64>,
    response_header_secs: Option<u64>,
    tls_handshake_secs: Option<u64>,
}

fn resolve_transport_timeouts() -> Result<TransportTimeouts> {
    match std::env::var(TRANSPORT_TIMEOUTS_ENV) {
        Ok(value) => serde_json::from_str(&value)
            .map_err(|e| Error::Configuration(format!("invalid {TRANSPORT_TIMEOUTS_ENV}: {e}"))),
        Err(_) => Ok(TransportTimeouts::default()),
    }
}

/// How the client should route requests and whether it should refresh
/// topology in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    #[default]
    Default,
    /// Forbids more than one address; skips the refresh task; routes
    /// everything to the bootstrap host.
    ThisNodeOnly,
    /// Forbids TLS and more than one address; skips the refresh task;
    /// routes everything to `127.0.0.1`/`[::1]`.
    Loopback,
}

/// Construction-time options for `Client::new`. Environment overrides are
/// read exactly once, inside `build()`/`new()`, and baked into the returned
/// `Client` — nothing in the client re-reads the environment afterward.
#[derive(Clone)]
pub struct ClientOptions {
    pub connection_string: String,
    pub provider: Arc<dyn CredentialProvider>,
    pub danger_accept_invalid_certs: bool,
    pub disable_ccp: bool,
    pub connection_mode: ConnectionMode,
    pub req_res_log_level: tracing::Level,
}

pub struct ClientOptionsBuilder {
    connection_string: String,
    provider: Option<Arc<dyn CredentialProvider>>,
    danger_accept_invalid_certs: bool,
    disable_ccp: bool,
    connection_mode: ConnectionMode,
    req_res_log_level: tracing::Level,
}

impl ClientOptionsBuilder {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            provider: None,
            danger_accept_invalid_certs: false,
            disable_ccp: false,
            connection_mode: ConnectionMode::Default,
            req_res_log_level: tracing::Level::DEBUG,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn danger_accept_invalid_certs(mut self, value: bool) -> Self {
        self.danger_accept_invalid_certs = value;
        self
    }

    pub fn disable_ccp(mut self, value: bool) -> Self {
        self.disable_ccp = value;
        self
    }

    pub fn connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.connection_mode = mode;
        self
    }

    pub fn req_res_log_level(mut self, level: tracing::Level) -> Self {
        self.req_res_log_level = level;
        self
    }

    pub fn build(self) -> Result<ClientOptions> {
        let provider = self
            .provider
            .ok_or_else(|| Error::Configuration("a credential provider is required".to_string()))?;
        Ok(ClientOptions {
            connection_string: self.connection_string,
            provider,
            danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            disable_ccp: self.disable_ccp,
            connection_mode: self.connection_mode,
            req_res_log_level: self.req_res_log_level,
        })
    }
}

/// The cluster-aware REST client. Cheap to `Clone`: the transport, topology
/// manager, and auth provider are all `Arc`-backed.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    timeout: Duration,
    danger_accept_invalid_certs: bool,
    transport_timeouts: TransportTimeouts,
    poll_timeout: Duration,
    auth_provider: Arc<AuthProvider>,
    credentials: Arc<dyn CredentialProvider>,
    connection_mode: ConnectionMode,
    disable_ccp: bool,
    req_res_log_level: tracing::Level,
    cluster_info: Arc<std::sync::RwLock<Option<ClusterInfo>>>,
    refresh: Arc<StdMutex<Option<RefreshHandle>>>,
}

struct RefreshHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl Client {
    /// Parses and resolves the connection string, bootstraps against the
    /// candidate hosts, fetches cluster identity, and — unless suppressed —
    /// starts the background refresh task.
    pub async fn new(options: ClientOptions) -> Result<Self> {
        let parsed = ParsedConnectionString::parse(&options.connection_string)?;
        validate_connection_mode(options.connection_mode, &parsed)?;

        let resolved = parsed.resolve().await?;
        let manager = Arc::new(ClusterConfigManager::new()?);
        let auth_provider = Arc::new(AuthProvider::new(resolved, manager)?);
        let timeout = resolve_client_timeout()?;
        let transport_timeouts = resolve_transport_timeouts()?;
        let poll_timeout = resolve_poll_timeout()?;
        let http = build_http_client(timeout, options.danger_accept_invalid_certs, &transport_timeouts)?;

        let client = Client {
            http,
            timeout,
            danger_accept_invalid_certs: options.danger_accept_invalid_certs,
            transport_timeouts,
            poll_timeout,
            auth_provider,
            credentials: options.provider,
            connection_mode: options.connection_mode,
            disable_ccp: options.disable_ccp,
            req_res_log_level: options.req_res_log_level,
            cluster_info: Arc::new(std::sync::RwLock::new(None)),
            refresh: Arc::new(StdMutex::new(None)),
        };

        client.bootstrap().await?;
        client.fetch_cluster_info().await?;

        if !client.disable_ccp && !matches!(client.connection_mode, ConnectionMode::ThisNodeOnly | ConnectionMode::Loopback)
        {
            client.spawn_refresh_task();
        }

        Ok(client)
    }

    // ---- 4.D.1 bootstrap ----

    async fn bootstrap(&self) -> Result<()> {
        let mut last_authentication = None;
        let mut last_authorization = None;

        for url in self.auth_provider.bootstrap_host_iter() {
            match self.fetch_and_install_node_services(&url, true).await {
                Ok(()) => return Ok(()),
                Err(Error::Authentication) => last_authentication = Some(Box::new(Error::Authentication)),
                Err(err @ Error::Authorization(_)) => last_authorization = Some(Box::new(err)),
                Err(err @ (Error::UnknownAuthority | Error::UnknownX509(_))) => return Err(err),
                Err(err) => {
                    debug!(%url, error = %err, "bootstrap candidate failed, trying next");
                }
            }
        }

        Err(Error::BootstrapFailure { last_authentication, last_authorization })
    }

    async fn fetch_cluster_info(&self) -> Result<()> {
        let url = self.auth_provider.get_service_host(ServiceType::Management, 0)?;
        let info = self.fetch_pools(&url).await?;
        *self.cluster_info.write().expect("cluster info lock poisoned") = Some(info);
        Ok(())
    }

    async fn fetch_pools(&self, base: &Url) -> Result<ClusterInfo> {
        let url = base.join(POOLS_PATH)?;
        let response = self.send_basic_auth_get(&url).await?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(Error::from)?;
        if status != StatusCode::OK {
            return Err(retry::status_to_error(status.as_u16(), bytes.to_vec()));
        }
        parse_pools_body(&bytes)
    }

    /// Fetches and installs the node-services payload from `url`.
    /// `fetched_from_bootstrap_host` records the host actually dialed, used
    /// both as the "host this config was fetched from" for alt-addr
    /// heuristics and to fill in blank `hostname` fields in the payload.
    async fn fetch_and_install_node_services(&self, url: &Url, _is_bootstrap: bool) -> Result<()> {
        let endpoint = url.join(NODE_SERVICES_PATH)?;
        let response = self.send_basic_auth_get(&endpoint).await?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(Error::from)?;

        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(Error::Authentication),
            StatusCode::FORBIDDEN => return Err(Error::Authorization(Default::default())),
            other => return Err(retry::status_to_error(other.as_u16(), bytes.to_vec())),
        }

        let fetched_from_host = url.host_str().unwrap_or_default().to_string();
        let config = parse_node_services_body(&bytes, &fetched_from_host)?;
        self.auth_provider.set_cluster_config(&fetched_from_host, config)?;
        Ok(())
    }

    async fn send_basic_auth_get(&self, url: &Url) -> Result<reqwest::Response> {
        let creds = self.credentials.credentials().await?;
        self.http
            .get(url.clone())
            .basic_auth(&creds.username, Some(&creds.password))
            .header(reqwest::header::USER_AGENT, self.credentials.user_agent())
            .send()
            .await
            .map_err(|err| classify_transport_error(err, &reqwest::Method::GET, url.path()))
    }

    // ---- 4.D.2 periodic refresh ----

    fn spawn_refresh_task(&self) {
        let cancel = CancellationToken::new();
        let client = self.clone();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = client.auth_provider.manager().wait_until_expired(&task_cancel) => {}
                    _ = task_cancel.cancelled() => return,
                }
                if task_cancel.is_cancelled() {
                    return;
                }
                if let Err(err) = client.update_cc().await {
                    warn!(error = %err, "cluster config refresh failed, will retry after max age");
                }
            }
        });
        *self.refresh.lock().expect("refresh handle lock poisoned") = Some(RefreshHandle { cancel, join });
    }

    /// Walks the known nodes bootstrap-first, verifying cluster identity via
    /// `/pools` before trusting a node-services payload from it.
    async fn update_cc(&self) -> Result<()> {
        let Some(config) = self.auth_provider.manager().get_cluster_config() else {
            return Err(Error::ExhaustedClusterNodes);
        };
        let expected_uuid = self.cluster_info.read().expect("cluster info lock poisoned").clone().map(|i| i.uuid);

        let use_ssl = self.auth_provider.use_ssl();
        let scheme = if use_ssl { "https" } else { "http" };
        for node in config.nodes_running(ServiceType::Management, false).into_iter().chain(config.nodes_running(ServiceType::Management, true)) {
            let Some((hostname, ports)) = node.host_for(ServiceType::Management, node.alternate_addresses.external.is_some()).or_else(|| node.host_for(ServiceType::Management, false)) else {
                continue;
            };
            let port = ports.port(use_ssl);
            let Ok(base) = Url::parse(&format!("{scheme}://{hostname}:{port}")) else { continue };

            match self.fetch_pools(&base).await {
                Ok(info) => {
                    if let Some(expected) = &expected_uuid {
                        if &info.uuid != expected {
                            debug!(hostname, "node belongs to a different cluster, skipping");
                            continue;
                        }
                    }
                }
                Err(Error::UnknownAuthority | Error::UnknownX509(_)) => {
                    debug!(hostname, "TLS identity changed during refresh, trying next node");
                    continue;
                }
                Err(err) => {
                    debug!(hostname, error = %err, "failed to verify node during refresh");
                    continue;
                }
            }

            match self.fetch_and_install_node_services(&base, false).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(hostname, error = %err, "failed to refresh node services, trying next node");
                    continue;
                }
            }
        }

        Err(Error::ExhaustedClusterNodes)
    }

    /// Piggybacks on the refresh task when it is running so concurrent
    /// failed requests coalesce on a single wait; otherwise refreshes
    /// directly. No-op in single-node routing modes.
    async fn wait_until_updated(&self) {
        if matches!(self.connection_mode, ConnectionMode::ThisNodeOnly | ConnectionMode::Loopback) {
            return;
        }

        let running = self.refresh.lock().expect("refresh handle lock poisoned").is_some();
        if running {
            let cancel = CancellationToken::new();
            self.auth_provider.manager().wait_until_updated(&cancel).await;
        } else if let Err(err) = self.update_cc().await {
            warn!(error = %err, "on-demand cluster config refresh failed");
        }
    }

    // ---- 4.D.3 request execution ----

    pub async fn execute(&self, req: Request) -> Result<Response> {
        self.execute_with_cancel(&CancellationToken::new(), req).await
    }

    pub async fn execute_with_cancel(&self, cancel: &CancellationToken, req: Request) -> Result<Response> {
        let max_attempts = max_retries() + 1;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let url = self.build_url(&req, attempt)?;

            if self.req_res_log_level <= tracing::Level::DEBUG {
                trace!(method = %req.method, %url, attempt, "dispatching request");
            }

            let dispatch = match self.dispatch(&req, &url).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    match response.bytes().await {
                        Ok(bytes) => Ok((status, retry_after, bytes)),
                        // A body-read failure after headers were already received is
                        // still a mid-response transport fault; classify it the same
                        // way a dispatch-time failure would be.
                        Err(err) => Err(classify_transport_error(err, &req.method, &req.endpoint)),
                    }
                }
                Err(err) => Err(err),
            };

            match dispatch {
                Ok((status, retry_after, bytes)) => {
                    if status == req.expected_status_code {
                        return Ok(Response { status_code: status, body: bytes.to_vec() });
                    }

                    if retry::status_implies_stale_config(status) {
                        self.wait_until_updated().await;
                    }

                    if attempt < max_attempts && retry::should_retry_status(&req, status) {
                        if let Some(delay) =
                            retry::parse_retry_after(status, retry_after.as_deref())
                        {
                            if !sleep_or_cancelled(delay, cancel).await {
                                return Err(Error::RetriesAborted {
                                    attempts: attempt,
                                    cause: Box::new(retry::status_to_error(status, bytes.to_vec())),
                                });
                            }
                        }
                        continue;
                    }

                    if attempt >= max_attempts && retry::should_retry_status(&req, status) {
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            cause: Box::new(retry::status_to_error(status, bytes.to_vec())),
                            last_body: Some(bytes.to_vec()),
                        });
                    }

                    return Err(retry::status_to_error(status, bytes.to_vec()));
                }
                Err(err) => {
                    let retryable = is_retryable_error(&err);
                    if matches!(err, Error::SocketClosedInFlight { .. }) {
                        // A connection killed mid-response often means the node
                        // went away; nudge topology refresh the same way a 401 does.
                        self.wait_until_updated().await;
                    }
                    if !retryable || attempt >= max_attempts {
                        return if retryable {
                            Err(Error::RetriesExhausted { attempts: attempt, cause: Box::new(err), last_body: None })
                        } else {
                            Err(err)
                        };
                    }
                    if cancel.is_cancelled() {
                        return Err(Error::RetriesAborted { attempts: attempt, cause: Box::new(err) });
                    }
                }
            }
        }
    }

    fn build_url(&self, req: &Request, attempt: u32) -> Result<Url> {
        let mut url = match &req.host {
            Some(host) => Url::parse(host)?,
            None => self.auth_provider.get_service_host(req.service, (attempt - 1) as usize)?,
        };

        if self.connection_mode == ConnectionMode::Loopback {
            let loopback_host = if url.host_str().is_some_and(|h| h.contains(':')) { "[::1]" } else { "127.0.0.1" };
            let _ = url.set_host(Some(loopback_host.trim_start_matches('[').trim_end_matches(']')));
        }

        url.set_path(&req.endpoint);
        for (k, v) in &req.query_parameters {
            url.query_pairs_mut().append_pair(k, v);
        }
        Ok(url)
    }

    async fn dispatch(&self, req: &Request, url: &Url) -> Result<reqwest::Response> {
        let creds = self.credentials.credentials().await?;

        let mut builder = self
            .http
            .request(req.method.clone(), url.clone())
            .basic_auth(&creds.username, Some(&creds.password))
            .header(reqwest::header::USER_AGENT, self.credentials.user_agent());

        for (k, v) in &req.headers {
            builder = builder.header(k, v);
        }
        if let Some(content_type) = &req.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }

        let needs_override = req.timeout.is_none_or(|t| t > self.timeout);
        let response = if needs_override {
            let per_call = build_http_client(
                req.timeout.unwrap_or(Duration::MAX),
                self.danger_accept_invalid_certs,
                &self.transport_timeouts,
            )?;
            per_call.execute(builder.build().map_err(Error::from)?).await
        } else {
            builder.send().await
        };

        response.map_err(|err| classify_transport_error(err, &req.method, &req.endpoint))
    }

    // ---- 4.D.4 streaming ----

    pub async fn execute_stream(&self, req: Request) -> Result<mpsc::Receiver<Result<StreamingResponse>>> {
        if req.timeout.is_some() {
            return Err(Error::StreamWithTimeout);
        }

        let url = self.build_url(&req, 1)?;
        let response = self.dispatch(&req, &url).await?;
        let status = response.status().as_u16();
        if status != req.expected_status_code {
            let bytes = response.bytes().await.unwrap_or_default();
            return Err(retry::status_to_error(status, bytes.to_vec()));
        }

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(stream_body(response, tx));
        Ok(rx)
    }

    // ---- 4.D.6 close ----

    /// Idempotent: cancels and awaits the refresh task if one is running.
    pub async fn close(&self) {
        let handle = self.refresh.lock().expect("refresh handle lock poisoned").take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            let _ = handle.join.await;
        }
    }

    pub fn cluster_info(&self) -> Option<ClusterInfo> {
        self.cluster_info.read().expect("cluster info lock poisoned").clone()
    }

    /// Direct access to the routing layer, for callers that need a host
    /// without going through `execute` (e.g. building a URL for a streaming
    /// client the core doesn't itself model).
    pub fn auth_provider(&self) -> &Arc<AuthProvider> {
        &self.auth_provider
    }

    /// Repeats `req` (cloning it for each attempt) until `condition` accepts
    /// the response, sleeping `CB_REST_CLIENT_POLL_TIMEOUT` between tries.
    /// Callers poll state that changes asynchronously on the cluster side
    /// (e.g. a rebalance or an index build) without hand-rolling a loop.
    pub async fn wait_for_condition(
        &self,
        req: Request,
        mut condition: impl FnMut(&Response) -> bool,
    ) -> Result<Response> {
        let start = std::time::Instant::now();
        loop {
            let response = self.execute(req.clone()).await?;
            if condition(&response) {
                return Ok(response);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.poll_timeout {
                return Err(Error::PollTimeout { elapsed });
            }
            tokio::time::sleep(POLL_INTERVAL.min(self.poll_timeout - elapsed)).await;
        }
    }
}

async fn stream_body(response: reqwest::Response, tx: mpsc::Sender<Result<StreamingResponse>>) {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        match body.next().await {
            Some(Ok(chunk)) => {
                buffer.extend_from_slice(&chunk);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let trimmed = line.strip_suffix(b"\n").unwrap_or(&line);
                    if trimmed.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    if tx.send(Ok(StreamingResponse { payload: trimmed.to_vec() })).await.is_err() {
                        return;
                    }
                }
            }
            Some(Err(err)) => {
                if is_clean_remote_close(&err) {
                    return;
                }
                let _ = tx.send(Err(Error::from(err))).await;
                return;
            }
            None => return,
        }
    }
}

fn is_clean_remote_close(err: &reqwest::Error) -> bool {
    err.source()
        .map(|e| {
            let text = e.to_string().to_lowercase();
            text.contains("unexpected eof") || text.contains("connection reset") || text.contains("eof")
        })
        .unwrap_or(false)
}

fn is_retryable_error(err: &Error) -> bool {
    matches!(err, Error::Transport(_) | Error::SocketClosedInFlight { .. })
}

fn sleep_or_cancelled(delay: Duration, cancel: &CancellationToken) -> impl std::future::Future<Output = bool> + '_ {
    async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

fn validate_connection_mode(mode: ConnectionMode, parsed: &ParsedConnectionString) -> Result<()> {
    match mode {
        ConnectionMode::ThisNodeOnly if parsed.addresses.len() != 1 => {
            Err(Error::Configuration("ThisNodeOnly requires exactly one address".to_string()))
        }
        ConnectionMode::Loopback if parsed.addresses.len() != 1 => {
            Err(Error::Configuration("Loopback requires exactly one address".to_string()))
        }
        ConnectionMode::Loopback if parsed.use_ssl => {
            Err(Error::Configuration("Loopback is incompatible with TLS".to_string()))
        }
        _ => Ok(()),
    }
}

fn resolve_client_timeout() -> Result<Duration> {
    match std::env::var(CLIENT_TIMEOUT_ENV) {
        Ok(value) => {
            if let Ok(seconds) = value.parse::<u64>() {
                Ok(Duration::from_secs(seconds))
            } else {
                humantime::parse_duration(&value)
                    .map_err(|e| Error::Configuration(format!("invalid {CLIENT_TIMEOUT_ENV}: {e}")))
            }
        }
        Err(_) => Ok(DEFAULT_TIMEOUT),
    }
}

fn resolve_poll_timeout() -> Result<Duration> {
    match std::env::var(POLL_TIMEOUT_ENV) {
        Ok(value) => {
            if let Ok(seconds) = value.parse::<u64>() {
                Ok(Duration::from_secs(seconds))
            } else {
                humantime::parse_duration(&value)
                    .map_err(|e| Error::Configuration(format!("invalid {POLL_TIMEOUT_ENV}: {e}")))
            }
        }
        Err(_) => Ok(DEFAULT_POLL_TIMEOUT),
    }
}

fn build_http_client(
    timeout: Duration,
    danger_accept_invalid_certs: bool,
    transport_timeouts: &TransportTimeouts,
) -> Result<reqwest::Client> {
    let mut builder =
        reqwest::Client::builder().timeout(timeout).danger_accept_invalid_certs(danger_accept_invalid_certs);

    let connect_secs = match (transport_timeouts.connect_secs, transport_timeouts.tls_handshake_secs) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0).max(b.unwrap_or(0))),
    };
    if let Some(secs) = connect_secs {
        builder = builder.connect_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = transport_timeouts.keep_alive_secs {
        builder = builder.tcp_keepalive(Duration::from_secs(secs));
    }
    if let Some(secs) = transport_timeouts.idle_conn_secs {
        builder = builder.pool_idle_timeout(Duration::from_secs(secs));
    }
    // Closest available approximation of a response-header deadline: a
    // per-read timeout rather than a true time-to-first-byte limit.
    if let Some(secs) = transport_timeouts.response_header_secs {
        builder = builder.read_timeout(Duration::from_secs(secs));
    }

    builder.build().map_err(Error::from)
}

fn classify_transport_error(err: reqwest::Error, method: &reqwest::Method, endpoint: &str) -> Error {
    let chain = err.source().map(|e| e.to_string().to_lowercase()).unwrap_or_default();
    if chain.contains("unknownissuer") || chain.contains("unknown authority") || chain.contains("certificateverify") {
        return Error::UnknownAuthority;
    }
    if chain.contains("certificate") {
        return Error::UnknownX509(chain);
    }
    if err
        .source()
        .and_then(|e| e.downcast_ref::<std::io::Error>())
        .is_some_and(retry::is_socket_closed_in_flight)
    {
        return Error::SocketClosedInFlight { method: method.to_string(), endpoint: endpoint.to_string() };
    }
    if retry::is_retryable_transport_error(&err) {
        return Error::Transport(err.to_string());
    }
    Error::from(err)
}

// ---- wire format decoding ----

#[derive(Deserialize)]
struct PoolsBody {
    uuid: serde_json::Value,
    #[serde(rename = "isEnterprise", default)]
    is_enterprise: bool,
    #[serde(rename = "isDeveloperPreview", default)]
    is_developer_preview: bool,
}

fn parse_pools_body(bytes: &[u8]) -> Result<ClusterInfo> {
    let body: PoolsBody = serde_json::from_slice(bytes)?;
    let uuid = match body.uuid {
        serde_json::Value::String(s) => s,
        serde_json::Value::Array(a) if a.is_empty() => String::new(),
        other => other.to_string(),
    };
    Ok(ClusterInfo { uuid, enterprise: body.is_enterprise, developer_preview: body.is_developer_preview })
}

#[derive(Deserialize)]
struct NodeServicesBody {
    #[serde(default)]
    rev: i64,
    #[serde(rename = "nodesExt")]
    nodes_ext: Vec<NodeExtWire>,
}

#[derive(Deserialize)]
struct NodeExtWire {
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    services: ServicesWire,
    #[serde(rename = "alternateAddresses", default)]
    alternate_addresses: Option<AlternateAddressesWire>,
    #[serde(rename = "thisNode", default)]
    this_node: bool,
}

#[derive(Deserialize, Default, Clone, Copy)]
struct ServicesWire {
    #[serde(default)]
    mgmt: u16,
    #[serde(default, rename = "mgmtSSL")]
    mgmt_ssl: u16,
    #[serde(default)]
    kv: u16,
    #[serde(default, rename = "kvSSL")]
    kv_ssl: u16,
    #[serde(default)]
    n1ql: u16,
    #[serde(default, rename = "n1qlSSL")]
    n1ql_ssl: u16,
    #[serde(default)]
    fts: u16,
    #[serde(default, rename = "ftsSSL")]
    fts_ssl: u16,
    #[serde(default)]
    cbas: u16,
    #[serde(default, rename = "cbasSSL")]
    cbas_ssl: u16,
    #[serde(default)]
    capi: u16,
    #[serde(default, rename = "capiSSL")]
    capi_ssl: u16,
    #[serde(default, rename = "eventingAdminPort")]
    eventing: u16,
    #[serde(default, rename = "eventingSSL")]
    eventing_ssl: u16,
    #[serde(default, rename = "indexHttp")]
    gsi: u16,
    #[serde(default, rename = "indexHttpsHTTP")]
    gsi_ssl: u16,
    #[serde(default, rename = "backupAPI")]
    backup: u16,
    #[serde(default, rename = "backupAPIHTTPS")]
    backup_ssl: u16,
}

impl From<ServicesWire> for ServicePorts {
    fn from(w: ServicesWire) -> Self {
        ServicePorts {
            management: PortPair { plain: w.mgmt, tls: w.mgmt_ssl },
            kv: PortPair { plain: w.kv, tls: w.kv_ssl },
            query: PortPair { plain: w.n1ql, tls: w.n1ql_ssl },
            search: PortPair { plain: w.fts, tls: w.fts_ssl },
            analytics: PortPair { plain: w.cbas, tls: w.cbas_ssl },
            gsi: PortPair { plain: w.gsi, tls: w.gsi_ssl },
            eventing: PortPair { plain: w.eventing, tls: w.eventing_ssl },
            views: PortPair { plain: w.capi, tls: w.capi_ssl },
            backup: PortPair { plain: w.backup, tls: w.backup_ssl },
        }
    }
}

#[derive(Deserialize, Default)]
struct AlternateAddressesWire {
    external: Option<AlternateHostWire>,
}

#[derive(Deserialize, Default)]
struct AlternateHostWire {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    ports: Option<ServicesWire>,
}

fn parse_node_services_body(bytes: &[u8], fetched_from_host: &str) -> Result<ClusterConfig> {
    let deserializer = &mut serde_json::Deserializer::from_slice(bytes);
    let body: NodeServicesBody = serde_path_to_error::deserialize(deserializer)
        .map_err(|e| Error::ParseError(format!("field '{}': {}", e.path(), e.inner())))?;

    let mut nodes = Vec::with_capacity(body.nodes_ext.len());
    for raw in body.nodes_ext {
        let hostname = if raw.hostname.is_empty() {
            fetched_from_host.to_string()
        } else {
            format_ipv6_host(&raw.hostname)
        };

        let alternate_addresses = raw
            .alternate_addresses
            .and_then(|a| a.external)
            .map(|ext| AlternateHost {
                hostname: format_ipv6_host(&ext.hostname.unwrap_or_default()),
                services: ext.ports.unwrap_or_default().into(),
            })
            .map_or(AlternateAddresses::default(), |host| AlternateAddresses { external: Some(host) });

        nodes.push(Node {
            hostname,
            services: raw.services.into(),
            alternate_addresses,
            bootstrap_node: raw.this_node,
        });
    }

    Ok(ClusterConfig { revision: body.rev, nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_services_body_and_fills_blank_hostname() {
        let body = serde_json::json!({
            "rev": 42,
            "nodesExt": [
                {
                    "hostname": "",
                    "services": {"mgmt": 8091, "mgmtSSL": 18091, "kv": 11210, "kvSSL": 11207},
                    "thisNode": true
                },
                {
                    "hostname": "node2",
                    "services": {"mgmt": 8091, "mgmtSSL": 18091}
                }
            ]
        });
        let config = parse_node_services_body(body.to_string().as_bytes(), "bootstrap-host").unwrap();
        assert_eq!(config.revision, 42);
        assert_eq!(config.nodes[0].hostname, "bootstrap-host");
        assert!(config.nodes[0].bootstrap_node);
        assert_eq!(config.nodes[1].hostname, "node2");
        assert!(!config.nodes[1].bootstrap_node);
    }

    #[test]
    fn parses_pools_body_with_array_uuid_as_uninitialized() {
        let body = serde_json::json!({"uuid": [], "isEnterprise": true});
        let info = parse_pools_body(body.to_string().as_bytes()).unwrap();
        assert_eq!(info.uuid, "");
        assert!(info.enterprise);
    }

    #[test]
    fn parses_pools_body_with_string_uuid() {
        let body = serde_json::json!({"uuid": "abc-123", "isEnterprise": false, "isDeveloperPreview": true});
        let info = parse_pools_body(body.to_string().as_bytes()).unwrap();
        assert_eq!(info.uuid, "abc-123");
        assert!(info.developer_preview);
    }

    #[test]
    fn validate_connection_mode_rejects_multi_address_this_node_only() {
        let parsed = ParsedConnectionString::parse("http://a,b").unwrap();
        assert!(validate_connection_mode(ConnectionMode::ThisNodeOnly, &parsed).is_err());
    }

    #[test]
    fn validate_connection_mode_rejects_loopback_with_tls() {
        let parsed = ParsedConnectionString::parse("https://a").unwrap();
        assert!(validate_connection_mode(ConnectionMode::Loopback, &parsed).is_err());
    }

    #[test]
    fn validate_connection_mode_allows_default_with_many_addresses() {
        let parsed = ParsedConnectionString::parse("http://a,b,c").unwrap();
        assert!(validate_connection_mode(ConnectionMode::Default, &parsed).is_ok());
    }

    #[test]
    fn transport_timeouts_default_to_all_none() {
        let timeouts = TransportTimeouts::default();
        assert!(timeouts.connect_secs.is_none());
        assert!(timeouts.keep_alive_secs.is_none());
    }

    #[test]
    fn transport_timeouts_parse_from_json() {
        let json = r#"{"connectSecs": 5, "keepAliveSecs": 30, "idleConnSecs": 90}"#;
        let timeouts: TransportTimeouts = serde_json::from_str(json).unwrap();
        assert_eq!(timeouts.connect_secs, Some(5));
        assert_eq!(timeouts.keep_alive_secs, Some(30));
        assert_eq!(timeouts.idle_conn_secs, Some(90));
        assert!(timeouts.response_header_secs.is_none());
    }

    // Mutates process-wide env state; must not interleave with another test
    // reading the same variable.
    #[test]
    #[serial_test::serial]
    fn resolve_transport_timeouts_reads_env_override() {
        unsafe { std::env::set_var(TRANSPORT_TIMEOUTS_ENV, r#"{"connectSecs": 3}"#) };
        let timeouts = resolve_transport_timeouts().unwrap();
        assert_eq!(timeouts.connect_secs, Some(3));
        unsafe { std::env::remove_var(TRANSPORT_TIMEOUTS_ENV) };
    }

    #[test]
    #[serial_test::serial]
    fn resolve_transport_timeouts_rejects_invalid_json() {
        unsafe { std::env::set_var(TRANSPORT_TIMEOUTS_ENV, "not json") };
        assert!(resolve_transport_timeouts().is_err());
        unsafe { std::env::remove_var(TRANSPORT_TIMEOUTS_ENV) };
    }

    #[test]
    #[serial_test::serial]
    fn resolve_poll_timeout_defaults_when_unset() {
        unsafe { std::env::remove_var(POLL_TIMEOUT_ENV) };
        assert_eq!(resolve_poll_timeout().unwrap(), DEFAULT_POLL_TIMEOUT);
    }

    #[test]
    #[serial_test::serial]
    fn resolve_poll_timeout_reads_bare_seconds() {
        unsafe { std::env::set_var(POLL_TIMEOUT_ENV, "90") };
        assert_eq!(resolve_poll_timeout().unwrap(), Duration::from_secs(90));
        unsafe { std::env::remove_var(POLL_TIMEOUT_ENV) };
    }

    #[test]
    #[serial_test::serial]
    fn resolve_poll_timeout_reads_humantime_duration() {
        unsafe { std::env::set_var(POLL_TIMEOUT_ENV, "2m") };
        assert_eq!(resolve_poll_timeout().unwrap(), Duration::from_secs(120));
        unsafe { std::env::remove_var(POLL_TIMEOUT_ENV) };
    }

    #[test]
    #[serial_test::serial]
    fn resolve_poll_timeout_rejects_garbage() {
        unsafe { std::env::set_var(POLL_TIMEOUT_ENV, "not-a-duration") };
        assert!(resolve_poll_timeout().is_err());
        unsafe { std::env::remove_var(POLL_TIMEOUT_ENV) };
    }
}
