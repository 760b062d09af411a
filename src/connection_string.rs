//! Component A: connection-string parsing and resolution.
//!
//! `<scheme>://host1[:port],host2[:port],...[?k=v&...]` is not representable
//! by `url::Url` directly (comma-separated authorities aren't valid generic
//! syntax), so the host list and query string are split out manually and
//! each host/value is handed to `url`'s percent-decoding and `Host` parsing
//! where that buys us correctness for free.

use crate::error::{Error, Result};
use hickory_resolver::Resolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use url::form_urlencoded;

const DEFAULT_MGMT_PORT: u16 = 8091;
const DEFAULT_MGMT_TLS_PORT: u16 = 18091;

/// A single `host[:port]` token from the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    /// `None` when the connection string did not specify a port for this host.
    pub port: Option<u16>,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(p) => write!(f, "{}:{p}", self.host),
            None => write!(f, "{}", self.host),
        }
    }
}

/// How `network=` in the query string should be interpreted; validated at
/// parse time so later components never see an invalid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkPreference {
    #[default]
    Auto,
    Default,
    External,
}

impl NetworkPreference {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "" => Ok(NetworkPreference::Auto),
            "default" => Ok(NetworkPreference::Default),
            "external" => Ok(NetworkPreference::External),
            other => Err(Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// The parsed, but not-yet-DNS-resolved, form of a connection string.
#[derive(Debug, Clone)]
pub struct ParsedConnectionString {
    pub addresses: Vec<HostPort>,
    pub use_ssl: bool,
    pub params: HashMap<String, Vec<String>>,
}

/// The fully resolved form: SRV expansion (if applicable) has already run.
#[derive(Debug, Clone)]
pub struct ResolvedConnectionString {
    pub addresses: Vec<HostPort>,
    pub use_ssl: bool,
    pub params: HashMap<String, Vec<String>>,
}

impl ResolvedConnectionString {
    pub fn network_preference(&self) -> Result<NetworkPreference> {
        match self.params.get("network").and_then(|v| v.first()) {
            Some(value) => NetworkPreference::parse(value),
            None => Ok(NetworkPreference::Auto),
        }
    }

    pub fn management_port(&self, use_ssl: bool) -> u16 {
        if use_ssl { DEFAULT_MGMT_TLS_PORT } else { DEFAULT_MGMT_PORT }
    }
}

impl ParsedConnectionString {
    /// Tokenize scheme, host list and query string. Does not touch the
    /// network; see `resolve` for SRV expansion.
    pub fn parse(text: &str) -> Result<Self> {
        let (scheme, rest) = text
            .split_once("://")
            .ok_or_else(|| Error::InvalidConnectionString(text.to_string()))?;

        let use_ssl = match scheme {
            "http" | "couchbase" => false,
            "https" | "couchbases" => true,
            other => return Err(Error::InvalidConnectionString(format!("unsupported scheme {other:?}"))),
        };

        let (host_list, query) = match rest.split_once('?') {
            Some((hosts, q)) => (hosts, Some(q)),
            None => (rest, None),
        };

        if host_list.is_empty() {
            return Err(Error::NoAddressesParsed);
        }

        let mut addresses = Vec::new();
        for token in host_list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            addresses.push(parse_host_port(token)?);
        }

        if addresses.is_empty() {
            return Err(Error::NoAddressesParsed);
        }

        let params = match query {
            Some(q) if !q.is_empty() => parse_query(q),
            _ => HashMap::new(),
        };

        Ok(ParsedConnectionString { addresses, use_ssl, params })
    }

    /// Expand a lone SRV-style hostname via DNS, otherwise pass addresses
    /// through unchanged. Always async: SRV lookup hits the network.
    pub async fn resolve(self) -> Result<ResolvedConnectionString> {
        if self.addresses.len() == 1 && self.addresses[0].port.is_none() {
            if let Some(expanded) = try_resolve_srv(&self.addresses[0].host, self.use_ssl).await {
                if expanded.is_empty() {
                    return Err(Error::NoAddressesResolved);
                }
                return Ok(ResolvedConnectionString {
                    addresses: expanded,
                    use_ssl: self.use_ssl,
                    params: self.params,
                });
            }
        }

        Ok(ResolvedConnectionString {
            addresses: self.addresses,
            use_ssl: self.use_ssl,
            params: self.params,
        })
    }
}

fn parse_host_port(token: &str) -> Result<HostPort> {
    if let Some(rest) = token.strip_prefix('[') {
        // Bracketed IPv6 literal, optionally followed by :port.
        let (addr, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::InvalidConnectionString(token.to_string()))?;
        let port = match after.strip_prefix(':') {
            Some(p) if !p.is_empty() => Some(parse_port(p)?),
            Some(_) => return Err(Error::BadPort(token.to_string())),
            None => None,
        };
        return Ok(HostPort { host: format!("[{addr}]"), port });
    }

    match token.rsplit_once(':') {
        // Guard against bare (unbracketed) IPv6 literals, which contain
        // multiple colons; only split on the last colon when what precedes
        // it isn't itself a multi-colon address.
        Some((host, port)) if !host.contains(':') && !port.is_empty() => {
            Ok(HostPort { host: host.to_string(), port: Some(parse_port(port)?) })
        }
        _ => Ok(HostPort { host: token.to_string(), port: None }),
    }
}

fn parse_port(text: &str) -> Result<u16> {
    text.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| Error::BadPort(text.to_string()))
}

fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    params
}

/// Attempt `_couchbase(s)._tcp.<host>` SRV resolution. Returns `None` (not an
/// error) on anything but a successful lookup; only a confirmed empty
/// lookup is a hard failure. The caller turns that case into
/// `NoAddressesResolved`.
async fn try_resolve_srv(host: &str, use_ssl: bool) -> Option<Vec<HostPort>> {
    let service = if use_ssl { "_couchbases._tcp" } else { "_couchbase._tcp" };
    let query = format!("{service}.{host}");

    let resolver = Resolver::builder_with_config(
        ResolverConfig::default(),
        TokioConnectionProvider::default(),
    )
    .with_options(ResolverOpts::default())
    .build();

    let lookup = match resolver.srv_lookup(query.clone()).await {
        Ok(lookup) => lookup,
        Err(err) => {
            debug!(%query, error = %err, "SRV lookup failed, falling back to original addresses");
            return None;
        }
    };

    let port = if use_ssl { DEFAULT_MGMT_TLS_PORT } else { DEFAULT_MGMT_PORT };
    let targets: Vec<HostPort> = lookup
        .iter()
        .map(|srv| HostPort {
            host: srv.target().to_utf8().trim_end_matches('.').to_string(),
            port: Some(port),
        })
        .collect();

    Some(targets)
}
