//! The retry discipline used by `Client::execute`: classification of
//! transport-level faults, the status-code retry decision, `Retry-After`
//! parsing, and the retry-count budget.

use crate::error::Error;
use crate::request::Request;
use chrono::{DateTime, Utc};
use std::time::Duration;

const DEFAULT_NUM_RETRIES: u32 = 3;
const NUM_RETRIES_ENV: &str = "CB_REST_CLIENT_NUM_RETRIES";

/// Statuses considered transiently retryable even without an explicit
/// `retry_on_status_codes` entry.
const DEFAULT_TEMPORARY_STATUSES: [u16; 7] = [502, 403, 504, 500, 503, 429, 509];

pub fn max_retries() -> u32 {
    match std::env::var(NUM_RETRIES_ENV) {
        Ok(value) => value.parse().ok().filter(|n| *n > 0).unwrap_or(DEFAULT_NUM_RETRIES),
        Err(_) => DEFAULT_NUM_RETRIES,
    }
}

/// A transport error is retryable when it is one of the known-temporary
/// faults: DNS/dial/connect failures, resets, timeouts, or a body read that
/// ended in an unexpected EOF (`SocketClosedInFlight`). `UnknownAuthority`
/// is retryable only while refreshing topology, never during bootstrap or a
/// user-initiated `execute`, so it is deliberately excluded here and handled
/// by the two call sites directly.
pub fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

pub fn is_socket_closed_in_flight(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
    )
}

/// Whether a non-expected status response should be retried, per the
/// status-path rule: idempotent, not explicitly excluded, and either a
/// default-temporary status, an explicitly-allowed one, or 401.
pub fn should_retry_status(req: &Request, status: u16) -> bool {
    if !req.is_idempotent() {
        return false;
    }
    if req.no_retry_on_status_codes.contains(&status) {
        return false;
    }
    DEFAULT_TEMPORARY_STATUSES.contains(&status) || req.retry_on_status_codes.contains(&status) || status == 401
}

/// `true` when a 401 should additionally nudge the client to treat the
/// current topology as possibly stale.
pub fn status_implies_stale_config(status: u16) -> bool {
    status == 401
}

/// Parses `Retry-After` for a 503 response: an integer number of seconds, or
/// an HTTP-date. Ignored (returns `None`) for anything else, including any
/// status other than 503 — callers must check the status themselves.
pub fn parse_retry_after(status: u16, header_value: Option<&str>) -> Option<Duration> {
    if status != 503 {
        return None;
    }
    let value = header_value?;

    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(Error::MAX_RETRY_AFTER));
    }

    let parsed = DateTime::parse_from_rfc2822(value).ok()?;
    let now = Utc::now();
    let target = parsed.with_timezone(&Utc);
    let delay = (target - now).to_std().unwrap_or(Duration::ZERO);
    Some(delay.min(Error::MAX_RETRY_AFTER))
}

/// Maps a non-retryable, non-expected status to its typed error.
pub fn status_to_error(status: u16, body: Vec<u8>) -> Error {
    match status {
        401 => Error::Authentication,
        403 => Error::Authorization(decode_permissions(&body)),
        500 => Error::InternalServer(String::from_utf8_lossy(&body).into_owned()),
        404 => Error::EndpointNotFound,
        other => Error::UnexpectedStatusCode { status: other, body: String::from_utf8_lossy(&body).into_owned() },
    }
}

fn decode_permissions(body: &[u8]) -> crate::error::Permissions {
    #[derive(serde::Deserialize)]
    struct Envelope {
        #[serde(default)]
        permissions: Vec<String>,
    }
    serde_json::from_slice::<Envelope>(body)
        .map(|e| crate::error::Permissions { missing: e.permissions })
        .unwrap_or_default()
}
