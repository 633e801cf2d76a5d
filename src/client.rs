//! HTTP client wrapper for the hytl.tools check endpoint.

use std::fmt;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use ureq::Agent;

const API_BASE: &str = "https://api.hytl.tools";
const ORIGIN: &str = "https://hytl.tools";

/// Raw classification of one availability check round trip.
///
/// This is a single request's result, before any retry handling; the
/// scheduler decides what to do with the retryable variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCheck {
    /// The endpoint says the name is free.
    Available,
    /// The endpoint says the name is in use.
    Taken,
    /// HTTP 429; retryable after backoff.
    RateLimited,
    /// Timeout or connection failure; retryable.
    Transient(String),
    /// Malformed body or unexpected status; not retryable.
    Fatal(String),
}

/// One availability check against the remote service.
///
/// The seam between the scheduler and the network: production code uses
/// [`HttpClient`], tests inject a scripted fake. Implementations perform
/// exactly one round trip per call and never retry internally.
pub trait AvailabilityCheck: Sync {
    /// Check a single username, classifying the result.
    fn check(&self, username: &str) -> RawCheck;
}

impl<T: AvailabilityCheck + ?Sized> AvailabilityCheck for &T {
    fn check(&self, username: &str) -> RawCheck {
        (**self).check(username)
    }
}

/// An HTTP client configured for hytl.tools API queries.
///
/// Wraps the underlying HTTP agent to insulate callers from the specific
/// HTTP library version used internally. Connections are pooled by the
/// agent and shared safely across worker threads; requests carry no
/// cross-call state.
#[derive(Clone)]
pub struct HttpClient {
    agent: Agent,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client with the given per-request deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION"),
                " (",
                env!("CARGO_PKG_REPOSITORY"),
                ")"
            ))
            .build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    available: bool,
}

/// Classify a 200-response body. The endpoint answers
/// `{"available": true|false}`; anything else is a protocol error.
fn parse_body(username: &str, body: &str) -> RawCheck {
    match serde_json::from_str::<CheckResponse>(body) {
        Ok(CheckResponse { available: true }) => RawCheck::Available,
        Ok(CheckResponse { available: false }) => RawCheck::Taken,
        Err(e) => RawCheck::Fatal(format!(
            "malformed response for `{username}`: {e}"
        )),
    }
}

impl AvailabilityCheck for HttpClient {
    fn check(&self, username: &str) -> RawCheck {
        let url = format!("{API_BASE}/check/{username}");
        let result = self
            .agent
            .get(&url)
            .header("Accept", "*/*")
            .header("Origin", ORIGIN)
            .header("Referer", "https://hytl.tools/")
            .call();

        match result {
            Ok(mut response) => {
                let status = response.status();
                match response.body_mut().read_to_string() {
                    Ok(body) => {
                        debug!("HTTP {status} <- {username}: {}", truncate(&body, 200));
                        parse_body(username, &body)
                    }
                    Err(e) => RawCheck::Transient(format!("reading body: {e}")),
                }
            }
            Err(ureq::Error::StatusCode(429)) => {
                debug!("HTTP 429 <- {username}");
                RawCheck::RateLimited
            }
            Err(ureq::Error::StatusCode(code)) => {
                RawCheck::Fatal(format!("HTTP {code}"))
            }
            Err(
                e @ (ureq::Error::Timeout(_)
                | ureq::Error::Io(_)
                | ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound),
            ) => RawCheck::Transient(e.to_string()),
            Err(e) => RawCheck::Fatal(e.to_string()),
        }
    }
}

fn truncate(body: &str, limit: usize) -> &str {
    match body.char_indices().nth(limit) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
