//! Remote API error types and retry classification
//!
//! Errors are classified from structured signals first (HTTP status, quota
//! headers, GraphQL error types, transport error kinds). Matching "rate limit"
//! in a message is only a fallback for responses that carry nothing better.

use crate::github::types::{Budget, Resource};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// How the retry policy should treat an [`ApiError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Quota exhausted: wait for the reset, then try again
    RateLimit,
    /// Server-side or network fault: retry with backoff
    Transient,
    /// Everything else: surface immediately
    Permanent,
}

/// Errors that can occur when talking to the remote API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Rate limit exceeded on {endpoint}: {message}")]
    RateLimited {
        endpoint: String,
        reset_at: Option<DateTime<Utc>>,
        message: String,
    },

    #[error("HTTP {status} from {endpoint}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Network error contacting {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("GraphQL error from {endpoint}: {}", .messages.join("; "))]
    GraphQl {
        endpoint: String,
        messages: Vec<String>,
        types: Vec<String>,
    },

    #[error("Unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
}

/// Result type for remote API calls
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Classifies this error for the retry policy
    ///
    /// | Condition | Kind |
    /// |-----------|------|
    /// | Quota headers exhausted, `retry-after`, GraphQL `RATE_LIMITED` | RateLimit |
    /// | Message mentions "rate limit" (any case) | RateLimit |
    /// | HTTP 5xx | Transient |
    /// | Connection reset, DNS failure, connect failure, timeout | Transient |
    /// | Any other 4xx, GraphQL error, undecodable body | Permanent |
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Network { .. } => ErrorKind::Transient,
            Self::Status {
                status, message, ..
            } => {
                if mentions_rate_limit(message) {
                    ErrorKind::RateLimit
                } else if *status >= 500 {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Self::GraphQl {
                messages, types, ..
            } => {
                if types.iter().any(|t| t == "RATE_LIMITED")
                    || messages.iter().any(|m| mentions_rate_limit(m))
                {
                    ErrorKind::RateLimit
                } else {
                    ErrorKind::Permanent
                }
            }
            Self::Decode { message, .. } | Self::Transport { message, .. } => {
                if mentions_rate_limit(message) {
                    ErrorKind::RateLimit
                } else {
                    ErrorKind::Permanent
                }
            }
        }
    }

    /// Returns true if the credential itself was rejected
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }

    /// Returns the quota reset time declared by the server, if any
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimited { reset_at, .. } => *reset_at,
            _ => None,
        }
    }

    /// Builds an error from a non-success HTTP response
    ///
    /// A 403 or 429 is a rate limit when the quota headers say so
    /// (`x-ratelimit-remaining: 0`) or when the server asks us to back off via
    /// `retry-after`; otherwise the status is kept for classification.
    pub fn from_status(endpoint: &str, status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let message = extract_message(body);

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let exhausted = header_str(headers, "x-ratelimit-remaining") == Some("0");
            let retry_after = header_str(headers, "retry-after")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

            if exhausted || retry_after.is_some() {
                let reset_at = retry_after.or_else(|| reset_from_headers(headers));
                return Self::RateLimited {
                    endpoint: endpoint.to_string(),
                    reset_at,
                    message,
                };
            }
        }

        Self::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        }
    }

    /// Builds an error from a failed request
    ///
    /// Walks the source chain looking for an I/O error kind that marks a
    /// transient network fault; connect failures (which include name
    /// resolution) and timeouts are transient as well.
    pub fn from_transport(endpoint: &str, err: &reqwest::Error) -> Self {
        let message = describe_chain(err);

        if err.is_timeout() || err.is_connect() || has_transient_io_source(err) {
            return Self::Network {
                endpoint: endpoint.to_string(),
                message,
            };
        }

        if err.is_decode() {
            return Self::Decode {
                endpoint: endpoint.to_string(),
                message,
            };
        }

        Self::Transport {
            endpoint: endpoint.to_string(),
            message,
        }
    }
}

/// Case-insensitive "rate limit" match used as a classification fallback
pub fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("ratelimit")
}

/// Reads `x-ratelimit-reset` (epoch seconds) from response headers
pub fn reset_from_headers(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    header_str(headers, "x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Reads the quota state the host attaches to every response
///
/// Returns the pool named by `x-ratelimit-resource` and its budget, or `None`
/// unless all of limit, remaining and reset are present.
pub fn budget_from_headers(headers: &HeaderMap) -> Option<(Option<Resource>, Budget)> {
    let number = |name: &str| header_str(headers, name).and_then(|v| v.trim().parse::<u64>().ok());

    let budget = Budget {
        limit: number("x-ratelimit-limit")?,
        remaining: number("x-ratelimit-remaining")?,
        reset_at: reset_from_headers(headers)?,
    };
    let resource = match header_str(headers, "x-ratelimit-resource") {
        Some("graphql") => Some(Resource::Graphql),
        Some("core") => Some(Resource::Core),
        _ => None,
    };
    Some((resource, budget))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Pulls `message` out of a JSON error body, or falls back to a trimmed snippet
fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(200).collect()
}

fn has_transient_io_source(err: &(dyn StdError + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::TimedOut
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn describe_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
