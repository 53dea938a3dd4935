// Shared HTTP plumbing - client construction and status handling
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header::HeaderMap, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

/// Upper bound for any paginated loop against an upstream
pub const MAX_PAGES: u32 = 10;

/// Settings every client is built from
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: "relwatch/0.1.0".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn build_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }
}

/// Turn a non-2xx response into the matching `ApiError`
///
/// GitHub signals an exhausted quota with a plain 403, so the rate limit
/// headers decide whether that 403 is a rate limit or a permission problem.
pub async fn check_response(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::FORBIDDEN && rate_limit_exhausted(response.headers()) {
        let reset_at = rate_limit_reset(response.headers());
        return Err(ApiError::RateLimitExceeded { reset_at });
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let reset_at = rate_limit_reset(response.headers());
        return Err(ApiError::RateLimitExceeded { reset_at });
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::AuthRequired);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(url.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    debug!("{} returned {}", url, status);
    Err(ApiError::RequestFailed(format!("Status {}: {}", status, body)))
}

/// Decode a JSON array one element at a time
///
/// The array itself must parse. An element that does not fit `T` is logged
/// and skipped so the rest of the batch survives.
pub fn decode_records<T: DeserializeOwned>(text: &str, what: &str) -> Result<Vec<T>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(text)?;
    Ok(decode_values(values, what))
}

/// [`decode_records`] for an array that is already parsed
pub fn decode_values<T: DeserializeOwned>(values: Vec<serde_json::Value>, what: &str) -> Vec<T> {
    let total = values.len();

    let records: Vec<T> = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed {} record #{}: {}", what, i, e);
                None
            }
        })
        .collect();

    if records.len() < total {
        debug!("Kept {} of {} {} records", records.len(), total, what);
    }
    records
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

/// Reset time from `X-RateLimit-Reset` (epoch seconds) as RFC 3339
pub fn rate_limit_reset(headers: &HeaderMap) -> String {
    headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}
