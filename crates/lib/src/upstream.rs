//! Upstream agent service HTTP client.
//!
//! Thin wrapper over `reqwest` that returns the raw status and body of every call. Status
//! interpretation (401 skip, accepted set, pass-through) belongs to the bridge, not here.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the upstream agent API. Cheap to clone; safe to share across requests.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Status and body of one upstream call.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body parsed as JSON. Empty or non-JSON bodies become an empty object.
    pub fn json(&self) -> Value {
        parse_body(&self.body)
    }
}

/// Parse a body leniently: anything that is not JSON becomes `{}`.
pub fn parse_body(body: &str) -> Value {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::Object(Default::default()))
}

impl UpstreamClient {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: timeout.filter(|t| !t.is_zero()).unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    /// Per-request timeout, capped by `remaining` when the caller has a deadline.
    fn effective_timeout(&self, remaining: Option<Duration>) -> Duration {
        match remaining {
            Some(r) => self.timeout.min(r.max(Duration::from_millis(1))),
            None => self.timeout,
        }
    }

    /// POST a JSON body with the given Authorization header value. `remaining` caps the request timeout.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        auth: &str,
        body: &T,
        remaining: Option<Duration>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let res = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.effective_timeout(remaining))
            .json(body)
            .send()
            .await?;
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Ok(UpstreamResponse { status, body })
    }

    /// GET with the given Authorization header value. `remaining` caps the request timeout.
    pub async fn get(
        &self,
        url: &str,
        auth: &str,
        remaining: Option<Duration>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let res = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.effective_timeout(remaining))
            .send()
            .await?;
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Ok(UpstreamResponse { status, body })
    }
}
