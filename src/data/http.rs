//! Blocking HTTP with timeout and backoff, shared by the network connectors.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use crate::data::SourceFailure;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("country-risk/", env!("CARGO_PKG_VERSION"));

/// Waits before each retry; the first attempt is immediate.
const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    backoff: Vec<Duration>,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, SourceFailure> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceFailure::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            backoff: DEFAULT_BACKOFF.to_vec(),
        })
    }

    /// Override the retry schedule (an empty schedule disables retries).
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    /// GET with retries on transport errors, 429, and 5xx.
    pub fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response, SourceFailure> {
        self.send(url, || self.client.get(url).query(query))
    }

    /// Authenticated GET (`Authorization: Bearer <token>`).
    pub fn get_bearer(&self, url: &str, query: &[(&str, String)], token: &str) -> Result<Response, SourceFailure> {
        self.send(url, || self.client.get(url).query(query).bearer_auth(token))
    }

    /// Form-encoded POST.
    pub fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<Response, SourceFailure> {
        self.send(url, || self.client.post(url).form(form))
    }

    fn send(&self, url: &str, build: impl Fn() -> RequestBuilder) -> Result<Response, SourceFailure> {
        let mut last_error = String::new();

        for attempt in 0..=self.backoff.len() {
            if attempt > 0 {
                let wait = self.backoff[attempt - 1];
                debug!(url, attempt, wait_secs = wait.as_secs(), "retrying request");
                std::thread::sleep(wait);
            }

            match build().send() {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if is_retryable(resp.status()) => {
                    last_error = format!("HTTP {}", resp.status());
                }
                Ok(resp) => {
                    return Err(SourceFailure::Unavailable(format!(
                        "request to {url} failed with status {}",
                        resp.status()
                    )));
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        warn!(url, error = %last_error, "request failed after retries");
        Err(SourceFailure::Unavailable(format!("request to {url} failed: {last_error}")))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
