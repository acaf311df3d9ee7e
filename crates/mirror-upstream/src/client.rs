//! Upstream HTTP client: bearer auth, retries with backoff+jitter, and
//! `Retry-After` handling on 429. Retries up to 5 times against any GET.

use std::time::Duration;

use mirror_common::{Error, Result};
use rand::Rng;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::limiter::Gate;

const MAX_RETRIES: u32 = 5;
const BASE_BACKOFF_MS: u64 = 250;

/// What a probed GET returned, distinguishing "not found" (a data signal)
/// from a genuine failure.
pub enum Fetched {
    Ok(serde_json::Value),
    NotFound,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    gate: Gate,
    bearer_token: String,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(bearer_token: String, gate: Gate) -> Self {
        Self::with_base_url(bearer_token, gate, "https://api.themoviedb.org".to_string())
    }

    pub fn with_base_url(bearer_token: String, gate: Gate, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");
        UpstreamClient { http, gate, bearer_token, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues one GET against `path` (joined to `base_url`), honoring the
    /// shared rate limiter/gate and retrying transient failures.
    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<Fetched> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;

        loop {
            let _permit = self.gate.acquire(cancel).await?;

            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.bearer_token)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => return Ok(Fetched::NotFound),
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED
                    || resp.status() == StatusCode::FORBIDDEN =>
                {
                    return Err(Error::authentication(format!(
                        "upstream rejected credentials: {}",
                        resp.status()
                    )));
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(Error::upstream("exhausted retries after 429"));
                    }
                    let wait = retry_after(&resp).unwrap_or_else(|| backoff_duration(attempt));
                    tracing::debug!(attempt, ?wait, "upstream rate limited, backing off");
                    sleep_cancellable(wait, cancel).await?;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(Error::upstream(format!(
                            "exhausted retries after {} from {}",
                            resp.status(),
                            url
                        )));
                    }
                    sleep_cancellable(backoff_duration(attempt), cancel).await?;
                }
                Ok(resp) if resp.status().is_success() => {
                    let body = resp
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| Error::upstream(format!("invalid JSON from {url}: {e}")))?;
                    return Ok(Fetched::Ok(body));
                }
                Ok(resp) => {
                    return Err(Error::upstream(format!(
                        "unexpected status {} from {}",
                        resp.status(),
                        url
                    )));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(Error::upstream(format!("transport error from {url}: {e}")));
                    }
                    sleep_cancellable(backoff_duration(attempt), cancel).await?;
                }
            }
        }
    }
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn backoff_duration(attempt: u32) -> Duration {
    let base = BASE_BACKOFF_MS * 2u64.saturating_pow(attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..=base / 2 + 1);
    Duration::from_millis(base + jitter)
}

async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::Gate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gate() -> Gate {
        Gate::new(50, 10)
    }

    #[tokio::test]
    async fn returns_not_found_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/999999"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = UpstreamClient::with_base_url("token".into(), gate(), server.uri());
        let cancel = CancellationToken::new();
        let result = client.get("/3/movie/999999", &cancel).await.unwrap();
        assert!(matches!(result, Fetched::NotFound));
    }

    #[tokio::test]
    async fn authentication_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/603"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = UpstreamClient::with_base_url("token".into(), gate(), server.uri());
        let cancel = CancellationToken::new();
        let err = client.get("/3/movie/603", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/603"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/3/movie/603"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 603})))
            .mount(&server)
            .await;

        let client = UpstreamClient::with_base_url("token".into(), gate(), server.uri());
        let cancel = CancellationToken::new();
        let result = client.get("/3/movie/603", &cancel).await.unwrap();
        match result {
            Fetched::Ok(v) => assert_eq!(v["id"], 603),
            Fetched::NotFound => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn cancellation_aborts_promptly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/603"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = UpstreamClient::with_base_url("token".into(), gate(), server.uri());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client.get("/3/movie/603", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
