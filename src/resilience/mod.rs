//! Resilient request execution: token renewal on 401 and backoff on 429.

use crate::auth::{AccessToken, Credentials, TokenProvider};
use crate::config::RetryConfig;
use crate::errors::{OfscError, OfscResult};
use crate::observability::Metrics;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Retry state of one logical operation.
///
/// Created per call, advanced once per 429, dropped on success or terminal
/// failure.
#[derive(Debug, Clone)]
pub struct RequestContext {
    retries_remaining: u32,
    current_backoff: Duration,
    multiplier: f64,
}

impl RequestContext {
    /// Creates a fresh context from the retry configuration.
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            retries_remaining: config.max_retries,
            current_backoff: config.initial_backoff,
            multiplier: config.multiplier,
        }
    }

    /// Retries still available.
    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    /// Backoff used when the server sends no Retry-After.
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// Consumes one retry and returns how long to wait before it.
    ///
    /// A Retry-After hint (whole seconds) wins over the computed backoff; the
    /// base backoff grows either way, saturating at `Duration::MAX`. Returns
    /// `None` once the budget is spent.
    pub fn next_delay(&mut self, retry_after: Option<u64>) -> Option<Duration> {
        if self.retries_remaining == 0 {
            return None;
        }

        let delay = retry_after
            .map(Duration::from_secs)
            .unwrap_or(self.current_backoff);

        self.retries_remaining -= 1;
        self.current_backoff =
            Duration::try_from_secs_f64(self.current_backoff.as_secs_f64() * self.multiplier)
                .unwrap_or(Duration::MAX);

        Some(delay)
    }
}

/// Parses a Retry-After header given in whole seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// A single logical call against the core API.
#[derive(Debug, Clone)]
pub struct ApiCall {
    method: HttpMethod,
    url: String,
    body: Option<String>,
}

impl ApiCall {
    /// A GET call.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    /// A PATCH call with a JSON body.
    pub fn patch<B: Serialize>(url: impl Into<String>, body: &B) -> OfscResult<Self> {
        let body = serde_json::to_string(body).map_err(|e| {
            OfscError::validation(format!("Failed to serialize request body: {}", e))
        })?;

        Ok(Self {
            method: HttpMethod::Patch,
            url: url.into(),
            body: Some(body),
        })
    }

    /// Gets the method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Gets the URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn to_request(&self, token: &AccessToken) -> HttpRequest {
        let mut request = HttpRequest::new(self.method, self.url.clone())
            .header("authorization", token.bearer_header())
            .header("accept", "application/json");

        if let Some(ref body) = self.body {
            request = request
                .header("content-type", "application/json")
                .body(body.clone());
        }

        request
    }
}

/// Payload of a successful call together with the token that succeeded.
///
/// The returned token supersedes every earlier one for the next call.
#[derive(Debug, Clone)]
pub struct Authorized<T> {
    /// Parsed response body.
    pub data: T,
    /// Token to pass into the next call.
    pub token: AccessToken,
}

impl<T> Authorized<T> {
    /// Maps the payload, keeping the token.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Authorized<U> {
        Authorized {
            data: f(self.data),
            token: self.token,
        }
    }
}

/// Issues single logical operations with token renewal and 429 backoff.
pub struct ResilientRequester {
    transport: Arc<dyn HttpTransport>,
    token_provider: Arc<dyn TokenProvider>,
    credentials: Credentials,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl ResilientRequester {
    /// Creates a new requester.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token_provider: Arc<dyn TokenProvider>,
        credentials: Credentials,
        retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            transport,
            token_provider,
            credentials,
            retry,
            metrics,
        }
    }

    /// Gets the retry configuration.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Acquires a fresh token from the token provider.
    pub async fn acquire_token(&self) -> OfscResult<AccessToken> {
        let token = self.token_provider.acquire_token(&self.credentials).await?;
        self.metrics.record_token_renewal();
        Ok(token)
    }

    /// Executes `call`, starting with `token` (or a freshly acquired one).
    ///
    /// A 401 renews the token once and repeats the request; a second 401 is
    /// an auth error. A 429 waits for Retry-After or the current backoff and
    /// starts over while the retry budget lasts. Any other non-2xx is a
    /// request error carrying status and body.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        call: &ApiCall,
        token: Option<AccessToken>,
    ) -> OfscResult<Authorized<T>> {
        let mut token = match token {
            Some(token) => token,
            None => self.acquire_token().await?,
        };
        let mut context = RequestContext::new(&self.retry);

        loop {
            let mut response = self.send(call, &token).await?;

            if response.status == 401 {
                tracing::warn!(url = %call.url, "Token rejected, renewing");
                token = self.acquire_token().await?;
                response = self.send(call, &token).await?;

                if response.status == 401 {
                    return Err(OfscError::authentication("Renewed token was rejected")
                        .with_status(401)
                        .with_body(response.body));
                }
            }

            if response.status == 429 {
                self.metrics.record_rate_limited();
                let retry_after = parse_retry_after(response.header("retry-after"));

                match context.next_delay(retry_after) {
                    Some(delay) => {
                        tracing::warn!(
                            url = %call.url,
                            delay_ms = delay.as_millis() as u64,
                            retries_left = context.retries_remaining(),
                            "Rate limited, backing off"
                        );
                        self.metrics.record_retry();
                        sleep(delay).await;
                        continue;
                    }
                    None => {
                        return Err(OfscError::rate_limit_exhausted(
                            self.retry.max_retries,
                            response.body,
                        )
                        .with_retry_after(retry_after));
                    }
                }
            }

            if !response.is_success() {
                tracing::error!(url = %call.url, status = response.status, "Request failed");
                return Err(OfscError::request(response.status, response.body));
            }

            let data = parse_body(&response)?;
            return Ok(Authorized { data, token });
        }
    }

    async fn send(&self, call: &ApiCall, token: &AccessToken) -> OfscResult<HttpResponse> {
        self.metrics.record_request();
        tracing::debug!(method = call.method.as_str(), url = %call.url, "Sending request");
        self.transport.send(call.to_request(token)).await
    }
}

fn parse_body<T: DeserializeOwned>(response: &HttpResponse) -> OfscResult<T> {
    let body = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };

    serde_json::from_str(body).map_err(|e| {
        OfscError::deserialization(format!("Failed to deserialize response: {}", e))
            .with_status(response.status)
            .with_cause(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OfscErrorKind;
    use crate::transport::MockHttpTransport;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Hands out `renewed-1`, `renewed-2`, ... and counts calls.
    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn acquire_token(&self, _credentials: &Credentials) -> OfscResult<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(OfscError::authentication("exchange rejected").with_status(400));
            }
            Ok(AccessToken::new(format!("renewed-{}", n)))
        }
    }

    fn requester(
        transport: Arc<MockHttpTransport>,
        provider: Arc<CountingProvider>,
    ) -> ResilientRequester {
        ResilientRequester::new(
            transport,
            provider,
            Credentials::new("client", "secret", "acme"),
            RetryConfig::default(),
            Arc::new(Metrics::new()),
        )
    }

    fn call() -> ApiCall {
        ApiCall::get("https://acme.example/rest/ofscCore/v1/resources/")
    }

    fn rate_limited(retry_after: Option<&str>) -> HttpResponse {
        let response = HttpResponse::new(429, "too many requests");
        match retry_after {
            Some(value) => response.with_header("Retry-After", value),
            None => response,
        }
    }

    #[test]
    fn test_context_backoff_doubles() {
        let mut context = RequestContext::new(&RetryConfig::default());

        let delays: Vec<_> = std::iter::from_fn(|| context.next_delay(None)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
            ]
        );
        assert_eq!(context.retries_remaining(), 0);
        assert!(context.next_delay(None).is_none());
    }

    #[test]
    fn test_context_retry_after_wins_but_base_still_doubles() {
        let mut context = RequestContext::new(&RetryConfig::default());
        assert_eq!(context.next_delay(Some(2)), Some(Duration::from_secs(2)));
        assert_eq!(context.current_backoff(), Duration::from_millis(1000));
        assert_eq!(context.next_delay(None), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_context_backoff_saturates_with_large_budget() {
        let mut context = RequestContext::new(&RetryConfig {
            max_retries: 80,
            ..Default::default()
        });

        for _ in 0..80 {
            assert_eq!(context.next_delay(Some(0)), Some(Duration::ZERO));
        }
        assert_eq!(context.current_backoff(), Duration::MAX);
        assert!(context.next_delay(Some(0)).is_none());
    }

    #[test]
    fn test_context_non_finite_multiplier_does_not_panic() {
        let mut context = RequestContext::new(&RetryConfig {
            multiplier: f64::NAN,
            ..Default::default()
        });

        assert_eq!(context.next_delay(None), Some(Duration::from_millis(500)));
        assert_eq!(context.next_delay(None), Some(Duration::MAX));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("2")), Some(2));
        assert_eq!(parse_retry_after(Some(" 10 ")), Some(10));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[tokio::test]
    async fn test_success_returns_same_token() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"items": []}));
        let provider = Arc::new(CountingProvider::default());

        let result: Authorized<Value> = requester(transport.clone(), provider.clone())
            .execute(&call(), Some(AccessToken::new("current")))
            .await
            .unwrap();

        assert_eq!(result.token.secret(), "current");
        assert_eq!(result.data, json!({"items": []}));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            transport.get_last_request().unwrap().headers["authorization"],
            "Bearer current"
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_acquired_first() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({}));
        let provider = Arc::new(CountingProvider::default());

        let result: Authorized<Value> = requester(transport.clone(), provider.clone())
            .execute(&call(), None)
            .await
            .unwrap();

        assert_eq!(result.token.secret(), "renewed-1");
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_401_renews_once_and_retries() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(401, "expired"));
        transport.queue_json_response(200, &json!({"ok": true}));
        let provider = Arc::new(CountingProvider::default());

        let result: Authorized<Value> = requester(transport.clone(), provider.clone())
            .execute(&call(), Some(AccessToken::new("stale")))
            .await
            .unwrap();

        assert_eq!(result.token.secret(), "renewed-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let requests = transport.get_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].headers["authorization"], "Bearer stale");
        assert_eq!(requests[1].headers["authorization"], "Bearer renewed-1");
    }

    #[tokio::test]
    async fn test_second_401_is_auth_error_without_third_attempt() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(401, "expired"));
        transport.queue_response(HttpResponse::new(401, "still expired"));
        transport.queue_json_response(200, &json!({}));
        let provider = Arc::new(CountingProvider::default());

        let err = requester(transport.clone(), provider.clone())
            .execute::<Value>(&call(), Some(AccessToken::new("stale")))
            .await
            .unwrap_err();

        assert_eq!(*err.kind(), OfscErrorKind::AuthError);
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(transport.request_count(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_renewal_failure_surfaces_auth_error() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(401, "expired"));
        let provider = Arc::new(CountingProvider {
            fail: true,
            ..Default::default()
        });

        let err = requester(transport.clone(), provider)
            .execute::<Value>(&call(), Some(AccessToken::new("stale")))
            .await
            .unwrap_err();

        assert!(err.is_auth_error());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_honors_retry_after() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(rate_limited(Some("2")));
        transport.queue_json_response(200, &json!({"ok": true}));
        let provider = Arc::new(CountingProvider::default());

        let start = Instant::now();
        let result: Authorized<Value> = requester(transport.clone(), provider)
            .execute(&call(), Some(AccessToken::new("current")))
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert_eq!(result.token.secret(), "current");
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_exponential_backoff_then_exhausted() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(rate_limited(None));
        let provider = Arc::new(CountingProvider::default());

        let start = Instant::now();
        let err = requester(transport.clone(), provider)
            .execute::<Value>(&call(), Some(AccessToken::new("current")))
            .await
            .unwrap_err();

        assert_eq!(*err.kind(), OfscErrorKind::RateLimitExhausted);
        assert!(err.is_request_error());
        assert_eq!(err.body(), Some("too many requests"));
        // First attempt plus five retries.
        assert_eq!(transport.request_count(), 6);
        // 500 + 1000 + 2000 + 4000 + 8000 ms
        assert!(start.elapsed() >= Duration::from_millis(15_500));
        assert!(start.elapsed() < Duration::from_millis(16_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_renewed_during_backoff_is_carried_forward() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(401, "expired"));
        transport.queue_response(rate_limited(None));
        transport.queue_json_response(200, &json!({}));
        let provider = Arc::new(CountingProvider::default());

        let result: Authorized<Value> = requester(transport.clone(), provider.clone())
            .execute(&call(), Some(AccessToken::new("stale")))
            .await
            .unwrap();

        assert_eq!(result.token.secret(), "renewed-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let requests = transport.get_requests();
        assert_eq!(requests[2].headers["authorization"], "Bearer renewed-1");
    }

    #[tokio::test]
    async fn test_other_status_is_request_error() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(404, "{\"title\":\"Not Found\"}"));
        let provider = Arc::new(CountingProvider::default());

        let err = requester(transport.clone(), provider)
            .execute::<Value>(&call(), Some(AccessToken::new("current")))
            .await
            .unwrap_err();

        assert_eq!(*err.kind(), OfscErrorKind::RequestError);
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.body(), Some("{\"title\":\"Not Found\"}"));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_patch_sends_json_body() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"resourceId": "R1", "email": "a@b.com"}));
        let provider = Arc::new(CountingProvider::default());

        let patch = ApiCall::patch(
            "https://acme.example/rest/ofscCore/v1/resources/R1",
            &json!({"email": "a@b.com"}),
        )
        .unwrap();
        let result: Authorized<Value> = requester(transport.clone(), provider)
            .execute(&patch, Some(AccessToken::new("current")))
            .await
            .unwrap();

        assert_eq!(result.data["resourceId"], "R1");
        let request = transport.get_last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Patch);
        assert_eq!(request.body.as_deref(), Some("{\"email\":\"a@b.com\"}"));
        assert_eq!(request.headers["content-type"], "application/json");
    }
}
