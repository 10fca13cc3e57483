use std::time::Duration;

use billsync_common::BackoffPolicy;
use billsync_domain::{BillSyncError, PlatformError};
use chrono::Utc;
use reqwest::{Client as ReqwestClient, Method, Request, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::errors::{classify_transport, retry_after_header, InfraError};

/// Vendor HTTP client.
///
/// Reads (GET, HEAD, OPTIONS) are retried on 5xx, on connection failures and
/// on 429 when the vendor's `Retry-After` fits inside the backoff cap. Writes
/// go out exactly once: a lost response must never produce a second vendor
/// record, so the sync engine owns what happens after a failed write.
#[derive(Clone)]
pub struct HttpClient {
    inner: ReqwestClient,
    read_attempts: u32,
    backoff: BackoffPolicy,
}

/// What to do with the outcome of one attempt
enum Next {
    Done(Result<Response, PlatformError>),
    RetryAfter(Duration),
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn new() -> Result<Self, BillSyncError> {
        Self::builder().build()
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.inner.request(method, url)
    }

    /// Send a request, retrying reads.
    ///
    /// Every HTTP status comes back as `Ok`; callers classify non-success
    /// responses themselves. `Err` means no response was received.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, PlatformError> {
        let request = builder
            .build()
            .map_err(|err| PlatformError::unexpected(format!("invalid request: {err}")))?;
        let attempts = if request.method().is_safe() { self.read_attempts } else { 1 };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt >= attempts;
            let copy = if last { None } else { request.try_clone() };
            let next = match copy {
                Some(copy) => self.try_once(copy, attempt, false).await,
                // Final attempt, or a streaming body that cannot be replayed.
                None => return self.finish(request, attempt).await,
            };
            match next {
                Next::Done(result) => return result,
                Next::RetryAfter(delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn finish(&self, request: Request, attempt: u32) -> Result<Response, PlatformError> {
        match self.try_once(request, attempt, true).await {
            Next::Done(result) => result,
            Next::RetryAfter(_) => Err(PlatformError::unexpected("retry requested on the final attempt")),
        }
    }

    async fn try_once(&self, request: Request, attempt: u32, last: bool) -> Next {
        let method = request.method().clone();
        let path = request.url().path().to_string();
        debug!(attempt, %method, path = %path, "sending request");

        match self.inner.execute(request).await {
            Ok(response) => {
                let status = response.status();
                debug!(attempt, %method, path = %path, %status, "response received");
                if last {
                    return Next::Done(Ok(response));
                }
                match self.retry_delay(&response, attempt) {
                    Some(delay) => {
                        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                        warn!(attempt, %method, path = %path, %status, delay_ms, "retrying read");
                        Next::RetryAfter(delay)
                    }
                    None => Next::Done(Ok(response)),
                }
            }
            Err(err) if !last && is_retryable_transport(&err) => {
                let delay = self.backoff.exponential_delay(attempt - 1);
                warn!(attempt, %method, path = %path, error = %err, "transport failure; retrying read");
                Next::RetryAfter(delay)
            }
            Err(err) => Next::Done(Err(classify_transport(&err))),
        }
    }

    fn retry_delay(&self, response: &Response, attempt: u32) -> Option<Duration> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let hint = retry_after_header(response.headers(), Utc::now())
                .unwrap_or_else(|| self.backoff.exponential_delay(attempt - 1));
            // Pauses beyond the cap are left to the engine's retry schedule.
            return (hint <= self.backoff.max_delay()).then_some(hint);
        }
        status.is_server_error().then(|| self.backoff.exponential_delay(attempt - 1))
    }
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    read_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    user_agent: Option<String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            read_attempts: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(5),
            user_agent: None,
        }
    }
}

impl HttpClientBuilder {
    /// Per-request deadline, connection included
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total tries for a read, the first included. Writes always get one.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.read_attempts = attempts.max(1);
        self
    }

    /// Delay before the first read retry and the cap on later ones. A 429
    /// whose `Retry-After` exceeds the cap is returned instead of retried.
    pub fn retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<HttpClient, BillSyncError> {
        let backoff = BackoffPolicy::new(self.backoff_base, 2.0, self.backoff_max)
            .map_err(|err| BillSyncError::Config(err.to_string()))?;

        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        let inner = builder.build().map_err(|err| BillSyncError::from(InfraError::from(err)))?;

        Ok(HttpClient { inner, read_attempts: self.read_attempts, backoff })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use billsync_domain::PlatformErrorKind;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

    use super::*;

    /// Serves the scripted statuses in order, then repeats the last one.
    struct Script {
        calls: Arc<AtomicUsize>,
        responses: Vec<ResponseTemplate>,
    }

    impl Respond for Script {
        fn respond(&self, _: &wiremock::Request) -> ResponseTemplate {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses[n.min(self.responses.len() - 1)].clone()
        }
    }

    async fn scripted(verb: &str, responses: Vec<ResponseTemplate>) -> (MockServer, Arc<AtomicUsize>) {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        Mock::given(method(verb))
            .respond_with(Script { calls: Arc::clone(&calls), responses })
            .mount(&server)
            .await;
        (server, calls)
    }

    fn client() -> HttpClient {
        HttpClient::builder()
            .retry_backoff(Duration::from_millis(5), Duration::from_secs(2))
            .max_attempts(3)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn read_recovers_after_server_errors() {
        let (server, calls) = scripted(
            "GET",
            vec![ResponseTemplate::new(503), ResponseTemplate::new(502), ResponseTemplate::new(200)],
        )
        .await;

        let client = client();
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn read_gives_up_with_last_response() {
        let (server, calls) = scripted("GET", vec![ResponseTemplate::new(500)]).await;

        let client = client();
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn write_is_sent_once_even_on_server_error() {
        let (server, calls) = scripted("POST", vec![ResponseTemplate::new(502)]).await;

        let client = client();
        let response =
            client.send(client.request(Method::POST, server.uri()).body("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_rate_limit_pause_is_waited_out() {
        let (server, calls) = scripted(
            "GET",
            vec![ResponseTemplate::new(429).insert_header("retry-after", "0"), ResponseTemplate::new(200)],
        )
        .await;

        let client = client();
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn long_rate_limit_pause_is_returned() {
        let (server, calls) =
            scripted("GET", vec![ResponseTemplate::new(429).insert_header("retry-after", "120")]).await;

        let client = client();
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (server, calls) = scripted("GET", vec![ResponseTemplate::new(404)]).await;

        let client = client();
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::builder()
            .retry_backoff(Duration::from_millis(1), Duration::from_millis(10))
            .max_attempts(2)
            .build()
            .unwrap();
        let err = client.send(client.request(Method::GET, format!("http://{addr}"))).await.unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::Network);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn slow_response_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HttpClient::builder().timeout(Duration::from_millis(50)).max_attempts(1).build().unwrap();
        let err = client.send(client.request(Method::GET, server.uri())).await.unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::Timeout);
    }

    #[test]
    fn base_above_cap_is_rejected() {
        let result = HttpClient::builder()
            .retry_backoff(Duration::from_secs(10), Duration::from_secs(1))
            .build();
        assert!(matches!(result, Err(BillSyncError::Config(_))));
    }
}
