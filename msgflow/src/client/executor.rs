//! The retrying request executor.

use super::backoff::{default_backoff, BackoffFn};
use super::error::{HttpError, HttpErrorKind};
use super::middleware::{HttpRequest, HttpResponse, Middleware, Next};
use super::pool::{BufferPool, StagedBody};
use super::{ERROR_BODY_LIMIT, INLINE_BODY_LIMIT};
use crate::cancellation::CancellationToken;
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request tuning: retry budget, backoff curve, extra headers, and
/// request-scoped middlewares.
///
/// Idempotent methods (GET, HEAD) retry transient failures by default;
/// any other method retries only when [`with_force_retry`] opts in.
///
/// [`with_force_retry`]: RequestOptions::with_force_retry
#[derive(Clone)]
pub struct RequestOptions {
    /// Retries after the first attempt; 3 by default.
    pub retries: u32,
    /// The backoff curve between attempts.
    pub backoff: BackoffFn,
    /// Headers appended to every attempt.
    pub headers: Vec<(String, String)>,
    /// Retries transient failures even for non-idempotent methods.
    pub force_retry: bool,
    /// Middlewares appended after the executor-level chain.
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Arc::new(default_backoff),
            headers: Vec::new(),
            force_retry: false,
            middlewares: Vec::new(),
        }
    }
}

impl RequestOptions {
    /// Creates options with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Replaces the backoff curve.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffFn) -> Self {
        self.backoff = backoff;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Opts non-idempotent methods into retrying transient failures.
    #[must_use]
    pub fn with_force_retry(mut self, force: bool) -> Self {
        self.force_retry = force;
        self
    }

    /// Appends a request-scoped middleware.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("retries", &self.retries)
            .field("headers", &self.headers)
            .field("force_retry", &self.force_retry)
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

/// The shared executor for all outbound delivery.
///
/// One instance serves the whole process: the inner connection pool, the
/// buffer pool, and any executor-level middlewares are reused across every
/// call. All methods take `&self` and are safe to call concurrently.
pub struct RequestExecutor {
    client: reqwest::Client,
    pool: Arc<BufferPool>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl RequestExecutor {
    /// Creates an executor with a 10 second request timeout.
    #[must_use]
    pub fn new() -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!(%err, "client builder failed, falling back to a client without a request timeout");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            pool: Arc::new(BufferPool::new()),
            middlewares: Vec::new(),
        }
    }

    /// Appends an executor-level middleware, outermost-first.
    ///
    /// Executor-level middlewares wrap every request before any
    /// request-scoped middleware from [`RequestOptions`].
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// The executor's body staging pool.
    #[must_use]
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Sends `method` to `url`, retrying transient failures per `options`.
    ///
    /// Attempts stop early on success, on a 4xx response, when the method
    /// is not retryable, or when `cancel` fires during a backoff wait.
    ///
    /// # Errors
    ///
    /// - [`HttpErrorKind::Client`] for a 4xx response, never retried.
    /// - [`HttpErrorKind::Transient`] when a single attempt of a
    ///   non-retryable request fails.
    /// - [`HttpErrorKind::Exhausted`] when the retry budget runs out.
    /// - [`HttpErrorKind::Cancelled`] when cancellation interrupts a wait.
    pub async fn execute(
        &self,
        cancel: &Arc<CancellationToken>,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        let retryable =
            options.force_retry || method == Method::GET || method == Method::HEAD;
        let chain: Vec<Arc<dyn Middleware>> = self
            .middlewares
            .iter()
            .chain(options.middlewares.iter())
            .cloned()
            .collect();

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(HttpError::cancelled(
                    method.as_str(),
                    url,
                    cancel.reason_or("request cancelled"),
                ));
            }

            let err = match self
                .attempt(&chain, method.clone(), url, body, options)
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            match err.kind {
                HttpErrorKind::Transient if retryable && attempt < options.retries => {
                    let delay = (options.backoff)(attempt);
                    debug!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        status = err.status,
                        "transient failure, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {
                            return Err(HttpError::cancelled(
                                method.as_str(),
                                url,
                                cancel.reason_or("request cancelled"),
                            ));
                        }
                    }
                    attempt += 1;
                }
                HttpErrorKind::Transient if retryable => return Err(err.into_exhausted()),
                _ => return Err(err),
            }
        }
    }

    /// GET without a body.
    ///
    /// # Errors
    ///
    /// See [`RequestExecutor::execute`].
    pub async fn get(
        &self,
        cancel: &Arc<CancellationToken>,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        self.execute(cancel, Method::GET, url, None, options).await
    }

    /// POST with a JSON-encoded payload.
    ///
    /// # Errors
    ///
    /// Returns [`HttpErrorKind::Build`] when the payload fails to
    /// serialize; otherwise see [`RequestExecutor::execute`].
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        cancel: &Arc<CancellationToken>,
        url: &str,
        payload: &T,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| HttpError::build("POST", url, err.to_string()))?;
        let options = options
            .clone()
            .with_header("Content-Type", "application/json");
        self.execute(cancel, Method::POST, url, Some(&body), &options)
            .await
    }

    /// Runs one attempt: stage the body, thread the middleware chain, and
    /// classify the outcome. Large bodies are copied once into a pooled
    /// buffer whose frozen bytes back the request directly; the lease
    /// reclaims the allocation when this frame unwinds, on every path.
    async fn attempt(
        &self,
        chain: &[Arc<dyn Middleware>],
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        let (payload, staged) = match body {
            Some(data) if data.len() >= INLINE_BODY_LIMIT => {
                let lease = self.pool.stage(data);
                (lease.bytes(), Some(lease))
            }
            Some(data) => (Bytes::copy_from_slice(data), None),
            None => (Bytes::new(), None),
        };

        let request = HttpRequest {
            method: method.clone(),
            url: url.to_string(),
            headers: options.headers.clone(),
            body: payload,
        };
        let response = Next {
            chain,
            client: &self.client,
        }
        .run(request)
        .await?;
        drop(staged);

        if response.is_success() {
            return Ok(response);
        }
        let detail = truncate_body(&response.body);
        if response.is_client_error() {
            Err(HttpError::client(
                method.as_str(),
                url,
                response.status,
                detail,
            ))
        } else {
            Err(HttpError::transient(
                method.as_str(),
                url,
                response.status,
                detail,
            ))
        }
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("middlewares", &self.middlewares.len())
            .field("pooled_buffers", &self.pool.available())
            .finish_non_exhaustive()
    }
}

fn truncate_body(body: &[u8]) -> String {
    let end = body.len().min(ERROR_BODY_LIMIT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers each attempt with the next scripted status, repeating the
    /// last one, without ever touching the network.
    struct ScriptedMock {
        statuses: Vec<u16>,
        hits: AtomicUsize,
    }

    impl ScriptedMock {
        fn new(statuses: Vec<u16>) -> Arc<Self> {
            Arc::new(Self {
                statuses,
                hits: AtomicUsize::new(0),
            })
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Middleware for ScriptedMock {
        async fn handle(
            &self,
            _req: HttpRequest,
            _next: Next<'_>,
        ) -> Result<HttpResponse, HttpError> {
            let hit = self.hits.fetch_add(1, Ordering::SeqCst);
            let status = self.statuses[hit.min(self.statuses.len() - 1)];
            Ok(HttpResponse {
                status,
                headers: HashMap::new(),
                body: format!("status {status}").into_bytes(),
            })
        }
    }

    fn fast_options() -> RequestOptions {
        RequestOptions::new().with_backoff(Arc::new(|_| Duration::from_millis(1)))
    }

    fn token() -> Arc<CancellationToken> {
        Arc::new(CancellationToken::new())
    }

    const URL: &str = "http://unreachable.invalid/hook";

    #[tokio::test]
    async fn test_client_error_is_terminal_after_one_attempt() {
        let mock = ScriptedMock::new(vec![404]);
        let executor = RequestExecutor::new().with_middleware(mock.clone());

        let err = executor
            .get(&token(), URL, &fast_options())
            .await
            .unwrap_err();

        assert_eq!(err.kind, HttpErrorKind::Client);
        assert_eq!(err.status, Some(404));
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn test_transient_get_retries_until_exhausted() {
        let mock = ScriptedMock::new(vec![503]);
        let executor = RequestExecutor::new().with_middleware(mock.clone());
        let options = fast_options().with_retries(2);

        let err = executor.get(&token(), URL, &options).await.unwrap_err();

        assert_eq!(err.kind, HttpErrorKind::Exhausted);
        assert_eq!(err.status, Some(503));
        assert_eq!(mock.hits(), 3);
    }

    #[tokio::test]
    async fn test_transient_get_recovers_mid_retry() {
        let mock = ScriptedMock::new(vec![503, 503, 200]);
        let executor = RequestExecutor::new().with_middleware(mock.clone());

        let response = executor
            .get(&token(), URL, &fast_options())
            .await
            .expect("third attempt should succeed");

        assert_eq!(response.status, 200);
        assert_eq!(mock.hits(), 3);
    }

    #[tokio::test]
    async fn test_post_does_not_retry_without_force() {
        let mock = ScriptedMock::new(vec![503]);
        let executor = RequestExecutor::new().with_middleware(mock.clone());

        let err = executor
            .post_json(&token(), URL, &serde_json::json!({"k": "v"}), &fast_options())
            .await
            .unwrap_err();

        assert_eq!(err.kind, HttpErrorKind::Transient);
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn test_force_retry_opts_post_into_retrying() {
        let mock = ScriptedMock::new(vec![503, 200]);
        let executor = RequestExecutor::new().with_middleware(mock.clone());
        let options = fast_options().with_force_retry(true);

        let response = executor
            .post_json(&token(), URL, &serde_json::json!({"k": "v"}), &options)
            .await
            .expect("retry should succeed");

        assert_eq!(response.status, 200);
        assert_eq!(mock.hits(), 2);
    }

    #[tokio::test]
    async fn test_large_bodies_return_to_the_pool_on_success_and_failure() {
        let big = vec![b'x'; 2048];

        let ok = RequestExecutor::new().with_middleware(ScriptedMock::new(vec![200]));
        ok.execute(&token(), Method::POST, URL, Some(&big), &fast_options())
            .await
            .expect("mock answers 200");
        assert_eq!(ok.buffer_pool().available(), 1);

        let failing = RequestExecutor::new().with_middleware(ScriptedMock::new(vec![404]));
        let err = failing
            .execute(&token(), Method::POST, URL, Some(&big), &fast_options())
            .await
            .unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Client);
        assert_eq!(failing.buffer_pool().available(), 1);
    }

    /// Keeps the body bytes the transport saw, to inspect sharing.
    struct BodyKeeper {
        seen: parking_lot::Mutex<Option<bytes::Bytes>>,
    }

    #[async_trait]
    impl Middleware for BodyKeeper {
        async fn handle(
            &self,
            req: HttpRequest,
            _next: Next<'_>,
        ) -> Result<HttpResponse, HttpError> {
            *self.seen.lock() = Some(req.body.clone());
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_pooled_body_backs_the_request_without_recopying() {
        let big = vec![b'x'; 2048];
        let keeper = Arc::new(BodyKeeper {
            seen: parking_lot::Mutex::new(None),
        });
        let executor = RequestExecutor::new().with_middleware(keeper.clone());

        executor
            .execute(&token(), Method::POST, URL, Some(&big), &fast_options())
            .await
            .expect("keeper answers 200");

        let seen = keeper.seen.lock().take().expect("body captured");
        assert_eq!(&seen[..], &big[..]);
        // The captured clone still owns the staged allocation, so the pool
        // cannot have taken it back; the body was shared, not copied out.
        assert_eq!(executor.buffer_pool().available(), 0);
    }

    #[tokio::test]
    async fn test_small_bodies_skip_the_pool() {
        let small = vec![b'x'; 16];
        let executor = RequestExecutor::new().with_middleware(ScriptedMock::new(vec![200]));
        executor
            .execute(&token(), Method::POST, URL, Some(&small), &fast_options())
            .await
            .expect("mock answers 200");
        assert_eq!(executor.buffer_pool().available(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_the_backoff_wait() {
        let mock = ScriptedMock::new(vec![503]);
        let executor = RequestExecutor::new().with_middleware(mock.clone());
        let options = RequestOptions::new().with_backoff(Arc::new(|_| Duration::from_secs(30)));

        let cancel = token();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel("shutting down");
        });

        let started = std::time::Instant::now();
        let err = executor.get(&cancel, URL, &options).await.unwrap_err();

        assert_eq!(err.kind, HttpErrorKind::Cancelled);
        assert!(err.body.contains("shutting down"));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_skips_the_first_attempt() {
        let mock = ScriptedMock::new(vec![200]);
        let executor = RequestExecutor::new().with_middleware(mock.clone());
        let cancel = token();
        cancel.cancel("stop");

        let err = executor.get(&cancel, URL, &fast_options()).await.unwrap_err();

        assert_eq!(err.kind, HttpErrorKind::Cancelled);
        assert_eq!(mock.hits(), 0);
    }
}
