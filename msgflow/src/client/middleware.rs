//! Request/response types and the onion-composed middleware chain.

use super::error::HttpError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// An outbound request as seen by the middleware chain.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// The request URL.
    pub url: String,
    /// Request headers, applied in order.
    pub headers: Vec<(String, String)>,
    /// The request body; empty for body-less methods. Cloning is cheap,
    /// the bytes are shared by reference count.
    pub body: Bytes,
}

impl HttpRequest {
    /// Appends a header.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The response status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// The full response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the status is 4xx.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// The body as lossy UTF-8 text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the body is not valid
    /// JSON for `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Decodes the body as a JSON object, yielding an empty map when the
    /// body is not a JSON object.
    #[must_use]
    pub fn json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.json::<serde_json::Map<String, serde_json::Value>>()
            .unwrap_or_default()
    }
}

/// A middleware wrapping the underlying send call.
///
/// Middlewares compose as an onion: the first-registered middleware is the
/// outermost (runs first, may short-circuit or post-process), the
/// last-registered is closest to the network call. A middleware forwards by
/// awaiting `next.run(req)`, or short-circuits by returning without it.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handles the request, optionally delegating to the rest of the chain.
    async fn handle(&self, req: HttpRequest, next: Next<'_>) -> Result<HttpResponse, HttpError>;
}

/// The remainder of the middleware chain, ending at the network transport.
pub struct Next<'a> {
    pub(crate) chain: &'a [Arc<dyn Middleware>],
    pub(crate) client: &'a reqwest::Client,
}

impl Next<'_> {
    /// Runs the rest of the chain.
    ///
    /// # Errors
    ///
    /// Propagates the innermost failure, transport or middleware.
    pub async fn run(self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        match self.chain.split_first() {
            Some((outer, rest)) => {
                outer
                    .handle(
                        req,
                        Next {
                            chain: rest,
                            client: self.client,
                        },
                    )
                    .await
            }
            None => dispatch(self.client, req).await,
        }
    }
}

/// The innermost send: hands the request to reqwest and buffers the reply.
async fn dispatch(client: &reqwest::Client, req: HttpRequest) -> Result<HttpResponse, HttpError> {
    let method_name = req.method.as_str().to_string();
    let mut builder = client.request(req.method, &req.url);
    for (name, value) in &req.headers {
        builder = builder.header(name, value);
    }
    if !req.body.is_empty() {
        builder = builder.body(req.body);
    }

    let response = builder
        .send()
        .await
        .map_err(|err| HttpError::transport(&method_name, &req.url, err))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response
        .bytes()
        .await
        .map_err(|err| HttpError::transport(&method_name, &req.url, err))?
        .to_vec();

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Tagger {
        tag: &'static str,
        order: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Tagger {
        async fn handle(
            &self,
            req: HttpRequest,
            next: Next<'_>,
        ) -> Result<HttpResponse, HttpError> {
            self.order.lock().push(self.tag);
            next.run(req).await
        }
    }

    struct ShortCircuit {
        status: u16,
    }

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(
            &self,
            _req: HttpRequest,
            _next: Next<'_>,
        ) -> Result<HttpResponse, HttpError> {
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::new(),
                body: b"stubbed".to_vec(),
            })
        }
    }

    fn request() -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            url: "http://unreachable.invalid/".to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn test_first_registered_middleware_is_outermost() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Tagger { tag: "outer", order: order.clone() }),
            Arc::new(Tagger { tag: "inner", order: order.clone() }),
            Arc::new(ShortCircuit { status: 200 }),
        ];

        let client = reqwest::Client::new();
        let next = Next { chain: &chain, client: &client };
        let resp = next.run(request()).await.expect("stub should answer");

        assert_eq!(resp.status, 200);
        assert_eq!(*order.lock(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_short_circuit_never_reaches_the_network() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(ShortCircuit { status: 204 })];
        let client = reqwest::Client::new();
        let next = Next { chain: &chain, client: &client };

        // The URL is unroutable; only the short-circuit can answer.
        let resp = next.run(request()).await.expect("stub should answer");
        assert_eq!(resp.status, 204);
        assert_eq!(resp.text(), "stubbed");
    }

    #[test]
    fn test_json_map_is_lenient() {
        let resp = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: b"not json".to_vec(),
        };
        assert!(resp.json_map().is_empty());
    }
}
