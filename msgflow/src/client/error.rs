//! Outbound HTTP failure taxonomy.

use thiserror::Error;

/// How an outbound request ultimately failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// The request could not be constructed or serialized.
    Build,
    /// A 4xx response: a client-input problem, never retried.
    Client,
    /// A single transient failure (5xx, transport error, timeout).
    Transient,
    /// All retry attempts were exhausted; wraps the last transient failure.
    Exhausted,
    /// The run was cancelled while waiting to retry.
    Cancelled,
}

impl std::fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => write!(f, "request build failed"),
            Self::Client => write!(f, "client error"),
            Self::Transient => write!(f, "transient failure"),
            Self::Exhausted => write!(f, "retries exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An outbound request failure carrying the status code, method, URL, and a
/// truncated response body for diagnostics.
#[derive(Debug, Error)]
#[error("{method} {url} failed: {kind}{}", self.detail())]
pub struct HttpError {
    /// The failure classification.
    pub kind: HttpErrorKind,
    /// The response status, when a response was received.
    pub status: Option<u16>,
    /// The request method.
    pub method: String,
    /// The request URL.
    pub url: String,
    /// Up to [`super::ERROR_BODY_LIMIT`] bytes of the response body.
    pub body: String,
    /// The underlying transport error, if any.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl HttpError {
    /// Creates a request-construction error.
    #[must_use]
    pub fn build(method: &str, url: &str, message: impl Into<String>) -> Self {
        Self {
            kind: HttpErrorKind::Build,
            status: None,
            method: method.to_string(),
            url: url.to_string(),
            body: message.into(),
            source: None,
        }
    }

    /// Creates a terminal 4xx error.
    #[must_use]
    pub fn client(method: &str, url: &str, status: u16, body: String) -> Self {
        Self {
            kind: HttpErrorKind::Client,
            status: Some(status),
            method: method.to_string(),
            url: url.to_string(),
            body,
            source: None,
        }
    }

    /// Creates a transient status failure (5xx and friends).
    #[must_use]
    pub fn transient(method: &str, url: &str, status: u16, body: String) -> Self {
        Self {
            kind: HttpErrorKind::Transient,
            status: Some(status),
            method: method.to_string(),
            url: url.to_string(),
            body,
            source: None,
        }
    }

    /// Creates a transport-level failure.
    #[must_use]
    pub fn transport(method: &str, url: &str, source: reqwest::Error) -> Self {
        Self {
            kind: HttpErrorKind::Transient,
            status: None,
            method: method.to_string(),
            url: url.to_string(),
            body: String::new(),
            source: Some(source),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(method: &str, url: &str, reason: String) -> Self {
        Self {
            kind: HttpErrorKind::Cancelled,
            status: None,
            method: method.to_string(),
            url: url.to_string(),
            body: reason,
            source: None,
        }
    }

    /// Reclassifies the last transient failure as retry exhaustion.
    #[must_use]
    pub fn into_exhausted(mut self) -> Self {
        if self.kind == HttpErrorKind::Transient {
            self.kind = HttpErrorKind::Exhausted;
        }
        self
    }

    fn detail(&self) -> String {
        let mut detail = String::new();
        if let Some(status) = self.status {
            detail.push_str(&format!(", status {status}"));
        }
        if !self.body.is_empty() {
            detail.push_str(&format!(", body {:?}", self.body));
        }
        detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display_carries_diagnostics() {
        let err = HttpError::client("POST", "https://example.com/hook", 404, "not found".to_string());
        let rendered = err.to_string();
        assert!(rendered.contains("POST https://example.com/hook"));
        assert!(rendered.contains("status 404"));
        assert!(rendered.contains("not found"));
    }

    #[test]
    fn test_into_exhausted_only_reclassifies_transient() {
        let transient = HttpError::transient("GET", "http://x", 503, String::new());
        assert_eq!(transient.into_exhausted().kind, HttpErrorKind::Exhausted);

        let cancelled = HttpError::cancelled("GET", "http://x", "stop".to_string());
        assert_eq!(cancelled.into_exhausted().kind, HttpErrorKind::Cancelled);
    }
}
