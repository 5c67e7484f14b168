//! Resilient outbound HTTP delivery.
//!
//! All network traffic of the dispatch core flows through the
//! [`RequestExecutor`]: retry with configurable backoff, terminal-vs-
//! transient status partitioning, an onion-composed middleware chain, and a
//! reusable buffer pool for large request bodies.

mod backoff;
mod error;
mod executor;
mod middleware;
mod pool;

pub use backoff::{default_backoff, BackoffFn};
pub use error::{HttpError, HttpErrorKind};
pub use executor::{RequestExecutor, RequestOptions};
pub use middleware::{HttpRequest, HttpResponse, Middleware, Next};
pub use pool::{BufferPool, StagedBody};

/// Request bodies at or above this size are staged through the buffer pool.
pub const INLINE_BODY_LIMIT: usize = 1024;

/// At most this many bytes of an error response body are kept for
/// diagnostics.
pub const ERROR_BODY_LIMIT: usize = 512;
