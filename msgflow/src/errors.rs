//! Error types for the msgflow dispatch core.
//!
//! The taxonomy separates fatal Check-phase failures (validation, auth,
//! resolution) from per-record delivery failures and opaque storage errors,
//! so callers can map each kind to a precise user-facing message.

use crate::client::HttpError;
use serde_json::Map;
use std::fmt;
use thiserror::Error;

/// The main error type for msgflow operations.
#[derive(Debug, Error)]
pub enum MsgflowError {
    /// A request parameter was malformed or missing. Fatal to the Check phase.
    #[error("Invalid parameter: {0}")]
    Validation(String),

    /// The agent identity could not be verified or is disabled.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No template exists for the requested code.
    #[error("Template not found: {code}")]
    TemplateMissing {
        /// The unresolved template code.
        code: String,
    },

    /// The template exists but has no associated channel.
    #[error("Template '{code}' has no associated channel")]
    ChannelMissing {
        /// The template code whose channel is missing.
        code: String,
    },

    /// No sender is registered for the requested vendor name.
    #[error("Sender not found for vendor: {vendor}")]
    SenderNotFound {
        /// The unresolved vendor name.
        vendor: String,
    },

    /// A sender name was registered twice.
    #[error("Sender '{name}' already registered")]
    SenderAlreadyRegistered {
        /// The duplicate sender name.
        name: String,
    },

    /// Sender configuration could not be bound onto the sender's fields.
    #[error("Sender configuration error: {0}")]
    Config(String),

    /// The vendor accepted the request but reported a delivery failure.
    #[error("Delivery failed: {message}")]
    Delivery {
        /// The vendor-reported error message.
        message: String,
        /// The vendor's raw response, when one was decoded.
        response: Option<Map<String, serde_json::Value>>,
    },

    /// An outbound HTTP call failed.
    #[error("{0}")]
    Http(#[from] HttpError),

    /// A persistence operation failed. Storage details are not leaked.
    #[error("Internal storage error")]
    Storage(String),

    /// The run was cancelled through the shared cancellation token.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// One or more tasks of a parallel stage failed.
    ///
    /// Advisory only: callers that need authoritative partial-failure
    /// accounting must inspect per-record state instead.
    #[error("{0}")]
    Parallel(#[from] ParallelErrors),

    /// `send` was called before a successful `check`.
    #[error("Send batch is missing, check must be run first")]
    MustCheckFirst,
}

impl MsgflowError {
    /// Creates a delivery error without a decoded vendor response.
    #[must_use]
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            response: None,
        }
    }

    /// Returns true if the error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// A single task failure inside a parallel stage, preserving the identity of
/// the failing task.
#[derive(Debug)]
pub struct TaskFailure {
    /// The stage the task ran in.
    pub stage: String,
    /// The name of the failing task.
    pub task: String,
    /// The task's error.
    pub error: MsgflowError,
}

/// Aggregate of every individual failure of a parallel stage run.
///
/// Sibling tasks are never aborted by one task's failure; the aggregate
/// simply enumerates what failed after all workers finished.
#[derive(Debug, Error)]
pub struct ParallelErrors {
    /// The stage name.
    pub stage: String,
    /// The collected failures, in completion order.
    pub failures: Vec<TaskFailure>,
}

impl ParallelErrors {
    /// The number of failed tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failures were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ParallelErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed in stage '{}': ", self.failures.len(), self.stage)?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.task, failure.error)?;
        }
        Ok(())
    }
}
