//! Batch and record lifecycle statuses.

use serde::{Deserialize, Serialize};

/// Where a batch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created by the check phase, not yet dispatched.
    Pending,
    /// Dispatch fan-out in progress.
    Sending,
    /// Dispatch completed with at least one success.
    Finished,
    /// Every record failed.
    Failed,
}

impl BatchStatus {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where a record is in its lifecycle. Transitions are monotonic: a record
/// moves forward through pending, sending, and a terminal outcome, never
/// back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Materialized, not yet handed to a worker.
    Pending,
    /// Claimed by a dispatch worker.
    Sending,
    /// Delivered and acknowledged by the vendor.
    Success,
    /// Delivery failed terminally.
    Failed,
}

impl RecordStatus {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Whether moving to `next` respects the monotonic lifecycle.
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Sending => next.is_terminal(),
            Self::Success | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
