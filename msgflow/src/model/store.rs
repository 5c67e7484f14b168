//! The persistence boundary consumed by the send pipeline.

use super::entities::{Agent, SendBatch, Template};
use super::status::BatchStatus;
use super::JsonMap;
use crate::errors::MsgflowError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Lookup and mutation operations the dispatch core needs from storage.
///
/// Implementations must treat the counter bumps in [`record_success`] and
/// [`record_failure`] as part of the same logical transaction as the record
/// update, and must enforce the monotonic record lifecycle. Failures
/// surface as [`MsgflowError::Storage`], which renders opaquely to callers.
///
/// [`record_success`]: Store::record_success
/// [`record_failure`]: Store::record_failure
#[async_trait]
pub trait Store: Send + Sync {
    /// Looks up an agent by its number and secret pair.
    async fn find_agent(
        &self,
        agent_no: &str,
        agent_secret: &str,
    ) -> Result<Option<Agent>, MsgflowError>;

    /// Looks up an enabled template by code, with its channel preloaded.
    async fn find_template(&self, code: &str) -> Result<Option<Template>, MsgflowError>;

    /// Persists a new batch and its records, assigning identifiers.
    async fn create_batch(&self, batch: SendBatch) -> Result<SendBatch, MsgflowError>;

    /// Stamps the batch start and moves it to [`BatchStatus::Sending`].
    async fn mark_batch_started(
        &self,
        batch_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), MsgflowError>;

    /// Stamps the batch end and moves it to a terminal status.
    async fn mark_batch_finished(
        &self,
        batch_id: u64,
        status: BatchStatus,
        at: DateTime<Utc>,
    ) -> Result<(), MsgflowError>;

    /// Moves a record to [`RecordStatus::Sending`] when a dispatch worker
    /// claims it. A record can only be claimed once.
    ///
    /// [`RecordStatus::Sending`]: super::RecordStatus::Sending
    async fn mark_record_started(&self, record_id: u64) -> Result<(), MsgflowError>;

    /// Marks a record delivered and bumps the owning batch's success
    /// counter.
    async fn record_success(
        &self,
        record_id: u64,
        response: Option<JsonMap>,
        at: DateTime<Utc>,
    ) -> Result<(), MsgflowError>;

    /// Marks a record failed and bumps the owning batch's fail counter.
    async fn record_failure(
        &self,
        record_id: u64,
        error: String,
        response: Option<JsonMap>,
        at: DateTime<Utc>,
    ) -> Result<(), MsgflowError>;

    /// Reloads a batch together with its records.
    async fn load_batch(&self, batch_id: u64) -> Result<Option<SendBatch>, MsgflowError>;

    /// Enumerates the templates bound to a channel, for delete-safety
    /// checks.
    async fn templates_for_channel(
        &self,
        channel_id: u64,
    ) -> Result<Vec<Template>, MsgflowError>;
}
