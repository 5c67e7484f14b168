//! The send pipeline: check, dispatch, and report one batch.

use super::state::DispatchState;
use super::tasks::{
    BatchEndTask, BatchStartTask, CheckAgentTask, CheckParamsTask, CheckTemplateTask,
    CreateBatchTask, DispatchRecordsTask,
};
use crate::cancellation::CancellationToken;
use crate::client::RequestExecutor;
use crate::errors::MsgflowError;
use crate::model::{JsonMap, SendBatch, Store};
use crate::senders::SenderRegistry;
use crate::workflow::SerialStage;
use std::collections::HashMap;
use std::sync::Arc;

/// One dispatch request, as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub trace_id: String,
    pub agent_no: String,
    pub agent_secret: String,
    pub template_code: String,
    pub receivers: Vec<String>,
    pub variables: HashMap<String, String>,
    pub extra: JsonMap,
}

/// Drives one request through `check` then `send`, and reports the batch.
///
/// Lifecycle is `unchecked → checked → sent`: a check-phase failure aborts
/// the whole request with no batch created; `send` refuses to run until
/// `check` succeeded; send-phase per-record failures are persisted, never
/// re-raised, so the reloaded batch's counters are the authoritative
/// partial-failure accounting.
pub struct SendPipeline {
    store: Arc<dyn Store>,
    registry: Arc<SenderRegistry>,
    executor: Arc<RequestExecutor>,
    send_limit: usize,
    state: DispatchState,
}

impl SendPipeline {
    /// Creates a pipeline for one request.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<SenderRegistry>,
        executor: Arc<RequestExecutor>,
        request: DispatchRequest,
    ) -> Self {
        Self {
            store,
            registry,
            executor,
            send_limit: 0,
            state: DispatchState {
                trace_id: request.trace_id,
                agent_no: request.agent_no,
                agent_secret: request.agent_secret,
                template_code: request.template_code,
                receivers: request.receivers,
                variables: request.variables,
                extra: request.extra,
                ..DispatchState::default()
            },
        }
    }

    /// Bounds the dispatch fan-out; `0` means one worker per record.
    #[must_use]
    pub fn with_send_limit(mut self, limit: usize) -> Self {
        self.send_limit = limit;
        self
    }

    /// Validates the request, authenticates the agent, resolves the
    /// template and channel, and persists the batch with one pending
    /// record per receiver.
    ///
    /// # Errors
    ///
    /// Any check failure aborts the whole request; no batch is created.
    pub async fn check(&mut self, cancel: &Arc<CancellationToken>) -> Result<(), MsgflowError> {
        let mut serial = SerialStage::new();
        serial.add(CheckParamsTask);
        serial.add(CheckAgentTask::new(Arc::clone(&self.store)));
        serial.add(CheckTemplateTask::new(Arc::clone(&self.store)));
        serial.add(CreateBatchTask::new(Arc::clone(&self.store)));
        serial.run(cancel, &mut self.state).await
    }

    /// Dispatches every record of the checked batch.
    ///
    /// # Errors
    ///
    /// Fails with [`MsgflowError::MustCheckFirst`] until [`check`] has
    /// succeeded. Per-record delivery failures are persisted on their
    /// records and do not fail this call; batch bookkeeping failures do.
    ///
    /// [`check`]: SendPipeline::check
    pub async fn send(&mut self, cancel: &Arc<CancellationToken>) -> Result<(), MsgflowError> {
        if self.state.batch.is_none() {
            return Err(MsgflowError::MustCheckFirst);
        }
        let mut serial = SerialStage::new();
        serial.add(BatchStartTask::new(Arc::clone(&self.store)));
        serial.add(DispatchRecordsTask::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.executor),
            self.send_limit,
        ));
        serial.add(BatchEndTask::new(Arc::clone(&self.store)));
        serial.run(cancel, &mut self.state).await
    }

    /// Reloads the batch and its records for caller reporting.
    ///
    /// # Errors
    ///
    /// Fails with [`MsgflowError::MustCheckFirst`] before a successful
    /// check, or [`MsgflowError::Storage`] when the batch cannot be
    /// reloaded.
    pub async fn send_batch(&self) -> Result<SendBatch, MsgflowError> {
        let batch = self.state.batch.as_ref().ok_or(MsgflowError::MustCheckFirst)?;
        self.store
            .load_batch(batch.id)
            .await?
            .ok_or_else(|| MsgflowError::Storage(format!("batch {} not found", batch.id)))
    }
}
