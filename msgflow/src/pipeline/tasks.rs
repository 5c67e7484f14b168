//! The concrete tasks that make up the check and send phases.

use super::state::DispatchState;
use crate::cancellation::CancellationToken;
use crate::client::RequestExecutor;
use crate::errors::MsgflowError;
use crate::model::{BatchStatus, JsonMap, RecordStatus, SendBatch, SendRecord, Store};
use crate::render::render_content;
use crate::senders::SenderRegistry;
use crate::workflow::{ParallelStage, Task};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

/// Rejects requests with any blank required field.
#[derive(Debug, Default)]
pub struct CheckParamsTask;

#[async_trait]
impl Task<DispatchState> for CheckParamsTask {
    fn name(&self) -> &str {
        "check_params"
    }

    async fn on_action(
        &self,
        _cancel: &Arc<CancellationToken>,
        state: &mut DispatchState,
    ) -> Result<(), MsgflowError> {
        if state.agent_no.is_empty() {
            error!(trace_id = %state.trace_id, "agent no is empty");
            return Err(MsgflowError::Validation("agent no is empty".to_string()));
        }
        if state.agent_secret.is_empty() {
            error!(trace_id = %state.trace_id, "agent secret is empty");
            return Err(MsgflowError::Validation("agent secret is empty".to_string()));
        }
        if state.template_code.is_empty() {
            error!(trace_id = %state.trace_id, "template code is empty");
            return Err(MsgflowError::Validation("template code is empty".to_string()));
        }
        if state.receivers.is_empty() {
            error!(trace_id = %state.trace_id, "receivers is empty");
            return Err(MsgflowError::Validation("receivers is empty".to_string()));
        }
        Ok(())
    }
}

/// Authenticates the agent by its number and secret pair.
pub struct CheckAgentTask {
    store: Arc<dyn Store>,
}

impl CheckAgentTask {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<DispatchState> for CheckAgentTask {
    fn name(&self) -> &str {
        "check_agent"
    }

    async fn on_action(
        &self,
        _cancel: &Arc<CancellationToken>,
        state: &mut DispatchState,
    ) -> Result<(), MsgflowError> {
        let agent = self
            .store
            .find_agent(&state.agent_no, &state.agent_secret)
            .await?;
        let Some(agent) = agent else {
            error!(trace_id = %state.trace_id, agent_no = %state.agent_no, "agent not found");
            return Err(MsgflowError::Auth("unknown agent or secret".to_string()));
        };
        if !agent.enabled {
            error!(trace_id = %state.trace_id, agent_no = %state.agent_no, "agent is disabled");
            return Err(MsgflowError::Auth("agent is disabled".to_string()));
        }
        state.agent = Some(agent);
        Ok(())
    }
}

/// Resolves the template and its channel; the two missing cases are
/// distinct error kinds so callers can message them precisely.
pub struct CheckTemplateTask {
    store: Arc<dyn Store>,
}

impl CheckTemplateTask {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<DispatchState> for CheckTemplateTask {
    fn name(&self) -> &str {
        "check_template"
    }

    async fn on_action(
        &self,
        _cancel: &Arc<CancellationToken>,
        state: &mut DispatchState,
    ) -> Result<(), MsgflowError> {
        let template = self.store.find_template(&state.template_code).await?;
        let Some(template) = template else {
            error!(trace_id = %state.trace_id, code = %state.template_code, "template not found");
            return Err(MsgflowError::TemplateMissing {
                code: state.template_code.clone(),
            });
        };
        let Some(channel) = template.channel.clone() else {
            error!(trace_id = %state.trace_id, code = %state.template_code, "template has no channel");
            return Err(MsgflowError::ChannelMissing {
                code: state.template_code.clone(),
            });
        };
        state.template = Some(template);
        state.channel = Some(channel);
        Ok(())
    }
}

/// Materializes the batch and one record per receiver, then persists them.
///
/// Each record carries its fully rendered content and a snapshot of the
/// channel config taken now; dispatch never re-reads the channel.
pub struct CreateBatchTask {
    store: Arc<dyn Store>,
}

impl CreateBatchTask {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<DispatchState> for CreateBatchTask {
    fn name(&self) -> &str {
        "create_batch"
    }

    async fn on_action(
        &self,
        _cancel: &Arc<CancellationToken>,
        state: &mut DispatchState,
    ) -> Result<(), MsgflowError> {
        let (Some(agent), Some(template), Some(channel)) =
            (&state.agent, &state.template, &state.channel)
        else {
            return Err(MsgflowError::Validation(
                "agent, template, and channel must be resolved before batch creation".to_string(),
            ));
        };

        let now = Utc::now();
        let records = state
            .receivers
            .iter()
            .map(|receiver| SendRecord {
                id: 0,
                batch_id: 0,
                trace_id: state.trace_id.clone(),
                receiver: receiver.clone(),
                vendor_name: channel.vendor_name.clone(),
                channel_config: channel.config.clone(),
                vendor_code: template.vendor_code.clone(),
                signature: template.signature.clone(),
                title: String::new(),
                content: render_content(&template.signature, &template.content, &state.variables),
                variables: state.variables.clone(),
                extra: state.extra.clone(),
                status: RecordStatus::Pending,
                sent_at: None,
                delivered_at: None,
                response: None,
                error: None,
            })
            .collect::<Vec<_>>();

        let batch = SendBatch {
            id: 0,
            batch_no: Uuid::new_v4().to_string(),
            trace_id: state.trace_id.clone(),
            agent_id: agent.id,
            channel_id: channel.id,
            template_id: template.id,
            total_count: records.len() as u32,
            success_count: 0,
            fail_count: 0,
            status: BatchStatus::Pending,
            scheduled_at: Some(now),
            started_at: None,
            finished_at: None,
            records,
        };

        let created = self.store.create_batch(batch).await?;
        state.batch = Some(created);
        Ok(())
    }
}

/// Delivers one record: claim it as `Sending`, resolve a sender clone,
/// bind the config snapshot, send, and persist the outcome with its
/// counter bump.
pub struct SendRecordTask {
    name: String,
    record: SendRecord,
    store: Arc<dyn Store>,
    registry: Arc<SenderRegistry>,
    executor: Arc<RequestExecutor>,
}

impl SendRecordTask {
    #[must_use]
    pub fn new(
        record: SendRecord,
        store: Arc<dyn Store>,
        registry: Arc<SenderRegistry>,
        executor: Arc<RequestExecutor>,
    ) -> Self {
        Self {
            name: format!("send_record_{}", record.id),
            record,
            store,
            registry,
            executor,
        }
    }

    async fn fail(&self, error: &MsgflowError, response: Option<JsonMap>) -> Result<(), MsgflowError> {
        error!(
            trace_id = %self.record.trace_id,
            record_id = self.record.id,
            receiver = %self.record.receiver,
            %error,
            "record delivery failed"
        );
        self.store
            .record_failure(self.record.id, error.to_string(), response, Utc::now())
            .await
    }
}

#[async_trait]
impl Task<()> for SendRecordTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_action(
        &self,
        cancel: &Arc<CancellationToken>,
        _state: &mut (),
    ) -> Result<(), MsgflowError> {
        self.store.mark_record_started(self.record.id).await?;

        let Some(mut sender) = self.registry.resolve(&self.record.vendor_name) else {
            let err = MsgflowError::SenderNotFound {
                vendor: self.record.vendor_name.clone(),
            };
            self.fail(&err, None).await?;
            return Err(err);
        };

        if let Err(err) = sender.set_config(&self.record.channel_config) {
            self.fail(&err, None).await?;
            return Err(err);
        }

        match sender.send(&self.executor, cancel, &self.record).await {
            Ok(response) => {
                self.store
                    .record_success(self.record.id, Some(response), Utc::now())
                    .await
            }
            Err(err) => {
                let response = match &err {
                    MsgflowError::Delivery { response, .. } => response.clone(),
                    _ => None,
                };
                self.fail(&err, response).await?;
                Err(err)
            }
        }
    }
}

/// Stamps the batch start and moves it to `Sending`.
pub struct BatchStartTask {
    store: Arc<dyn Store>,
}

impl BatchStartTask {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<DispatchState> for BatchStartTask {
    fn name(&self) -> &str {
        "batch_start"
    }

    async fn on_action(
        &self,
        _cancel: &Arc<CancellationToken>,
        state: &mut DispatchState,
    ) -> Result<(), MsgflowError> {
        let batch = state
            .batch
            .as_ref()
            .ok_or(MsgflowError::MustCheckFirst)?;
        self.store.mark_batch_started(batch.id, Utc::now()).await
    }
}

/// Fans out one [`SendRecordTask`] per record through a bounded parallel
/// stage. The stage's aggregate error is advisory only: per-record
/// outcomes are already persisted, so it is logged and swallowed.
pub struct DispatchRecordsTask {
    store: Arc<dyn Store>,
    registry: Arc<SenderRegistry>,
    executor: Arc<RequestExecutor>,
    limit: usize,
}

impl DispatchRecordsTask {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<SenderRegistry>,
        executor: Arc<RequestExecutor>,
        limit: usize,
    ) -> Self {
        Self {
            store,
            registry,
            executor,
            limit,
        }
    }
}

#[async_trait]
impl Task<DispatchState> for DispatchRecordsTask {
    fn name(&self) -> &str {
        "dispatch_records"
    }

    async fn on_action(
        &self,
        cancel: &Arc<CancellationToken>,
        state: &mut DispatchState,
    ) -> Result<(), MsgflowError> {
        let batch = state
            .batch
            .as_ref()
            .ok_or(MsgflowError::MustCheckFirst)?;

        let mut parallel = ParallelStage::new("dispatch_records");
        parallel.set_limit(self.limit);
        for record in &batch.records {
            parallel.add(SendRecordTask::new(
                record.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
                Arc::clone(&self.executor),
            ));
        }

        if let Err(err) = parallel.run(cancel, &()).await {
            warn!(
                trace_id = %state.trace_id,
                batch_id = batch.id,
                %err,
                "some record deliveries failed"
            );
        }
        Ok(())
    }
}

/// Stamps the batch end with its terminal status: `Failed` when every
/// record failed, `Finished` otherwise.
pub struct BatchEndTask {
    store: Arc<dyn Store>,
}

impl BatchEndTask {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<DispatchState> for BatchEndTask {
    fn name(&self) -> &str {
        "batch_end"
    }

    async fn on_action(
        &self,
        _cancel: &Arc<CancellationToken>,
        state: &mut DispatchState,
    ) -> Result<(), MsgflowError> {
        let batch_id = state
            .batch
            .as_ref()
            .map(|batch| batch.id)
            .ok_or(MsgflowError::MustCheckFirst)?;
        let current = self
            .store
            .load_batch(batch_id)
            .await?
            .ok_or_else(|| MsgflowError::Storage(format!("batch {batch_id} vanished")))?;

        let status = if current.total_count > 0 && current.fail_count == current.total_count {
            BatchStatus::Failed
        } else {
            BatchStatus::Finished
        };
        self.store
            .mark_batch_finished(batch_id, status, Utc::now())
            .await
    }
}
