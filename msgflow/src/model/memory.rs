//! In-process store for tests and database-less embedders.

use super::entities::{Agent, SendBatch, Template};
use super::status::{BatchStatus, RecordStatus};
use super::store::Store;
use super::JsonMap;
use crate::errors::MsgflowError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A [`Store`] held entirely in memory.
///
/// Identifiers auto-increment across all entity kinds. Counter bumps and
/// record updates happen under one write lock, so the batch invariant
/// holds at every observable point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    agents: Vec<Agent>,
    templates: Vec<Template>,
    batches: HashMap<u64, SendBatch>,
    /// Record id to owning batch id.
    record_owner: HashMap<u64, u64>,
    next_id: u64,
}

impl Inner {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an agent, assigning its id.
    pub fn insert_agent(&self, mut agent: Agent) -> Agent {
        let mut inner = self.inner.write();
        agent.id = inner.alloc_id();
        inner.agents.push(agent.clone());
        agent
    }

    /// Seeds a template, assigning ids to it and its embedded channel.
    pub fn insert_template(&self, mut template: Template) -> Template {
        let mut inner = self.inner.write();
        template.id = inner.alloc_id();
        if let Some(channel) = template.channel.as_mut() {
            if channel.id == 0 {
                channel.id = inner.alloc_id();
            }
            template.channel_id = channel.id;
        }
        inner.templates.push(template.clone());
        template
    }

    /// The number of batches created so far.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.inner.read().batches.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_agent(
        &self,
        agent_no: &str,
        agent_secret: &str,
    ) -> Result<Option<Agent>, MsgflowError> {
        let inner = self.inner.read();
        Ok(inner
            .agents
            .iter()
            .find(|agent| agent.agent_no == agent_no && agent.agent_secret == agent_secret)
            .cloned())
    }

    async fn find_template(&self, code: &str) -> Result<Option<Template>, MsgflowError> {
        let inner = self.inner.read();
        Ok(inner
            .templates
            .iter()
            .find(|template| template.enabled && template.code == code)
            .cloned())
    }

    async fn create_batch(&self, mut batch: SendBatch) -> Result<SendBatch, MsgflowError> {
        let mut inner = self.inner.write();
        batch.id = inner.alloc_id();
        for record in &mut batch.records {
            record.id = inner.alloc_id();
            record.batch_id = batch.id;
        }
        for record in &batch.records {
            inner.record_owner.insert(record.id, batch.id);
        }
        inner.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn mark_batch_started(
        &self,
        batch_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), MsgflowError> {
        let mut inner = self.inner.write();
        let batch = inner
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| MsgflowError::Storage(format!("batch {batch_id} not found")))?;
        if batch.status != BatchStatus::Pending {
            return Err(MsgflowError::Storage(format!(
                "batch {batch_id} is {}, cannot start",
                batch.status
            )));
        }
        batch.status = BatchStatus::Sending;
        batch.started_at = Some(at);
        Ok(())
    }

    async fn mark_batch_finished(
        &self,
        batch_id: u64,
        status: BatchStatus,
        at: DateTime<Utc>,
    ) -> Result<(), MsgflowError> {
        if !status.is_terminal() {
            return Err(MsgflowError::Storage(format!(
                "{status} is not a terminal batch status"
            )));
        }
        let mut inner = self.inner.write();
        let batch = inner
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| MsgflowError::Storage(format!("batch {batch_id} not found")))?;
        if batch.status != BatchStatus::Sending {
            return Err(MsgflowError::Storage(format!(
                "batch {batch_id} is {}, cannot finish",
                batch.status
            )));
        }
        batch.status = status;
        batch.finished_at = Some(at);
        Ok(())
    }

    async fn mark_record_started(&self, record_id: u64) -> Result<(), MsgflowError> {
        let mut inner = self.inner.write();
        let batch_id = *inner
            .record_owner
            .get(&record_id)
            .ok_or_else(|| MsgflowError::Storage(format!("record {record_id} not found")))?;
        let batch = inner
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| MsgflowError::Storage(format!("batch {batch_id} not found")))?;
        let record = batch
            .records
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| MsgflowError::Storage(format!("record {record_id} not found")))?;
        if !record.status.can_transition(RecordStatus::Sending) {
            return Err(MsgflowError::Storage(format!(
                "record {record_id} is {}, cannot claim",
                record.status
            )));
        }
        record.status = RecordStatus::Sending;
        Ok(())
    }

    async fn record_success(
        &self,
        record_id: u64,
        response: Option<JsonMap>,
        at: DateTime<Utc>,
    ) -> Result<(), MsgflowError> {
        let mut inner = self.inner.write();
        let batch_id = *inner
            .record_owner
            .get(&record_id)
            .ok_or_else(|| MsgflowError::Storage(format!("record {record_id} not found")))?;
        let batch = inner
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| MsgflowError::Storage(format!("batch {batch_id} not found")))?;
        if batch.success_count + batch.fail_count >= batch.total_count {
            return Err(MsgflowError::Storage(format!(
                "batch {batch_id} counters already account for every record"
            )));
        }
        let record = batch
            .records
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| MsgflowError::Storage(format!("record {record_id} not found")))?;
        if !record.status.can_transition(RecordStatus::Success) {
            return Err(MsgflowError::Storage(format!(
                "record {record_id} is {}, cannot mark success",
                record.status
            )));
        }
        record.status = RecordStatus::Success;
        record.sent_at = Some(at);
        record.delivered_at = Some(at);
        record.response = response;
        batch.success_count += 1;
        Ok(())
    }

    async fn record_failure(
        &self,
        record_id: u64,
        error: String,
        response: Option<JsonMap>,
        at: DateTime<Utc>,
    ) -> Result<(), MsgflowError> {
        let mut inner = self.inner.write();
        let batch_id = *inner
            .record_owner
            .get(&record_id)
            .ok_or_else(|| MsgflowError::Storage(format!("record {record_id} not found")))?;
        let batch = inner
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| MsgflowError::Storage(format!("batch {batch_id} not found")))?;
        if batch.success_count + batch.fail_count >= batch.total_count {
            return Err(MsgflowError::Storage(format!(
                "batch {batch_id} counters already account for every record"
            )));
        }
        let record = batch
            .records
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| MsgflowError::Storage(format!("record {record_id} not found")))?;
        if !record.status.can_transition(RecordStatus::Failed) {
            return Err(MsgflowError::Storage(format!(
                "record {record_id} is {}, cannot mark failed",
                record.status
            )));
        }
        record.status = RecordStatus::Failed;
        record.sent_at = Some(at);
        record.error = Some(error);
        record.response = response;
        batch.fail_count += 1;
        Ok(())
    }

    async fn load_batch(&self, batch_id: u64) -> Result<Option<SendBatch>, MsgflowError> {
        Ok(self.inner.read().batches.get(&batch_id).cloned())
    }

    async fn templates_for_channel(
        &self,
        channel_id: u64,
    ) -> Result<Vec<Template>, MsgflowError> {
        let inner = self.inner.read();
        Ok(inner
            .templates
            .iter()
            .filter(|template| template.channel_id == channel_id)
            .cloned()
            .collect())
    }
}
