//! The core entities of the dispatch domain.

use super::status::{BatchStatus, RecordStatus};
use super::JsonMap;
use crate::senders::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tenant allowed to dispatch notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: u64,
    /// The public agent number presented by callers.
    pub agent_no: String,
    /// The shared secret paired with `agent_no`.
    pub agent_secret: String,
    pub name: String,
    pub email: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A configured delivery channel bound to a vendor integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: u64,
    pub agent_id: u64,
    pub code: String,
    pub name: String,
    /// The registry name of the vendor integration this channel uses.
    pub vendor_name: String,
    /// Vendor-specific settings, bound onto the sender at dispatch time.
    pub config: JsonMap,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message template owned by an agent and bound to one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,
    pub agent_id: u64,
    pub channel_id: u64,
    pub code: String,
    pub vendor_code: String,
    /// Prefix prepended to every rendered content.
    pub signature: String,
    /// Body with `${key}` placeholders.
    pub content: String,
    pub enabled: bool,
    pub used_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The owning channel, preloaded on lookup.
    pub channel: Option<Channel>,
}

/// One dispatch request: counters, lifecycle, and the records it owns.
///
/// `total_count` is fixed at creation; `success_count + fail_count ≤
/// total_count` at every point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendBatch {
    pub id: u64,
    pub batch_no: String,
    pub trace_id: String,
    pub agent_id: u64,
    pub channel_id: u64,
    pub template_id: u64,
    pub total_count: u32,
    pub success_count: u32,
    pub fail_count: u32,
    pub status: BatchStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records: Vec<SendRecord>,
}

/// One recipient's delivery: rendered content, a config snapshot taken at
/// creation time, and the outcome of its single dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRecord {
    pub id: u64,
    pub batch_id: u64,
    pub trace_id: String,
    pub receiver: String,
    pub vendor_name: String,
    /// Channel config copied at creation; never re-read from the channel.
    pub channel_config: JsonMap,
    pub vendor_code: String,
    pub signature: String,
    pub title: String,
    /// Fully rendered content, signature included.
    pub content: String,
    pub variables: HashMap<String, String>,
    pub extra: JsonMap,
    pub status: RecordStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub response: Option<JsonMap>,
    pub error: Option<String>,
}

impl Message for SendRecord {
    fn receiver(&self) -> &str {
        &self.receiver
    }

    fn signature(&self) -> &str {
        &self.signature
    }

    fn vendor_code(&self) -> &str {
        &self.vendor_code
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    fn extra(&self) -> &JsonMap {
        &self.extra
    }
}
