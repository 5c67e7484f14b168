//! The typed accumulator threaded through pipeline stages.

use crate::model::{Agent, Channel, JsonMap, SendBatch, Template};
use std::collections::HashMap;

/// Everything a dispatch run knows: the caller's request fields, plus what
/// each check task resolved for the tasks after it.
///
/// Serial tasks read the fields earlier tasks filled and fill their own;
/// the compiler, not a runtime lookup, guarantees which fields exist.
#[derive(Debug, Clone, Default)]
pub struct DispatchState {
    pub trace_id: String,
    pub agent_no: String,
    pub agent_secret: String,
    pub template_code: String,
    pub receivers: Vec<String>,
    pub variables: HashMap<String, String>,
    pub extra: JsonMap,

    /// Filled by the agent check.
    pub agent: Option<Agent>,
    /// Filled by the template check.
    pub template: Option<Template>,
    /// Filled by the template check, from the template's channel.
    pub channel: Option<Channel>,
    /// Filled by batch creation; present means the check phase succeeded.
    pub batch: Option<SendBatch>,
}
