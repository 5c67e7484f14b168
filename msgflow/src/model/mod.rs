//! Entities, lifecycle statuses, and the persistence boundary.

mod entities;
mod memory;
mod status;
mod store;

pub use entities::{Agent, Channel, SendBatch, SendRecord, Template};
pub use memory::MemoryStore;
pub use status::{BatchStatus, RecordStatus};
pub use store::Store;

/// A string-keyed JSON object, the shape of channel configs and vendor
/// responses.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
