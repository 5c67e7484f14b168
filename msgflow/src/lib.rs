//! # Msgflow
//!
//! The dispatch core of a notification service: task orchestration,
//! resilient outbound HTTP delivery, pluggable vendor senders, and a
//! multi-phase send pipeline with per-record partial-failure accounting.
//!
//! The crate is organized around four layers:
//!
//! - **Workflow**: serial and bounded-parallel task stages with shared
//!   cancellation
//! - **Client**: a retrying request executor with an onion-composed
//!   middleware chain and pooled body buffers
//! - **Senders**: a name-keyed vendor registry with per-call clones and two
//!   reference webhook integrations
//! - **Pipeline**: the check/send phases that validate a request, persist a
//!   batch, and fan deliveries out per record
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use msgflow::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let registry = Arc::new(SenderRegistry::with_defaults());
//! let executor = Arc::new(RequestExecutor::new());
//!
//! let mut pipeline = SendPipeline::new(store, registry, executor, request);
//! let cancel = Arc::new(CancellationToken::new());
//! pipeline.check(&cancel).await?;
//! pipeline.send(&cancel).await?;
//! let batch = pipeline.send_batch().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod errors;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod senders;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{
        default_backoff, BackoffFn, BufferPool, HttpError, HttpErrorKind, HttpRequest,
        HttpResponse, Middleware, Next, RequestExecutor, RequestOptions,
    };
    pub use crate::errors::{MsgflowError, ParallelErrors, TaskFailure};
    pub use crate::model::{
        Agent, BatchStatus, Channel, JsonMap, MemoryStore, RecordStatus, SendBatch, SendRecord,
        Store, Template,
    };
    pub use crate::pipeline::{DispatchRequest, DispatchState, SendPipeline};
    pub use crate::render::{render_content, replace_variables};
    pub use crate::senders::{
        bind_config, ConfigField, DingTalkSender, Message, Sender, SenderInfo, SenderRegistry,
        WorkWxSender,
    };
    pub use crate::workflow::{ParallelStage, SerialStage, Task};
}
