//! The multi-phase send pipeline: check, dispatch, report.

mod send;
mod state;
mod tasks;

pub use send::{DispatchRequest, SendPipeline};
pub use state::DispatchState;
pub use tasks::{
    BatchEndTask, BatchStartTask, CheckAgentTask, CheckParamsTask, CheckTemplateTask,
    CreateBatchTask, DispatchRecordsTask, SendRecordTask,
};
