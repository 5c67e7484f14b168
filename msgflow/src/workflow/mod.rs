//! The task orchestration engine: tasks plus serial and bounded-parallel
//! execution stages.
//!
//! A [`Task`] is the atomic unit of orchestrated work, with before/action/
//! finish hooks over a typed state. A [`SerialStage`] threads the state
//! through its tasks in registration order and stops at the first error; a
//! [`ParallelStage`] fans tasks out across a bounded worker pool and
//! aggregates every failure without aborting siblings.

mod parallel;
mod serial;
mod task;

pub use parallel::ParallelStage;
pub use serial::SerialStage;
pub use task::Task;
