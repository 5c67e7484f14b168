//! Serial stage: ordered, fail-fast task execution.

use super::Task;
use crate::cancellation::CancellationToken;
use crate::errors::MsgflowError;
use std::sync::Arc;
use tracing::debug;

/// Runs an ordered list of tasks one at a time, threading the state from
/// each task into the next.
///
/// The cancellation token is checked before every task; a cancelled stage
/// returns [`MsgflowError::Cancelled`] without running remaining tasks. The
/// first action error stops the stage and is returned; the state produced by
/// a task becomes the input to the next task only on success. The finish
/// hook runs for every task that started, success or failure.
pub struct SerialStage<S> {
    tasks: Vec<Arc<dyn Task<S>>>,
}

impl<S> Default for SerialStage<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SerialStage<S>
where
    S: Send + Sync + 'static,
{
    /// Creates an empty serial stage.
    #[must_use]
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Appends a task to the end of the run order.
    pub fn add(&mut self, task: impl Task<S> + 'static) {
        self.tasks.push(Arc::new(task));
    }

    /// The number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs all tasks in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first task error, or [`MsgflowError::Cancelled`] when the
    /// token is cancelled before a task starts.
    pub async fn run(
        &self,
        cancel: &Arc<CancellationToken>,
        state: &mut S,
    ) -> Result<(), MsgflowError> {
        for task in &self.tasks {
            if cancel.is_cancelled() {
                return Err(MsgflowError::Cancelled(
                    cancel.reason_or("serial stage cancelled"),
                ));
            }

            task.on_before(state).await;
            let result = task.on_action(cancel, state).await;
            task.on_finish(state, result.as_ref().err()).await;

            if let Err(err) = result {
                debug!(task = task.name(), error = %err, "serial task failed, stopping stage");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl<S> std::fmt::Debug for SerialStage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStage")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
