//! Parallel stage: bounded fan-out with aggregate error collection.

use super::Task;
use crate::cancellation::CancellationToken;
use crate::errors::{MsgflowError, ParallelErrors, TaskFailure};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs tasks across a bounded pool of concurrent workers.
///
/// All added tasks are enqueued into a shared work queue and exactly `limit`
/// workers are spawned, each pulling tasks until the queue drains or the
/// cancellation token fires. A cancelled worker exits without draining the
/// queue - tasks not yet picked up are abandoned, not explicitly cancelled.
///
/// Unlike [`super::SerialStage`], a task failure never aborts its siblings:
/// every failure is collected into a [`ParallelErrors`] aggregate returned
/// after all workers finish. The aggregate is informational; callers that
/// need authoritative partial-success accounting must inspect the per-item
/// state their tasks produced.
///
/// Each worker receives its own clone of the state snapshot, so tasks must
/// not depend on one another's state mutations.
pub struct ParallelStage<S> {
    stage_name: String,
    limit: usize,
    tasks: Vec<Arc<dyn Task<S>>>,
}

impl<S> ParallelStage<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Creates an empty parallel stage.
    #[must_use]
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            limit: 0,
            tasks: Vec::new(),
        }
    }

    /// Sets the maximum number of concurrent workers.
    ///
    /// A limit of `0` means one worker per queued task, effectively
    /// unrestricted relative to the batch size.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Appends a task to the work queue.
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

    /// Runs all tasks across the worker pool and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns [`MsgflowError::Parallel`] enumerating every individual task
    /// failure when one or more tasks errored.
    pub async fn run(
        &self,
        cancel: &Arc<CancellationToken>,
        state: &S,
    ) -> Result<(), MsgflowError> {
        if self.tasks.is_empty() {
            return Ok(());
        }

        let limit = if self.limit == 0 {
            self.tasks.len()
        } else {
            self.limit.min(self.tasks.len())
        };

        let queue: Arc<Mutex<VecDeque<Arc<dyn Task<S>>>>> =
            Arc::new(Mutex::new(self.tasks.iter().cloned().collect()));
        let failures: Arc<Mutex<Vec<TaskFailure>>> = Arc::new(Mutex::new(Vec::new()));

        let mut workers = Vec::with_capacity(limit);
        for worker_id in 0..limit {
            let queue = queue.clone();
            let failures = failures.clone();
            let cancel = cancel.clone();
            let state = state.clone();
            let stage_name = self.stage_name.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!(worker_id, stage = %stage_name, "worker exiting on cancellation");
                        return;
                    }
                    let Some(task) = queue.lock().pop_front() else {
                        return;
                    };

                    let mut snapshot = state.clone();
                    task.on_before(&mut snapshot).await;
                    let result = task.on_action(&cancel, &mut snapshot).await;
                    task.on_finish(&snapshot, result.as_ref().err()).await;

                    if let Err(error) = result {
                        failures.lock().push(TaskFailure {
                            stage: stage_name.clone(),
                            task: task.name().to_string(),
                            error,
                        });
                    }
                }
            }));
        }

        for outcome in futures::future::join_all(workers).await {
            if let Err(err) = outcome {
                warn!(stage = %self.stage_name, error = %err, "parallel worker panicked");
            }
        }

        let failures = std::mem::take(&mut *failures.lock());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(MsgflowError::Parallel(ParallelErrors {
                stage: self.stage_name.clone(),
                failures,
            }))
        }
    }
}

impl<S> std::fmt::Debug for ParallelStage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelStage")
            .field("stage_name", &self.stage_name)
            .field("limit", &self.limit)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
