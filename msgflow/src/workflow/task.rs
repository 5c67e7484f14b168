//! The task trait executed by serial and parallel stages.

use crate::cancellation::CancellationToken;
use crate::errors::MsgflowError;
use async_trait::async_trait;
use std::sync::Arc;

/// An atomic unit of orchestrated work.
///
/// Tasks are generic over a typed state `S` that the owning stage threads
/// between them, replacing untyped key-value context passing with
/// compile-time guarantees over what each task may read and write.
///
/// A stage invokes the hooks in order: `on_before`, `on_action`, and then
/// `on_finish` regardless of the action's outcome - the finish hook is
/// guaranteed to run for every task that started. Tasks are stateless
/// between invocations and owned exclusively by their stage for one run.
#[async_trait]
pub trait Task<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// The task's name, used to identify it in failure aggregates and logs.
    fn name(&self) -> &str;

    /// Called before the action; may prime the state.
    async fn on_before(&self, _state: &mut S) {}

    /// Executes the task's work.
    async fn on_action(
        &self,
        cancel: &Arc<CancellationToken>,
        state: &mut S,
    ) -> Result<(), MsgflowError>;

    /// Called after the action with the resulting state and error, whether
    /// or not the action succeeded.
    async fn on_finish(&self, _state: &S, _err: Option<&MsgflowError>) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Records every hook invocation, for asserting stage ordering.
    pub struct RecordingTask {
        pub task_name: String,
        pub fail: bool,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingTask {
        pub fn new(name: &str, fail: bool, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                task_name: name.to_string(),
                fail,
                log,
            }
        }
    }

    #[async_trait]
    impl Task<Vec<String>> for RecordingTask {
        fn name(&self) -> &str {
            &self.task_name
        }

        async fn on_before(&self, _state: &mut Vec<String>) {
            self.log.lock().push(format!("{}:before", self.task_name));
        }

        async fn on_action(
            &self,
            _cancel: &Arc<CancellationToken>,
            state: &mut Vec<String>,
        ) -> Result<(), MsgflowError> {
            self.log.lock().push(format!("{}:action", self.task_name));
            if self.fail {
                return Err(MsgflowError::Validation(format!("{} failed", self.task_name)));
            }
            state.push(self.task_name.clone());
            Ok(())
        }

        async fn on_finish(&self, _state: &Vec<String>, err: Option<&MsgflowError>) {
            let outcome = if err.is_some() { "err" } else { "ok" };
            self.log
                .lock()
                .push(format!("{}:finish:{outcome}", self.task_name));
        }
    }
}
