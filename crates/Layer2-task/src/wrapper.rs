//! Execution wrapper - the context a dispatched task body runs inside
//!
//! Runs the body against the task's interrupt token, turns whatever the
//! body produced (value, error or panic) into the slot's terminal outcome,
//! and logs the diagnostic dump when it is done.

use crate::slot::Outcome;
use crate::task::{Execute, Task};
use errand_foundation::TaskFailure;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cancels the task if the wrapper is dropped before recording an outcome,
/// e.g. when it is aborted or its runtime shuts down.
struct Abandoned<'a, E: Execute> {
    task: Option<&'a Task<E>>,
}

impl<E: Execute> Abandoned<'_, E> {
    fn disarm(&mut self) {
        self.task = None;
    }
}

impl<E: Execute> Drop for Abandoned<'_, E> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if task.cancel() {
                warn!("Task {} dropped before finishing", task.id());
            }
        }
    }
}

pub(crate) async fn run<E: Execute>(task: Arc<Task<E>>) {
    let mut abandoned = Abandoned { task: Some(&*task) };
    let interrupt = task.interrupt_token().clone();
    let body = AssertUnwindSafe(task.body().execute(task.input())).catch_unwind();

    let outcome = tokio::select! {
        biased;
        _ = interrupt.cancelled() => None,
        result = body => Some(match result {
            Ok(Ok(output)) => Outcome::Success(output),
            Ok(Err(error)) => Outcome::Failure(TaskFailure::new(error)),
            Err(payload) => Outcome::Failure(TaskFailure::panic(panic_message(&*payload))),
        }),
    };
    abandoned.disarm();

    match outcome {
        Some(outcome) => {
            let finished = outcome.status();
            if !task.complete(outcome) {
                debug!(
                    "Discarded {} result, task was already {}",
                    finished,
                    task.status()
                );
            }
        }
        None => debug!("Interrupted"),
    }

    debug!("{}", task);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Status;
    use async_trait::async_trait;

    struct Panicky;

    #[async_trait]
    impl Execute for Panicky {
        type Input = ();
        type Output = ();

        async fn execute(&self, _: &()) -> anyhow::Result<()> {
            panic!("kaboom");
        }
    }

    struct Forever;

    #[async_trait]
    impl Execute for Forever {
        type Input = ();
        type Output = ();

        async fn execute(&self, _: &()) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failure() {
        let task = Arc::new(Task::new((), Panicky));
        task.try_start().unwrap();
        run(Arc::clone(&task)).await;

        assert_eq!(task.status(), Status::Failed);
        let failure = task.failure().unwrap();
        assert!(failure.is_panic());
        assert_eq!(failure.message(), "kaboom");
        assert!(task.ended_at().is_some());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_body() {
        let task = Arc::new(Task::new((), Forever));
        task.try_start().unwrap();

        let handle = tokio::spawn(run(Arc::clone(&task)));
        tokio::task::yield_now().await;
        assert!(task.cancel());

        handle.await.unwrap();
        assert_eq!(task.status(), Status::Cancelled);
    }

    #[tokio::test]
    async fn test_abort_marks_cancelled() {
        let task = Arc::new(Task::new((), Forever));
        task.try_start().unwrap();

        let handle = tokio::spawn(run(Arc::clone(&task)));
        tokio::task::yield_now().await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(task.status(), Status::Cancelled);
    }
}
