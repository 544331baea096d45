//! Task definition and types

use crate::slot::{Outcome, ResultSlot};
use crate::state::Status;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errand_foundation::{Error, Result, TaskFailure};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for compact log lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unit of work behind a [`Task`].
///
/// Implementors read their input from the reference handed in and report
/// failure by returning an error. A body is cancelled cooperatively: it is
/// dropped at its next `.await` once the task is cancelled, so a body that
/// never yields keeps running until it returns (its result is then discarded).
#[async_trait]
pub trait Execute: Send + Sync + 'static {
    type Input: fmt::Debug + Send + Sync + 'static;
    type Output: fmt::Debug + Send + Sync + 'static;

    async fn execute(&self, input: &Self::Input) -> anyhow::Result<Self::Output>;

    /// Automatic cancellation after this long; zero means never
    fn timeout(&self) -> Duration {
        Duration::ZERO
    }

    /// Kind name used in logs and the diagnostic dump
    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }
}

/// A typed unit of asynchronous work with a single authoritative result.
///
/// Constructed `PENDING`; dispatched at most once by a
/// [`TaskExecutor`](crate::TaskExecutor).
pub struct Task<E: Execute> {
    id: TaskId,
    input: E::Input,
    body: E,
    timeout: Option<Duration>,
    slot: ResultSlot<E::Output>,
    created_at: DateTime<Utc>,
    started_at: OnceLock<DateTime<Utc>>,
    ended_at: OnceLock<DateTime<Utc>>,
    /// Fired on cancellation; the running body is dropped when it fires
    interrupt: CancellationToken,
    /// Fired once the slot holds a terminal outcome
    done: CancellationToken,
    dispatch_lock: Mutex<()>,
}

impl<E: Execute> Task<E> {
    pub fn new(input: E::Input, body: E) -> Self {
        Self {
            id: TaskId::new(),
            input,
            body,
            timeout: None,
            slot: ResultSlot::new(),
            created_at: Utc::now(),
            started_at: OnceLock::new(),
            ended_at: OnceLock::new(),
            interrupt: CancellationToken::new(),
            done: CancellationToken::new(),
            dispatch_lock: Mutex::new(()),
        }
    }

    /// Override the body's timeout for this instance
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn input(&self) -> &E::Input {
        &self.input
    }

    pub fn body(&self) -> &E {
        &self.body
    }

    pub fn name(&self) -> &'static str {
        self.body.name()
    }

    /// Never blocks
    pub fn status(&self) -> Status {
        self.slot.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Present only when the status is `COMPLETED`
    pub fn output(&self) -> Option<&E::Output> {
        self.slot.output()
    }

    /// Present only when the status is `FAILED`
    pub fn failure(&self) -> Option<&TaskFailure> {
        self.slot.failure()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.get().copied()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at.get().copied()
    }

    /// Zero before start, elapsed so far while running, fixed once ended
    pub fn duration(&self) -> Duration {
        let Some(start) = self.started_at() else {
            return Duration::ZERO;
        };
        let end = self.ended_at().unwrap_or_else(Utc::now);
        (end - start).to_std().unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| self.body.timeout())
    }

    /// Request cooperative cancellation.
    ///
    /// Returns true if this call moved the task to `CANCELLED`. A task that
    /// was never dispatched, or is already terminal, is left untouched.
    pub fn cancel(&self) -> bool {
        if !self.slot.has_started() {
            return false;
        }
        let cancelled = self.complete(Outcome::Cancelled);
        if cancelled {
            self.interrupt.cancel();
        }
        cancelled
    }

    /// Wait for a terminal state and return the output.
    ///
    /// A body that panicked resumes its panic here rather than being
    /// reported as an ordinary failure.
    pub async fn wait(&self) -> Result<E::Output>
    where
        E::Output: Clone,
    {
        self.settle(None).await?;
        self.resolve()
    }

    /// Like [`wait`](Self::wait), giving up with `AwaitInterrupted` as soon
    /// as `interrupt` fires. The task itself keeps running.
    pub async fn wait_interruptible(&self, interrupt: &CancellationToken) -> Result<E::Output>
    where
        E::Output: Clone,
    {
        self.settle(Some(interrupt)).await?;
        self.resolve()
    }

    async fn settle(&self, interrupt: Option<&CancellationToken>) -> Result<()> {
        if !self.slot.has_started() {
            return Err(Error::NotDispatched(self.id.to_string()));
        }
        match interrupt {
            Some(interrupt) => {
                tokio::select! {
                    biased;
                    _ = self.done.cancelled() => Ok(()),
                    _ = interrupt.cancelled() => Err(Error::AwaitInterrupted(self.id.to_string())),
                }
            }
            None => {
                self.done.cancelled().await;
                Ok(())
            }
        }
    }

    fn resolve(&self) -> Result<E::Output>
    where
        E::Output: Clone,
    {
        match self.slot.outcome() {
            Some(Outcome::Success(output)) => Ok(output.clone()),
            Some(Outcome::Failure(failure)) if failure.is_panic() => {
                std::panic::resume_unwind(Box::new(failure.message()))
            }
            Some(Outcome::Failure(failure)) => Err(Error::execution_failed(self.id, failure.clone())),
            Some(Outcome::Cancelled) => Err(Error::AwaitCancelled(self.id.to_string())),
            None => Err(Error::Internal(format!(
                "task {} signalled completion without an outcome",
                self.id
            ))),
        }
    }

    /// PENDING check and `unset -> running`, under this task's own lock.
    ///
    /// `started_at` is set before `running` is published, so a concurrent
    /// `cancel()` always sees a start time when it records the end.
    pub(crate) fn try_start(&self) -> Result<()> {
        let _guard = self.dispatch_lock.lock();
        let status = self.status();
        if !status.is_pending() {
            return Err(Error::NotPending {
                id: self.id.to_string(),
                status: status.to_string(),
            });
        }
        let _ = self.started_at.set(Utc::now());
        if !self.slot.start() {
            return Err(Error::Internal(format!(
                "task {} left PENDING while its dispatch lock was held",
                self.id
            )));
        }
        Ok(())
    }

    /// `running -> terminal`; false when another transition got there first
    pub(crate) fn complete(&self, outcome: Outcome<E::Output>) -> bool {
        let now = Utc::now();
        if self.slot.finish(outcome).is_err() {
            return false;
        }
        let _ = self.ended_at.set(now);
        self.done.cancel();
        true
    }

    pub(crate) fn interrupt_token(&self) -> &CancellationToken {
        &self.interrupt
    }
}

impl<I, O, F> Task<FnTask<I, O, F>>
where
    I: fmt::Debug + Send + Sync + 'static,
    O: fmt::Debug + Send + Sync + 'static,
    F: Fn(&I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    /// Build a task from a plain function of its input
    pub fn from_fn(input: I, f: F) -> Self {
        Task::new(
            input,
            FnTask {
                f,
                _marker: PhantomData,
            },
        )
    }
}

impl<E: Execute> fmt::Display for Task<E> {
    /// Diagnostic dump; safe to render at any point of the lifecycle
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "type: Task # {}", self.name())?;
        writeln!(f, "id: {}", self.id)?;
        write!(f, "status: {}", self.status())?;
        if let Some(started) = self.started_at() {
            write!(f, "\nstarted: {}", started.to_rfc3339())?;
        }
        if let Some(ended) = self.ended_at() {
            write!(f, "\nended: {}", ended.to_rfc3339())?;
        }
        if self.started_at().is_some() {
            write!(f, "\nduration: {:?}", self.duration())?;
        }
        let timeout = self.timeout();
        if !timeout.is_zero() {
            write!(f, "\ntimeout: {:?}", timeout)?;
        }
        write!(f, "\ninput: {:?}", self.input)?;
        if let Some(output) = self.output() {
            write!(f, "\noutput: {:?}", output)?;
        }
        if let Some(failure) = self.failure() {
            write!(f, "\nfailure: {}", failure)?;
        }
        Ok(())
    }
}

impl<E: Execute> fmt::Debug for Task<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.name())
            .field("status", &self.status())
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Body wrapping a plain function, see [`Task::from_fn`]
pub struct FnTask<I, O, F> {
    f: F,
    _marker: PhantomData<fn(&I) -> O>,
}

#[async_trait]
impl<I, O, F> Execute for FnTask<I, O, F>
where
    I: fmt::Debug + Send + Sync + 'static,
    O: fmt::Debug + Send + Sync + 'static,
    F: Fn(&I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    type Input = I;
    type Output = O;

    async fn execute(&self, input: &I) -> anyhow::Result<O> {
        (self.f)(input)
    }

    fn name(&self) -> &'static str {
        "FnTask"
    }
}

/// Type-erased view of a task, as held by the executor's registry
pub trait AnyTask: fmt::Display + Send + Sync + 'static {
    fn id(&self) -> TaskId;
    fn name(&self) -> &'static str;
    fn status(&self) -> Status;
    fn started_at(&self) -> Option<DateTime<Utc>>;
    fn ended_at(&self) -> Option<DateTime<Utc>>;
    fn duration(&self) -> Duration;
    fn timeout(&self) -> Duration;
    fn failure(&self) -> Option<TaskFailure>;
    fn cancel(&self) -> bool;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Execute> AnyTask for Task<E> {
    fn id(&self) -> TaskId {
        Task::id(self)
    }

    fn name(&self) -> &'static str {
        Task::name(self)
    }

    fn status(&self) -> Status {
        Task::status(self)
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        Task::started_at(self)
    }

    fn ended_at(&self) -> Option<DateTime<Utc>> {
        Task::ended_at(self)
    }

    fn duration(&self) -> Duration {
        Task::duration(self)
    }

    fn timeout(&self) -> Duration {
        Task::timeout(self)
    }

    fn failure(&self) -> Option<TaskFailure> {
        Task::failure(self).cloned()
    }

    fn cancel(&self) -> bool {
        Task::cancel(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Immediate;

    #[async_trait]
    impl Execute for Immediate {
        type Input = String;
        type Output = String;

        async fn execute(&self, input: &String) -> anyhow::Result<String> {
            Ok(format!("Result: {}", input))
        }
    }

    struct Patient;

    #[async_trait]
    impl Execute for Patient {
        type Input = ();
        type Output = ();

        async fn execute(&self, _: &()) -> anyhow::Result<()> {
            Ok(())
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new("test".to_string(), Immediate);
        assert_eq!(task.status(), Status::Pending);
        assert_eq!(task.input(), "test");
        assert!(task.output().is_none());
        assert!(task.failure().is_none());
        assert!(task.started_at().is_none());
        assert_eq!(task.duration(), Duration::ZERO);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Task::new("a".to_string(), Immediate);
        let b = Task::new("b".to_string(), Immediate);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().short().len(), 8);
    }

    #[test]
    fn test_cancel_before_dispatch_is_noop() {
        let task = Task::new("x".to_string(), Immediate);
        assert!(!task.cancel());
        assert_eq!(task.status(), Status::Pending);
    }

    #[test]
    fn test_try_start_only_once() {
        let task = Task::new("x".to_string(), Immediate);
        task.try_start().unwrap();
        assert_eq!(task.status(), Status::InProgress);
        assert!(task.started_at().is_some());

        let err = task.try_start().unwrap_err();
        assert!(matches!(err, Error::NotPending { .. }));
    }

    #[test]
    fn test_complete_records_output_and_end() {
        let task = Task::new("x".to_string(), Immediate);
        task.try_start().unwrap();
        assert!(task.complete(Outcome::Success("done".to_string())));

        assert_eq!(task.status(), Status::Completed);
        assert_eq!(task.output().map(String::as_str), Some("done"));
        assert!(task.ended_at().is_some());

        // Terminal states are final
        assert!(!task.cancel());
        assert_eq!(task.status(), Status::Completed);
    }

    #[test]
    fn test_timeout_default_and_override() {
        assert_eq!(Task::new("x".to_string(), Immediate).timeout(), Duration::ZERO);
        assert_eq!(Task::new((), Patient).timeout(), Duration::from_secs(5));
        let task = Task::new((), Patient).with_timeout(Duration::from_millis(10));
        assert_eq!(task.timeout(), Duration::from_millis(10));
    }

    #[test]
    fn test_name_strips_module_path() {
        assert_eq!(Immediate.name(), "Immediate");
        let task = Task::from_fn(1u32, |n: &u32| -> anyhow::Result<u32> { Ok(n + 1) });
        assert_eq!(task.name(), "FnTask");
    }

    #[test]
    fn test_dump_while_pending_and_after_failure() {
        let task = Task::new((), Patient);
        let dump = task.to_string();
        assert!(dump.starts_with("type: Task # Patient\n"));
        assert!(dump.contains("status: PENDING"));
        assert!(dump.contains("timeout: 5s"));
        assert!(!dump.contains("started:"));

        task.try_start().unwrap();
        task.complete(Outcome::Failure(TaskFailure::new(anyhow::anyhow!("broken"))));
        let dump = task.to_string();
        assert!(dump.contains("status: FAILED"));
        assert!(dump.contains("failure: broken"));
        assert!(!dump.contains("output:"));
    }

    #[tokio::test]
    async fn test_wait_before_dispatch_is_reported() {
        let task = Task::new("x".to_string(), Immediate);
        let err = task.wait().await.unwrap_err();
        assert!(matches!(err, Error::NotDispatched(_)));
    }

    #[tokio::test]
    async fn test_wait_interruptible() {
        let task = Task::new("x".to_string(), Immediate);
        task.try_start().unwrap();

        let interrupt = CancellationToken::new();
        interrupt.cancel();
        let err = task.wait_interruptible(&interrupt).await.unwrap_err();
        assert!(matches!(err, Error::AwaitInterrupted(_)));
        assert_eq!(task.status(), Status::InProgress);
    }

    #[tokio::test]
    async fn test_wait_after_cancel() {
        let task = Task::new("x".to_string(), Immediate);
        task.try_start().unwrap();
        assert!(task.cancel());

        let err = task.wait().await.unwrap_err();
        assert!(matches!(err, Error::AwaitCancelled(_)));
        assert!(task.interrupt_token().is_cancelled());
    }

    #[test]
    fn test_cancel_racing_start_sees_start_time() {
        for _ in 0..200 {
            let task = Arc::new(Task::new("x".to_string(), Immediate));
            let canceller = Arc::clone(&task);
            let spinner = std::thread::spawn(move || {
                while !canceller.cancel() && canceller.status() != Status::Cancelled {
                    std::hint::spin_loop();
                }
            });
            task.try_start().unwrap();
            spinner.join().unwrap();

            let started = task.started_at().unwrap();
            let ended = task.ended_at().unwrap();
            assert!(ended >= started);
        }
    }
}
