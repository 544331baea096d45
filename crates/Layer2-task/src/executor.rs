//! Task Executor - dispatches tasks and tracks them until they are evicted
//!
//! Features:
//! - One tokio task per submitted task, no fixed worker pool
//! - Exactly-once dispatch, even across executors
//! - Timeouts enforced off the dispatch runtime
//! - Periodic eviction of terminal tasks
//! - Cooperative shutdown with a bounded grace period

use crate::monitor::Monitor;
use crate::registry::Registry;
use crate::task::{AnyTask, Execute, Task, TaskId};
use crate::wrapper;
use errand_foundation::{Error, ExecutorConfig, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument::{Instrument, WithSubscriber};
use tracing::{debug, info, info_span, warn, Dispatch};

/// Builder for [`TaskExecutor`]
#[derive(Default)]
pub struct TaskExecutorBuilder {
    config: ExecutorConfig,
    runtime: Option<Handle>,
    dispatch: Option<Dispatch>,
}

impl TaskExecutorBuilder {
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn eviction_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_eviction_interval(interval);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config = self.config.with_shutdown_grace(grace);
        self
    }

    /// Runtime task bodies are spawned on (default: the current one)
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Subscriber every log line of this executor and its tasks goes to
    /// (default: whichever is current where each call is made)
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn build(self) -> Result<TaskExecutor> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                Error::Config("TaskExecutor must be built inside a tokio runtime".to_string())
            })?,
        };

        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let monitor_dispatch = self
            .dispatch
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));
        let monitor = Monitor::spawn(
            &self.config,
            Arc::clone(&registry),
            shutdown.clone(),
            monitor_dispatch,
        )?;

        Ok(TaskExecutor {
            registry,
            gate: RwLock::new(false),
            tracker: TaskTracker::new(),
            runtime,
            monitor,
            shutdown,
            dispatch: self.dispatch,
            config: self.config,
        })
    }
}

/// Scheduler for [`Task`]s
pub struct TaskExecutor {
    registry: Arc<Registry>,

    /// `true` once closed. Held shared while dispatching, exclusively by
    /// `close()`, so no dispatch can straddle the start of shutdown.
    gate: RwLock<bool>,

    /// In-flight task bodies
    tracker: TaskTracker,

    runtime: Handle,
    monitor: Monitor,

    /// Stops the monitor thread
    shutdown: CancellationToken,

    dispatch: Option<Dispatch>,
    config: ExecutorConfig,
}

impl TaskExecutor {
    /// Executor with default configuration on the current runtime
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> TaskExecutorBuilder {
        TaskExecutorBuilder::default()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Register and dispatch a task.
    ///
    /// Fails with `AlreadySubmitted` if this executor already holds the task,
    /// `NotPending` if it was dispatched elsewhere, and `ExecutorClosed`
    /// once `close()` has begun.
    pub fn submit<E: Execute>(&self, task: Arc<Task<E>>) -> Result<TaskId> {
        let dispatch = self.log_dispatch();
        let closed = self.gate.read();
        if *closed {
            return Err(Error::ExecutorClosed);
        }

        let id = task.id();
        let erased: Arc<dyn AnyTask> = task.clone();
        if !self.registry.insert_new(Arc::clone(&erased)) {
            return Err(Error::AlreadySubmitted(id.to_string()));
        }
        if let Err(e) = task.try_start() {
            self.registry.remove(&id);
            return Err(e);
        }

        let kind = task.name();
        let body = async move {
            let span = info_span!("task", id = %id, kind);
            wrapper::run(task).instrument(span).await
        };
        let handle = self
            .tracker
            .spawn_on(body.with_subscriber(dispatch.clone()), &self.runtime);
        self.registry.set_abort_handle(&id, handle.abort_handle());

        let timeout = erased.timeout();
        let armed = timeout.is_zero() || self.monitor.schedule(Arc::downgrade(&erased), timeout);
        drop(closed);

        tracing::dispatcher::with_default(&dispatch, || {
            if !armed {
                warn!("Monitor has stopped, timeout {:?} of {} is not enforced", timeout, id);
            }
            debug!("Dispatched {} {} (timeout {:?})", kind, id, timeout);
        });
        Ok(id)
    }

    /// Submit and wait for the terminal result
    pub async fn run<E: Execute>(&self, task: Arc<Task<E>>) -> Result<E::Output>
    where
        E::Output: Clone,
    {
        self.submit(Arc::clone(&task))?;
        task.wait().await
    }

    pub fn get(&self, id: TaskId) -> Result<Arc<dyn AnyTask>> {
        self.registry
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Typed lookup; `NotFound` also when the task has a different body type
    pub fn get_as<E: Execute>(&self, id: TaskId) -> Result<Arc<Task<E>>> {
        self.get(id)?
            .into_any()
            .downcast::<Task<E>>()
            .map_err(|_| Error::NotFound(format!("{} as {}", id, std::any::type_name::<E>())))
    }

    /// Snapshot of registered ids, terminal tasks included until evicted
    pub fn list(&self) -> Vec<TaskId> {
        self.registry.ids()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        *self.gate.read()
    }

    /// Remove terminal tasks now instead of waiting for the next sweep
    pub fn evict(&self) -> usize {
        let evicted = self.registry.evict_terminal();
        if evicted > 0 {
            tracing::dispatcher::with_default(&self.log_dispatch(), || {
                debug!("Evicted {} terminal tasks", evicted);
            });
        }
        evicted
    }

    /// Shut down: cancel every registered task, give in-flight bodies the
    /// configured grace period, then abort what is left. Never fails; a
    /// second call returns immediately.
    pub async fn close(&self) {
        {
            let mut closed = self.gate.write();
            if *closed {
                return;
            }
            *closed = true;
        }

        let grace = self.config.shutdown_grace();
        async {
            self.shutdown.cancel();

            let cancelled = self.registry.cancel_all();
            info!(
                "Closing executor: {} tasks registered, {} cancelled",
                self.registry.len(),
                cancelled
            );

            self.tracker.close();
            if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
                let aborted = self.registry.abort_unfinished();
                warn!("{} tasks still running after {:?}, aborted", aborted, grace);
            }

            self.registry.clear();
            debug!("Executor closed");
        }
        .with_subscriber(self.log_dispatch())
        .await
    }

    fn log_dispatch(&self) -> Dispatch {
        self.dispatch
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone))
    }
}

impl Drop for TaskExecutor {
    /// Without an explicit `close()`, registered tasks are still cancelled
    /// (cooperatively, without waiting) and the monitor is stopped.
    fn drop(&mut self) {
        self.shutdown.cancel();
        if !*self.gate.get_mut() {
            let cancelled = self.registry.cancel_all();
            if cancelled > 0 {
                tracing::dispatcher::with_default(&self.log_dispatch(), || {
                    debug!("Executor dropped, cancelled {} tasks", cancelled);
                });
            }
        }
    }
}
