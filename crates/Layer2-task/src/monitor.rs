//! Timeout monitor and eviction sweep
//!
//! Both run on a dedicated OS thread with its own current-thread runtime, so
//! a saturated or blocked dispatch runtime can delay neither timeouts nor
//! registry cleanup.

use crate::registry::Registry;
use crate::task::AnyTask;
use errand_foundation::{ExecutorConfig, Result};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::time::delay_queue::{Expired, Key};
use tokio_util::time::DelayQueue;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, Dispatch};

/// Longest delay handed to the timer wheel at once; later deadlines are
/// re-armed each time this much has elapsed.
const MAX_ARM_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A task to cancel once `timeout` has elapsed
pub(crate) struct Deadline {
    pub(crate) task: Weak<dyn AnyTask>,
    pub(crate) timeout: Duration,
}

/// Handle to the monitor thread; the thread exits once `shutdown` fires or
/// every handle is dropped.
pub(crate) struct Monitor {
    deadlines: mpsc::UnboundedSender<Deadline>,
}

impl Monitor {
    pub(crate) fn spawn(
        config: &ExecutorConfig,
        registry: Arc<Registry>,
        shutdown: CancellationToken,
        dispatch: Dispatch,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (deadlines, receiver) = mpsc::unbounded_channel();
        let interval = config.eviction_interval();

        std::thread::Builder::new()
            .name(config.monitor_thread_name.clone())
            .spawn(move || {
                runtime.block_on(
                    watch(receiver, registry, shutdown, interval).with_subscriber(dispatch),
                );
            })?;

        Ok(Self { deadlines })
    }

    /// Arm a timeout; false if the monitor has stopped
    pub(crate) fn schedule(&self, task: Weak<dyn AnyTask>, timeout: Duration) -> bool {
        self.deadlines.send(Deadline { task, timeout }).is_ok()
    }
}

struct Armed {
    task: Weak<dyn AnyTask>,
    deadline: Instant,
}

/// Pending timeouts, keyed so entries of finished tasks can be dropped early
struct Timeouts {
    queue: DelayQueue<Armed>,
    keys: HashMap<Key, Weak<dyn AnyTask>>,
}

impl Timeouts {
    fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn arm(&mut self, task: Weak<dyn AnyTask>, timeout: Duration) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.arm_until(task, deadline),
            None => debug!("Timeout {:?} is out of range and never fires", timeout),
        }
    }

    fn arm_until(&mut self, task: Weak<dyn AnyTask>, deadline: Instant) {
        let delay = deadline
            .saturating_duration_since(Instant::now())
            .min(MAX_ARM_DELAY);
        let key = self.queue.insert(
            Armed {
                task: task.clone(),
                deadline,
            },
            delay,
        );
        self.keys.insert(key, task);
    }

    /// Cancel the task behind an expired entry, or re-arm it if its
    /// deadline lies beyond what the wheel could hold.
    fn fire(&mut self, expired: Expired<Armed>) {
        self.keys.remove(&expired.key());
        let armed = expired.into_inner();
        if Instant::now() < armed.deadline {
            self.arm_until(armed.task, armed.deadline);
            return;
        }
        if let Some(task) = armed.task.upgrade() {
            if task.cancel() {
                info!("Task {} timed out after {:?}", task.id(), task.timeout());
            }
        }
    }

    /// Drop entries whose task is gone or no longer running
    fn prune(&mut self) -> usize {
        let finished: Vec<Key> = self
            .keys
            .iter()
            .filter(|(_, task)| {
                !task
                    .upgrade()
                    .map(|task| task.status().is_running())
                    .unwrap_or(false)
            })
            .map(|(key, _)| *key)
            .collect();
        for key in &finished {
            self.keys.remove(key);
            self.queue.remove(key);
        }
        finished.len()
    }
}

async fn watch(
    mut receiver: mpsc::UnboundedReceiver<Deadline>,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    eviction_interval: Duration,
) {
    let mut timeouts = Timeouts::new();
    let mut sweep = tokio::time::interval_at(Instant::now() + eviction_interval, eviction_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("Monitor started, eviction every {:?}", eviction_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = receiver.recv() => match received {
                Some(deadline) => timeouts.arm(deadline.task, deadline.timeout),
                None => break,
            },
            Some(expired) = timeouts.queue.next(), if !timeouts.queue.is_empty() => {
                timeouts.fire(expired);
            }
            _ = sweep.tick() => {
                let pruned = timeouts.prune();
                let evicted = registry.evict_terminal();
                if evicted > 0 || pruned > 0 {
                    debug!(
                        "Evicted {} terminal tasks, {} remain; dropped {} stale timeouts, {} armed",
                        evicted,
                        registry.len(),
                        pruned,
                        timeouts.len()
                    );
                }
            }
        }
    }

    debug!("Monitor stopped");
}
